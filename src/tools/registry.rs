//! 执行器目录与步骤工具注册表
//!
//! ExecutorCatalog 是规划器与网关共同查阅的外部配置（引用 → 能力、是否可澄清、是否取数）；
//! 所有步骤执行器实现 StepTool trait，由 ToolRegistry 按引用注册与查找。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::CatalogEntryConfig;
use crate::memory::QueryMetadata;

/// 目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub reference: String,
    pub capability: String,
    pub description: String,
    /// 是否允许返回 ClarificationNeeded
    pub clarifiable: bool,
    /// 是否为取数步骤（成功时携带 Query Metadata）
    pub data_retrieval: bool,
}

impl From<&CatalogEntryConfig> for CatalogEntry {
    fn from(cfg: &CatalogEntryConfig) -> Self {
        Self {
            reference: cfg.reference.clone(),
            capability: cfg.capability.clone(),
            description: cfg.description.clone(),
            clarifiable: cfg.clarifiable,
            data_retrieval: cfg.data_retrieval,
        }
    }
}

/// 执行器目录（保持注册顺序，规划提示中按此顺序列出）
#[derive(Debug, Clone, Default)]
pub struct ExecutorCatalog {
    entries: Vec<CatalogEntry>,
}

impl ExecutorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(entries: &[CatalogEntryConfig]) -> Self {
        let mut catalog = Self::new();
        for entry in entries {
            catalog.register(entry.into());
        }
        catalog
    }

    /// 注册条目；同名引用覆盖旧条目
    pub fn register(&mut self, entry: CatalogEntry) {
        match self.entries.iter_mut().find(|e| e.reference == entry.reference) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, reference: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.reference == reference)
    }

    pub fn may_clarify(&self, reference: &str) -> bool {
        self.get(reference).is_some_and(|e| e.clarifiable)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// 规划提示中的目录段落，每行一个执行器
    pub fn to_prompt_lines(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "- {} | capability={} | clarifiable={} | data_retrieval={} | {}",
                    e.reference, e.capability, e.clarifiable, e.data_retrieval, e.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 网关交给执行器的输入载荷
#[derive(Debug, Clone, Serialize)]
pub struct StepInput {
    pub step_key: String,
    pub description: String,
    pub executor: String,
    pub params: Value,
    /// 本回合用户原文
    pub user_input: String,
    pub original_request: String,
    pub rewritten_request: String,
    /// 重跑时的澄清答复
    pub clarification_answer: Option<String>,
    pub rerun: bool,
    /// 短期记忆窗口文本
    pub memory_window: String,
    /// 上一份已完成查询（分析类步骤使用）
    pub prior_query: Option<QueryMetadata>,
    /// 本步骤是否允许发起澄清
    pub allow_clarification: bool,
}

/// 执行器的正常返回
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReply {
    Done {
        action: String,
        tools_invoked: Vec<String>,
        query: Option<QueryMetadata>,
    },
    Clarify {
        question: String,
    },
}

/// 执行器自身报告的失败：kind 与 message 原样透传给调用方
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// 步骤执行器 trait
#[async_trait]
pub trait StepTool: Send + Sync {
    /// 执行器引用（与目录中的 reference 一致）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, input: &StepInput) -> Result<ToolReply, ToolError>;
}

/// 步骤执行器注册表
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn StepTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl StepTool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn StepTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StepTool>> {
        self.tools.get(name).cloned()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(reference: &str, capability: &str, clarifiable: bool) -> CatalogEntry {
        CatalogEntry {
            reference: reference.into(),
            capability: capability.into(),
            description: format!("{reference} tool"),
            clarifiable,
            data_retrieval: false,
        }
    }

    #[test]
    fn test_catalog_lookup() {
        let mut catalog = ExecutorCatalog::new();
        catalog.register(entry("es_builder", "query building", true));
        catalog.register(entry("graphql_builder", "query building", false));
        catalog.register(entry("es_executor", "query execution", false));

        assert!(catalog.may_clarify("es_builder"));
        assert!(!catalog.may_clarify("graphql_builder"));
        assert!(!catalog.may_clarify("missing"));
        assert_eq!(catalog.get("es_executor").map(|e| e.capability.as_str()), Some("query execution"));
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_catalog_register_replaces_same_reference() {
        let mut catalog = ExecutorCatalog::new();
        catalog.register(entry("a", "x", false));
        catalog.register(entry("a", "x", true));
        assert_eq!(catalog.entries().len(), 1);
        assert!(catalog.may_clarify("a"));
    }

    #[test]
    fn test_prompt_lines_preserve_order() {
        let mut catalog = ExecutorCatalog::new();
        catalog.register(entry("first", "one", true));
        catalog.register(entry("second", "two", false));
        let lines = catalog.to_prompt_lines();
        let first = lines.find("- first").unwrap();
        let second = lines.find("- second").unwrap();
        assert!(first < second);
        assert!(lines.contains("clarifiable=true"));
    }
}
