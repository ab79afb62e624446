//! 规划器
//!
//! 计划内容由规划协作方生成；列表的构建与校验在本地完成：空计划、空白或重复 key、
//! 未知执行器、目录不允许澄清却被标为 clarifiable，任一情况整份计划作废（InvalidPlan），从不部分接受。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::bounded::bounded;
use crate::core::{CollaboratorError, PlanViolation, TurnError};
use crate::llm::{parse_json_reply, prompt, LlmClient, PromptTask};
use crate::memory::QueryMetadata;
use crate::todo::{Step, TodoList};
use crate::tools::{CatalogEntry, ExecutorCatalog};

/// 协作方提出的一个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProposedStep {
    /// 计划内唯一的步骤标识，如 "resolve_port"
    pub key: String,
    /// 给用户看的一句话描述
    pub description: String,
    /// 执行器目录中的 reference
    pub executor: String,
    /// 该步骤是否可以暂停并向用户提问（仅当执行器允许时）
    #[serde(default)]
    pub clarifiable: bool,
    /// 传给执行器的参数
    #[serde(default)]
    pub params: Value,
}

/// 交给规划协作方的输入
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub rewritten_request: String,
    pub catalog: Vec<CatalogEntry>,
    pub memory_window: String,
    /// 上一份已完成查询（分析「这些结果」时使用）
    pub prior_query: Option<QueryMetadata>,
}

/// 规划协作方
#[async_trait]
pub trait PlanProposer: Send + Sync {
    async fn propose(&self, request: &PlanRequest) -> Result<Vec<ProposedStep>, CollaboratorError>;
}

/// 规划时可用的上下文
#[derive(Debug, Clone, Default)]
pub struct PlanningContext {
    pub memory_window: String,
    pub prior_query: Option<QueryMetadata>,
}

pub struct Planner {
    proposer: Arc<dyn PlanProposer>,
    catalog: ExecutorCatalog,
    timeout: Duration,
}

impl Planner {
    pub fn new(proposer: Arc<dyn PlanProposer>, catalog: ExecutorCatalog, timeout_secs: u64) -> Self {
        Self {
            proposer,
            catalog,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 生成一份全新的 Todo List（游标指向第一个步骤）
    pub async fn plan(
        &self,
        original_request: &str,
        rewritten_request: &str,
        context: PlanningContext,
        cancel: &CancellationToken,
    ) -> Result<TodoList, TurnError> {
        let request = PlanRequest {
            rewritten_request: rewritten_request.to_string(),
            catalog: self.catalog.entries().to_vec(),
            memory_window: context.memory_window,
            prior_query: context.prior_query,
        };
        let proposed = bounded(self.proposer.propose(&request), self.timeout, cancel)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "planning collaborator failed");
                PlanViolation::Collaborator(e.to_string())
            })?;

        let list = self
            .build(original_request, rewritten_request, proposed)
            .inspect_err(|v| tracing::warn!(violation = %v, "rejected plan"))?;
        tracing::info!(
            list_id = %list.list_id(),
            steps = list.len(),
            "planned todo list"
        );
        Ok(list)
    }

    /// 校验并构建列表
    pub fn build(
        &self,
        original_request: &str,
        rewritten_request: &str,
        proposed: Vec<ProposedStep>,
    ) -> Result<TodoList, PlanViolation> {
        for step in &proposed {
            let entry = self.catalog.get(&step.executor).ok_or_else(|| {
                PlanViolation::UnknownExecutor {
                    key: step.key.clone(),
                    executor: step.executor.clone(),
                }
            })?;
            if step.clarifiable && !entry.clarifiable {
                return Err(PlanViolation::ClarificationNotLicensed {
                    key: step.key.clone(),
                    executor: step.executor.clone(),
                });
            }
        }

        let steps = proposed
            .into_iter()
            .map(|p| Step::new(p.key, p.description, p.executor, p.clarifiable).with_params(p.params))
            .collect();
        TodoList::new(original_request, rewritten_request, steps)
    }
}

/// 步骤的 JSON Schema，拼入规划提示以约束输出格式
pub fn plan_step_schema_json() -> String {
    serde_json::to_string_pretty(&schema_for!(ProposedStep)).unwrap_or_default()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanReply {
    Wrapped { steps: Vec<ProposedStep> },
    Bare(Vec<ProposedStep>),
}

/// LLM 实现的规划协作方
pub struct LlmPlanProposer {
    llm: Arc<dyn LlmClient>,
}

impl LlmPlanProposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PlanProposer for LlmPlanProposer {
    async fn propose(&self, request: &PlanRequest) -> Result<Vec<ProposedStep>, CollaboratorError> {
        let mut catalog = ExecutorCatalog::new();
        for entry in &request.catalog {
            catalog.register(entry.clone());
        }

        let system = format!(
            "{}\n\
             Each step is executed by one executor from the catalog, strictly in order; later steps may \
             depend on earlier results. Only mark a step clarifiable when its executor allows it.\n\
             Answer with ONE JSON object {{\"steps\": [...]}} where every step matches this schema:\n```json\n{}\n```",
            PromptTask::Plan.opening(),
            plan_step_schema_json()
        );
        let mut user = format!(
            "Request: {}\nRecent turns:\n{}\n",
            request.rewritten_request, request.memory_window
        );
        if let Some(query) = &request.prior_query {
            user.push_str(&format!(
                "Previous query ({}): {}. {}\n",
                query.query_kind, query.result_summary, query.retrieval_description
            ));
        }
        user.push_str("Catalog:\n");
        user.push_str(&catalog.to_prompt_lines());

        let raw = self.llm.complete(&prompt(system, user)).await?;
        match parse_json_reply::<PlanReply>(&raw).map_err(CollaboratorError::Malformed)? {
            PlanReply::Wrapped { steps } | PlanReply::Bare(steps) => Ok(steps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ScriptedLlmClient};
    use crate::todo::StepStatus;
    use serde_json::json;

    struct FixedProposer(Vec<ProposedStep>);

    #[async_trait]
    impl PlanProposer for FixedProposer {
        async fn propose(&self, _request: &PlanRequest) -> Result<Vec<ProposedStep>, CollaboratorError> {
            Ok(self.0.clone())
        }
    }

    fn catalog() -> ExecutorCatalog {
        let mut catalog = ExecutorCatalog::new();
        for (reference, clarifiable) in [("entity_resolution", true), ("query_executor", false)] {
            catalog.register(CatalogEntry {
                reference: reference.into(),
                capability: reference.replace('_', " "),
                description: String::new(),
                clarifiable,
                data_retrieval: reference == "query_executor",
            });
        }
        catalog
    }

    fn proposed(key: &str, executor: &str, clarifiable: bool) -> ProposedStep {
        ProposedStep {
            key: key.into(),
            description: format!("{key} step"),
            executor: executor.into(),
            clarifiable,
            params: Value::Null,
        }
    }

    fn planner(steps: Vec<ProposedStep>) -> Planner {
        Planner::new(Arc::new(FixedProposer(steps)), catalog(), 5)
    }

    #[tokio::test]
    async fn test_plan_builds_list_with_cursor_on_first() {
        let planner = planner(vec![
            proposed("resolve", "entity_resolution", true),
            proposed("run", "query_executor", false),
        ]);
        let list = planner
            .plan("raw", "clean", PlanningContext::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(list.cursor(), Some("resolve"));
        assert!(list.steps().iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(list.rewritten_request(), "clean");
    }

    #[tokio::test]
    async fn test_plan_rejects_violations() {
        let cases = vec![
            (vec![], PlanViolation::Empty),
            (
                vec![proposed("a", "entity_resolution", false), proposed("a", "query_executor", false)],
                PlanViolation::DuplicateKey("a".into()),
            ),
            (
                vec![proposed("a", "sql_runner", false)],
                PlanViolation::UnknownExecutor { key: "a".into(), executor: "sql_runner".into() },
            ),
            (
                vec![proposed("a", "query_executor", true)],
                PlanViolation::ClarificationNotLicensed { key: "a".into(), executor: "query_executor".into() },
            ),
        ];
        for (steps, expected) in cases {
            let err = planner(steps)
                .plan("raw", "clean", PlanningContext::default(), &CancellationToken::new())
                .await
                .unwrap_err();
            match err {
                TurnError::InvalidPlan(v) => assert_eq!(v, expected),
                other => panic!("Expected InvalidPlan, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_llm_proposer_accepts_wrapped_and_bare() {
        let step = json!({"key": "resolve", "description": "Resolve port", "executor": "entity_resolution", "clarifiable": true});
        let llm = Arc::new(ScriptedLlmClient::with_replies([
            json!({ "steps": [step.clone()] }).to_string(),
            json!([step]).to_string(),
        ]));
        let proposer = LlmPlanProposer::new(llm.clone());
        let request = PlanRequest {
            rewritten_request: "Show arrivals at Port of Miami".into(),
            catalog: catalog().entries().to_vec(),
            memory_window: String::new(),
            prior_query: None,
        };
        assert_eq!(proposer.propose(&request).await.unwrap().len(), 1);
        assert_eq!(proposer.propose(&request).await.unwrap()[0].key, "resolve");

        let sent = &llm.seen()[0];
        assert!(sent[0].content.contains("\"executor\""));
        assert!(sent[1].content.contains("- entity_resolution | capability=entity resolution"));
    }

    #[tokio::test]
    async fn test_mock_llm_plan_validates_against_catalog() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient);
        let planner = Planner::new(Arc::new(LlmPlanProposer::new(llm)), catalog(), 5);
        let list = planner
            .plan("arrivals", "Show arrivals at Port of Miami", PlanningContext::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.steps()[0].clarifiable);
        assert!(!list.steps()[1].clarifiable);
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = plan_step_schema_json();
        for field in ["key", "description", "executor", "clarifiable"] {
            assert!(schema.contains(field));
        }
    }
}
