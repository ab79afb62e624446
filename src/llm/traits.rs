//! LLM 客户端抽象
//!
//! 分类、改写、规划与 LLM 型步骤执行器都只依赖 LlmClient::complete（非流式）。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用失败的原因
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("empty completion")]
    EmptyCompletion,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首个候选的文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}
