//! 回合错误类型
//!
//! TurnError 是编排层对外的错误分类；CollaboratorError 描述单次外部协作调用（分类 / 改写 / 规划）失败的原因。
//! 与 RecoveryEngine 配合：根据 TurnError 生成面向用户的恢复提示。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::StoreError;

/// 规划结果不合法的具体原因；任何一条都导致整份计划被拒绝
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanViolation {
    #[error("plan has no steps")]
    Empty,

    #[error("step at position {0} has a blank key")]
    BlankKey(usize),

    #[error("duplicate step key '{0}'")]
    DuplicateKey(String),

    #[error("step '{key}' references unknown executor '{executor}'")]
    UnknownExecutor { key: String, executor: String },

    #[error("step '{key}' is marked clarifiable but executor '{executor}' may not ask questions")]
    ClarificationNotLicensed { key: String, executor: String },

    #[error("planning collaborator failed: {0}")]
    Collaborator(String),
}

/// Todo List 状态迁移被拒绝（编排层内部不变量被破坏）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TodoError {
    #[error("no active todo list")]
    NoActiveList,

    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("step '{0}' is already complete")]
    StepAlreadyComplete(String),
}

/// 外部协作调用失败
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// 回合错误（对外分类），每个变体对应一种 ErrorKind
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("rewrite failed: {0}")]
    RewriteFailed(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] PlanViolation),

    #[error("step '{step_key}' violated its contract: {message}")]
    ContractViolation { step_key: String, message: String },

    #[error("iteration limit of {limit} steps exceeded in one turn")]
    IterationLimitExceeded { limit: usize },

    #[error("step '{step_key}' failed ({kind}): {message}")]
    ToolFailure {
        step_key: String,
        kind: String,
        message: String,
    },

    #[error("conversation store: {0}")]
    Store(#[from] StoreError),

    #[error("todo list state: {0}")]
    Todo(#[from] TodoError),
}

/// 调用方可见的错误种类（可序列化）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ClassificationUnavailable,
    RewriteFailed,
    InvalidPlan,
    ContractViolation,
    IterationLimitExceeded,
    ToolFailure,
    Store,
    Internal,
}

impl TurnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TurnError::ClassificationUnavailable(_) => ErrorKind::ClassificationUnavailable,
            TurnError::RewriteFailed(_) => ErrorKind::RewriteFailed,
            TurnError::InvalidPlan(_) => ErrorKind::InvalidPlan,
            TurnError::ContractViolation { .. } => ErrorKind::ContractViolation,
            TurnError::IterationLimitExceeded { .. } => ErrorKind::IterationLimitExceeded,
            TurnError::ToolFailure { .. } => ErrorKind::ToolFailure,
            TurnError::Store(_) => ErrorKind::Store,
            TurnError::Todo(_) => ErrorKind::Internal,
        }
    }

    /// 是否发生在进入任何步骤之前（分类 / 改写 / 规划），此类错误不写回合记录
    pub fn is_pre_plan(&self) -> bool {
        matches!(
            self,
            TurnError::ClassificationUnavailable(_)
                | TurnError::RewriteFailed(_)
                | TurnError::InvalidPlan(_)
        )
    }
}

/// 恢复引擎根据错误类型给出的建议动作（携带面向用户的文本）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 列表仍然有效：用户补充或回复 continue 即可重跑当前步骤
    RetryStep(String),
    /// 请用户换一种说法重新提出请求
    Rephrase(String),
    /// 外部服务暂不可用，稍后再发
    RetryLater(String),
}

impl RecoveryAction {
    pub fn message(&self) -> &str {
        match self {
            RecoveryAction::RetryStep(m) | RecoveryAction::Rephrase(m) | RecoveryAction::RetryLater(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = TurnError::ToolFailure {
            step_key: "s1".into(),
            kind: "timeout".into(),
            message: "slow".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ToolFailure);
        assert!(!err.is_pre_plan());

        let err: TurnError = PlanViolation::Empty.into();
        assert_eq!(err.kind(), ErrorKind::InvalidPlan);
        assert!(err.is_pre_plan());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::IterationLimitExceeded).unwrap();
        assert_eq!(json, "\"iteration_limit_exceeded\"");
    }
}
