//! 错误恢复引擎
//!
//! 根据 TurnError 返回 RecoveryAction，其文本即错误回合的 final_text。

use crate::core::{RecoveryAction, TurnError};

/// 语义化错误恢复：将错误映射为用户可执行的下一步
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &TurnError) -> RecoveryAction {
        match err {
            TurnError::ClassificationUnavailable(_) => RecoveryAction::RetryLater(
                "I couldn't interpret that message right now. Please send it again in a moment."
                    .to_string(),
            ),
            TurnError::RewriteFailed(_) => RecoveryAction::Rephrase(
                "I couldn't restate your request clearly. Could you phrase it differently?"
                    .to_string(),
            ),
            TurnError::InvalidPlan(violation) => RecoveryAction::Rephrase(format!(
                "I couldn't build a workable plan for that request ({violation}). Could you rephrase it?"
            )),
            TurnError::ContractViolation { step_key, .. } => RecoveryAction::RetryStep(format!(
                "Step '{step_key}' needed input it is not allowed to ask for. \
                 Add the missing detail to your request or reply 'retry'."
            )),
            TurnError::IterationLimitExceeded { limit } => RecoveryAction::RetryStep(format!(
                "I stopped after {limit} steps in a single turn. Reply 'continue' to resume."
            )),
            TurnError::ToolFailure {
                step_key,
                kind,
                message,
            } => RecoveryAction::RetryStep(format!(
                "Step '{step_key}' failed ({kind}): {message}. \
                 Reply with a correction, or 'retry' to run it again."
            )),
            TurnError::Store(_) => RecoveryAction::RetryLater(
                "I couldn't save the conversation state. Please try again shortly.".to_string(),
            ),
            TurnError::Todo(_) => RecoveryAction::Rephrase(
                "Something went wrong with the current plan. Please restate your request."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PlanViolation;

    #[test]
    fn test_recovery_tool_failure_keeps_step() {
        let engine = RecoveryEngine::new();
        let err = TurnError::ToolFailure {
            step_key: "query".into(),
            kind: "timeout".into(),
            message: "backend slow".into(),
        };
        match engine.handle(&err) {
            RecoveryAction::RetryStep(msg) => {
                assert!(msg.contains("query"));
                assert!(msg.contains("backend slow"));
            }
            other => panic!("Expected RetryStep, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_invalid_plan() {
        let engine = RecoveryEngine::new();
        let err = TurnError::InvalidPlan(PlanViolation::DuplicateKey("a".into()));
        let action = engine.handle(&err);
        assert!(matches!(action, RecoveryAction::Rephrase(_)));
        assert!(action.message().contains("duplicate step key 'a'"));
    }

    #[test]
    fn test_recovery_classification_unavailable() {
        let engine = RecoveryEngine::new();
        let err = TurnError::ClassificationUnavailable("down".into());
        assert!(matches!(engine.handle(&err), RecoveryAction::RetryLater(_)));
    }

    #[test]
    fn test_recovery_iteration_limit() {
        let engine = RecoveryEngine::new();
        let err = TurnError::IterationLimitExceeded { limit: 10 };
        let action = engine.handle(&err);
        assert!(matches!(action, RecoveryAction::RetryStep(_)));
        assert!(action.message().contains("continue"));
    }
}
