//! 回合状态定义：阶段、停止原因与回合结果
//!
//! TurnOutcome 是调用方看到的回合结果；阶段只用于日志与事件。

use serde::{Deserialize, Serialize};

use crate::core::ErrorKind;
use crate::routing::Route;

/// 单个回合内的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Classifying,
    Replanning,
    Resuming,
    Executing,
    Advancing,
    Halting,
}

/// 回合停止的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Clarification,
    Error,
    Completed,
}

/// runTurn 的返回值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub final_text: String,
    pub halt_reason: HaltReason,
    pub clarification_question: Option<String>,
    /// halt_reason 为 Error 时的错误种类
    pub error: Option<ErrorKind>,
    /// 分类失败时为空
    pub route: Option<Route>,
    /// 本回合追加的回合记录数
    pub records_written: usize,
}

impl TurnOutcome {
    pub fn completed(final_text: String, route: Route, records_written: usize) -> Self {
        Self {
            final_text,
            halt_reason: HaltReason::Completed,
            clarification_question: None,
            error: None,
            route: Some(route),
            records_written,
        }
    }

    pub fn clarification(question: String, route: Route, records_written: usize) -> Self {
        Self {
            final_text: question.clone(),
            halt_reason: HaltReason::Clarification,
            clarification_question: Some(question),
            error: None,
            route: Some(route),
            records_written,
        }
    }

    pub fn errored(final_text: String, kind: ErrorKind, route: Option<Route>, records_written: usize) -> Self {
        Self {
            final_text,
            halt_reason: HaltReason::Error,
            clarification_question: None,
            error: Some(kind),
            route,
            records_written,
        }
    }
}
