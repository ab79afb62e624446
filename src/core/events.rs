//! 回合过程事件：供前端展示「正在执行第 2/5 步」等进度

use serde::Serialize;

use crate::core::HaltReason;
use crate::routing::Route;
use crate::todo::StepStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 路由已确定
    Classified { route: Route },
    /// 新计划已生成（步骤描述按执行顺序）
    Planned { steps: Vec<String> },
    /// 开始执行一个步骤（position 从 1 开始）
    StepStarted {
        step_key: String,
        description: String,
        position: usize,
        total: usize,
    },
    StepFinished { step_key: String, status: StepStatus },
    Halted { reason: HaltReason },
}
