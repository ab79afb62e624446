//! 计划步骤

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 步骤状态；Complete 在列表生命周期内不可再变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Complete,
    ClarificationNeeded,
    Errored,
}

/// 一个计划步骤：绑定执行器，并声明是否允许中途澄清
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub key: String,
    pub description: String,
    /// 执行器引用（对应执行器目录中的 reference）
    pub executor: String,
    pub clarifiable: bool,
    /// 规划时绑定的参数，原样传给执行器
    #[serde(default)]
    pub params: Value,
    pub status: StepStatus,
}

impl Step {
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        executor: impl Into<String>,
        clarifiable: bool,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            executor: executor.into(),
            clarifiable,
            params: Value::Null,
            status: StepStatus::Pending,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.status == StepStatus::Complete
    }
}
