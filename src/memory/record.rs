//! 回合记录与 Query Metadata
//!
//! 每次步骤执行（成功 / 需澄清 / 出错）写入一条 TurnRecord，写入后不可变。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::todo::{Step, TodoList};

/// 记录编号：同一对话内从 1 开始单调递增且无空洞
pub type TurnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Complete,
    ClarificationNeeded,
    Errored,
}

/// 取数步骤的查询描述，供后续「分析这些结果」类请求复用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// 查询类型（如 elasticsearch / graphql）
    pub query_kind: String,
    /// 查询本体，编排层不解析
    pub query_body: Value,
    pub result_summary: String,
    /// 如何重新取回这批数据的说明
    pub retrieval_description: String,
    /// 执行时间（Unix 毫秒）
    pub executed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: String,
    pub message: String,
}

/// 一次步骤执行的不可变日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// 由 TurnMemory::append 分配
    pub turn_id: TurnId,
    pub step_key: String,
    pub step_description: String,
    pub status: RecordStatus,
    pub user_input: String,
    pub agent_action: String,
    pub tools_invoked: Vec<String>,
    pub query_metadata: Option<QueryMetadata>,
    pub clarification_question: Option<String>,
    pub error: Option<RecordedError>,
    /// 写入时的列表状态（状态更新与游标前移之后）
    pub todo_list_snapshot: TodoList,
    /// 写入时间（Unix 毫秒）
    pub recorded_at: i64,
}

impl TurnRecord {
    fn base(step: &Step, status: RecordStatus, user_input: &str, snapshot: &TodoList) -> Self {
        Self {
            turn_id: 0,
            step_key: step.key.clone(),
            step_description: step.description.clone(),
            status,
            user_input: user_input.to_string(),
            agent_action: String::new(),
            tools_invoked: Vec::new(),
            query_metadata: None,
            clarification_question: None,
            error: None,
            todo_list_snapshot: snapshot.clone(),
            recorded_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn complete(
        step: &Step,
        user_input: &str,
        agent_action: String,
        tools_invoked: Vec<String>,
        query_metadata: Option<QueryMetadata>,
        snapshot: &TodoList,
    ) -> Self {
        Self {
            agent_action,
            tools_invoked,
            query_metadata,
            ..Self::base(step, RecordStatus::Complete, user_input, snapshot)
        }
    }

    pub fn clarification(step: &Step, user_input: &str, question: String, snapshot: &TodoList) -> Self {
        Self {
            agent_action: format!("Asked for clarification on '{}'", step.description),
            clarification_question: Some(question),
            ..Self::base(step, RecordStatus::ClarificationNeeded, user_input, snapshot)
        }
    }

    pub fn errored(
        step: &Step,
        user_input: &str,
        kind: impl Into<String>,
        message: impl Into<String>,
        snapshot: &TodoList,
    ) -> Self {
        let error = RecordedError {
            kind: kind.into(),
            message: message.into(),
        };
        Self {
            agent_action: format!("Step '{}' failed: {}", step.description, error.message),
            error: Some(error),
            ..Self::base(step, RecordStatus::Errored, user_input, snapshot)
        }
    }

    /// 记录在短期记忆窗口中的文本形式
    pub fn to_context_string(&self) -> String {
        let reply = match self.status {
            RecordStatus::Complete => self.agent_action.as_str(),
            RecordStatus::ClarificationNeeded => {
                self.clarification_question.as_deref().unwrap_or("(asked for clarification)")
            }
            RecordStatus::Errored => self
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("(step failed)"),
        };
        format!("User: {}\nAssistant: {}", self.user_input, reply)
    }
}
