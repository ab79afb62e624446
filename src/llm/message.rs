//! 提示消息：与 Chat Completions 接口对齐的 role + content

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// 单条提示消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

}

/// 协作方提示的固定形状：一条 system 指令 + 一条 user 载荷
pub fn prompt(system: impl Into<String>, user: impl Into<String>) -> Vec<Message> {
    vec![Message::system(system), Message::user(user)]
}

/// 协作方提示的类别；各类 system 指令以固定首句开头，Mock 客户端据此给出对应形状的回复
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptTask {
    Classify,
    Rewrite,
    Plan,
    Step,
}

impl PromptTask {
    /// system 指令的首句
    pub fn opening(self) -> &'static str {
        match self {
            PromptTask::Classify => "You route replies in a business-intelligence conversation.",
            PromptTask::Rewrite => {
                "Rewrite the user's business-intelligence request as one clear, unambiguous statement."
            }
            PromptTask::Plan => "You plan business-intelligence requests as an ordered list of steps.",
            PromptTask::Step => "You execute one step of a business-intelligence plan.",
        }
    }

    /// 从首条 system 消息识别类别
    pub fn detect(messages: &[Message]) -> Option<Self> {
        let system = messages.iter().find(|m| m.role == Role::System)?;
        [
            PromptTask::Classify,
            PromptTask::Rewrite,
            PromptTask::Plan,
            PromptTask::Step,
        ]
        .into_iter()
        .find(|t| system.content.starts_with(t.opening()))
    }
}
