//! 意图分类
//!
//! 每条用户消息先经过分类，选出四种路由之一：
//! - 没有活动列表 → NewRequest
//! - 上一条记录停在当前游标步骤上（澄清或出错）→ 交给分类协作方判断 ExactAnswer / Modification / NewRequest
//! - 否则 → 续跑信号为 Continue，其余为 NewRequest
//!
//! 出错的记录遇到续跑信号直接 Continue（重跑当前步骤），不再询问协作方。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::bounded::bounded;
use crate::core::{CollaboratorError, TurnError};
use crate::llm::{parse_json_reply, prompt, LlmClient, PromptTask};
use crate::memory::{RecordStatus, TurnRecord};
use crate::routing::is_continuation_signal;
use crate::todo::TodoList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    NewRequest,
    Modification,
    ExactAnswer,
    Continue,
}

/// 交给分类协作方的输入
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    /// 当前游标步骤的描述
    pub step_description: String,
    /// 上一轮提出的澄清问题（出错时为错误信息）
    pub question: String,
    pub memory_window: String,
    pub user_input: String,
}

/// 协作方的判断
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationVerdict {
    pub route: Route,
    /// 协作方给出的消歧后答复（ExactAnswer 重跑时作为澄清答复）
    pub disambiguation: Option<String>,
}

impl ClassificationVerdict {
    pub fn route(route: Route) -> Self {
        Self {
            route,
            disambiguation: None,
        }
    }
}

/// 分类协作方：区分「只补了答案」「改了范围」「放弃原目标」
#[async_trait]
pub trait ClassificationCollaborator: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationVerdict, CollaboratorError>;
}

pub struct IntentClassifier {
    collaborator: Arc<dyn ClassificationCollaborator>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(collaborator: Arc<dyn ClassificationCollaborator>, timeout_secs: u64) -> Self {
        Self {
            collaborator,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 纯决策：不修改任何状态。协作方不可用时返回 ClassificationUnavailable，绝不猜测路由
    pub async fn classify(
        &self,
        user_input: &str,
        active: Option<&TodoList>,
        last: Option<&TurnRecord>,
        memory_window: &str,
        cancel: &CancellationToken,
    ) -> Result<ClassificationVerdict, TurnError> {
        let Some(list) = active else {
            return Ok(ClassificationVerdict::route(Route::NewRequest));
        };

        let Some((record, question)) = last.and_then(|r| Self::pending_question(list, r)) else {
            let route = if is_continuation_signal(user_input) {
                Route::Continue
            } else {
                Route::NewRequest
            };
            return Ok(ClassificationVerdict::route(route));
        };

        if record.status == RecordStatus::Errored && is_continuation_signal(user_input) {
            return Ok(ClassificationVerdict::route(Route::Continue));
        }

        let request = ClassificationRequest {
            step_description: record.step_description.clone(),
            question,
            memory_window: memory_window.to_string(),
            user_input: user_input.to_string(),
        };
        let verdict = bounded(self.collaborator.classify(&request), self.timeout, cancel)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "classification collaborator failed");
                TurnError::ClassificationUnavailable(e.to_string())
            })?;
        Ok(verdict)
    }

    /// 上一条记录是否停在当前游标步骤上等待用户输入；是则返回该记录与提出的问题
    fn pending_question<'a>(
        list: &TodoList,
        record: &'a TurnRecord,
    ) -> Option<(&'a TurnRecord, String)> {
        if record.todo_list_snapshot.list_id() != list.list_id()
            || list.cursor() != Some(record.step_key.as_str())
        {
            return None;
        }
        match record.status {
            RecordStatus::ClarificationNeeded => {
                Some((record, record.clarification_question.clone().unwrap_or_default()))
            }
            RecordStatus::Errored => Some((
                record,
                record
                    .error
                    .as_ref()
                    .map(|e| format!("The step failed: {}", e.message))
                    .unwrap_or_default(),
            )),
            RecordStatus::Complete => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerdictReply {
    route: String,
    #[serde(default)]
    disambiguation: Option<String>,
}

/// LLM 实现的分类协作方
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn parse_route(route: &str) -> Option<Route> {
        match route.trim().to_lowercase().as_str() {
            "exact_answer" | "answer" => Some(Route::ExactAnswer),
            "modification" | "modify" => Some(Route::Modification),
            "new_request" | "new" => Some(Route::NewRequest),
            "continuation" | "continue" => Some(Route::Continue),
            _ => None,
        }
    }
}

#[async_trait]
impl ClassificationCollaborator for LlmClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationVerdict, CollaboratorError> {
        let system = format!(
            "{} The assistant paused a step and asked the user something.\n\
             Decide what the user's reply does:\n\
             - exact_answer: it only supplies the missing value\n\
             - modification: it changes the scope or adds criteria to the same goal\n\
             - new_request: it abandons the goal and asks for something else\n\
             Answer with ONE JSON object: {{\"route\": \"exact_answer\" | \"modification\" | \"new_request\", \
             \"disambiguation\": \"<the answer restated unambiguously, or null>\"}}",
            PromptTask::Classify.opening()
        );
        let user = format!(
            "Step: {}\nQuestion: {}\nRecent turns:\n{}\nInput: {}",
            request.step_description, request.question, request.memory_window, request.user_input
        );
        let raw = self.llm.complete(&prompt(system, user)).await?;
        let reply: VerdictReply = parse_json_reply(&raw).map_err(CollaboratorError::Malformed)?;
        let route = Self::parse_route(&reply.route).ok_or_else(|| {
            CollaboratorError::Malformed(format!("unknown route '{}'", reply.route))
        })?;
        Ok(ClassificationVerdict {
            route,
            disambiguation: reply.disambiguation.filter(|d| !d.trim().is_empty()),
        })
    }
}
