//! Mock LLM 客户端（离线可跑通整条编排链路，无需 API）
//!
//! MockLlmClient 依据提示类别给出确定性回复；ScriptedLlmClient 按队列回放预设回复，供单元测试使用。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{LlmClient, LlmError, Message, PromptTask, Role};

/// Mock 客户端：按提示类别构造合法 JSON 回复
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn user_payload(messages: &[Message]) -> &str {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    fn field<'a>(payload: &'a str, label: &str) -> Option<&'a str> {
        payload
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(label))
            .map(str::trim)
    }

    fn classify(payload: &str) -> String {
        let input = Self::field(payload, "Input:").unwrap_or("");
        let lower = input.to_lowercase();
        let route = if ["never mind", "forget it", "new question"]
            .iter()
            .any(|w| lower.contains(w))
        {
            "new_request"
        } else if ["instead", "also", "change", "only", " but "]
            .iter()
            .any(|w| lower.contains(w))
        {
            "modification"
        } else {
            "exact_answer"
        };
        json!({ "route": route, "disambiguation": input }).to_string()
    }

    fn plan(payload: &str) -> String {
        let request = Self::field(payload, "Request:").unwrap_or("the request");
        let steps: Vec<_> = payload
            .lines()
            .filter_map(|line| line.strip_prefix("- "))
            .filter_map(|line| {
                let mut parts = line.split(" | ");
                let reference = parts.next()?.trim();
                let capability = parts
                    .next()
                    .and_then(|p| p.strip_prefix("capability="))
                    .unwrap_or(reference);
                let clarifiable = parts.next() == Some("clarifiable=true");
                Some((reference.to_string(), capability.to_string(), clarifiable))
            })
            .enumerate()
            .map(|(i, (reference, capability, clarifiable))| {
                json!({
                    "key": format!("step_{}_{}", i + 1, reference),
                    "description": format!("{capability} for: {request}"),
                    "executor": reference,
                    "clarifiable": clarifiable,
                })
            })
            .collect();
        json!({ "steps": steps }).to_string()
    }

    fn step(payload: &str) -> String {
        let description = Self::field(payload, "Step:").unwrap_or("step");
        if Self::field(payload, "Data retrieval:") == Some("yes") {
            json!({
                "status": "done",
                "action": format!("Executed query for {description}"),
                "query": {
                    "kind": "mock",
                    "body": { "match_all": {} },
                    "summary": "0 rows (mock backend)",
                    "retrieval": format!("Mock query issued for {description}"),
                }
            })
            .to_string()
        } else {
            json!({ "status": "done", "action": format!("Completed {description}") }).to_string()
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let payload = Self::user_payload(messages);
        Ok(match PromptTask::detect(messages) {
            Some(PromptTask::Classify) => Self::classify(payload),
            Some(PromptTask::Rewrite) => Self::field(payload, "Request:").unwrap_or(payload).to_string(),
            Some(PromptTask::Plan) => Self::plan(payload),
            Some(PromptTask::Step) => Self::step(payload),
            None => format!("Echo from Mock: {payload}"),
        })
    }
}

/// 按队列回放预设回复，并记录收到的提示（测试断言提示内容）
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self::new(replies.into_iter().map(|r| Ok(r.into())))
    }

    /// 已收到的全部提示（按调用顺序）
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyCompletion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::prompt;

    #[tokio::test]
    async fn test_mock_plans_one_step_per_catalog_line() {
        let messages = prompt(
            format!("{}\nPlan it.", PromptTask::Plan.opening()),
            "Request: Show arrivals at Port of Miami\nCatalog:\n\
             - entity_resolution | capability=entity resolution | clarifiable=true | data_retrieval=false | resolve\n\
             - query_executor | capability=query execution | clarifiable=false | data_retrieval=true | run",
        );
        let reply = MockLlmClient.complete(&messages).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        let steps = value["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["executor"], "entity_resolution");
        assert_eq!(steps[0]["clarifiable"], true);
        assert_eq!(steps[1]["clarifiable"], false);
    }

    #[tokio::test]
    async fn test_mock_step_attaches_query_for_retrieval() {
        let messages = prompt(
            format!("{}\nRun it.", PromptTask::Step.opening()),
            "Step: query execution\nData retrieval: yes",
        );
        let reply = MockLlmClient.complete(&messages).await.unwrap();
        assert!(reply.contains("\"query\""));
    }

    #[tokio::test]
    async fn test_scripted_exhausted_queue_errors() {
        let client = ScriptedLlmClient::with_replies(["first"]);
        let messages = prompt("sys", "hi");
        assert_eq!(client.complete(&messages).await.unwrap(), "first");
        assert_eq!(
            client.complete(&messages).await,
            Err(LlmError::EmptyCompletion)
        );
        assert_eq!(client.seen().len(), 2);
    }
}
