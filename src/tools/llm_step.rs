//! LLM 型步骤执行器
//!
//! 目录中 kind = "llm" 的条目都由它承担：把 StepInput 拼成提示，要求模型以
//! `{"status": "done" | "clarify" | "error", ...}` 作答，再映射为 ToolReply / ToolError。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::{parse_json_reply, prompt, LlmClient, PromptTask};
use crate::memory::QueryMetadata;
use crate::tools::{CatalogEntry, StepInput, StepTool, ToolError, ToolReply};

#[derive(Debug, Deserialize)]
struct StepReply {
    status: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    query: Option<QueryReply>,
}

#[derive(Debug, Deserialize)]
struct QueryReply {
    kind: String,
    #[serde(default)]
    body: Value,
    summary: String,
    #[serde(default)]
    retrieval: String,
}

pub struct LlmStepTool {
    entry: CatalogEntry,
    llm: Arc<dyn LlmClient>,
}

impl LlmStepTool {
    pub fn new(entry: CatalogEntry, llm: Arc<dyn LlmClient>) -> Self {
        Self { entry, llm }
    }

    fn system_prompt(&self, input: &StepInput) -> String {
        let mut system = format!(
            "{}\nYou are the '{}' executor ({}). {}\n\
             Perform exactly the step you are given and answer with ONE JSON object:\n\
             {{\"status\": \"done\", \"action\": \"<what you did>\"}}",
            PromptTask::Step.opening(),
            self.entry.reference,
            self.entry.capability,
            self.entry.description,
        );
        if self.entry.data_retrieval {
            system.push_str(
                "\nAs a data-retrieval step, add \"query\": {\"kind\": \"...\", \"body\": {...}, \
                 \"summary\": \"<result summary>\", \"retrieval\": \"<how to fetch these results again>\"}.",
            );
        }
        if input.allow_clarification {
            system.push_str(
                "\nIf the request is ambiguous, answer {\"status\": \"clarify\", \"question\": \"...\"} instead.",
            );
        } else {
            system.push_str("\nYou must not ask the user questions; make the most reasonable choice.");
        }
        system.push_str("\nIf the step cannot be done, answer {\"status\": \"error\", \"error\": \"...\"}.");
        system
    }

    fn user_prompt(&self, input: &StepInput) -> String {
        let mut user = format!(
            "Request: {}\nStep: {}\nParams: {}\nData retrieval: {}\nRecent turns:\n{}",
            input.rewritten_request,
            input.description,
            input.params,
            if self.entry.data_retrieval { "yes" } else { "no" },
            input.memory_window,
        );
        if let Some(answer) = &input.clarification_answer {
            user.push_str(&format!("\nClarification from user: {answer}"));
        }
        if let Some(query) = &input.prior_query {
            user.push_str(&format!(
                "\nPrevious query ({}): {}. {}",
                query.query_kind, query.result_summary, query.retrieval_description
            ));
        }
        user
    }
}

#[async_trait]
impl StepTool for LlmStepTool {
    fn name(&self) -> &str {
        &self.entry.reference
    }

    fn description(&self) -> &str {
        &self.entry.description
    }

    async fn execute(&self, input: &StepInput) -> Result<ToolReply, ToolError> {
        let raw = self
            .llm
            .complete(&prompt(self.system_prompt(input), self.user_prompt(input)))
            .await
            .map_err(|e| ToolError::new("llm_unavailable", e.to_string()))?;
        let reply: StepReply =
            parse_json_reply(&raw).map_err(|e| ToolError::new("malformed_reply", e))?;

        match reply.status.as_str() {
            "done" => Ok(ToolReply::Done {
                action: reply
                    .action
                    .unwrap_or_else(|| format!("Completed {}", input.description)),
                tools_invoked: vec![self.entry.reference.clone()],
                query: reply.query.map(|q| QueryMetadata {
                    query_kind: q.kind,
                    query_body: q.body,
                    result_summary: q.summary,
                    retrieval_description: q.retrieval,
                    executed_at: chrono::Utc::now().timestamp_millis(),
                }),
            }),
            "clarify" => reply
                .question
                .filter(|q| !q.trim().is_empty())
                .map(|question| ToolReply::Clarify { question })
                .ok_or_else(|| ToolError::new("malformed_reply", "clarify reply without a question")),
            "error" => Err(ToolError::new(
                "executor_error",
                reply.error.unwrap_or_else(|| "unspecified error".to_string()),
            )),
            other => Err(ToolError::new(
                "malformed_reply",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use serde_json::json;

    fn entry(retrieval: bool) -> CatalogEntry {
        CatalogEntry {
            reference: "query_executor".into(),
            capability: "query execution".into(),
            description: "Run the query.".into(),
            clarifiable: false,
            data_retrieval: retrieval,
        }
    }

    fn input(allow_clarification: bool) -> StepInput {
        StepInput {
            step_key: "run".into(),
            description: "Execute shipment query".into(),
            executor: "query_executor".into(),
            params: json!({"index": "shipments"}),
            user_input: "Port of Miami".into(),
            original_request: "arrivals in Miami".into(),
            rewritten_request: "Show arrivals at Port of Miami".into(),
            clarification_answer: Some("Port of Miami".into()),
            rerun: true,
            memory_window: "(no previous turns)".into(),
            prior_query: None,
            allow_clarification,
        }
    }

    #[tokio::test]
    async fn test_done_with_query() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([json!({
            "status": "done",
            "action": "Ran shipment query",
            "query": {"kind": "elasticsearch", "body": {"size": 10}, "summary": "42 arrivals", "retrieval": "index shipments"}
        })
        .to_string()]));
        let tool = LlmStepTool::new(entry(true), llm.clone());
        match tool.execute(&input(false)).await.unwrap() {
            ToolReply::Done { action, query, .. } => {
                assert_eq!(action, "Ran shipment query");
                let query = query.unwrap();
                assert_eq!(query.result_summary, "42 arrivals");
                assert_eq!(query.query_body, json!({"size": 10}));
            }
            other => panic!("Expected Done, got {other:?}"),
        }

        let sent = &llm.seen()[0];
        assert!(sent[1].content.contains("Data retrieval: yes"));
        assert!(sent[1].content.contains("Clarification from user: Port of Miami"));
        assert!(sent[0].content.contains("must not ask"));
    }

    #[tokio::test]
    async fn test_clarify_reply() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([
            r#"{"status": "clarify", "question": "Which Miami?"}"#,
        ]));
        let tool = LlmStepTool::new(entry(false), llm);
        assert_eq!(
            tool.execute(&input(true)).await.unwrap(),
            ToolReply::Clarify {
                question: "Which Miami?".into()
            }
        );
    }

    #[tokio::test]
    async fn test_error_and_malformed_replies() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([
            r#"{"status": "error", "error": "index missing"}"#,
            r#"{"status": "maybe"}"#,
            "not json",
        ]));
        let tool = LlmStepTool::new(entry(false), llm);
        assert_eq!(
            tool.execute(&input(false)).await.unwrap_err(),
            ToolError::new("executor_error", "index missing")
        );
        assert_eq!(tool.execute(&input(false)).await.unwrap_err().kind, "malformed_reply");
        assert_eq!(tool.execute(&input(false)).await.unwrap_err().kind, "malformed_reply");
    }

    #[tokio::test]
    async fn test_llm_failure() {
        let llm = Arc::new(ScriptedLlmClient::with_replies(Vec::<String>::new()));
        let tool = LlmStepTool::new(entry(false), llm);
        assert_eq!(tool.execute(&input(false)).await.unwrap_err().kind, "llm_unavailable");
    }
}
