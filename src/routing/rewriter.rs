//! 请求改写：把原始输入改写为清晰、无指代歧义的请求
//!
//! 只在 NewRequest / Modification 路由上运行。已经足够清晰的输入直接沿用，不调用 LLM。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::CollaboratorError;
use crate::llm::{prompt, LlmClient, PromptTask};

/// 改写协作方
#[async_trait]
pub trait RequestRewriter: Send + Sync {
    async fn rewrite(&self, user_input: &str, memory_window: &str) -> Result<String, CollaboratorError>;
}

/// 需要借助上下文才能理解的指代词与口语词
const CONTEXT_DEPENDENT_WORDS: &[&str] = &[
    "it", "its", "that", "this", "these", "those", "them", "they", "their", "there", "same",
    "again", "above", "previous", "last one", "gimme", "wanna", "pls",
];

/// 输入是否无需改写：不含指代/口语词，且不是过短的片段
pub fn is_already_clean(user_input: &str) -> bool {
    let lower = user_input.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < 4 {
        return false;
    }
    !CONTEXT_DEPENDENT_WORDS.iter().any(|needle| {
        if needle.contains(' ') {
            lower.contains(needle)
        } else {
            words.contains(needle)
        }
    })
}

/// LLM 实现的改写协作方
pub struct LlmRewriter {
    llm: Arc<dyn LlmClient>,
}

impl LlmRewriter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RequestRewriter for LlmRewriter {
    async fn rewrite(&self, user_input: &str, memory_window: &str) -> Result<String, CollaboratorError> {
        if is_already_clean(user_input) {
            tracing::debug!("input already clean, skipping rewrite");
            return Ok(user_input.trim().to_string());
        }

        let system = format!(
            "{}\n\
             Resolve pronouns (it, that, there) from the conversation, expand abbreviations and \
             normalise informal phrasing. Preserve the meaning exactly and add nothing that is not in \
             the input or the conversation. Reply with the rewritten request only.",
            PromptTask::Rewrite.opening()
        );
        let user = format!("Recent turns:\n{memory_window}\nRequest: {user_input}");
        let rewritten = self.llm.complete(&prompt(system, user)).await?;
        Ok(rewritten.trim().trim_matches('"').trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[test]
    fn test_is_already_clean() {
        assert!(is_already_clean("Show all shipments to Port of Miami in the last 7 days"));
        assert!(!is_already_clean("show me arrivals there last week"));
        assert!(!is_already_clean("what about it"));
        assert!(!is_already_clean("Miami"));
    }

    #[tokio::test]
    async fn test_clean_input_skips_llm() {
        let llm = Arc::new(ScriptedLlmClient::with_replies(Vec::<String>::new()));
        let rewriter = LlmRewriter::new(llm.clone());
        let out = rewriter
            .rewrite("Show all shipments to Port of Miami in the last 7 days", "")
            .await
            .unwrap();
        assert_eq!(out, "Show all shipments to Port of Miami in the last 7 days");
        assert!(llm.seen().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_input_uses_llm_with_context() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([
            "\"Show all shipments to Port of Miami in the last 7 days\"",
        ]));
        let rewriter = LlmRewriter::new(llm.clone());
        let out = rewriter
            .rewrite("show me shipments there last week", "User: Port of Miami\nAssistant: ok")
            .await
            .unwrap();
        assert_eq!(out, "Show all shipments to Port of Miami in the last 7 days");
        assert!(llm.seen()[0][1].content.contains("User: Port of Miami"));
    }
}
