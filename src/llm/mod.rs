//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），以及回复 JSON 的解析工具

pub mod json;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use json::{extract_json, parse_json_reply};
pub use message::{prompt, Message, PromptTask, Role};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError};
