//! 路由层：意图分类、续跑信号识别与请求改写

pub mod classifier;
pub mod continuation;
pub mod rewriter;

pub use classifier::{
    ClassificationCollaborator, ClassificationRequest, ClassificationVerdict, IntentClassifier,
    LlmClassifier, Route,
};
pub use continuation::is_continuation_signal;
pub use rewriter::{is_already_clean, LlmRewriter, RequestRewriter};
