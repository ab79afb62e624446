//! 核心编排层：错误与恢复、回合状态、对话互斥、编排器与构建器

pub mod bounded;
pub mod builder;
pub mod error;
pub mod events;
pub mod gate;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use builder::{create_llm_from_config, create_store_from_config, OrchestratorBuilder};
pub use error::{
    CollaboratorError, ErrorKind, PlanViolation, RecoveryAction, TodoError, TurnError,
};
pub use events::TurnEvent;
pub use gate::{ConversationGate, ConversationGuard};
pub use orchestrator::{TurnOrchestrator, TurnSettings};
pub use recovery::RecoveryEngine;
pub use state::{HaltReason, TurnOutcome, TurnPhase};
