//! 工具层：执行器目录、步骤执行器与调用网关

pub mod echo;
pub mod gateway;
pub mod llm_step;
pub mod registry;

pub use echo::EchoTool;
pub use gateway::{FailureKind, StepOutcome, ToolGateway};
pub use llm_step::LlmStepTool;
pub use registry::{
    CatalogEntry, ExecutorCatalog, StepInput, StepTool, ToolError, ToolRegistry, ToolReply,
};
