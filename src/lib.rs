//! BI Agent - 商业智能请求的回合编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合编排器、错误与恢复、对话互斥、构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 回合记录、只追加的回合记忆、对话状态持久化
//! - **planning**: 规划器（协作方提出步骤，本地校验）
//! - **routing**: 意图分类、续跑信号、请求改写
//! - **todo**: 计划步骤与带游标的 Todo List
//! - **tools**: 执行器目录、步骤执行器与调用网关

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;
pub mod routing;
pub mod todo;
pub mod tools;

pub use crate::core::{HaltReason, OrchestratorBuilder, TurnOrchestrator, TurnOutcome};
