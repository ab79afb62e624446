//! 工具调用网关
//!
//! 持有执行器目录、注册表与单步超时。invoke(step, input) 在超时与取消令牌约束下调用执行器，
//! 并把结果归为 Success / ClarificationNeeded / Failure 三类；每次调用输出结构化审计日志（JSON）。
//! 网关不做重试，重试策略属于执行器自身。

use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::llm::json::preview;
use crate::memory::QueryMetadata;
use crate::todo::Step;
use crate::tools::{ExecutorCatalog, StepInput, ToolRegistry, ToolReply};

/// 网关层面的失败种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// 未获授权的步骤返回了澄清请求
    ContractViolation,
    Timeout,
    Cancelled,
    UnknownExecutor,
    /// 执行器自报的错误种类（原样透传）
    Tool(String),
}

impl FailureKind {
    pub fn as_str(&self) -> &str {
        match self {
            FailureKind::ContractViolation => "contract_violation",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::UnknownExecutor => "unknown_executor",
            FailureKind::Tool(kind) => kind,
        }
    }
}

/// 单次步骤调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success {
        agent_action: String,
        tools_invoked: Vec<String>,
        query_metadata: Option<QueryMetadata>,
    },
    ClarificationNeeded {
        question: String,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

impl StepOutcome {
    fn label(&self) -> &str {
        match self {
            StepOutcome::Success { .. } => "success",
            StepOutcome::ClarificationNeeded { .. } => "clarification",
            StepOutcome::Failure { kind, .. } => kind.as_str(),
        }
    }
}

pub struct ToolGateway {
    catalog: ExecutorCatalog,
    registry: ToolRegistry,
    timeout: Duration,
    yolo: bool,
}

impl ToolGateway {
    pub fn new(catalog: ExecutorCatalog, registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            catalog,
            registry,
            timeout: Duration::from_secs(timeout_secs),
            yolo: false,
        }
    }

    /// YOLO 模式：任何步骤都不允许澄清
    pub fn with_yolo(mut self, yolo: bool) -> Self {
        self.yolo = yolo;
        self
    }

    pub fn catalog(&self) -> &ExecutorCatalog {
        &self.catalog
    }

    /// 澄清仅在计划与目录都授权且未开启 YOLO 时合法
    pub fn clarification_licensed(&self, step: &Step) -> bool {
        !self.yolo && step.clarifiable && self.catalog.may_clarify(&step.executor)
    }

    pub async fn invoke(
        &self,
        step: &Step,
        input: &StepInput,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let start = Instant::now();
        let outcome = self.dispatch(step, input, cancel).await;

        let audit = serde_json::json!({
            "event": "step_audit",
            "executor": step.executor,
            "step_key": step.key,
            "ok": matches!(outcome, StepOutcome::Success { .. }),
            "outcome": outcome.label(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "input_preview": preview(&input.user_input),
        });
        tracing::info!(audit = %audit, "step");

        outcome
    }

    async fn dispatch(
        &self,
        step: &Step,
        input: &StepInput,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let Some(tool) = self.registry.get(&step.executor) else {
            return StepOutcome::Failure {
                kind: FailureKind::UnknownExecutor,
                message: format!("no executor registered for '{}'", step.executor),
            };
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return StepOutcome::Failure {
                    kind: FailureKind::Cancelled,
                    message: format!("step '{}' was cancelled", step.key),
                };
            }
            result = timeout(self.timeout, tool.execute(input)) => result,
        };

        match result {
            Ok(Ok(ToolReply::Done {
                action,
                tools_invoked,
                query,
            })) => {
                let retrieval = self
                    .catalog
                    .get(&step.executor)
                    .is_some_and(|e| e.data_retrieval);
                if query.is_some() && !retrieval {
                    tracing::warn!(
                        step = %step.key,
                        executor = %step.executor,
                        "dropping query metadata from non-retrieval executor"
                    );
                }
                StepOutcome::Success {
                    agent_action: action,
                    tools_invoked: if tools_invoked.is_empty() {
                        vec![step.executor.clone()]
                    } else {
                        tools_invoked
                    },
                    query_metadata: query.filter(|_| retrieval),
                }
            }
            Ok(Ok(ToolReply::Clarify { question })) => {
                if self.clarification_licensed(step) {
                    StepOutcome::ClarificationNeeded { question }
                } else {
                    tracing::warn!(
                        step = %step.key,
                        executor = %step.executor,
                        "unlicensed clarification request"
                    );
                    StepOutcome::Failure {
                        kind: FailureKind::ContractViolation,
                        message: format!(
                            "executor '{}' asked \"{question}\" but step '{}' may not ask for clarification",
                            step.executor, step.key
                        ),
                    }
                }
            }
            Ok(Err(e)) => StepOutcome::Failure {
                kind: FailureKind::Tool(e.kind),
                message: e.message,
            },
            Err(_) => StepOutcome::Failure {
                kind: FailureKind::Timeout,
                message: format!(
                    "executor '{}' did not answer within {:?}",
                    step.executor, self.timeout
                ),
            },
        }
    }
}
