//! 回合编排器：分类 → (重新规划 | 续跑) → 执行 → (推进 → 执行 | 停止)
//!
//! 每条用户消息对应一次 run_turn。整个回合持有该对话的互斥锁；状态在回合开始时从存储加载，
//! 每写入一条回合记录（连同状态更新与游标前移）就保存一次。
//! 步骤成功后在同一回合内继续执行下一个步骤，直到澄清、出错、列表耗尽或达到单回合步数上限。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::bounded::bounded;
use crate::core::{
    ConversationGate, HaltReason, RecoveryEngine, TodoError, TurnError, TurnEvent, TurnOutcome,
    TurnPhase,
};
use crate::memory::{ConversationState, ConversationStore, StoreError, TurnId, TurnRecord};
use crate::planning::{Planner, PlanningContext};
use crate::routing::{IntentClassifier, RequestRewriter, Route};
use crate::todo::{StepStatus, TodoList};
use crate::tools::{FailureKind, StepInput, StepOutcome, ToolGateway};

/// 编排参数（来自 [agent] 配置段）
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub short_term_turns: usize,
    pub max_iterations: usize,
}

/// 步骤结果导致的回合停止
enum Halt {
    Clarification(String),
    Error(TurnError),
}

/// 重跑 / 推进时交给步骤的额外输入
struct Resumption {
    clarification_answer: Option<String>,
    rerun: bool,
}

pub struct TurnOrchestrator {
    pub(super) classifier: IntentClassifier,
    pub(super) rewriter: Arc<dyn RequestRewriter>,
    pub(super) rewrite_timeout: Duration,
    pub(super) planner: Planner,
    pub(super) gateway: ToolGateway,
    pub(super) store: Arc<dyn ConversationStore>,
    pub(super) gate: ConversationGate,
    pub(super) recovery: RecoveryEngine,
    pub(super) settings: TurnSettings,
    pub(super) events: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl TurnOrchestrator {
    /// 处理一条用户消息，直到回合停止
    pub async fn run_turn(&self, conversation_id: &str, user_input: &str) -> TurnOutcome {
        let guard = self.gate.acquire(conversation_id).await;
        let cancel = guard.token().clone();
        let span = tracing::info_span!("turn", conversation = %conversation_id);
        let outcome = self
            .run_locked(conversation_id, user_input, &cancel)
            .instrument(span)
            .await;
        drop(guard);
        outcome
    }

    /// 取消该对话正在进行的回合（当前步骤按失败处理，列表保留）
    pub fn cancel(&self, conversation_id: &str) -> bool {
        self.gate.cancel(conversation_id)
    }

    pub async fn history(&self, conversation_id: &str) -> Result<Vec<TurnRecord>, StoreError> {
        Ok(self
            .store
            .load(conversation_id)
            .await?
            .map(|s| s.memory.records().to_vec())
            .unwrap_or_default())
    }

    pub async fn active_list(&self, conversation_id: &str) -> Result<Option<TodoList>, StoreError> {
        Ok(self
            .store
            .load(conversation_id)
            .await?
            .and_then(|s| s.active_list))
    }

    /// 清空对话：丢弃活动列表与回合记忆
    pub async fn reset(&self, conversation_id: &str) -> Result<(), StoreError> {
        let _guard = self.gate.acquire(conversation_id).await;
        self.store
            .save(&ConversationState::new(conversation_id))
            .await
    }

    async fn run_locked(
        &self,
        conversation_id: &str,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        self.phase(TurnPhase::Classifying);
        let mut state = match self.store.load(conversation_id).await {
            Ok(Some(state)) => state,
            Ok(None) => ConversationState::new(conversation_id),
            Err(e) => return self.halt_error(e.into(), None, 0),
        };

        let window = state.memory.context_window(self.settings.short_term_turns);
        let verdict = match self
            .classifier
            .classify(
                user_input,
                state.active_list.as_ref(),
                state.memory.last(),
                &window,
                cancel,
            )
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => return self.halt_error(e, None, 0),
        };
        let route = verdict.route;
        tracing::info!(route = ?route, "classified");
        self.emit(TurnEvent::Classified { route });

        let resumption = match route {
            Route::NewRequest | Route::Modification => {
                self.phase(TurnPhase::Replanning);
                let list = match self.replan(&state, user_input, &window, cancel).await {
                    Ok(list) => list,
                    Err(e) => return self.halt_error(e, Some(route), 0),
                };
                self.emit(TurnEvent::Planned {
                    steps: list.steps().iter().map(|s| s.description.clone()).collect(),
                });
                if let Some(old) = state.active_list.replace(list) {
                    tracing::info!(discarded = %old.list_id(), "discarded active todo list");
                }
                Resumption {
                    clarification_answer: None,
                    rerun: false,
                }
            }
            Route::ExactAnswer | Route::Continue => {
                self.phase(TurnPhase::Resuming);
                let answer = (route == Route::ExactAnswer)
                    .then(|| verdict.disambiguation.unwrap_or_else(|| user_input.to_string()));
                match Self::reopen(&mut state) {
                    Ok(reopened) => Resumption {
                        rerun: reopened || answer.is_some(),
                        clarification_answer: answer,
                    },
                    Err(e) => return self.halt_error(e.into(), Some(route), 0),
                }
            }
        };

        state.user_turns += 1;
        self.execute(&mut state, user_input, route, resumption, cancel)
            .await
    }

    /// 改写 + 规划；失败时不触碰任何状态
    async fn replan(
        &self,
        state: &ConversationState,
        user_input: &str,
        window: &str,
        cancel: &CancellationToken,
    ) -> Result<TodoList, TurnError> {
        let rewritten = bounded(
            self.rewriter.rewrite(user_input, window),
            self.rewrite_timeout,
            cancel,
        )
        .await
        .map_err(|e| TurnError::RewriteFailed(e.to_string()))?;
        if rewritten.trim().is_empty() {
            return Err(TurnError::RewriteFailed("empty rewrite".to_string()));
        }
        tracing::debug!(rewritten = %rewritten, "rewrote request");

        let context = PlanningContext {
            memory_window: window.to_string(),
            prior_query: state.last_query_metadata().cloned(),
        };
        self.planner
            .plan(user_input, &rewritten, context, cancel)
            .await
    }

    /// 游标步骤若停在澄清 / 出错上则复位为 pending；返回是否为重跑
    fn reopen(state: &mut ConversationState) -> Result<bool, TodoError> {
        let list = state.active_list.as_mut().ok_or(TodoError::NoActiveList)?;
        let was_pending = list
            .current()
            .is_some_and(|s| s.status == StepStatus::Pending);
        list.reopen_current()?;
        Ok(!was_pending)
    }

    async fn execute(
        &self,
        state: &mut ConversationState,
        user_input: &str,
        route: Route,
        resumption: Resumption,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let Resumption {
            mut clarification_answer,
            mut rerun,
        } = resumption;
        let mut records = 0usize;
        let mut iterations = 0usize;

        loop {
            let Some(list) = state.active_list.as_ref() else {
                return self.halt_error(TodoError::NoActiveList.into(), Some(route), records);
            };
            let Some(step) = list.current().cloned() else {
                return self.halt_error(TodoError::NoActiveList.into(), Some(route), records);
            };
            if iterations >= self.settings.max_iterations {
                tracing::warn!(
                    limit = self.settings.max_iterations,
                    next_step = %step.key,
                    "iteration limit reached"
                );
                return self.halt_error(
                    TurnError::IterationLimitExceeded {
                        limit: self.settings.max_iterations,
                    },
                    Some(route),
                    records,
                );
            }
            iterations += 1;

            self.phase(TurnPhase::Executing);
            self.emit(TurnEvent::StepStarted {
                step_key: step.key.clone(),
                description: step.description.clone(),
                position: list.position(&step.key).map_or(0, |p| p + 1),
                total: list.len(),
            });
            tracing::info!(step = %step.key, executor = %step.executor, rerun, "executing step");

            let input = StepInput {
                step_key: step.key.clone(),
                description: step.description.clone(),
                executor: step.executor.clone(),
                params: step.params.clone(),
                user_input: user_input.to_string(),
                original_request: list.original_request().to_string(),
                rewritten_request: list.rewritten_request().to_string(),
                clarification_answer: clarification_answer.take(),
                rerun,
                memory_window: state.memory.context_window(self.settings.short_term_turns),
                prior_query: state.last_query_metadata().cloned(),
                allow_clarification: self.gateway.clarification_licensed(&step),
            };
            let outcome = self.gateway.invoke(&step, &input, cancel).await;

            let Some(list) = state.active_list.as_mut() else {
                return self.halt_error(TodoError::NoActiveList.into(), Some(route), records);
            };
            let status = match &outcome {
                StepOutcome::Success { .. } => StepStatus::Complete,
                StepOutcome::ClarificationNeeded { .. } => StepStatus::ClarificationNeeded,
                StepOutcome::Failure { .. } => StepStatus::Errored,
            };
            if let Err(e) = list.set_status(&step.key, status) {
                return self.halt_error(e.into(), Some(route), records);
            }
            if status == StepStatus::Complete {
                self.phase(TurnPhase::Advancing);
                list.advance();
            }
            let snapshot = list.clone();

            let (record, halt) = match outcome {
                StepOutcome::Success {
                    agent_action,
                    tools_invoked,
                    query_metadata,
                } => (
                    TurnRecord::complete(
                        &step,
                        user_input,
                        agent_action,
                        tools_invoked,
                        query_metadata,
                        &snapshot,
                    ),
                    None,
                ),
                StepOutcome::ClarificationNeeded { question } => (
                    TurnRecord::clarification(&step, user_input, question.clone(), &snapshot),
                    Some(Halt::Clarification(question)),
                ),
                StepOutcome::Failure { kind, message } => {
                    let record = TurnRecord::errored(
                        &step,
                        user_input,
                        kind.as_str(),
                        message.as_str(),
                        &snapshot,
                    );
                    let err = match kind {
                        FailureKind::ContractViolation => TurnError::ContractViolation {
                            step_key: step.key.clone(),
                            message,
                        },
                        other => TurnError::ToolFailure {
                            step_key: step.key.clone(),
                            kind: other.as_str().to_string(),
                            message,
                        },
                    };
                    (record, Some(Halt::Error(err)))
                }
            };
            let turn_id = state.memory.append(record);
            records += 1;
            tracing::info!(turn_id, step = %step.key, status = ?status, "recorded step");

            let exhausted = halt.is_none() && snapshot.is_exhausted();
            let mut query_ref = None;
            if exhausted {
                state.active_list = None;
                query_ref = Self::query_record_of(state, &snapshot);
                if query_ref.is_some() {
                    state.last_query_ref = query_ref;
                }
            }
            if let Err(e) = self.checkpoint(state).await {
                return self.halt_error(e, Some(route), records);
            }
            self.emit(TurnEvent::StepFinished {
                step_key: step.key.clone(),
                status,
            });

            match halt {
                Some(Halt::Clarification(question)) => {
                    self.phase(TurnPhase::Halting);
                    self.emit(TurnEvent::Halted {
                        reason: HaltReason::Clarification,
                    });
                    return TurnOutcome::clarification(question, route, records);
                }
                Some(Halt::Error(err)) => return self.halt_error(err, Some(route), records),
                None if exhausted => {
                    self.phase(TurnPhase::Halting);
                    self.emit(TurnEvent::Halted {
                        reason: HaltReason::Completed,
                    });
                    return TurnOutcome::completed(
                        Self::completion_text(state, &snapshot, query_ref),
                        route,
                        records,
                    );
                }
                None => rerun = false,
            }
        }
    }

    /// 刚耗尽的列表中最后一条带 Query Metadata 的记录（该列表的记录位于日志末尾且连续）
    fn query_record_of(state: &ConversationState, list: &TodoList) -> Option<TurnId> {
        state
            .memory
            .records()
            .iter()
            .rev()
            .take_while(|r| r.todo_list_snapshot.list_id() == list.list_id())
            .find(|r| r.query_metadata.is_some())
            .map(|r| r.turn_id)
    }

    fn completion_text(
        state: &ConversationState,
        list: &TodoList,
        query_ref: Option<TurnId>,
    ) -> String {
        let last_action = state
            .memory
            .last()
            .map(|r| r.agent_action.as_str())
            .unwrap_or_default();
        let mut text = format!(
            "Completed {} step(s) for \"{}\".\n{}",
            list.len(),
            list.rewritten_request(),
            last_action
        );
        if let Some(query) = query_ref
            .and_then(|id| state.memory.get(id))
            .and_then(|r| r.query_metadata.as_ref())
        {
            text.push_str(&format!("\nResult: {}", query.result_summary));
        }
        text
    }

    async fn checkpoint(&self, state: &ConversationState) -> Result<(), TurnError> {
        self.store.save(state).await.map_err(|e| {
            tracing::error!(error = %e, "failed to save conversation state");
            TurnError::Store(e)
        })
    }

    fn halt_error(&self, err: TurnError, route: Option<Route>, records: usize) -> TurnOutcome {
        if err.is_pre_plan() {
            tracing::warn!(error = %err, "turn halted before any step");
        } else {
            tracing::warn!(error = %err, records, "turn halted with error");
        }
        self.phase(TurnPhase::Halting);
        self.emit(TurnEvent::Halted {
            reason: HaltReason::Error,
        });
        let action = self.recovery.handle(&err);
        TurnOutcome::errored(action.message().to_string(), err.kind(), route, records)
    }

    fn phase(&self, phase: TurnPhase) {
        tracing::debug!(phase = ?phase, "turn phase");
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
