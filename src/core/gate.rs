//! 对话级互斥：同一对话同一时刻只有一个回合在执行
//!
//! acquire 返回的守卫持有该对话的异步互斥锁，贯穿整个回合（含内部的步骤推进循环）；
//! 不同对话互不阻塞。每次获得锁都会生成新的取消令牌，cancel(id) 取消正在进行的回合。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

type EntryMap = Arc<StdMutex<HashMap<String, Arc<GateEntry>>>>;

#[derive(Clone, Default)]
pub struct ConversationGate {
    inner: EntryMap,
}

#[derive(Default)]
struct GateEntry {
    lock: Arc<Mutex<()>>,
    permits: AtomicUsize,
    in_flight: StdMutex<Option<CancellationToken>>,
}

/// 回合期间持有；drop 时释放锁，最后一个持有者清理条目
pub struct ConversationGuard {
    token: CancellationToken,
    _lock_guard: OwnedMutexGuard<()>,
    permit: GatePermit,
}

struct GatePermit {
    conversation_id: String,
    inner: EntryMap,
    entry: Arc<GateEntry>,
}

impl ConversationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, conversation_id: &str) -> ConversationGuard {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(GateEntry::default()))
                .clone()
        };

        // 等锁期间 future 被丢弃时，由 permit 的 Drop 归还计数
        entry.permits.fetch_add(1, Ordering::AcqRel);
        let permit = GatePermit {
            conversation_id: conversation_id.to_string(),
            inner: Arc::clone(&self.inner),
            entry,
        };
        let lock_guard = permit.entry.lock.clone().lock_owned().await;

        let token = CancellationToken::new();
        *permit
            .entry
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());

        ConversationGuard {
            token,
            _lock_guard: lock_guard,
            permit,
        }
    }

    /// 取消该对话正在进行的回合；没有进行中的回合时返回 false
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let entry = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned();
        let Some(entry) = entry else {
            return false;
        };
        let token = entry
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[doc(hidden)]
    pub fn active_conversations(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ConversationGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        // 仍持有锁，不会与下一个持有者的令牌冲突
        *self
            .permit
            .entry
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let previous = self.entry.permits.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "conversation gate permit underflow");
        if previous != 1 {
            return;
        }

        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let should_remove = map
            .get(&self.conversation_id)
            .is_some_and(|current| Arc::ptr_eq(current, &self.entry))
            && self.entry.permits.load(Ordering::Acquire) == 0;
        if should_remove {
            map.remove(&self.conversation_id);
        }
    }
}
