//! 对话状态持久化
//!
//! 每个对话的完整状态（活动 Todo List + 回合记忆 + 上一份查询的回指）按对话 ID 存取。
//! 编排器在每次写入回合记录后保存一次，进程重启后从最后一条记录处续跑。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::{QueryMetadata, TurnId, TurnMemory};
use crate::todo::TodoList;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("stored state belongs to conversation '{found}', not '{requested}'")]
    ConversationMismatch { requested: String, found: String },
}

/// 单个对话的持久状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    /// 活动列表；耗尽后置空
    pub active_list: Option<TodoList>,
    pub memory: TurnMemory,
    /// 最近一份已退役列表的 Query Metadata 所在记录
    pub last_query_ref: Option<TurnId>,
    pub user_turns: u64,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            active_list: None,
            memory: TurnMemory::new(),
            last_query_ref: None,
            user_turns: 0,
        }
    }

    /// 通过回指读取上一份查询（不共享可变句柄）
    pub fn last_query_metadata(&self) -> Option<&QueryMetadata> {
        self.last_query_ref
            .and_then(|id| self.memory.get(id))
            .and_then(|r| r.query_metadata.as_ref())
    }
}

/// 对话状态存储
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError>;

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;
}

/// 进程内存储
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.states.read().await.get(conversation_id).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }
}

/// 文件存储：目录下每个对话一个 JSON 文件；先写临时文件再 rename，避免半截文件。
/// 文件名是对话 ID 的十六进制编码，不同 ID 不会落到同一个文件。
#[derive(Debug, Clone)]
pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(conversation_id)))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let path = self.path_for(conversation_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: ConversationState = serde_json::from_str(&data)?;
        if state.conversation_id != conversation_id {
            return Err(StoreError::ConversationMismatch {
                requested: conversation_id.to_string(),
                found: state.conversation_id,
            });
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&state.conversation_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
