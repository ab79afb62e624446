//! 记忆层：回合记录、只追加的回合记忆、对话状态持久化

pub mod persistence;
pub mod record;
pub mod turn_memory;

pub use persistence::{
    ConversationState, ConversationStore, FileConversationStore, MemoryConversationStore,
    StoreError,
};
pub use record::{QueryMetadata, RecordStatus, RecordedError, TurnId, TurnRecord};
pub use turn_memory::TurnMemory;
