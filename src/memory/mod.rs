//! 记忆层：对话历史与会话存储

pub mod conversation;
pub mod store;

pub use conversation::{transcript, ConversationMemory, Message, Role};
pub use store::{generate_title, Conversation, ConversationStore, InMemoryConversationStore};
