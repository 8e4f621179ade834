//! 会话存储：按 id 保存完整对话（标题、消息、模式、标签、置顶）
//!
//! 存储本身是外部协作者，编排器从不直接访问；这里只给出 trait 与一个内存实现，
//! 供二进制入口在多轮对话之间保存历史。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::Mode;
use crate::memory::{Message, Role};

const TITLE_MAX_CHARS: usize = 50;

/// 一次完整会话
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub mode: Mode,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
}

impl Conversation {
    pub fn new(mode: Mode) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: generate_title(&[]),
            messages: Vec::new(),
            mode,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            pinned: false,
        }
    }

    /// 追加消息；首条 user 消息出现后标题随之确定
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.title = generate_title(&self.messages);
    }
}

/// 取首条 user 消息的前 50 个字符作为标题，截断时补 "..."
pub fn generate_title(messages: &[Message]) -> String {
    let Some(first) = messages.iter().find(|m| m.role == Role::User) else {
        return "New Conversation".to_string();
    };
    let title: String = first.content.chars().take(TITLE_MAX_CHARS).collect();
    if first.content.chars().count() > TITLE_MAX_CHARS {
        format!("{}...", title)
    } else {
        title
    }
}

/// 会话存储 trait（键值语义，id 为键）
pub trait ConversationStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Conversation>;

    /// 新增或覆盖；写入时刷新 updated_at
    fn save(&self, conversation: Conversation);

    fn delete(&self, id: &str);

    /// 按 updated_at 从新到旧
    fn list(&self) -> Vec<Conversation>;

    /// 标题、消息内容或标签包含 query（不区分大小写）
    fn search(&self, query: &str) -> Vec<Conversation> {
        let query = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|c| {
                c.title.to_lowercase().contains(&query)
                    || c.messages
                        .iter()
                        .any(|m| m.content.to_lowercase().contains(&query))
                    || c.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .collect()
    }

    fn pinned(&self) -> Vec<Conversation> {
        self.list().into_iter().filter(|c| c.pinned).collect()
    }
}

/// 内存实现
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .ok()
            .and_then(|map| map.get(id).cloned())
    }

    fn save(&self, mut conversation: Conversation) {
        conversation.updated_at = chrono::Utc::now().timestamp_millis();
        match self.conversations.write() {
            Ok(mut map) => {
                map.insert(conversation.id.clone(), conversation);
            }
            Err(e) => tracing::warn!("conversation store poisoned: {}", e),
        }
    }

    fn delete(&self, id: &str) {
        if let Ok(mut map) = self.conversations.write() {
            map.remove(id);
        }
    }

    fn list(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> = self
            .conversations
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all
    }
}
