use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::battle::BattleHandle;
use crate::types::{ChatId, MessageId};

/// Process-wide map of live battles, at most one per chat. All mutation goes
/// through this type; the core never touches a global map directly.
pub struct BattleRegistry {
    battles: Mutex<HashMap<ChatId, Arc<BattleHandle>>>,
}

impl BattleRegistry {
    pub fn new() -> Self {
        Self {
            battles: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts the handle unless the chat already has a live battle.
    pub async fn insert(&self, handle: Arc<BattleHandle>) -> bool {
        let mut battles = self.battles.lock().await;
        if battles.contains_key(&handle.chat_id) {
            return false;
        }
        battles.insert(handle.chat_id, handle);
        true
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<Arc<BattleHandle>> {
        self.battles.lock().await.get(&chat_id).cloned()
    }

    pub async fn remove(&self, chat_id: ChatId) -> Option<Arc<BattleHandle>> {
        self.battles.lock().await.remove(&chat_id)
    }

    pub async fn contains(&self, chat_id: ChatId) -> bool {
        self.battles.lock().await.contains_key(&chat_id)
    }
}

impl Default for BattleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending cancel-confirmation prompts, one per chat. A second cancel request
/// replaces the previous prompt's target message.
pub struct PendingCancels {
    prompts: Mutex<HashMap<ChatId, MessageId>>,
}

impl PendingCancels {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set(&self, chat_id: ChatId, message_id: MessageId) {
        self.prompts.lock().await.insert(chat_id, message_id);
    }

    pub async fn take(&self, chat_id: ChatId) -> Option<MessageId> {
        self.prompts.lock().await.remove(&chat_id)
    }
}

impl Default for PendingCancels {
    fn default() -> Self {
        Self::new()
    }
}
