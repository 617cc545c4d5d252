//! Ban registry: chats whose updates never reach the workflow.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::{BanEntry, ChatId},
    ports::BanStore,
    Result,
};

/// Read-mostly set of banned chat ids, written through to a `BanStore`.
pub struct BanRegistry {
    entries: RwLock<HashMap<ChatId, BanEntry>>,
    store: Arc<dyn BanStore>,
}

impl BanRegistry {
    pub fn open(store: Arc<dyn BanStore>) -> Result<Self> {
        let entries = store
            .load_all()?
            .into_iter()
            .map(|e| (e.chat_id, e))
            .collect::<HashMap<_, _>>();
        info!(count = entries.len(), "Loaded ban list");
        Ok(Self {
            entries: RwLock::new(entries),
            store,
        })
    }

    pub fn is_banned(&self, chat_id: ChatId) -> bool {
        self.entries.read().contains_key(&chat_id)
    }

    pub fn get(&self, chat_id: ChatId) -> Option<BanEntry> {
        self.entries.read().get(&chat_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ban a chat. Banning an already banned chat returns the existing entry.
    pub fn ban(&self, chat_id: ChatId) -> Result<BanEntry> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&chat_id) {
            return Ok(existing.clone());
        }
        let entry = BanEntry {
            id: Uuid::new_v4(),
            chat_id,
            banned_at: Utc::now(),
        };
        self.store.insert(&entry)?;
        entries.insert(chat_id, entry.clone());
        info!(chat_id = chat_id.0, "Chat banned");
        Ok(entry)
    }

    /// Lift a ban. `Ok(None)` when the chat was not banned.
    pub fn unban(&self, chat_id: ChatId) -> Result<Option<BanEntry>> {
        let mut entries = self.entries.write();
        if !entries.contains_key(&chat_id) {
            return Ok(None);
        }
        self.store.remove(chat_id)?;
        let removed = entries.remove(&chat_id);
        info!(chat_id = chat_id.0, "Chat unbanned");
        Ok(removed)
    }
}
