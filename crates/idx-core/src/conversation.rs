//! Per-chat "awaiting input" markers with timer-based expiry.
//!
//! One entry per chat. A new prompt overwrites the previous one and restarts
//! its timer. Every timer carries the generation it was armed for and only
//! removes the entry if that generation is still current, so a cancelled timer
//! that is already mid-fire cannot remove a newer entry.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ChatId;

/// Which flow the awaited reply belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AwaitScope {
    /// Submitter editing their own draft.
    Enroll,
    /// Moderator editing a submitted enrollment.
    Approve,
    /// Creator editing a published record.
    Update,
    /// Anyone leaving feedback on a record.
    Feedback,
}

/// Which field the awaited reply fills in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AwaitField {
    Title,
    Description,
    Tags,
    Link,
    Feedback,
}

impl AwaitField {
    /// Parse the field part of callback data (`title`, `about`, ...).
    pub fn from_callback(s: &str) -> Option<Self> {
        match s {
            "title" => Some(AwaitField::Title),
            "about" => Some(AwaitField::Description),
            "tags" => Some(AwaitField::Tags),
            "link" => Some(AwaitField::Link),
            "feedback" => Some(AwaitField::Feedback),
            _ => None,
        }
    }

    /// Reply catalog key for the prompt asking for this field.
    pub fn prompt_key(self) -> &'static str {
        match self {
            AwaitField::Title => "enroll-update-title",
            AwaitField::Description => "enroll-update-about",
            AwaitField::Tags => "enroll-update-tags",
            AwaitField::Link => "update-link",
            AwaitField::Feedback => "feedback-start",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AwaitEntry {
    pub chat_id: ChatId,
    pub target: Uuid,
    pub scope: AwaitScope,
    pub field: AwaitField,
    pub expires_at: Instant,
}

struct Slot {
    entry: AwaitEntry,
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<ChatId, Slot>,
    next_generation: u64,
}

/// Owned conversation state; cheap to clone.
#[derive(Clone)]
pub struct ConversationState {
    inner: Arc<Mutex<Inner>>,
    ttl: Duration,
}

impl ConversationState {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            ttl,
        }
    }

    /// Start awaiting a field for `chat_id`, replacing any previous entry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_await(&self, chat_id: ChatId, target: Uuid, scope: AwaitScope, field: AwaitField) {
        self.set_await_for(chat_id, target, scope, field, self.ttl);
    }

    pub fn set_await_for(
        &self,
        chat_id: ChatId,
        target: Uuid,
        scope: AwaitScope,
        field: AwaitField,
        ttl: Duration,
    ) {
        let cancel = CancellationToken::new();
        let generation = {
            let mut inner = self.inner.lock();
            inner.next_generation += 1;
            let generation = inner.next_generation;
            let slot = Slot {
                entry: AwaitEntry {
                    chat_id,
                    target,
                    scope,
                    field,
                    expires_at: Instant::now() + ttl,
                },
                generation,
                cancel: cancel.clone(),
            };
            if let Some(previous) = inner.slots.insert(chat_id, slot) {
                previous.cancel.cancel();
            }
            generation
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(ttl) => {
                    let mut inner = inner.lock();
                    let current = inner.slots.get(&chat_id).map(|s| s.generation);
                    if current == Some(generation) {
                        inner.slots.remove(&chat_id);
                        debug!(chat_id = chat_id.0, "Await status expired");
                    }
                }
            }
        });
    }

    /// Current entry for `chat_id`, if any and not yet expired.
    pub fn get(&self, chat_id: ChatId) -> Option<AwaitEntry> {
        let inner = self.inner.lock();
        inner
            .slots
            .get(&chat_id)
            .map(|s| s.entry.clone())
            .filter(|e| e.expires_at > Instant::now())
    }

    /// Remove the entry and cancel its timer. Safe when absent.
    pub fn clear(&self, chat_id: ChatId) -> Option<AwaitEntry> {
        let slot = self.inner.lock().slots.remove(&chat_id)?;
        slot.cancel.cancel();
        Some(slot.entry)
    }

    /// Number of live entries (expired entries are removed by their timers).
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
