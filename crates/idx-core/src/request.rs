//! Request classification: the single gate between inbound updates and the
//! workflow. Banned chats and unsupported chat kinds never get past here.

use std::sync::Arc;

use tracing::debug;

use crate::{
    ban::BanRegistry,
    domain::{Actor, ChatId, ChatKind, MessageId, MessageRef},
    messaging::types::{InboundCallback, InboundUpdate, Sender},
};

/// A classified update together with the chat it belongs to.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub sender: Option<Sender>,
    pub update: InboundUpdate,
}

impl RequestContext {
    /// Message text, trimmed. `None` for callbacks and empty messages.
    pub fn text(&self) -> Option<&str> {
        self.update
            .message
            .as_ref()
            .and_then(|m| m.text.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn callback(&self) -> Option<&InboundCallback> {
        self.update.callback.as_ref()
    }

    /// The message a callback button sits under, or the inbound message.
    pub fn message_ref(&self) -> Option<MessageRef> {
        if let Some(origin) = self.callback().and_then(|c| c.message) {
            return Some(origin.message_ref());
        }
        self.update.message.as_ref().map(|m| MessageRef {
            chat_id: m.chat.id,
            message_id: m.message_id,
        })
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message_ref().map(|m| m.message_id)
    }

    pub fn actor(&self) -> Option<Actor> {
        self.sender.as_ref().map(Sender::actor)
    }
}

#[derive(Clone, Debug)]
pub enum Request {
    Private(RequestContext),
    Group(RequestContext),
    Moderator(RequestContext),
}

impl Request {
    pub fn context(&self) -> &RequestContext {
        match self {
            Request::Private(c) | Request::Group(c) | Request::Moderator(c) => c,
        }
    }
}

pub struct RequestRouter {
    bans: Arc<BanRegistry>,
    moderator_group: ChatId,
}

impl RequestRouter {
    pub fn new(bans: Arc<BanRegistry>, moderator_group: ChatId) -> Self {
        Self {
            bans,
            moderator_group,
        }
    }

    /// Classify an update. `None` means the update is dropped silently.
    pub fn classify(&self, update: InboundUpdate) -> Option<Request> {
        let has_text = update
            .message
            .as_ref()
            .and_then(|m| m.text.as_deref())
            .is_some_and(|t| !t.trim().is_empty());
        if !has_text && update.callback.is_none() {
            return None;
        }

        let origin = update.callback.as_ref().and_then(|c| c.message);
        let (chat_id, chat_kind) = match (origin, update.message.as_ref(), update.callback.as_ref())
        {
            (Some(origin), _, _) => (origin.chat.id, origin.chat.kind),
            (None, Some(msg), _) => (msg.chat.id, msg.chat.kind),
            (None, None, Some(cb)) => (ChatId::from(cb.from.id), ChatKind::Private),
            (None, None, None) => return None,
        };

        let sender = update
            .callback
            .as_ref()
            .map(|c| c.from.clone())
            .or_else(|| update.message.as_ref().and_then(|m| m.from.clone()));

        if self.bans.is_banned(chat_id)
            || sender
                .as_ref()
                .is_some_and(|s| self.bans.is_banned(ChatId::from(s.id)))
        {
            debug!(chat_id = chat_id.0, "Dropped update from banned chat");
            return None;
        }

        let ctx = RequestContext {
            chat_id,
            chat_kind,
            sender,
            update,
        };
        match chat_kind {
            ChatKind::Private => Some(Request::Private(ctx)),
            ChatKind::Group | ChatKind::Supergroup if chat_id == self.moderator_group => {
                Some(Request::Moderator(ctx))
            }
            ChatKind::Group | ChatKind::Supergroup => Some(Request::Group(ctx)),
            ChatKind::Channel => None,
        }
    }
}
