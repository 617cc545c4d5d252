use crate::domain::{Actor, ChatId, ChatKind, MessageId, MessageRef, UserId};

/// Transport-neutral inbound update: a text message, a button callback, or
/// (rarely) neither, in which case it is ignored by the router.
#[derive(Clone, Debug, Default)]
pub struct InboundUpdate {
    pub message: Option<InboundMessage>,
    pub callback: Option<InboundCallback>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatRef {
    pub id: ChatId,
    pub kind: ChatKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl Sender {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{}{}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.display_name())
    }
}

#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat: ChatRef,
    pub message_id: MessageId,
    pub from: Option<Sender>,
    pub text: Option<String>,
}

/// The message a callback button was attached to.
#[derive(Clone, Copy, Debug)]
pub struct CallbackOrigin {
    pub chat: ChatRef,
    pub message_id: MessageId,
}

impl CallbackOrigin {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat.id,
            message_id: self.message_id,
        }
    }
}

#[derive(Clone, Debug)]
pub struct InboundCallback {
    pub id: String,
    pub from: Sender,
    pub data: Option<String>,
    pub message: Option<CallbackOrigin>,
}

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Inline keyboard (buttons under a message) laid out in rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }

    /// Lay buttons out `per_row` at a time.
    pub fn grid(buttons: Vec<InlineButton>, per_row: usize) -> Self {
        let per_row = per_row.max(1);
        let mut rows = Vec::new();
        let mut it = buttons.into_iter().peekable();
        while it.peek().is_some() {
            rows.push(it.by_ref().take(per_row).collect());
        }
        Self { rows }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// Reply keyboard (replaces the user's keyboard with text buttons).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Markup {
    Inline(InlineKeyboard),
    Reply(ReplyKeyboard),
}
