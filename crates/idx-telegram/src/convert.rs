//! teloxide types -> transport-neutral inbound updates.

use teloxide::types::{CallbackQuery, Chat, Message, User};

use idx_core::{
    domain::{ChatId, ChatKind, MessageId, UserId},
    messaging::types::{
        CallbackOrigin, ChatRef, InboundCallback, InboundMessage, InboundUpdate, Sender,
    },
};

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    }
}

fn chat_ref(chat: &Chat) -> ChatRef {
    ChatRef {
        id: ChatId(chat.id.0),
        kind: chat_kind(chat),
    }
}

pub fn sender(user: &User) -> Sender {
    Sender {
        id: UserId(user.id.0 as i64),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
    }
}

pub fn message(msg: &Message) -> InboundUpdate {
    InboundUpdate {
        message: Some(InboundMessage {
            chat: chat_ref(&msg.chat),
            message_id: MessageId(msg.id.0),
            from: msg.from().map(sender),
            text: msg.text().map(str::to_string),
        }),
        callback: None,
    }
}

pub fn callback(q: &CallbackQuery) -> InboundUpdate {
    InboundUpdate {
        message: None,
        callback: Some(InboundCallback {
            id: q.id.clone(),
            from: sender(&q.from),
            data: q.data.clone(),
            message: q.message.as_ref().map(|m| CallbackOrigin {
                chat: chat_ref(&m.chat),
                message_id: MessageId(m.id.0),
            }),
        }),
    }
}
