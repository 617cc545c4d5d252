//! Telegram adapter (teloxide).
//!
//! This crate implements the `idx-core` ChatGateway over the Telegram Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        Chat, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
        ParseMode, Recipient, ReplyMarkup,
    },
    ApiError, RequestError,
};

use tokio::time::sleep;
use tracing::warn;

pub mod convert;
pub mod router;

use idx_core::{
    domain::{ChatId, ChatLookup, ChatProfile, EntityKind, MessageId, MessageRef},
    errors::Error,
    formatting::public_link,
    messaging::{
        port::ChatGateway,
        types::{ChatAction, InlineKeyboard, Markup, ReplyKeyboard},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    fn inline_markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
                    .collect()
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    fn reply_markup(keyboard: ReplyKeyboard) -> KeyboardMarkup {
        let rows: Vec<Vec<KeyboardButton>> = keyboard
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect())
            .collect();
        KeyboardMarkup::new(rows)
    }

    async fn retry_raw<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                other => return other,
            }
        }
    }

    async fn with_retry<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        self.retry_raw(op).await.map_err(Self::map_err)
    }

    /// `getChat`, with "not found" mapped to `None`.
    async fn get_chat(&self, recipient: Recipient) -> Result<Option<Chat>> {
        match self.retry_raw(|| self.bot.get_chat(recipient.clone())).await {
            Ok(chat) => Ok(Some(chat)),
            Err(RequestError::Api(ApiError::ChatNotFound | ApiError::UserNotFound)) => Ok(None),
            Err(e) => Err(Self::map_err(e)),
        }
    }
}

fn entity_kind(chat: &Chat) -> EntityKind {
    if chat.is_private() {
        let is_bot = chat
            .username()
            .is_some_and(|u| u.to_ascii_lowercase().ends_with("bot"));
        if is_bot {
            EntityKind::Bot
        } else {
            EntityKind::Person
        }
    } else if chat.is_channel() {
        EntityKind::Channel
    } else {
        EntityKind::Group
    }
}

fn chat_title(chat: &Chat) -> String {
    if let Some(title) = chat.title() {
        return title.to_string();
    }
    match (chat.first_name(), chat.last_name()) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first.to_string(),
        _ => chat.username().unwrap_or_default().to_string(),
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn send_message(
        &self,
        chat_id: ChatId,
        html: &str,
        markup: Option<Markup>,
    ) -> Result<MessageRef> {
        let markup: Option<ReplyMarkup> = markup.map(|m| match m {
            Markup::Inline(kb) => Self::inline_markup(kb).into(),
            Markup::Reply(kb) => Self::reply_markup(kb).into(),
        });

        let msg = self
            .with_retry(|| {
                let req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true);
                match markup.clone() {
                    Some(m) => req.reply_markup(m),
                    None => req,
                }
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_message(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        let markup = keyboard.map(Self::inline_markup);
        self.with_retry(|| {
            let req = self
                .bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true);
            match markup.clone() {
                Some(m) => req.reply_markup(m),
                None => req,
            }
        })
        .await?;
        Ok(())
    }

    async fn clear_keyboard(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot.edit_message_reply_markup(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
            )
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await?;
        Ok(())
    }

    async fn resolve_chat(&self, lookup: &ChatLookup) -> Result<Option<ChatProfile>> {
        let recipient = match lookup {
            ChatLookup::Username(name) => {
                Recipient::ChannelUsername(format!("@{}", name.trim_start_matches('@')))
            }
            ChatLookup::Id(id) => Recipient::Id(Self::tg_chat(*id)),
        };
        let Some(chat) = self.get_chat(recipient).await? else {
            return Ok(None);
        };

        let kind = entity_kind(&chat);
        let member_count = if chat.is_private() {
            None
        } else {
            match self.bot.get_chat_member_count(chat.id).await {
                Ok(n) => Some(u64::from(n)),
                Err(e) => {
                    warn!(chat_id = chat.id.0, error = %e, "Member count unavailable");
                    None
                }
            }
        };
        let username = chat.username().map(str::to_string);
        let link = username
            .as_deref()
            .map(public_link)
            .or_else(|| chat.invite_link().map(str::to_string));

        Ok(Some(ChatProfile {
            chat_id: Some(ChatId(chat.id.0)),
            kind,
            title: chat_title(&chat),
            description: chat.description().map(str::to_string),
            username,
            link,
            member_count,
        }))
    }
}
