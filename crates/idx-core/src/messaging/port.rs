use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatLookup, ChatProfile, MessageRef},
    messaging::types::{ChatAction, InlineKeyboard, Markup},
    Result,
};

/// Chat gateway port: the only transport surface the core depends on.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send an HTML message, optionally with a keyboard.
    async fn send_message(
        &self,
        chat_id: ChatId,
        html: &str,
        markup: Option<Markup>,
    ) -> Result<MessageRef>;

    /// Replace a message's text; `keyboard = None` removes its inline keyboard.
    async fn edit_message(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()>;

    /// Strip the inline keyboard and keep the text.
    async fn clear_keyboard(&self, msg: MessageRef) -> Result<()>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    /// Look up public information about a chat. `Ok(None)` when it does not
    /// exist or is not visible to the bot.
    async fn resolve_chat(&self, lookup: &ChatLookup) -> Result<Option<ChatProfile>>;
}
