//! The moderator group: approval cards, removals and admin commands.

use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use super::{parse_command, parse_page, parse_uuid, App, Command};
use crate::{
    conversation::{AwaitField, AwaitScope},
    domain::ChatId,
    request::RequestContext,
    views::{self, CallbackData},
    Error, Result,
};

fn chat_id_param(args: &str) -> Option<ChatId> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^-?\d+$").expect("valid regex"));
    let args = args.trim();
    if !re.is_match(args) {
        return None;
    }
    args.parse().ok().map(ChatId)
}

impl App {
    pub(super) async fn handle_moderator(&self, ctx: &RequestContext) -> Result<()> {
        if let Some(data) = ctx.callback().and_then(|c| c.data.clone()) {
            return match views::parse_callback(&data) {
                Some(cb) => self.moderator_callback(ctx, cb).await,
                None => Err(Error::InvalidInput(format!("callback {data:?}"))),
            };
        }
        let Some(text) = ctx.text() else {
            return Ok(());
        };

        if let Some(cmd) = parse_command(text) {
            if !self.is_for_me(&cmd) {
                return Ok(());
            }
            return self.moderator_command(ctx, cmd).await;
        }
        match self.conversations.get(ctx.chat_id) {
            Some(entry) if entry.scope == AwaitScope::Approve => {
                self.handle_awaited(ctx, entry, text).await
            }
            _ => Ok(()),
        }
    }

    async fn moderator_callback(&self, ctx: &RequestContext, cb: CallbackData<'_>) -> Result<()> {
        match cb.scope {
            "approve" => {
                let uuid = parse_uuid(cb.target)?;
                match cb.action {
                    "pass" => self.decide(ctx, uuid, true).await,
                    "fail" => self.decide(ctx, uuid, false).await,
                    "enroll-class" => {
                        let e = self.workflow.get(uuid).await?;
                        if e.approval.is_decided() {
                            return Err(Error::Terminal(uuid));
                        }
                        self.show_classification_picker(
                            ctx,
                            "enroll-class",
                            uuid,
                            &views::approval_card(&e),
                        )
                        .await
                    }
                    action => match AwaitField::from_callback(action) {
                        Some(field @ (AwaitField::Title | AwaitField::Description | AwaitField::Tags)) => {
                            let e = self.workflow.get(uuid).await?;
                            if e.approval.is_decided() {
                                return Err(Error::Terminal(uuid));
                            }
                            self.prompt_field(ctx, uuid, AwaitScope::Approve, field).await
                        }
                        _ => Err(Error::InvalidInput(format!("approve action {action:?}"))),
                    },
                }
            }
            "enroll-class" => {
                let uuid = parse_uuid(cb.target)?;
                let class = self.known_classification(cb.action)?;
                let e = self.workflow.set_classification(uuid, class).await?;
                self.show(
                    ctx.chat_id,
                    ctx.message_ref(),
                    &views::approval_card(&e),
                    Some(views::approve_keyboard(uuid)),
                )
                .await
            }
            "remove" => {
                let uuid = parse_uuid(cb.target)?;
                let moderator = ctx
                    .actor()
                    .ok_or_else(|| Error::InvalidInput("anonymous moderator".to_string()))?;
                self.catalog
                    .delete(uuid, &moderator)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("record {uuid}")))?;
                if let Some(card) = ctx.message_ref() {
                    self.gateway.clear_keyboard(card).await?;
                }
                Ok(())
            }
            "blacklist" => {
                let uuid = parse_uuid(cb.target)?;
                let (chat_id, created_by) = match self.catalog.get(uuid).await? {
                    Some(r) => (r.chat_id, r.created_by),
                    None => {
                        let e = self.workflow.get(uuid).await?;
                        (e.chat_id, e.created_by)
                    }
                };
                let target = match cb.action {
                    "chat" => chat_id,
                    "user" => Some(ChatId::from(created_by)),
                    action => return Err(Error::InvalidInput(format!("blacklist action {action:?}"))),
                };
                let Some(target) = target else {
                    return self.reply(ctx.chat_id, "ban-no-chat-id").await;
                };
                self.bans.ban(target)?;
                info!(uuid = %uuid, target = target.0, "Ban issued from decision card");
                let id = target.to_string();
                self.reply_with(ctx.chat_id, "ban-success", &[("chat-id", &id)])
                    .await
            }
            "page" => {
                let page = parse_page(cb.target)?;
                self.show_search(ctx.chat_id, ctx.message_ref(), cb.action, page)
                    .await
            }
            other => Err(Error::InvalidInput(format!("moderator callback {other:?}"))),
        }
    }

    async fn moderator_command(&self, ctx: &RequestContext, cmd: Command<'_>) -> Result<()> {
        match cmd.name.as_str() {
            "ban" => match chat_id_param(cmd.args) {
                Some(target) => {
                    self.bans.ban(target)?;
                    info!(target = target.0, "Ban issued from moderator group");
                    let id = target.to_string();
                    self.reply_with(ctx.chat_id, "ban-success", &[("chat-id", &id)])
                        .await
                }
                None => self.reply(ctx.chat_id, "ban-parameter").await,
            },
            "unban" => match chat_id_param(cmd.args) {
                Some(target) => {
                    let key = match self.bans.unban(target)? {
                        Some(_) => "unban-success",
                        None => "unban-no-need",
                    };
                    let id = target.to_string();
                    self.reply_with(ctx.chat_id, key, &[("chat-id", &id)]).await
                }
                None => self.reply(ctx.chat_id, "unban-parameter").await,
            },
            "count" => {
                let count = self.catalog.count().await?.to_string();
                self.reply_with(ctx.chat_id, "statistics", &[("count", &count)])
                    .await
            }
            "start" | "enroll" | "update" | "setting" | "help" | "list" => {
                self.reply(ctx.chat_id, "disable").await
            }
            "mine" => self.reply(ctx.chat_id, "only-private").await,
            _ => self.reply(ctx.chat_id, "can-not-understand").await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_params_must_be_plain_integers() {
        assert_eq!(chat_id_param("-1001234"), Some(ChatId(-1001234)));
        assert_eq!(chat_id_param(" 42 "), Some(ChatId(42)));
        assert_eq!(chat_id_param("@someone"), None);
        assert_eq!(chat_id_param(""), None);
        assert_eq!(chat_id_param("99999999999999999999999"), None);
    }
}
