//! Private chat: intake, self-service and search.

use tracing::info;

use super::{parse_command, parse_page, parse_uuid, App, Command};
use crate::{
    conversation::{AwaitField, AwaitScope},
    domain::{ChatLookup, EntityKind, FieldEdit},
    formatting::{escape_html, extract_username},
    messaging::types::Markup,
    request::RequestContext,
    views::{self, CallbackData},
    Error, Result,
};

impl App {
    pub(super) async fn handle_private(&self, ctx: &RequestContext) -> Result<()> {
        if let Some(data) = ctx.callback().and_then(|c| c.data.clone()) {
            return match views::parse_callback(&data) {
                Some(cb) => self.private_callback(ctx, cb).await,
                None => Err(Error::InvalidInput(format!("callback {data:?}"))),
            };
        }
        let Some(text) = ctx.text() else {
            return Ok(());
        };
        self.typing(ctx.chat_id).await;

        if let Some(cmd) = parse_command(text) {
            return self.private_command(ctx, cmd).await;
        }
        if let Some(entry) = self.conversations.get(ctx.chat_id) {
            return self.handle_awaited(ctx, entry, text).await;
        }
        if let Some(username) = extract_username(text) {
            return self.intake(ctx, &username).await;
        }
        self.show_search(ctx.chat_id, None, text, 1).await
    }

    async fn private_command(&self, ctx: &RequestContext, cmd: Command<'_>) -> Result<()> {
        let user = ctx
            .actor()
            .ok_or_else(|| Error::InvalidInput("anonymous sender".to_string()))?;
        match cmd.name.as_str() {
            "start" if !cmd.args.is_empty() => self.show_record(ctx, cmd.args).await,
            "start" => {
                let text = self
                    .replies
                    .render("start", &[("bot", self.bot_username.as_str())]);
                let keyboard = views::classification_reply_keyboard(&self.cfg.classifications);
                self.gateway
                    .send_message(ctx.chat_id, &escape_html(&text), Some(Markup::Reply(keyboard)))
                    .await?;
                Ok(())
            }
            "help" => self.reply(ctx.chat_id, "help").await,
            "enroll" => self.reply(ctx.chat_id, "enroll-start").await,
            "mine" => self.show_mine(ctx.chat_id, user.id, None, 1).await,
            "list" if cmd.args.is_empty() => self.reply(ctx.chat_id, "list-parameter").await,
            "list" => self.show_search(ctx.chat_id, None, cmd.args, 1).await,
            "cancel" => match self.conversations.clear(ctx.chat_id) {
                Some(_) => self.reply(ctx.chat_id, "cancel").await,
                None => self.reply(ctx.chat_id, "nothing-to-cancel").await,
            },
            _ => self.reply(ctx.chat_id, "can-not-understand").await,
        }
    }

    /// `/start <uuid>`: record detail with owner or visitor buttons.
    async fn show_record(&self, ctx: &RequestContext, arg: &str) -> Result<()> {
        let uuid = parse_uuid(arg)?;
        let record = self
            .catalog
            .get(uuid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("record {uuid}")))?;
        let is_owner = ctx.sender.as_ref().map(|s| s.id) == Some(record.created_by);
        let keyboard = if is_owner {
            views::update_keyboard(uuid)
        } else {
            views::feedback_keyboard(uuid)
        };
        self.show(ctx.chat_id, None, &views::record_detail(&record), Some(keyboard))
            .await
    }

    /// Resolve a public chat and open a draft for it.
    async fn intake(&self, ctx: &RequestContext, username: &str) -> Result<()> {
        let owner = ctx
            .actor()
            .ok_or_else(|| Error::InvalidInput("anonymous sender".to_string()))?;
        let profile = self
            .gateway
            .resolve_chat(&ChatLookup::Username(username.to_string()))
            .await?;
        let Some(profile) = profile else {
            return self.reply(ctx.chat_id, "enroll-not-found").await;
        };
        if profile.kind == EntityKind::Person {
            return self.reply(ctx.chat_id, "enroll-person").await;
        }
        let e = self.workflow.draft(profile, &owner).await?;
        info!(uuid = %e.uuid, username, "Draft opened from private chat");
        self.show(
            ctx.chat_id,
            None,
            &views::enrollment_detail(&e),
            Some(views::enroll_keyboard(e.uuid)),
        )
        .await
    }

    async fn private_callback(&self, ctx: &RequestContext, cb: CallbackData<'_>) -> Result<()> {
        let user = ctx
            .actor()
            .ok_or_else(|| Error::InvalidInput("anonymous sender".to_string()))?;
        match cb.scope {
            "page" => {
                let page = parse_page(cb.target)?;
                self.show_search(ctx.chat_id, ctx.message_ref(), cb.action, page)
                    .await
            }
            "mine" => {
                let page = parse_page(cb.target)?;
                self.show_mine(ctx.chat_id, user.id, ctx.message_ref(), page)
                    .await
            }
            "feedback" => {
                let uuid = parse_uuid(cb.target)?;
                self.prompt_field(ctx, uuid, AwaitScope::Feedback, AwaitField::Feedback)
                    .await
            }
            "enroll" => {
                let uuid = parse_uuid(cb.target)?;
                let e = self.owned_enrollment(uuid, user.id).await?;
                if e.is_submitted {
                    return Err(Error::AlreadySubmitted(uuid));
                }
                match cb.action {
                    "submit" => {
                        let e = self.workflow.submit(uuid).await?;
                        self.show(ctx.chat_id, ctx.message_ref(), &views::enrollment_detail(&e), None)
                            .await?;
                        self.reply(ctx.chat_id, "enroll-submitted").await
                    }
                    "cancel" => {
                        self.workflow.cancel(uuid, user.id).await?;
                        let text = self.replies.lookup("enroll-cancelled");
                        self.show(ctx.chat_id, ctx.message_ref(), text, None).await
                    }
                    "enroll-class" => {
                        self.show_classification_picker(
                            ctx,
                            "enroll-class",
                            uuid,
                            &views::enrollment_detail(&e),
                        )
                        .await
                    }
                    action => match AwaitField::from_callback(action) {
                        Some(field) if field != AwaitField::Feedback => {
                            self.prompt_field(ctx, uuid, AwaitScope::Enroll, field).await
                        }
                        _ => Err(Error::InvalidInput(format!("enroll action {action:?}"))),
                    },
                }
            }
            "enroll-class" => {
                let uuid = parse_uuid(cb.target)?;
                let e = self.owned_enrollment(uuid, user.id).await?;
                if e.is_submitted {
                    return Err(Error::AlreadySubmitted(uuid));
                }
                let class = self.known_classification(cb.action)?;
                let e = self.workflow.set_classification(uuid, class).await?;
                self.show(
                    ctx.chat_id,
                    ctx.message_ref(),
                    &views::enrollment_detail(&e),
                    Some(views::enroll_keyboard(uuid)),
                )
                .await
            }
            "update" => {
                let uuid = parse_uuid(cb.target)?;
                let record = self.owned_record(uuid, user.id).await?;
                match cb.action {
                    "remove" => {
                        self.catalog.delete(uuid, &user).await?;
                        let text = self.replies.lookup("record-removed");
                        self.show(ctx.chat_id, ctx.message_ref(), text, None).await
                    }
                    "record-class" => {
                        self.show_classification_picker(
                            ctx,
                            "record-class",
                            uuid,
                            &views::record_detail(&record),
                        )
                        .await
                    }
                    action => match AwaitField::from_callback(action) {
                        Some(field) if field != AwaitField::Feedback => {
                            self.prompt_field(ctx, uuid, AwaitScope::Update, field).await
                        }
                        _ => Err(Error::InvalidInput(format!("update action {action:?}"))),
                    },
                }
            }
            "record-class" => {
                let uuid = parse_uuid(cb.target)?;
                self.owned_record(uuid, user.id).await?;
                let class = self.known_classification(cb.action)?;
                let r = self
                    .catalog
                    .edit(uuid, FieldEdit::Classification(class))
                    .await?;
                self.show(
                    ctx.chat_id,
                    ctx.message_ref(),
                    &views::record_detail(&r),
                    Some(views::update_keyboard(uuid)),
                )
                .await
            }
            other => Err(Error::InvalidInput(format!("callback scope {other:?}"))),
        }
    }
}
