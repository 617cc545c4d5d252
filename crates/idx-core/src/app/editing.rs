//! Field edits driven by "awaiting input" prompts, and moderator decisions.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::App;
use crate::{
    conversation::{AwaitEntry, AwaitField, AwaitScope},
    domain::{parse_tags, FieldEdit, Record, UserId},
    formatting::{extract_username, public_link},
    messaging::types::Markup,
    request::RequestContext,
    views, Error, Result,
};

/// Turn a free-text reply into the edit it stands for.
pub(super) fn field_edit(field: AwaitField, text: &str) -> Result<FieldEdit> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("empty reply".to_string()));
    }
    match field {
        AwaitField::Title => Ok(FieldEdit::Title(text.to_string())),
        AwaitField::Description => Ok(FieldEdit::Description(text.to_string())),
        AwaitField::Tags => {
            let tags = parse_tags(text);
            if tags.is_empty() {
                return Err(Error::InvalidInput("no tags".to_string()));
            }
            Ok(FieldEdit::Tags(tags))
        }
        AwaitField::Link => extract_username(text)
            .map(|name| FieldEdit::Link(public_link(&name)))
            .ok_or_else(|| Error::InvalidInput(format!("not a chat link: {text:?}"))),
        AwaitField::Feedback => Err(Error::InvalidInput("feedback is not a field".to_string())),
    }
}

impl App {
    pub(super) async fn prompt_field(
        &self,
        ctx: &RequestContext,
        target: Uuid,
        scope: AwaitScope,
        field: AwaitField,
    ) -> Result<()> {
        self.conversations
            .set_await(ctx.chat_id, target, scope, field);
        self.reply(ctx.chat_id, field.prompt_key()).await
    }

    /// Apply a reply to the prompt the chat is waiting on.
    pub(super) async fn handle_awaited(
        &self,
        ctx: &RequestContext,
        entry: AwaitEntry,
        text: &str,
    ) -> Result<()> {
        self.conversations.clear(ctx.chat_id);
        let actor = ctx
            .actor()
            .ok_or_else(|| Error::InvalidInput("anonymous sender".to_string()))?;

        match entry.scope {
            AwaitScope::Enroll => {
                let current = self.owned_enrollment(entry.target, actor.id).await?;
                if current.is_submitted {
                    return Err(Error::AlreadySubmitted(current.uuid));
                }
                let edit = field_edit(entry.field, text)?;
                let e = self.workflow.edit(entry.target, edit).await?;
                self.show(
                    ctx.chat_id,
                    None,
                    &views::enrollment_detail(&e),
                    Some(views::enroll_keyboard(e.uuid)),
                )
                .await
            }
            AwaitScope::Approve => {
                let edit = field_edit(entry.field, text)?;
                let e = self.workflow.edit(entry.target, edit).await?;
                self.show(
                    ctx.chat_id,
                    None,
                    &views::approval_card(&e),
                    Some(views::approve_keyboard(e.uuid)),
                )
                .await
            }
            AwaitScope::Update => {
                self.owned_record(entry.target, actor.id).await?;
                let edit = field_edit(entry.field, text)?;
                let r = self.catalog.edit(entry.target, edit).await?;
                self.reply(ctx.chat_id, "update-success").await?;
                self.show(
                    ctx.chat_id,
                    None,
                    &views::record_detail(&r),
                    Some(views::update_keyboard(r.uuid)),
                )
                .await
            }
            AwaitScope::Feedback => {
                self.catalog.feedback(entry.target, &actor, text.trim()).await?;
                self.reply(ctx.chat_id, "feedback-received").await
            }
        }
    }

    pub(super) async fn owned_record(&self, uuid: Uuid, user: UserId) -> Result<Record> {
        match self.catalog.get(uuid).await? {
            Some(r) if r.created_by == user => Ok(r),
            _ => Err(Error::NotFound(format!("record {uuid}"))),
        }
    }

    /// Moderator decision from an approval card.
    ///
    /// A pass materializes the Record under the enrollment's uuid and retires
    /// the enrollment. The card loses its buttons: right away on a pass,
    /// after the configured delay on a rejection.
    pub(super) async fn decide(&self, ctx: &RequestContext, uuid: Uuid, passed: bool) -> Result<()> {
        let moderator = ctx
            .actor()
            .ok_or_else(|| Error::InvalidInput("anonymous moderator".to_string()))?;
        let enrollment = self.workflow.approve(uuid, &moderator, passed).await?;

        if passed {
            let record = Record::from_enrollment(&enrollment, Utc::now());
            self.catalog.publish(record).await?;
            self.workflow.retire(uuid).await?;
            info!(uuid = %uuid, "Enrollment materialized as record");
        }

        let Some(card) = ctx.message_ref() else {
            return Ok(());
        };
        if passed {
            if let Err(e) = self.gateway.clear_keyboard(card).await {
                warn!(uuid = %uuid, error = %e, "Failed to clear approval card keyboard");
            }
        } else {
            let gateway = self.gateway.clone();
            let delay = self.cfg.auto_delete_msg_cycle;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = gateway.clear_keyboard(card).await {
                    warn!(error = %e, "Failed to clear approval card keyboard");
                }
            });
        }
        Ok(())
    }

    /// Edit a card in place to offer the classification picker.
    pub(super) async fn show_classification_picker(
        &self,
        ctx: &RequestContext,
        scope: &str,
        uuid: Uuid,
        html: &str,
    ) -> Result<()> {
        let keyboard = views::classification_keyboard(scope, uuid, &self.cfg.classifications);
        match ctx.message_ref() {
            Some(msg) => self.gateway.edit_message(msg, html, Some(keyboard)).await,
            None => {
                self.gateway
                    .send_message(ctx.chat_id, html, Some(Markup::Inline(keyboard)))
                    .await?;
                Ok(())
            }
        }
    }

    /// Validate a classification picked from a keyboard.
    pub(super) fn known_classification(&self, name: &str) -> Result<String> {
        self.listing
            .classification_for(name)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidInput(format!("unknown classification {name:?}")))
    }
}
