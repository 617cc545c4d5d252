//! Public groups: only commands addressed to this bot are answered.

use tracing::info;

use super::{parse_command, parse_page, App, Command};
use crate::{
    domain::{ChatId, ChatLookup},
    request::RequestContext,
    views, Error, Result,
};

impl App {
    pub(super) async fn handle_group(&self, ctx: &RequestContext) -> Result<()> {
        if let Some(data) = ctx.callback().and_then(|c| c.data.clone()) {
            let cb = views::parse_callback(&data)
                .ok_or_else(|| Error::InvalidInput(format!("callback {data:?}")))?;
            return match cb.scope {
                "page" => {
                    let page = parse_page(cb.target)?;
                    self.show_search(ctx.chat_id, ctx.message_ref(), cb.action, page)
                        .await
                }
                other => Err(Error::InvalidInput(format!("group callback {other:?}"))),
            };
        }

        let Some(cmd) = ctx.text().and_then(parse_command) else {
            return Ok(());
        };
        if !self.is_for_me(&cmd) {
            return Ok(());
        }
        self.group_command(ctx, cmd).await
    }

    async fn group_command(&self, ctx: &RequestContext, cmd: Command<'_>) -> Result<()> {
        match cmd.name.as_str() {
            "enroll" => self.enroll_group(ctx).await,
            "list" if cmd.args.is_empty() => self.reply(ctx.chat_id, "list-parameter").await,
            "list" => self.show_search(ctx.chat_id, None, cmd.args, 1).await,
            "mine" | "start" | "help" | "cancel" => self.reply(ctx.chat_id, "only-private").await,
            _ => self.reply(ctx.chat_id, "can-not-understand").await,
        }
    }

    /// `/enroll@bot` in a group drafts the group itself; the card goes to
    /// the sender's private chat.
    async fn enroll_group(&self, ctx: &RequestContext) -> Result<()> {
        let owner = ctx
            .actor()
            .ok_or_else(|| Error::InvalidInput("anonymous sender".to_string()))?;
        let profile = self
            .gateway
            .resolve_chat(&ChatLookup::Id(ctx.chat_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", ctx.chat_id)))?;
        let e = self.workflow.draft(profile, &owner).await?;
        info!(uuid = %e.uuid, chat_id = ctx.chat_id.0, "Draft opened from group");

        self.show(
            ChatId::from(owner.id),
            None,
            &views::enrollment_detail(&e),
            Some(views::enroll_keyboard(e.uuid)),
        )
        .await?;
        self.reply(ctx.chat_id, "enroll-group-private").await
    }
}
