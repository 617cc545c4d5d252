//! Application layer: interprets classified requests.
//!
//! Every inbound update runs on its own tokio task. Rule violations are
//! answered with a reply; anything else is logged, reported to the operator
//! and answered with the generic error reply.

use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    ban::BanRegistry,
    bulletin::BulletinPublisher,
    catalog::RecordCatalog,
    config::Config,
    conversation::ConversationState,
    domain::{ChatId, Enrollment, MessageRef, UserId},
    events::EventBus,
    listing::ListingService,
    messaging::{
        port::ChatGateway,
        types::{ChatAction, InlineKeyboard, InboundUpdate, Markup},
    },
    moderation::ModerationConsole,
    ports::SearchIndex,
    replies::ReplyCatalog,
    request::{Request, RequestContext, RequestRouter},
    search_cache::SearchResultCache,
    views,
    workflow::SubmissionWorkflow,
    Error, Result,
};

mod editing;
mod group;
mod moderator;
mod private;

/// A slash command: `/name@bot args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: String,
    pub bot: Option<&'a str>,
    pub args: &'a str,
}

pub fn parse_command(text: &str) -> Option<Command<'_>> {
    let text = text.trim();
    let body = text.strip_prefix('/')?;
    let (head, args) = match body.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (body, ""),
    };
    let (name, bot) = match head.split_once('@') {
        Some((name, bot)) => (name, Some(bot)),
        None => (head, None),
    };
    if name.is_empty() {
        return None;
    }
    Some(Command {
        name: name.to_lowercase(),
        bot,
        args,
    })
}

/// Everything the application needs from the outside world.
pub struct AppDeps {
    pub cfg: Arc<Config>,
    pub bot_username: String,
    pub gateway: Arc<dyn ChatGateway>,
    pub index: Arc<dyn SearchIndex>,
    pub bans: Arc<BanRegistry>,
    pub replies: Arc<ReplyCatalog>,
    pub bus: Arc<EventBus>,
}

pub struct App {
    cfg: Arc<Config>,
    bot_username: String,
    gateway: Arc<dyn ChatGateway>,
    router: RequestRouter,
    bans: Arc<BanRegistry>,
    conversations: ConversationState,
    workflow: Arc<SubmissionWorkflow>,
    catalog: Arc<RecordCatalog>,
    listing: ListingService,
    replies: Arc<ReplyCatalog>,
}

impl App {
    /// Wire the components and register the event subscribers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(deps: AppDeps) -> Arc<Self> {
        let AppDeps {
            cfg,
            bot_username,
            gateway,
            index,
            bans,
            replies,
            bus,
        } = deps;

        let workflow = Arc::new(SubmissionWorkflow::new(index.clone(), bus.clone()));
        let catalog = Arc::new(RecordCatalog::new(index.clone(), bus.clone()));
        let listing = ListingService::new(
            index,
            SearchResultCache::new(cfg.cache_capacity, cfg.cache_ttl),
            cfg.classifications.clone(),
            cfg.page_size,
        );

        bus.subscribe(Arc::new(ModerationConsole::new(
            gateway.clone(),
            replies.clone(),
            cfg.approve_group_id,
        )));
        bus.subscribe(Arc::new(BulletinPublisher::new(
            gateway.clone(),
            catalog.clone(),
            replies.clone(),
            cfg.bulletin_channel_id,
        )));

        Arc::new(Self {
            router: RequestRouter::new(bans.clone(), cfg.approve_group_id),
            conversations: ConversationState::new(cfg.await_ttl),
            cfg,
            bot_username,
            gateway,
            bans,
            workflow,
            catalog,
            listing,
            replies,
        })
    }

    /// Handle one inbound update end to end. Never fails and never panics
    /// into the caller.
    pub async fn handle_update(self: Arc<Self>, update: InboundUpdate) {
        let Some(request) = self.router.classify(update) else {
            return;
        };

        let app = Arc::clone(&self);
        let task_request = request.clone();
        let outcome = tokio::spawn(async move { app.dispatch(&task_request).await }).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(request.context(), &e.to_string()).await,
            Err(e) => self.report(request.context(), &format!("task panicked: {e}")).await,
        }
    }

    async fn dispatch(&self, request: &Request) -> Result<()> {
        let ctx = request.context();
        if let Some(cb) = ctx.callback() {
            self.gateway.answer_callback(&cb.id, None).await?;
        }

        let result = match request {
            Request::Private(ctx) => self.handle_private(ctx).await,
            Request::Group(ctx) => self.handle_group(ctx).await,
            Request::Moderator(ctx) => self.handle_moderator(ctx).await,
        };
        match result {
            Err(e) if e.is_rule_violation() => {
                tracing::debug!(chat_id = ctx.chat_id.0, error = %e, "Request rejected");
                self.reply(ctx.chat_id, e.reply_key()).await
            }
            other => other,
        }
    }

    async fn report(&self, ctx: &RequestContext, detail: &str) {
        error!(chat_id = ctx.chat_id.0, error = detail, "Request failed");

        let text = self.replies.render(
            "operator-error",
            &[("chat", &ctx.chat_id.to_string()), ("error", detail)],
        );
        let html = crate::formatting::escape_html(&text);
        if let Err(e) = self
            .gateway
            .send_message(ChatId::from(self.cfg.creator), &html, None)
            .await
        {
            warn!(error = %e, "Failed to report error to operator");
        }
        if let Err(e) = self.reply(ctx.chat_id, "error").await {
            warn!(chat_id = ctx.chat_id.0, error = %e, "Failed to send error reply");
        }
    }

    // ---- shared helpers ----

    fn is_for_me(&self, cmd: &Command<'_>) -> bool {
        cmd.bot
            .is_some_and(|b| b.eq_ignore_ascii_case(&self.bot_username))
    }

    async fn reply(&self, chat_id: ChatId, key: &str) -> Result<()> {
        self.reply_with(chat_id, key, &[]).await
    }

    async fn reply_with(&self, chat_id: ChatId, key: &str, params: &[(&str, &str)]) -> Result<()> {
        let mut all = vec![("bot", self.bot_username.as_str())];
        all.extend_from_slice(params);
        let text = crate::formatting::escape_html(&self.replies.render(key, &all));
        self.gateway.send_message(chat_id, &text, None).await?;
        Ok(())
    }

    async fn typing(&self, chat_id: ChatId) {
        let _ = self
            .gateway
            .send_chat_action(chat_id, ChatAction::Typing)
            .await;
    }

    /// Send a new message, or replace `edit` in place when given.
    async fn show(
        &self,
        chat_id: ChatId,
        edit: Option<MessageRef>,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        match edit {
            Some(msg) => self.gateway.edit_message(msg, html, keyboard).await,
            None => {
                self.gateway
                    .send_message(chat_id, html, keyboard.map(Markup::Inline))
                    .await?;
                Ok(())
            }
        }
    }

    /// Run a search and show one page of results.
    async fn show_search(
        &self,
        chat_id: ChatId,
        edit: Option<MessageRef>,
        query: &str,
        page: usize,
    ) -> Result<()> {
        let result = self.listing.search(query, page).await?;
        if result.records.is_empty() {
            return match edit {
                Some(msg) => {
                    let text = self.replies.lookup("empty");
                    self.gateway.edit_message(msg, text, None).await
                }
                None => self.reply(chat_id, "empty").await,
            };
        }
        let html = views::record_list(&result.records, &self.bot_username, result.page, result.pages);
        let query = views::callback_safe_query(&result.query).to_string();
        let keyboard = views::pager(result.page, result.pages, |p| format!("page:{query}&{p}"));
        self.show(chat_id, edit, &html, keyboard).await
    }

    async fn show_mine(
        &self,
        chat_id: ChatId,
        user: UserId,
        edit: Option<MessageRef>,
        page: usize,
    ) -> Result<()> {
        let mine = self.listing.mine(user, page).await?;
        if mine.total == 0 {
            return self.reply(chat_id, "empty").await;
        }
        let html = views::mine_list(
            &mine.records,
            &mine.enrollments,
            &self.bot_username,
            mine.page,
            mine.pages,
        );
        let keyboard = views::pager(mine.page, mine.pages, |p| format!("mine:{p}"));
        self.show(chat_id, edit, &html, keyboard).await
    }

    /// Load an enrollment the sender owns; other people's drafts look absent.
    async fn owned_enrollment(&self, uuid: Uuid, user: UserId) -> Result<Enrollment> {
        let enrollment = self.workflow.get(uuid).await?;
        if enrollment.created_by != user {
            return Err(Error::NotFound(format!("enrollment {uuid}")));
        }
        Ok(enrollment)
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| Error::InvalidInput(format!("bad id {s:?}")))
}

fn parse_page(s: &str) -> Result<usize> {
    s.trim()
        .parse::<usize>()
        .map_err(|_| Error::InvalidInput(format!("bad page {s:?}")))
}
