use std::sync::Arc;

use teloxide::{
    dispatching::Dispatcher,
    dptree,
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::info;

use idx_core::{
    app::{App, AppDeps},
    ban::BanRegistry,
    config::Config,
    events::EventBus,
    messaging::{
        port::ChatGateway,
        throttled::{ThrottleConfig, ThrottledGateway},
    },
    ports::SearchIndex,
    replies::ReplyCatalog,
};

use crate::{convert, TelegramGateway};

/// Storage and text collaborators built by the binary.
pub struct Services {
    pub index: Arc<dyn SearchIndex>,
    pub bans: Arc<BanRegistry>,
    pub replies: Arc<ReplyCatalog>,
}

async fn on_message(msg: Message, app: Arc<App>) -> ResponseResult<()> {
    app.handle_update(convert::message(&msg)).await;
    Ok(())
}

async fn on_callback(q: CallbackQuery, app: Arc<App>) -> ResponseResult<()> {
    app.handle_update(convert::callback(&q)).await;
    Ok(())
}

pub async fn run_polling(cfg: Arc<Config>, services: Services) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    let bot_username = me.username().to_string();
    info!(bot = %bot_username, "Directory bot started");

    // Throttle outbound calls to stay under Telegram's flood limits. The
    // adapter still retries a single RetryAfter.
    let raw_gateway: Arc<dyn ChatGateway> = Arc::new(TelegramGateway::new(bot.clone()));
    let gateway: Arc<dyn ChatGateway> = Arc::new(ThrottledGateway::new(
        raw_gateway,
        ThrottleConfig::default(),
    ));

    let app = App::new(AppDeps {
        cfg: cfg.clone(),
        bot_username,
        gateway,
        index: services.index,
        bans: services.bans,
        replies: services.replies,
        bus: Arc::new(EventBus::new()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(on_callback))
        .branch(Update::filter_message().endpoint(on_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .build()
        .dispatch()
        .await;

    info!("Directory bot stopped");
    Ok(())
}
