use std::sync::Arc;

use idx_core::{ban::BanRegistry, config::Config, replies::ReplyCatalog};
use idx_store::{SledBanStore, SledIndex};
use idx_telegram::router::Services;

#[tokio::main]
async fn main() -> Result<(), idx_core::Error> {
    idx_core::logging::init("idx")?;

    let cfg = Arc::new(Config::load()?);

    let db = idx_store::open(&cfg.data_dir)?;
    let index = Arc::new(SledIndex::new(&db)?);
    let bans = Arc::new(BanRegistry::open(Arc::new(SledBanStore::new(&db)?))?);
    let replies = Arc::new(ReplyCatalog::load(cfg.reply_file.as_deref())?);

    idx_telegram::router::run_polling(
        cfg,
        Services {
            index,
            bans,
            replies,
        },
    )
    .await
    .map_err(|e| idx_core::Error::External(format!("telegram bot failed: {e}")))?;

    db.flush_async()
        .await
        .map_err(|e| idx_core::Error::IndexUnavailable(e.to_string()))?;
    Ok(())
}
