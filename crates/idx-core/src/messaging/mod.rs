//! Chat transport abstractions. Telegram implements them in `idx-telegram`.

pub mod port;
pub mod throttled;
pub mod types;
