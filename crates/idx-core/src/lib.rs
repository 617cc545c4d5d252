//! Core domain + application logic for the chat directory bot.
//!
//! This crate is framework-agnostic. Telegram and the on-disk index live
//! behind ports (traits) implemented in adapter crates.

pub mod app;
pub mod ban;
pub mod bulletin;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod events;
pub mod formatting;
pub mod listing;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod moderation;
pub mod ports;
pub mod replies;
pub mod request;
pub mod search_cache;
pub mod views;
pub mod workflow;

#[cfg(test)]
pub mod testing;

pub use errors::{Error, Result};
