#![deny(missing_docs)]
//! Channel Mirror
//!
//! A Telegram bot that mirrors posts from a broadcast channel into a
//! discussion group: new posts and albums are copied and pinned, edits are
//! replayed onto the copies, and the bot's own pin notifications are removed.

/// Telegram handlers and outbound calls
pub mod bot;
/// Configuration management
pub mod config;
/// Persisted mirror map
pub mod storage;
