/// Outbound Telegram calls used by the mirror
pub mod api;
/// Conversion of Telegram messages into mirrorable content
pub mod content;
/// Channel post, edit and pin notification handlers
pub mod handlers;
/// Album collection and batched sending
pub mod media_group;
/// Bounded retry for transient Telegram failures
pub mod resilient;

pub use api::{MirrorApi, TelegramMirrorApi};
pub use handlers::MirrorContext;
pub use media_group::MediaGroupAggregator;

use crate::storage::StorageError;
use teloxide::types::{MessageId, UserId};
use thiserror::Error;

/// Errors raised while mirroring a channel event
#[derive(Error, Debug)]
pub enum MirrorError {
    /// An edit arrived for a post that was never mirrored
    #[error("source post {0:?} has no mirrored message")]
    NotMirrored(MessageId),
    /// The post carries content that cannot be mirrored
    #[error("source post {0:?} has unsupported content")]
    UnsupportedContent(MessageId),
    /// Telegram rejected or failed the request
    #[error("Telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
    /// The mirror map could not be persisted
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The bot's own user id, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotIdentity(pub UserId);
