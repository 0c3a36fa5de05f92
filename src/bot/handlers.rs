use super::api::MirrorApi;
use super::content::{ChannelPost, EditedContent, EditedPost, MediaItem, PinNotification, PostKind};
use super::media_group::MediaGroupAggregator;
use super::{BotIdentity, MirrorError};
use crate::config::Settings;
use crate::storage::MirrorMap;
use std::sync::Arc;
use teloxide::types::ChatId;
use tracing::{debug, info};

/// Everything a handler needs, shared across dispatcher tasks
pub struct MirrorContext {
    api: Arc<dyn MirrorApi>,
    store: Arc<MirrorMap>,
    aggregator: MediaGroupAggregator,
    identity: BotIdentity,
    source: ChatId,
    destination: ChatId,
}

impl MirrorContext {
    /// Wires handlers to `api` and `store` using the chats and album window from `settings`
    #[must_use]
    pub fn new(
        api: Arc<dyn MirrorApi>,
        store: Arc<MirrorMap>,
        identity: BotIdentity,
        settings: &Settings,
    ) -> Self {
        let aggregator = MediaGroupAggregator::new(
            api.clone(),
            store.clone(),
            settings.destination_group(),
            settings.media_group_window(),
        );
        Self {
            api,
            store,
            aggregator,
            identity,
            source: settings.source_channel(),
            destination: settings.destination_group(),
        }
    }

    /// Channel whose posts are mirrored
    #[must_use]
    pub const fn source(&self) -> ChatId {
        self.source
    }

    /// Group receiving the mirrored posts
    #[must_use]
    pub const fn destination(&self) -> ChatId {
        self.destination
    }

    /// Mirror map shared by all handlers
    #[must_use]
    pub fn store(&self) -> &MirrorMap {
        &self.store
    }

    /// Album collector shared by all handlers
    #[must_use]
    pub const fn aggregator(&self) -> &MediaGroupAggregator {
        &self.aggregator
    }
}

/// Mirrors a new channel post.
///
/// Album items are handed to the aggregator; anything else is copied,
/// recorded and pinned right away.
///
/// # Errors
///
/// Returns an error if an album item has no supported attachment or a
/// Telegram call or the map write fails.
pub async fn mirror_post(ctx: &MirrorContext, post: ChannelPost) -> Result<(), MirrorError> {
    match post.kind {
        PostKind::Grouped { group_id, media } => {
            let media = media.ok_or(MirrorError::UnsupportedContent(post.id))?;
            ctx.aggregator
                .on_item(
                    group_id,
                    MediaItem {
                        media,
                        source_id: post.id,
                    },
                )
                .await;
        }
        PostKind::Single => {
            let copy = ctx
                .api
                .copy_post(ctx.source, post.id, ctx.destination)
                .await?;
            ctx.store.record(post.id, copy).await?;
            ctx.api.pin(ctx.destination, copy).await?;
            info!("Mirrored post {} as {}", post.id.0, copy.0);
        }
    }
    Ok(())
}

/// Replays an edit of a channel post onto its mirrored message.
///
/// # Errors
///
/// Returns [`MirrorError::NotMirrored`] without touching Telegram if the
/// post was never mirrored, [`MirrorError::UnsupportedContent`] if the post
/// holds nothing replayable, or the Telegram error of the edit call.
pub async fn propagate_edit(ctx: &MirrorContext, post: EditedPost) -> Result<(), MirrorError> {
    let target = ctx
        .store
        .lookup(post.id)
        .await
        .ok_or(MirrorError::NotMirrored(post.id))?;
    let content = post.content.ok_or(MirrorError::UnsupportedContent(post.id))?;

    match content {
        EditedContent::Text { html } => ctx.api.edit_text(ctx.destination, target, html).await?,
        EditedContent::LiveLocation(location) => {
            ctx.api
                .edit_live_location(ctx.destination, target, location)
                .await?;
        }
        EditedContent::Media(media) => ctx.api.edit_media(ctx.destination, target, media).await?,
    }

    info!("Propagated edit of post {} to {}", post.id.0, target.0);
    Ok(())
}

/// Deletes a pin notification if the bot itself pinned the message.
///
/// Returns whether the notification was deleted.
///
/// # Errors
///
/// Returns the Telegram error if the deletion fails.
pub async fn suppress_pin_notification(
    ctx: &MirrorContext,
    notification: PinNotification,
) -> Result<bool, MirrorError> {
    if notification.actor != Some(ctx.identity.0) {
        debug!(
            "Keeping pin notification {} from {:?}",
            notification.id.0, notification.actor
        );
        return Ok(false);
    }

    ctx.api.delete(ctx.destination, notification.id).await?;
    debug!("Deleted pin notification {}", notification.id.0);
    Ok(true)
}
