//! Outbound Telegram operations used by the mirror.
//!
//! Handlers talk to Telegram only through [`MirrorApi`], which production
//! code implements over a `teloxide::Bot` and tests replace with a mock.

use super::content::{LiveLocation, Media, MediaKind};
use super::resilient::retry_transient;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InputFile, InputMedia, InputMediaAudio, InputMediaDocument, InputMediaPhoto,
    InputMediaVideo, MessageId, ParseMode,
};
use teloxide::RequestError;

/// Interface for the Telegram calls the mirror issues
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MirrorApi: Send + Sync {
    /// Copy a message verbatim into another chat, returning the copy's id
    async fn copy_post(
        &self,
        from: ChatId,
        message_id: MessageId,
        to: ChatId,
    ) -> Result<MessageId, RequestError>;

    /// Send an ordered album; the returned ids follow the request order
    async fn send_album(
        &self,
        chat_id: ChatId,
        media: Vec<Media>,
    ) -> Result<Vec<MessageId>, RequestError>;

    /// Pin a message without notifying members
    async fn pin(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), RequestError>;

    /// Replace a message's text with HTML-formatted `html`
    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        html: String,
    ) -> Result<(), RequestError>;

    /// Move a live location
    async fn edit_live_location(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        location: LiveLocation,
    ) -> Result<(), RequestError>;

    /// Replace a message's attachment and caption
    async fn edit_media(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        media: Media,
    ) -> Result<(), RequestError>;

    /// Delete a message
    async fn delete(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), RequestError>;
}

/// [`MirrorApi`] backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramMirrorApi {
    bot: Bot,
    max_retries: usize,
}

impl TelegramMirrorApi {
    /// Wraps `bot`; transient failures are retried up to `max_retries` times
    #[must_use]
    pub const fn new(bot: Bot, max_retries: usize) -> Self {
        Self { bot, max_retries }
    }
}

/// Builds the Bot API payload for `media`, captions parsed as HTML
fn input_media(media: Media) -> InputMedia {
    let file = InputFile::file_id(media.file);
    match media.kind {
        MediaKind::Photo => {
            let mut m = InputMediaPhoto::new(file).parse_mode(ParseMode::Html);
            if let Some(caption) = media.caption {
                m = m.caption(caption);
            }
            InputMedia::Photo(m)
        }
        MediaKind::Video => {
            let mut m = InputMediaVideo::new(file).parse_mode(ParseMode::Html);
            if let Some(caption) = media.caption {
                m = m.caption(caption);
            }
            InputMedia::Video(m)
        }
        MediaKind::Audio => {
            let mut m = InputMediaAudio::new(file).parse_mode(ParseMode::Html);
            if let Some(caption) = media.caption {
                m = m.caption(caption);
            }
            InputMedia::Audio(m)
        }
        MediaKind::Document => {
            let mut m = InputMediaDocument::new(file).parse_mode(ParseMode::Html);
            if let Some(caption) = media.caption {
                m = m.caption(caption);
            }
            InputMedia::Document(m)
        }
    }
}

#[async_trait]
impl MirrorApi for TelegramMirrorApi {
    async fn copy_post(
        &self,
        from: ChatId,
        message_id: MessageId,
        to: ChatId,
    ) -> Result<MessageId, RequestError> {
        retry_transient(self.max_retries, || async {
            self.bot
                .copy_message(to, from, message_id)
                .disable_notification(true)
                .await
        })
        .await
    }

    async fn send_album(
        &self,
        chat_id: ChatId,
        media: Vec<Media>,
    ) -> Result<Vec<MessageId>, RequestError> {
        let sent = retry_transient(self.max_retries, || {
            let album: Vec<InputMedia> = media.iter().cloned().map(input_media).collect();
            async move {
                self.bot
                    .send_media_group(chat_id, album)
                    .disable_notification(true)
                    .await
            }
        })
        .await?;

        Ok(sent.into_iter().map(|msg| msg.id).collect())
    }

    async fn pin(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), RequestError> {
        retry_transient(self.max_retries, || async {
            self.bot
                .pin_chat_message(chat_id, message_id)
                .disable_notification(true)
                .await
        })
        .await?;
        Ok(())
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        html: String,
    ) -> Result<(), RequestError> {
        retry_transient(self.max_retries, || async {
            self.bot
                .edit_message_text(chat_id, message_id, html.clone())
                .parse_mode(ParseMode::Html)
                .await
        })
        .await?;
        Ok(())
    }

    async fn edit_live_location(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        location: LiveLocation,
    ) -> Result<(), RequestError> {
        retry_transient(self.max_retries, || async {
            let mut req = self.bot.edit_message_live_location(
                chat_id,
                message_id,
                location.latitude,
                location.longitude,
            );
            if let Some(accuracy) = location.horizontal_accuracy {
                req = req.horizontal_accuracy(accuracy);
            }
            if let Some(period) = location.live_period {
                req = req.live_period(period);
            }
            if let Some(heading) = location.heading {
                req = req.heading(heading);
            }
            if let Some(radius) = location.proximity_alert_radius {
                req = req.proximity_alert_radius(radius);
            }
            req.await
        })
        .await?;
        Ok(())
    }

    async fn edit_media(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        media: Media,
    ) -> Result<(), RequestError> {
        retry_transient(self.max_retries, || {
            let payload = input_media(media.clone());
            async move {
                self.bot
                    .edit_message_media(chat_id, message_id, payload)
                    .await
            }
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), RequestError> {
        retry_transient(self.max_retries, || async {
            self.bot.delete_message(chat_id, message_id).await
        })
        .await?;
        Ok(())
    }
}
