//! Extraction of mirrorable content from Telegram messages.
//!
//! Handlers never look at raw [`Message`]s; they work on the small set of
//! values defined here, which keeps them testable without the Bot API.

use teloxide::types::{
    FileId, LivePeriod, Location, Message, MessageEntity, MessageId, UserId,
};
use teloxide::utils::render::Renderer;

/// Media kinds that may appear inside an album
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Audio track
    Audio,
    /// Generic file
    Document,
    /// Photo
    Photo,
    /// Video
    Video,
}

/// An already uploaded file plus its HTML caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    /// How the file should be presented
    pub kind: MediaKind,
    /// Telegram file reference, reusable without re-uploading
    pub file: FileId,
    /// Caption rendered as Telegram HTML
    pub caption: Option<String>,
}

/// One album item waiting to be mirrored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Content to send
    pub media: Media,
    /// Channel post the item came from
    pub source_id: MessageId,
}

/// Live location payload replayed onto the mirrored message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveLocation {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Uncertainty radius in meters
    pub horizontal_accuracy: Option<f64>,
    /// How long the location stays updatable
    pub live_period: Option<LivePeriod>,
    /// Direction of movement in degrees
    pub heading: Option<u16>,
    /// Alert distance in meters
    pub proximity_alert_radius: Option<u32>,
}

impl From<&Location> for LiveLocation {
    fn from(location: &Location) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            horizontal_accuracy: location.horizontal_accuracy,
            live_period: location.live_period,
            heading: location.heading,
            proximity_alert_radius: location.proximity_alert_radius,
        }
    }
}

/// A new post in the source channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPost {
    /// Post id in the source channel
    pub id: MessageId,
    /// Whether the post is standalone or part of an album
    pub kind: PostKind,
}

/// Shape of a new channel post
#[derive(Debug, Clone, PartialEq)]
pub enum PostKind {
    /// Copied as-is
    Single,
    /// Part of an album; `media` is `None` when the item has no album-capable attachment
    Grouped {
        /// Identifier shared by all items of the album
        group_id: String,
        /// The item's attachment
        media: Option<Media>,
    },
}

impl ChannelPost {
    /// Classifies a channel post message
    #[must_use]
    pub fn from_message(msg: &Message) -> Self {
        let kind = match msg.media_group_id() {
            Some(group) => PostKind::Grouped {
                group_id: group.0.clone(),
                media: album_media(msg),
            },
            None => PostKind::Single,
        };
        Self { id: msg.id, kind }
    }
}

/// New content of an edited channel post
#[derive(Debug, Clone, PartialEq)]
pub enum EditedContent {
    /// Text message, rendered as HTML
    Text {
        /// Rendered text
        html: String,
    },
    /// Live location update
    LiveLocation(LiveLocation),
    /// Replaced attachment
    Media(Media),
}

/// An edited post in the source channel
#[derive(Debug, Clone, PartialEq)]
pub struct EditedPost {
    /// Post id in the source channel
    pub id: MessageId,
    /// `None` when the post holds nothing that can be replayed
    pub content: Option<EditedContent>,
}

impl EditedPost {
    /// Extracts the replayable content of an edited message.
    ///
    /// Text wins over location, location over attachments. Photos and
    /// videos keep their kind; animations, documents, audio, voice notes,
    /// stickers and video notes are sent as a document.
    #[must_use]
    pub fn from_message(msg: &Message) -> Self {
        Self {
            id: msg.id,
            content: edited_content(msg),
        }
    }
}

/// A "message pinned" service message in the destination group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinNotification {
    /// Id of the service message itself
    pub id: MessageId,
    /// Who pinned the message
    pub actor: Option<UserId>,
}

impl PinNotification {
    /// Returns the notification if `msg` is a pin service message
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        msg.pinned_message()?;
        Some(Self {
            id: msg.id,
            actor: msg.from.as_ref().map(|user| user.id),
        })
    }
}

fn render_html(text: &str, entities: Option<&[MessageEntity]>) -> String {
    Renderer::new(text, entities.unwrap_or_default()).as_html()
}

fn caption_html(msg: &Message) -> Option<String> {
    msg.caption()
        .map(|caption| render_html(caption, msg.caption_entities()))
}

fn album_media(msg: &Message) -> Option<Media> {
    let (kind, file) = if let Some(sizes) = msg.photo() {
        // Sizes are ordered smallest first
        (MediaKind::Photo, sizes.last()?.file.id.clone())
    } else if let Some(video) = msg.video() {
        (MediaKind::Video, video.file.id.clone())
    } else if let Some(audio) = msg.audio() {
        (MediaKind::Audio, audio.file.id.clone())
    } else if let Some(document) = msg.document() {
        (MediaKind::Document, document.file.id.clone())
    } else {
        return None;
    };

    Some(Media {
        kind,
        file,
        caption: caption_html(msg),
    })
}

fn edited_content(msg: &Message) -> Option<EditedContent> {
    if let Some(text) = msg.text() {
        return Some(EditedContent::Text {
            html: render_html(text, msg.entities()),
        });
    }
    if let Some(location) = msg.location() {
        return Some(EditedContent::LiveLocation(location.into()));
    }

    let (kind, file) = if let Some(sizes) = msg.photo() {
        (MediaKind::Photo, sizes.last()?.file.id.clone())
    } else if let Some(video) = msg.video() {
        (MediaKind::Video, video.file.id.clone())
    } else {
        (MediaKind::Document, other_attachment(msg)?)
    };

    Some(EditedContent::Media(Media {
        kind,
        file,
        caption: caption_html(msg),
    }))
}

/// Any attachment without a dedicated edit kind, replayed as a document
fn other_attachment(msg: &Message) -> Option<FileId> {
    msg.animation()
        .map(|a| a.file.id.clone())
        .or_else(|| msg.document().map(|d| d.file.id.clone()))
        .or_else(|| msg.audio().map(|a| a.file.id.clone()))
        .or_else(|| msg.voice().map(|v| v.file.id.clone()))
        .or_else(|| msg.sticker().map(|s| s.file.id.clone()))
        .or_else(|| msg.video_note().map(|v| v.file.id.clone()))
}
