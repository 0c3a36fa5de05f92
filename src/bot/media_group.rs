//! Album collection.
//!
//! Telegram delivers every item of an album as its own update, sharing a
//! media group id. Items are collected per group and re-sent as one album
//! once a fixed window has elapsed since the group's FIRST item. Later
//! items do not extend the window; an item arriving after the flush opens
//! a new batch of its own.

use super::api::MirrorApi;
use super::content::MediaItem;
use super::MirrorError;
use crate::storage::MirrorMap;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::ChatId;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Collects album items and flushes each group as a single batched send
#[derive(Clone)]
pub struct MediaGroupAggregator {
    api: Arc<dyn MirrorApi>,
    store: Arc<MirrorMap>,
    destination: ChatId,
    window: Duration,
    pending: Arc<Mutex<HashMap<String, Vec<MediaItem>>>>,
    timers: TaskTracker,
}

impl MediaGroupAggregator {
    /// Creates an aggregator sending albums to `destination`
    #[must_use]
    pub fn new(
        api: Arc<dyn MirrorApi>,
        store: Arc<MirrorMap>,
        destination: ChatId,
        window: Duration,
    ) -> Self {
        Self {
            api,
            store,
            destination,
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timers: TaskTracker::new(),
        }
    }

    /// Adds `item` to its group's batch.
    ///
    /// The first item of a group schedules the flush; the call itself
    /// returns without waiting for it.
    pub async fn on_item(&self, group_id: String, item: MediaItem) {
        let group_id = {
            let mut pending = self.pending.lock().await;
            match pending.entry(group_id) {
                Entry::Occupied(mut batch) => {
                    batch.get_mut().push(item);
                    debug!(
                        "Album {} now holds {} items",
                        batch.key(),
                        batch.get().len()
                    );
                    return;
                }
                Entry::Vacant(slot) => {
                    let group_id = slot.key().clone();
                    slot.insert(vec![item]);
                    group_id
                }
            }
        };

        debug!("Collecting album {} for {:?}", group_id, self.window);
        let this = self.clone();
        self.timers.spawn(async move {
            tokio::time::sleep(this.window).await;
            if let Err(e) = this.flush(&group_id).await {
                error!("Failed to mirror album {}: {}", group_id, e);
            }
        });
    }

    /// Sends the batch collected for `group_id` as one album.
    ///
    /// Unknown, already flushed and empty groups are a no-op. The batch is
    /// removed before sending, so a failed send loses it.
    ///
    /// # Errors
    ///
    /// Returns an error if the album cannot be sent, the last message cannot
    /// be pinned or the mapping cannot be persisted. A persistence failure is
    /// reported only after the pin; the mapping stays in memory.
    pub async fn flush(&self, group_id: &str) -> Result<(), MirrorError> {
        let Some(batch) = self.pending.lock().await.remove(group_id) else {
            debug!("Album {} already flushed", group_id);
            return Ok(());
        };
        if batch.is_empty() {
            return Ok(());
        }

        let media = batch.iter().map(|item| item.media.clone()).collect();
        let sent = self.api.send_album(self.destination, media).await?;

        if sent.len() != batch.len() {
            warn!(
                "Album {}: sent {} items but got {} messages back",
                group_id,
                batch.len(),
                sent.len()
            );
        }

        let pairs: Vec<_> = batch
            .iter()
            .map(|item| item.source_id)
            .zip(sent.iter().copied())
            .collect();
        // The album is already posted; pin it even if the map write failed
        let recorded = self.store.record_all(&pairs).await;

        if let Some(last) = sent.last() {
            self.api.pin(self.destination, *last).await?;
        }
        recorded?;

        info!("Mirrored album {} ({} items)", group_id, sent.len());
        Ok(())
    }

    /// Number of albums still collecting
    pub async fn pending_groups(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Waits until every scheduled flush has run
    pub async fn shutdown(&self) {
        self.timers.close();
        self.timers.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::api::MockMirrorApi;
    use crate::bot::content::{Media, MediaKind};
    use crate::storage::StorageError;
    use mockall::predicate::eq;
    use teloxide::types::{FileId, MessageId};

    const GROUP: ChatId = ChatId(-1002);

    fn item(source: i32) -> MediaItem {
        MediaItem {
            media: Media {
                kind: MediaKind::Photo,
                file: FileId(format!("file-{source}")),
                caption: Some(format!("caption {source}")),
            },
            source_id: MessageId(source),
        }
    }

    fn aggregator(api: MockMirrorApi, store: Arc<MirrorMap>) -> MediaGroupAggregator {
        MediaGroupAggregator::new(Arc::new(api), store, GROUP, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_flush_unknown_group_is_noop() -> Result<(), MirrorError> {
        let mut api = MockMirrorApi::new();
        api.expect_send_album().never();
        api.expect_pin().never();

        let aggregator = aggregator(api, Arc::new(MirrorMap::in_memory()));
        aggregator.flush("missing").await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_album_flushes_once_in_order() -> Result<(), MirrorError> {
        let mut api = MockMirrorApi::new();
        api.expect_send_album()
            .withf(|chat, media| {
                *chat == GROUP
                    && media
                        .iter()
                        .map(|m| m.file.0.as_str())
                        .eq(["file-1", "file-2", "file-3"])
            })
            .times(1)
            .returning(|_, _| Ok(vec![MessageId(101), MessageId(102), MessageId(103)]));
        api.expect_pin()
            .with(eq(GROUP), eq(MessageId(103)))
            .times(1)
            .returning(|_, _| Ok(()));

        let store = Arc::new(MirrorMap::in_memory());
        let aggregator = aggregator(api, store.clone());

        for source in 1..=3 {
            aggregator.on_item("g1".to_string(), item(source)).await;
        }
        assert_eq!(aggregator.pending_groups().await, 1);

        aggregator.shutdown().await;

        assert_eq!(aggregator.pending_groups().await, 0);
        assert_eq!(store.lookup(MessageId(1)).await, Some(MessageId(101)));
        assert_eq!(store.lookup(MessageId(2)).await, Some(MessageId(102)));
        assert_eq!(store.lookup(MessageId(3)).await, Some(MessageId(103)));

        // The timer already flushed the group
        aggregator.flush("g1").await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_groups_are_independent() {
        let mut api = MockMirrorApi::new();
        api.expect_send_album()
            .times(2)
            .returning(|_, media| {
                let base = if media[0].file.0 == "file-1" { 100 } else { 200 };
                Ok(vec![MessageId(base)])
            });
        api.expect_pin().times(2).returning(|_, _| Ok(()));

        let store = Arc::new(MirrorMap::in_memory());
        let aggregator = aggregator(api, store.clone());

        aggregator.on_item("a".to_string(), item(1)).await;
        aggregator.on_item("b".to_string(), item(2)).await;
        assert_eq!(aggregator.pending_groups().await, 2);

        aggregator.shutdown().await;

        assert_eq!(store.lookup(MessageId(1)).await, Some(MessageId(100)));
        assert_eq!(store.lookup(MessageId(2)).await, Some(MessageId(200)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_drops_batch() {
        let mut api = MockMirrorApi::new();
        api.expect_send_album().times(1).returning(|_, _| {
            Err(teloxide::RequestError::Api(teloxide::ApiError::Unknown(
                "Too Many Requests".to_string(),
            )))
        });
        api.expect_pin().never();

        let store = Arc::new(MirrorMap::in_memory());
        let aggregator = aggregator(api, store.clone());

        aggregator.on_item("g1".to_string(), item(1)).await;
        aggregator.shutdown().await;

        assert_eq!(aggregator.pending_groups().await, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_persist_failure_still_pins_and_keeps_mapping() -> Result<(), StorageError> {
        let mut api = MockMirrorApi::new();
        api.expect_send_album()
            .times(1)
            .returning(|_, _| Ok(vec![MessageId(101), MessageId(102)]));
        api.expect_pin()
            .with(eq(GROUP), eq(MessageId(102)))
            .times(1)
            .returning(|_, _| Ok(()));

        let dir = tempfile::tempdir()?;
        // Parent directory does not exist, so the map can never be written
        let store = Arc::new(
            MirrorMap::load(dir.path().join("missing").join("persistence.json")).await?,
        );
        let aggregator = aggregator(api, store.clone());

        aggregator.on_item("g1".to_string(), item(1)).await;
        aggregator.on_item("g1".to_string(), item(2)).await;
        let result = aggregator.flush("g1").await;

        assert!(matches!(result, Err(MirrorError::Storage(_))));
        assert_eq!(store.lookup(MessageId(1)).await, Some(MessageId(101)));
        assert_eq!(store.lookup(MessageId(2)).await, Some(MessageId(102)));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_response_records_prefix() {
        let mut api = MockMirrorApi::new();
        api.expect_send_album()
            .times(1)
            .returning(|_, _| Ok(vec![MessageId(101)]));
        api.expect_pin()
            .with(eq(GROUP), eq(MessageId(101)))
            .times(1)
            .returning(|_, _| Ok(()));

        let store = Arc::new(MirrorMap::in_memory());
        let aggregator = aggregator(api, store.clone());

        aggregator.on_item("g1".to_string(), item(1)).await;
        aggregator.on_item("g1".to_string(), item(2)).await;
        aggregator.shutdown().await;

        assert_eq!(store.lookup(MessageId(1)).await, Some(MessageId(101)));
        assert_eq!(store.lookup(MessageId(2)).await, None);
    }
}
