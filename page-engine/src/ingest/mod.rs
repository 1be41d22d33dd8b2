use tracing::{debug, info, info_span, warn};

use common::{error::AppError, storage::assets::DynUploader, storage::types::page::Page};

use crate::{allocator::PageNumberAllocator, notify::PageEvents, store::DynPageStore};

pub mod item;

pub use item::{
    BatchReport, FailureKind, FileItem, IngestionItem, ItemFailure, ItemReport, ItemState, LinkItem,
};

use item::{compute_next_state, ItemTransition};

/// Drives a batch of independent page-creation attempts.
///
/// Items are processed strictly one at a time: that bounds load on the
/// upload adapter, keeps progress deterministic, and isolates failures so a
/// bad item never takes the rest of the batch down with it. The batch call
/// itself only fails when the batch as a whole is malformed.
#[derive(Clone)]
pub struct BulkIngestionCoordinator {
    store: DynPageStore,
    uploader: DynUploader,
    allocator: PageNumberAllocator,
    events: PageEvents,
}

impl BulkIngestionCoordinator {
    pub fn new(
        store: DynPageStore,
        uploader: DynUploader,
        allocator: PageNumberAllocator,
        events: PageEvents,
    ) -> Self {
        Self {
            store,
            uploader,
            allocator,
            events,
        }
    }

    pub async fn ingest_batch(
        &self,
        episode_id: &str,
        items: Vec<IngestionItem>,
    ) -> Result<BatchReport, AppError> {
        if episode_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Episode id must not be empty".to_string(),
            ));
        }
        if items.is_empty() {
            return Err(AppError::Validation(
                "Ingestion batch contains no items".to_string(),
            ));
        }

        let span = info_span!("ingest_batch", %episode_id, total = items.len());
        let _enter = span.enter();

        let mut reports = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let source = item.describe();
            let state = compute_next_state(&ItemState::Pending, ItemTransition::Start)?;
            debug!(index, %source, "processing batch item");

            let report = match self.process_item(episode_id, item).await {
                Ok(page) => {
                    let state = compute_next_state(&state, ItemTransition::Succeed)?;
                    info!(index, page_number = page.page_number, "batch item succeeded");
                    ItemReport {
                        index,
                        source,
                        state,
                        page_id: Some(page.id),
                        page_number: Some(page.page_number),
                        failure: None,
                    }
                }
                Err(err) => {
                    let state = compute_next_state(&state, ItemTransition::Fail)?;
                    warn!(index, %source, error = %err, "batch item failed");
                    ItemReport {
                        index,
                        source,
                        state,
                        page_id: None,
                        page_number: None,
                        failure: Some(ItemFailure::from_error(&err)),
                    }
                }
            };
            reports.push(report);
        }

        let report = BatchReport {
            episode_id: episode_id.to_string(),
            items: reports,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "bulk ingestion finished"
        );
        Ok(report)
    }

    /// Resolves one item completely before the caller moves to the next.
    ///
    /// File items keep their caller-chosen number: a slot conflict is
    /// reported, never silently renumbered. Link items go through the
    /// allocator, so automatic numbering and its conflict retry apply per
    /// link.
    async fn process_item(
        &self,
        episode_id: &str,
        item: &IngestionItem,
    ) -> Result<Page, AppError> {
        match item {
            IngestionItem::File(file) => {
                file.validate()?;

                let hint = format!("episodes/{episode_id}");
                let content_ref = self.uploader.upload(file.bytes.clone(), &hint).await?;

                let page = self
                    .store
                    .create(
                        episode_id,
                        file.page_number,
                        &content_ref,
                        file.alt_text.as_deref(),
                    )
                    .await?;
                self.events.publish(episode_id);
                Ok(page)
            }
            IngestionItem::Link(link) => {
                let url = link.validated_url()?;
                self.allocator
                    .allocate_and_create(episode_id, url.as_str(), link.alt_text.as_deref())
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::store::testing::MemoryPageStore;
    use crate::store::PageStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use common::storage::assets::{UploadAdapter, UploadError};
    use std::sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    };
    use std::time::Duration;

    /// Uploader double: hands out distinct refs, records destination hints,
    /// and can be told to fail its next upload.
    #[derive(Default)]
    struct RecordingUploader {
        counter: AtomicU32,
        hints: Mutex<Vec<String>>,
        fail_next: AtomicBool,
    }

    impl RecordingUploader {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        fn hints(&self) -> Vec<String> {
            self.hints.lock().expect("hints lock").clone()
        }
    }

    #[async_trait]
    impl UploadAdapter for RecordingUploader {
        async fn upload(
            &self,
            _data: Bytes,
            destination_hint: &str,
        ) -> Result<String, UploadError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(UploadError::Backend(object_store::Error::Generic {
                    store: "test",
                    source: "upload backend unavailable".into(),
                }));
            }
            self.hints
                .lock()
                .expect("hints lock")
                .push(destination_hint.to_string());
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{destination_hint}/obj-{n}"))
        }
    }

    fn coordinator(
        store: Arc<MemoryPageStore>,
        uploader: Arc<RecordingUploader>,
    ) -> (BulkIngestionCoordinator, PageEvents) {
        let events = PageEvents::new(32);
        let allocator = PageNumberAllocator::new(
            store.clone(),
            RetryPolicy::new(5, Duration::from_millis(1)),
            events.clone(),
        );
        (
            BulkIngestionCoordinator::new(store, uploader, allocator, events.clone()),
            events,
        )
    }

    fn image_link(name: &str) -> IngestionItem {
        IngestionItem::link(&format!("https://cdn.example.com/pages/{name}.png"), None)
    }

    #[tokio::test]
    async fn test_mixed_batch_numbers_files_then_links() {
        let store = MemoryPageStore::new();
        let uploader = RecordingUploader::new();
        let (coordinator, _) = coordinator(store.clone(), uploader.clone());

        let items = vec![
            IngestionItem::file(Bytes::from_static(b"p1"), 1, Some("one".to_string())),
            IngestionItem::file(Bytes::from_static(b"p2"), 2, None),
            image_link("extra"),
        ];

        let report = coordinator
            .ingest_batch("ep-1", items)
            .await
            .expect("batch");

        assert!(report.is_complete_success());
        assert_eq!(report.succeeded(), 3);
        assert_eq!(store.numbers("ep-1"), vec![1, 2, 3]);
        // Link pages are numbered by the allocator, after the files
        assert_eq!(report.items[2].page_number, Some(3));
        assert_eq!(uploader.hints(), vec!["episodes/ep-1", "episodes/ep-1"]);
    }

    #[tokio::test]
    async fn test_invalid_link_fails_alone() {
        let store = MemoryPageStore::new();
        let uploader = RecordingUploader::new();
        let (coordinator, _) = coordinator(store.clone(), uploader);

        let items = vec![
            image_link("001"),
            image_link("002"),
            IngestionItem::link("definitely not a url", None),
            image_link("004"),
            image_link("005"),
        ];

        let report = coordinator
            .ingest_batch("ep-1", items)
            .await
            .expect("batch");

        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(store.numbers("ep-1"), vec![1, 2, 3, 4]);

        let failed = &report.items[2];
        assert_eq!(failed.state, ItemState::Failed);
        let failure = failed.failure.as_ref().expect("failure recorded");
        assert_eq!(failure.kind, FailureKind::Validation);
        assert!(failed.page_id.is_none());
    }

    #[tokio::test]
    async fn test_file_conflict_is_reported_not_renumbered() {
        let store = MemoryPageStore::new();
        store
            .create("ep-1", 2, "assets/existing", None)
            .await
            .expect("seed");
        let uploader = RecordingUploader::new();
        let (coordinator, _) = coordinator(store.clone(), uploader);

        let items = vec![
            IngestionItem::file(Bytes::from_static(b"a"), 2, None),
            IngestionItem::file(Bytes::from_static(b"b"), 3, None),
        ];

        let report = coordinator
            .ingest_batch("ep-1", items)
            .await
            .expect("batch");

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        // The conflicting item kept its number out of the store; the other landed
        assert_eq!(store.numbers("ep-1"), vec![2, 3]);

        let failure = report.items[0].failure.as_ref().expect("failure recorded");
        assert_eq!(failure.kind, FailureKind::NumberingConflict);
        assert!(failure.message.contains("resubmit this item"));
    }

    #[tokio::test]
    async fn test_upload_failure_does_not_abort_batch() {
        let store = MemoryPageStore::new();
        let uploader = RecordingUploader::new();
        uploader.fail_next();
        let (coordinator, _) = coordinator(store.clone(), uploader);

        let items = vec![
            IngestionItem::file(Bytes::from_static(b"a"), 1, None),
            image_link("002"),
        ];

        let report = coordinator
            .ingest_batch("ep-1", items)
            .await
            .expect("batch");

        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(
            report.items[0].failure.as_ref().expect("failure").kind,
            FailureKind::Upload
        );
        // The link was still attempted and allocated the first free number
        assert_eq!(store.numbers("ep-1"), vec![1]);
    }

    #[tokio::test]
    async fn test_malformed_batches_are_rejected_wholesale() {
        let store = MemoryPageStore::new();
        let uploader = RecordingUploader::new();
        let (coordinator, _) = coordinator(store, uploader);

        let empty = coordinator.ingest_batch("ep-1", vec![]).await;
        assert!(matches!(empty, Err(AppError::Validation(_))));

        let blank = coordinator
            .ingest_batch("  ", vec![image_link("001")])
            .await;
        assert!(matches!(blank, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_each_success_publishes_pages_changed() {
        let store = MemoryPageStore::new();
        let uploader = RecordingUploader::new();
        let (coordinator, events) = coordinator(store, uploader);
        let mut receiver = events.subscribe();

        let items = vec![
            IngestionItem::file(Bytes::from_static(b"a"), 1, None),
            IngestionItem::link("nonsense", None),
            image_link("002"),
        ];

        let report = coordinator
            .ingest_batch("ep-1", items)
            .await
            .expect("batch");
        assert_eq!(report.succeeded(), 2);

        // One event per successful item, none for the failed one
        assert_eq!(receiver.recv().await.expect("event").episode_id, "ep-1");
        assert_eq!(receiver.recv().await.expect("event").episode_id, "ep-1");
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_file_item_is_rejected_before_upload() {
        let store = MemoryPageStore::new();
        let uploader = RecordingUploader::new();
        let (coordinator, _) = coordinator(store.clone(), uploader.clone());

        let report = coordinator
            .ingest_batch(
                "ep-1",
                vec![IngestionItem::file(Bytes::new(), 1, None)],
            )
            .await
            .expect("batch");

        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.items[0].failure.as_ref().expect("failure").kind,
            FailureKind::Validation
        );
        // Nothing reached the uploader or the store
        assert!(uploader.hints().is_empty());
        assert_eq!(store.len(), 0);
    }
}
