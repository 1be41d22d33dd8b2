use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        assets::{AssetStore, DynUploader, ObjectStoreUploader},
        db::SurrealDbClient,
        types::page::Page,
    },
    utils::config::AppConfig,
};

use crate::{
    allocator::PageNumberAllocator,
    ingest::{BatchReport, BulkIngestionCoordinator, IngestionItem},
    notify::PageEvents,
    reorder::{MoveDirection, SequenceReorderer},
    retry::RetryPolicy,
    store::{DynPageStore, SurrealPageStore},
};

/// Wires the sequencing components to one store, one uploader and one event
/// surface, and exposes the episode-page operations as a single entry point.
#[derive(Clone)]
pub struct PageEngine {
    store: DynPageStore,
    allocator: PageNumberAllocator,
    reorderer: SequenceReorderer,
    coordinator: BulkIngestionCoordinator,
    events: PageEvents,
}

impl PageEngine {
    pub fn new(store: DynPageStore, uploader: DynUploader, config: &AppConfig) -> Self {
        let events = PageEvents::new(config.event_capacity);
        let policy = RetryPolicy::from_config(config);
        let allocator = PageNumberAllocator::new(store.clone(), policy, events.clone());
        let reorderer = SequenceReorderer::new(store.clone(), events.clone());
        let coordinator = BulkIngestionCoordinator::new(
            store.clone(),
            uploader,
            allocator.clone(),
            events.clone(),
        );

        Self {
            store,
            allocator,
            reorderer,
            coordinator,
            events,
        }
    }

    /// Convenience wiring for the SurrealDB store and the object-store
    /// backed uploader.
    pub fn surreal(db: Arc<SurrealDbClient>, assets: AssetStore, config: &AppConfig) -> Self {
        let store: DynPageStore = Arc::new(SurrealPageStore::new(db));
        let uploader: DynUploader = Arc::new(ObjectStoreUploader::new(assets));
        Self::new(store, uploader, config)
    }

    pub fn events(&self) -> &PageEvents {
        &self.events
    }

    /// Append a page with an automatically allocated number.
    pub async fn add_page(
        &self,
        episode_id: &str,
        content_ref: &str,
        alt_text: Option<&str>,
    ) -> Result<Page, AppError> {
        self.allocator
            .allocate_and_create(episode_id, content_ref, alt_text)
            .await
    }

    pub async fn move_page(
        &self,
        episode_id: &str,
        page_id: &str,
        direction: MoveDirection,
    ) -> Result<(), AppError> {
        self.reorderer
            .move_adjacent(episode_id, page_id, direction)
            .await
    }

    pub async fn move_page_to(
        &self,
        episode_id: &str,
        page_id: &str,
        target_number: i64,
    ) -> Result<(), AppError> {
        self.reorderer
            .move_to(episode_id, page_id, target_number)
            .await
    }

    pub async fn ingest_batch(
        &self,
        episode_id: &str,
        items: Vec<IngestionItem>,
    ) -> Result<BatchReport, AppError> {
        self.coordinator.ingest_batch(episode_id, items).await
    }

    /// Deletes a page and notifies observers. Remaining pages are not
    /// renumbered; the gap stays.
    pub async fn delete_page(&self, episode_id: &str, page_id: &str) -> Result<(), AppError> {
        self.store.delete(page_id).await?;
        self.events.publish(episode_id);
        Ok(())
    }

    pub async fn list_pages(&self, episode_id: &str) -> Result<Vec<Page>, AppError> {
        self.store.list_by_episode(episode_id).await
    }
}
