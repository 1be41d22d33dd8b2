use std::sync::Arc;

use async_trait::async_trait;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::page::Page},
};

/// The durable record store the engine sequences against.
///
/// The store is trusted for exactly one thing: atomically rejecting a write
/// that would duplicate `(episode_id, page_number)`. Everything else the
/// engine layers on top with re-reads and bounded retries.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Insert a page at an explicit number. Fails with
    /// `AppError::UniqueViolation` when the slot is already taken.
    async fn create(
        &self,
        episode_id: &str,
        page_number: i64,
        content_ref: &str,
        alt_text: Option<&str>,
    ) -> Result<Page, AppError>;

    /// Move a single page to a new number. Fails with `AppError::NotFound`
    /// when the page vanished, `AppError::UniqueViolation` on collision.
    async fn update_number(&self, page_id: &str, new_number: i64) -> Result<Page, AppError>;

    async fn delete(&self, page_id: &str) -> Result<(), AppError>;

    /// All pages of an episode, ascending by page number.
    async fn list_by_episode(&self, episode_id: &str) -> Result<Vec<Page>, AppError>;

    /// Highest page number in the episode, 0 when it has none.
    async fn max_number(&self, episode_id: &str) -> Result<i64, AppError>;
}

pub type DynPageStore = Arc<dyn PageStore>;

/// SurrealDB-backed store; the queries live on `Page` in `common`.
pub struct SurrealPageStore {
    db: Arc<SurrealDbClient>,
}

impl SurrealPageStore {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PageStore for SurrealPageStore {
    async fn create(
        &self,
        episode_id: &str,
        page_number: i64,
        content_ref: &str,
        alt_text: Option<&str>,
    ) -> Result<Page, AppError> {
        Page::create_numbered(&self.db, episode_id, page_number, content_ref, alt_text).await
    }

    async fn update_number(&self, page_id: &str, new_number: i64) -> Result<Page, AppError> {
        Page::update_number(&self.db, page_id, new_number).await
    }

    async fn delete(&self, page_id: &str) -> Result<(), AppError> {
        Page::delete(&self.db, page_id).await
    }

    async fn list_by_episode(&self, episode_id: &str) -> Result<Vec<Page>, AppError> {
        Page::list_by_episode(&self.db, episode_id).await
    }

    async fn max_number(&self, episode_id: &str) -> Result<i64, AppError> {
        Page::max_number(&self.db, episode_id).await
    }
}
