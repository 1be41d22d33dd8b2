use uuid::Uuid;

use crate::{
    error::AppError,
    storage::db::{is_unique_index_violation, SurrealDbClient},
    stored_object,
};

stored_object!(Page, "page", {
    episode_id: String,
    page_number: i64,
    content_ref: String,
    alt_text: Option<String>,
    active: bool
});

impl Page {
    /// Builds a fresh, active page. Settled page numbers are always >= 1;
    /// negative numbers appear only transiently while a reorder stages a row
    /// out of the valid range.
    pub fn new(
        episode_id: &str,
        page_number: i64,
        content_ref: &str,
        alt_text: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            episode_id: episode_id.to_string(),
            page_number,
            content_ref: content_ref.to_string(),
            alt_text: alt_text.map(ToString::to_string),
            active: true,
        }
    }

    /// Inserts a page at an explicit number. The unique index on
    /// `(episode_id, page_number)` arbitrates between concurrent writers;
    /// its rejection is surfaced as `AppError::UniqueViolation` so callers
    /// can distinguish a lost race from a store outage.
    pub async fn create_numbered(
        db: &SurrealDbClient,
        episode_id: &str,
        page_number: i64,
        content_ref: &str,
        alt_text: Option<&str>,
    ) -> Result<Page, AppError> {
        let page = Page::new(episode_id, page_number, content_ref, alt_text);

        match db.store_item(page).await {
            Ok(Some(created)) => Ok(created),
            Ok(None) => Err(AppError::NotFound(format!(
                "Store returned no record for new page in episode {episode_id}"
            ))),
            Err(err) if is_unique_index_violation(&err) => Err(AppError::UniqueViolation {
                page_number,
                detail: err.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(db: &SurrealDbClient, id: &str) -> Result<Option<Page>, AppError> {
        Ok(db.get_item::<Page>(id).await?)
    }

    /// Moves a page to a new number, returning the updated row.
    ///
    /// # Returns
    /// * `AppError::NotFound` when the page vanished before the write
    /// * `AppError::UniqueViolation` when the target number is occupied
    pub async fn update_number(
        db: &SurrealDbClient,
        page_id: &str,
        new_number: i64,
    ) -> Result<Page, AppError> {
        const UPDATE_NUMBER_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET page_number = $number,
                updated_at = time::now()
            RETURN *;
        "#;

        let mut result = db
            .client
            .query(UPDATE_NUMBER_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", page_id.to_string()))
            .bind(("number", new_number))
            .await?;

        let updated: Option<Page> = match result.take(0) {
            Ok(value) => value,
            Err(err) if is_unique_index_violation(&err) => {
                return Err(AppError::UniqueViolation {
                    page_number: new_number,
                    detail: err.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        updated.ok_or_else(|| AppError::NotFound(format!("Page {page_id} does not exist")))
    }

    /// All pages of an episode, ascending by page number. Staged rows
    /// (negative numbers) sort first, which keeps a half-finished reorder
    /// visible instead of hidden.
    pub async fn list_by_episode(
        db: &SurrealDbClient,
        episode_id: &str,
    ) -> Result<Vec<Page>, AppError> {
        const LIST_QUERY: &str = r#"
            SELECT * FROM type::table($table)
            WHERE episode_id = $episode_id
            ORDER BY page_number ASC;
        "#;

        let pages: Vec<Page> = db
            .client
            .query(LIST_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("episode_id", episode_id.to_string()))
            .await?
            .take(0)?;

        Ok(pages)
    }

    /// Highest page number currently present in the episode, 0 when empty.
    pub async fn max_number(db: &SurrealDbClient, episode_id: &str) -> Result<i64, AppError> {
        const MAX_QUERY: &str = r#"
            SELECT * FROM type::table($table)
            WHERE episode_id = $episode_id
            ORDER BY page_number DESC
            LIMIT 1;
        "#;

        let top: Option<Page> = db
            .client
            .query(MAX_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("episode_id", episode_id.to_string()))
            .await?
            .take(0)?;

        Ok(top.map_or(0, |page| page.page_number))
    }

    pub async fn count_by_episode(db: &SurrealDbClient, episode_id: &str) -> Result<i64, AppError> {
        #[derive(serde::Deserialize)]
        struct CountRow {
            count: i64,
        }

        const COUNT_QUERY: &str = r#"
            SELECT count() FROM type::table($table)
            WHERE episode_id = $episode_id
            GROUP ALL;
        "#;

        let row: Option<CountRow> = db
            .client
            .query(COUNT_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("episode_id", episode_id.to_string()))
            .await?
            .take(0)?;

        Ok(row.map_or(0, |r| r.count))
    }

    pub async fn delete(db: &SurrealDbClient, page_id: &str) -> Result<(), AppError> {
        let deleted = db.delete_item::<Page>(page_id).await?;
        match deleted {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Page {page_id} does not exist"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, &database)
            .await
            .expect("in-memory surrealdb");
        db.ensure_initialized().await.expect("indexes");
        db
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let db = memory_db().await;

        let first = Page::create_numbered(&db, "ep-1", 1, "assets/a", Some("cover"))
            .await
            .expect("create first");
        let second = Page::create_numbered(&db, "ep-1", 2, "assets/b", None)
            .await
            .expect("create second");
        Page::create_numbered(&db, "ep-2", 1, "assets/other", None)
            .await
            .expect("create in other episode");

        assert!(first.active);
        assert_eq!(first.alt_text.as_deref(), Some("cover"));

        let fetched = Page::get(&db, &first.id).await.expect("fetch");
        assert_eq!(fetched.as_ref().map(|p| p.page_number), Some(1));

        let pages = Page::list_by_episode(&db, "ep-1").await.expect("list");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].id, first.id);
        assert_eq!(pages[1].id, second.id);
        assert_eq!(
            pages.iter().map(|p| p.page_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_duplicate_number_is_rejected() {
        let db = memory_db().await;

        Page::create_numbered(&db, "ep-1", 1, "assets/a", None)
            .await
            .expect("create first");

        let duplicate = Page::create_numbered(&db, "ep-1", 1, "assets/b", None).await;
        match duplicate {
            Err(AppError::UniqueViolation { page_number, .. }) => assert_eq!(page_number, 1),
            other => panic!("Expected UniqueViolation, got {other:?}"),
        }

        // Same number in a different episode is fine
        Page::create_numbered(&db, "ep-2", 1, "assets/b", None)
            .await
            .expect("create in other episode");
    }

    #[tokio::test]
    async fn test_max_number_ignores_other_episodes() {
        let db = memory_db().await;

        assert_eq!(Page::max_number(&db, "ep-1").await.expect("max"), 0);

        Page::create_numbered(&db, "ep-1", 3, "assets/a", None)
            .await
            .expect("create");
        Page::create_numbered(&db, "ep-2", 9, "assets/b", None)
            .await
            .expect("create");

        assert_eq!(Page::max_number(&db, "ep-1").await.expect("max"), 3);
    }

    #[tokio::test]
    async fn test_update_number_moves_and_reports_conflicts() {
        let db = memory_db().await;

        let page = Page::create_numbered(&db, "ep-1", 1, "assets/a", None)
            .await
            .expect("create");
        let blocker = Page::create_numbered(&db, "ep-1", 2, "assets/b", None)
            .await
            .expect("create");

        let moved = Page::update_number(&db, &page.id, 5).await.expect("move");
        assert_eq!(moved.page_number, 5);

        let conflict = Page::update_number(&db, &page.id, blocker.page_number).await;
        assert!(matches!(conflict, Err(AppError::UniqueViolation { .. })));

        let missing = Page::update_number(&db, "no-such-page", 7).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_staged_negative_number_is_allowed() {
        let db = memory_db().await;

        let page = Page::create_numbered(&db, "ep-1", 2, "assets/a", None)
            .await
            .expect("create");

        let staged = Page::update_number(&db, &page.id, -2).await.expect("stage");
        assert_eq!(staged.page_number, -2);

        // The vacated slot is immediately reusable
        Page::create_numbered(&db, "ep-1", 2, "assets/b", None)
            .await
            .expect("reuse slot");
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let db = memory_db().await;

        let page = Page::create_numbered(&db, "ep-1", 1, "assets/a", None)
            .await
            .expect("create");
        Page::create_numbered(&db, "ep-1", 2, "assets/b", None)
            .await
            .expect("create");

        assert_eq!(
            Page::count_by_episode(&db, "ep-1").await.expect("count"),
            2
        );

        Page::delete(&db, &page.id).await.expect("delete");
        assert_eq!(
            Page::count_by_episode(&db, "ep-1").await.expect("count"),
            1
        );

        let again = Page::delete(&db, &page.id).await;
        assert!(matches!(again, Err(AppError::NotFound(_))));
    }
}
