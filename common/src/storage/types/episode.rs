use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::page::Page;

stored_object!(Episode, "episode", {
    number: i64,
    title: String,
    page_count: i64
});

impl Episode {
    pub fn new(number: i64, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            number,
            title: title.to_string(),
            page_count: 0,
        }
    }

    /// Recomputes the derived page count from the page table.
    ///
    /// The count is a display convenience, not an authority; observers of a
    /// pages-changed notification call this to converge it.
    pub async fn refresh_page_count(
        db: &SurrealDbClient,
        episode_id: &str,
    ) -> Result<i64, AppError> {
        let count = Page::count_by_episode(db, episode_id).await?;

        const REFRESH_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET page_count = $count,
                updated_at = time::now()
            RETURN *;
        "#;

        let updated: Option<Episode> = db
            .client
            .query(REFRESH_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", episode_id.to_string()))
            .bind(("count", count))
            .await?
            .take(0)?;

        updated
            .map(|episode| episode.page_count)
            .ok_or_else(|| AppError::NotFound(format!("Episode {episode_id} does not exist")))
    }
}
