use tokio_retry::RetryIf;
use tracing::{debug, instrument};

use common::{error::AppError, storage::types::page::Page};

use crate::{notify::PageEvents, retry::RetryPolicy, store::DynPageStore};

/// Successor proposal derived from an episode's current maximum. Clamped so
/// a proposal is never below 1, whatever the store reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposedNumber(i64);

impl ProposedNumber {
    pub fn after(max: i64) -> Self {
        Self(max.max(0) + 1)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

/// Assigns the next free page number in an episode and performs the insert.
///
/// There is no lock to take: the store's unique index arbitrates between
/// concurrent writers, and a lost race shows up as a `UniqueViolation` that
/// is answered by re-reading the maximum and proposing again, a bounded
/// number of times. Episode page lists are written at human pace, so
/// contention is rare and short.
#[derive(Clone)]
pub struct PageNumberAllocator {
    store: DynPageStore,
    policy: RetryPolicy,
    events: PageEvents,
}

impl PageNumberAllocator {
    pub fn new(store: DynPageStore, policy: RetryPolicy, events: PageEvents) -> Self {
        Self {
            store,
            policy,
            events,
        }
    }

    /// Creates a page at `max + 1`. On exhausted retries no page exists and
    /// the caller gets `NumberingConflict`; any error other than a lost
    /// numbering race propagates on the first occurrence.
    #[instrument(skip(self, content_ref, alt_text))]
    pub async fn allocate_and_create(
        &self,
        episode_id: &str,
        content_ref: &str,
        alt_text: Option<&str>,
    ) -> Result<Page, AppError> {
        if episode_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Episode id must not be empty".to_string(),
            ));
        }
        if content_ref.trim().is_empty() {
            return Err(AppError::Validation(
                "Content reference must not be empty".to_string(),
            ));
        }

        let outcome = RetryIf::spawn(
            self.policy.backoff(),
            || self.propose_and_insert(episode_id, content_ref, alt_text),
            AppError::is_unique_violation,
        )
        .await;

        match outcome {
            Ok(page) => {
                debug!(%episode_id, page_number = page.page_number, "allocated page number");
                self.events.publish(episode_id);
                Ok(page)
            }
            Err(err) if err.is_unique_violation() => Err(AppError::NumberingConflict {
                episode_id: episode_id.to_string(),
                attempts: self.policy.max_attempts(),
            }),
            Err(err) => Err(err),
        }
    }

    /// One optimistic attempt: re-read the current maximum, propose the
    /// successor, insert. State is never cached between attempts.
    async fn propose_and_insert(
        &self,
        episode_id: &str,
        content_ref: &str,
        alt_text: Option<&str>,
    ) -> Result<Page, AppError> {
        let max = self.store.max_number(episode_id).await?;
        let proposed = ProposedNumber::after(max);
        self.store
            .create(episode_id, proposed.value(), content_ref, alt_text)
            .await
    }
}
