use tracing::{debug, warn};

use common::{error::AppError, storage::types::page::Page};

use crate::{notify::PageEvents, store::DynPageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Moves pages within an episode by exchanging page numbers, without ever
/// renumbering the whole episode.
///
/// The store only offers single-row updates, so every exchange is sequenced
/// through a parking slot outside the valid range (the negated number): a
/// half-finished move leaves at most one row parked at a negative number and
/// never two rows contending for the same positive one.
#[derive(Clone)]
pub struct SequenceReorderer {
    store: DynPageStore,
    events: PageEvents,
}

impl SequenceReorderer {
    pub fn new(store: DynPageStore, events: PageEvents) -> Self {
        Self { store, events }
    }

    /// Swap the page with its nearest neighbor in the given direction.
    /// Neighbors are resolved against the sorted listing, so deletion gaps
    /// do not pin pages in place. Moving the first page up or the last page
    /// down is a silent no-op.
    pub async fn move_adjacent(
        &self,
        episode_id: &str,
        page_id: &str,
        direction: MoveDirection,
    ) -> Result<(), AppError> {
        let pages = self.store.list_by_episode(episode_id).await?;
        let settled: Vec<&Page> = pages.iter().filter(|p| p.page_number >= 1).collect();

        let Some(idx) = settled.iter().position(|p| p.id == page_id) else {
            return Err(stale_lookup(&pages, episode_id, page_id));
        };

        let neighbor_idx = match direction {
            MoveDirection::Up => idx.checked_sub(1),
            MoveDirection::Down => {
                let next = idx + 1;
                (next < settled.len()).then_some(next)
            }
        };

        let Some(neighbor_idx) = neighbor_idx else {
            debug!(%episode_id, %page_id, ?direction, "move at sequence boundary is a no-op");
            return Ok(());
        };

        self.swap(settled[idx], settled[neighbor_idx]).await?;
        self.events.publish(episode_id);
        Ok(())
    }

    /// Move a page to an absolute number, shifting the run of pages between
    /// its old and new position by one slot toward the vacated end. The
    /// occupant of the target slot is part of the run, which makes the
    /// adjacent swap the degenerate case.
    pub async fn move_to(
        &self,
        episode_id: &str,
        page_id: &str,
        target_number: i64,
    ) -> Result<(), AppError> {
        if target_number < 1 {
            return Err(AppError::Validation(format!(
                "Page numbers start at 1, got {target_number}"
            )));
        }

        let pages = self.store.list_by_episode(episode_id).await?;
        let Some(moving) = pages.iter().find(|p| p.id == page_id).cloned() else {
            return Err(AppError::StaleReference(format!(
                "Page {page_id} not found in episode {episode_id}"
            )));
        };

        let current = moving.page_number;
        if current == target_number {
            return Ok(());
        }

        if current < 1 {
            // Parked by an interrupted move: land it directly, nothing to shift.
            self.store
                .update_number(&moving.id, target_number)
                .await
                .map_err(stale)?;
            self.events.publish(episode_id);
            return Ok(());
        }

        // Park the moving page so the run shift can pass over its slot.
        self.store
            .update_number(&moving.id, -current)
            .await
            .map_err(stale)?;

        // Shift toward the vacated slot. Moving a page down walks the run
        // ascending (each page steps into the slot just freed below it);
        // moving up walks it descending. Either way the next slot is always
        // free when it is written.
        let run: Vec<(String, i64, i64)> = if target_number > current {
            pages
                .iter()
                .filter(|p| p.page_number > current && p.page_number <= target_number)
                .map(|p| (p.id.clone(), p.page_number, p.page_number - 1))
                .collect()
        } else {
            pages
                .iter()
                .rev()
                .filter(|p| p.page_number >= target_number && p.page_number < current)
                .map(|p| (p.id.clone(), p.page_number, p.page_number + 1))
                .collect()
        };

        let mut shifted: Vec<(String, i64)> = Vec::with_capacity(run.len());
        for (id, from, to) in &run {
            if let Err(err) = self.store.update_number(id, *to).await {
                self.unwind(&moving, current, &shifted).await;
                return Err(stale(err));
            }
            shifted.push((id.clone(), *from));
        }

        if let Err(err) = self.store.update_number(&moving.id, target_number).await {
            self.unwind(&moving, current, &shifted).await;
            return Err(stale(err));
        }

        self.events.publish(episode_id);
        Ok(())
    }

    /// Three-step staged swap: park the neighbor, land the target on the
    /// neighbor's number, land the neighbor on the target's old number.
    /// Applied steps are compensated when a later step hits a vanished row.
    async fn swap(&self, target: &Page, neighbor: &Page) -> Result<(), AppError> {
        let parked = -neighbor.page_number;

        self.store
            .update_number(&neighbor.id, parked)
            .await
            .map_err(stale)?;

        if let Err(err) = self
            .store
            .update_number(&target.id, neighbor.page_number)
            .await
        {
            self.restore(&neighbor.id, neighbor.page_number).await;
            return Err(stale(err));
        }

        if let Err(err) = self
            .store
            .update_number(&neighbor.id, target.page_number)
            .await
        {
            self.restore(&target.id, target.page_number).await;
            self.restore(&neighbor.id, neighbor.page_number).await;
            return Err(stale(err));
        }

        Ok(())
    }

    async fn unwind(&self, moving: &Page, original: i64, shifted: &[(String, i64)]) {
        for (id, number) in shifted.iter().rev() {
            self.restore(id, *number).await;
        }
        self.restore(&moving.id, original).await;
    }

    async fn restore(&self, page_id: &str, number: i64) {
        if let Err(err) = self.store.update_number(page_id, number).await {
            warn!(%page_id, number, error = %err, "failed to roll back an interrupted move");
        }
    }
}

/// A concurrently deleted row surfaces as `NotFound` from the store; to the
/// caller that is a stale read, answered by re-fetching and retrying.
fn stale(err: AppError) -> AppError {
    match err {
        AppError::NotFound(detail) => AppError::StaleReference(detail),
        other => other,
    }
}

fn stale_lookup(pages: &[Page], episode_id: &str, page_id: &str) -> AppError {
    if pages.iter().any(|p| p.id == page_id) {
        AppError::StaleReference(format!(
            "Page {page_id} is parked by an interrupted move; give it an explicit position"
        ))
    } else {
        AppError::StaleReference(format!(
            "Page {page_id} not found in episode {episode_id}"
        ))
    }
}
