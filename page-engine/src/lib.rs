//! Episode page sequencing engine: stable page-number allocation under
//! concurrent writers, order moves without full renumbering, and bulk
//! ingestion with per-item failure isolation.

pub mod allocator;
pub mod engine;
pub mod ingest;
pub mod notify;
pub mod reorder;
pub mod retry;
pub mod store;

pub use allocator::{PageNumberAllocator, ProposedNumber};
pub use engine::PageEngine;
pub use ingest::{BatchReport, BulkIngestionCoordinator, FileItem, IngestionItem, LinkItem};
pub use notify::{PageEvents, PagesChanged};
pub use reorder::{MoveDirection, SequenceReorderer};
pub use retry::RetryPolicy;
pub use store::{DynPageStore, PageStore, SurrealPageStore};
