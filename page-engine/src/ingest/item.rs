use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use state_machines::state_machine;
use url::Url;

use common::error::AppError;

/// One entry of an ingestion batch: either raw bytes that still need a home
/// in object storage, or a link to content that is already hosted somewhere.
///
/// The numbering asymmetry is deliberate: file items carry a caller-chosen
/// page number fixed before the batch starts, link items are numbered by the
/// allocator as they land.
#[derive(Debug, Clone)]
pub enum IngestionItem {
    File(FileItem),
    Link(LinkItem),
}

#[derive(Debug, Clone)]
pub struct FileItem {
    pub bytes: Bytes,
    pub page_number: i64,
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LinkItem {
    pub url: String,
    pub alt_text: Option<String>,
}

impl IngestionItem {
    pub fn file(bytes: Bytes, page_number: i64, alt_text: Option<String>) -> Self {
        Self::File(FileItem {
            bytes,
            page_number,
            alt_text,
        })
    }

    pub fn link(url: &str, alt_text: Option<String>) -> Self {
        Self::Link(LinkItem {
            url: url.to_string(),
            alt_text,
        })
    }

    /// Short label for reports and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::File(file) => format!("file for page {}", file.page_number),
            Self::Link(link) => format!("link {}", link.url),
        }
    }
}

impl FileItem {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.bytes.is_empty() {
            return Err(AppError::Validation("File item has no bytes".to_string()));
        }
        if self.page_number < 1 {
            return Err(AppError::Validation(format!(
                "Page numbers start at 1, got {}",
                self.page_number
            )));
        }
        Ok(())
    }
}

impl LinkItem {
    /// Syntactic validation only, before any network or store call: the
    /// source must parse as an http(s) URL whose path carries a recognized
    /// image extension.
    pub fn validated_url(&self) -> Result<Url, AppError> {
        let url = Url::parse(self.url.trim())
            .map_err(|err| AppError::Validation(format!("Invalid URL {}: {err}", self.url)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "Unsupported URL scheme {}: {}",
                url.scheme(),
                self.url
            )));
        }

        let guessed = mime_guess::from_path(Path::new(url.path()))
            .first_or(mime::APPLICATION_OCTET_STREAM);
        if guessed.type_() != mime::IMAGE {
            return Err(AppError::Validation(format!(
                "URL path does not end in a recognized image extension: {}",
                self.url
            )));
        }

        Ok(url)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemState {
    #[serde(rename = "Pending")]
    #[default]
    Pending,
    #[serde(rename = "InProgress")]
    InProgress,
    #[serde(rename = "Succeeded")]
    Succeeded,
    #[serde(rename = "Failed")]
    Failed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "Pending",
            ItemState::InProgress => "InProgress",
            ItemState::Succeeded => "Succeeded",
            ItemState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Succeeded | ItemState::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ItemTransition {
    Start,
    Succeed,
    Fail,
}

impl ItemTransition {
    fn as_str(&self) -> &'static str {
        match self {
            ItemTransition::Start => "start",
            ItemTransition::Succeed => "succeed",
            ItemTransition::Fail => "fail",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: ItemLifecycleMachine,
        initial: Pending,
        states: [Pending, InProgress, Succeeded, Failed],
        events {
            start {
                transition: { from: Pending, to: InProgress }
            }
            succeed {
                transition: { from: InProgress, to: Succeeded }
            }
            fail {
                transition: { from: InProgress, to: Failed }
            }
        }
    }

    pub(super) fn pending() -> ItemLifecycleMachine<(), Pending> {
        ItemLifecycleMachine::new(())
    }

    pub(super) fn in_progress() -> ItemLifecycleMachine<(), InProgress> {
        pending()
            .start()
            .expect("start transition from Pending should exist")
    }
}

fn invalid_transition(state: &ItemState, event: ItemTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid batch item transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

pub(crate) fn compute_next_state(
    state: &ItemState,
    event: ItemTransition,
) -> Result<ItemState, AppError> {
    use lifecycle::*;
    match (state, event) {
        (ItemState::Pending, ItemTransition::Start) => pending()
            .start()
            .map(|_| ItemState::InProgress)
            .map_err(|_| invalid_transition(state, event)),
        (ItemState::InProgress, ItemTransition::Succeed) => in_progress()
            .succeed()
            .map(|_| ItemState::Succeeded)
            .map_err(|_| invalid_transition(state, event)),
        (ItemState::InProgress, ItemTransition::Fail) => in_progress()
            .fail()
            .map(|_| ItemState::Failed)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    NumberingConflict,
    Upload,
    Store,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ItemFailure {
    /// Folds the error taxonomy into per-item reasons. A slot conflict on a
    /// caller-numbered file gets the remediation spelled out: re-pick the
    /// number and resubmit that one item, not the whole batch.
    pub fn from_error(err: &AppError) -> Self {
        match err {
            AppError::Validation(message) => Self {
                kind: FailureKind::Validation,
                message: message.clone(),
            },
            AppError::UniqueViolation { page_number, .. } => Self {
                kind: FailureKind::NumberingConflict,
                message: format!(
                    "Page number {page_number} was taken by another writer; pick a new number and resubmit this item"
                ),
            },
            AppError::NumberingConflict { .. } => Self {
                kind: FailureKind::NumberingConflict,
                message: err.to_string(),
            },
            AppError::Upload(_) => Self {
                kind: FailureKind::Upload,
                message: err.to_string(),
            },
            _ => Self {
                kind: FailureKind::Store,
                message: err.to_string(),
            },
        }
    }
}

/// Outcome of a single batch entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemReport {
    pub index: usize,
    pub source: String,
    pub state: ItemState,
    pub page_id: Option<String>,
    pub page_number: Option<i64>,
    pub failure: Option<ItemFailure>,
}

/// Aggregated outcome of a batch. Partial success is an expected shape, not
/// an error: the batch call itself only fails when the batch was malformed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub episode_id: String,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.state == ItemState::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.state == ItemState::Failed)
            .count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }
}
