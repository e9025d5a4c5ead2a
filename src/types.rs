//! In-flight entities of the processing pipeline.
//!
//! Everything here is owned by one [`crate::coordinator::PipelineCoordinator`]
//! invocation; nothing is shared across documents. The only entity with a
//! durability contract is the persisted record
//! ([`crate::events::PersistedRecord`]), written exactly once per document
//! key by the coordinator.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Reference to a source document in the blob store.
///
/// Immutable once created; produced by the trigger/ingest layer and
/// consumed by the conversion stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Storage location (bucket, directory) holding the document.
    pub location: String,
    /// Object key of the document, e.g. `uploads/invoice.pdf`. Doubles as
    /// the partition key of the final record.
    pub key: String,
}

impl DocumentRef {
    pub fn new(location: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            key: key.into(),
        }
    }
}

/// Reference to one rendered page image.
///
/// `page_index` is 1-based and defines the canonical page ordering. When the
/// source document is already a raster image, conversion yields exactly one
/// `PageImageRef` whose key aliases the original object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImageRef {
    pub location: String,
    pub key: String,
    pub page_index: usize,
}

/// Extraction result for one page: OCR text plus decoded QR payloads, in
/// detection order. Both fields may be empty for a readable but blank page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageScan {
    pub page_index: usize,
    pub text: String,
    pub qr_payloads: Vec<String>,
}

/// Per-page extraction outcome. Exactly one outcome exists per page index
/// in `[1..N]` — failed pages are captured, never dropped.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Scanned(PageScan),
    Failed(PageError),
}

impl PageOutcome {
    /// 1-based page index regardless of success or failure.
    pub fn page_index(&self) -> usize {
        match self {
            PageOutcome::Scanned(scan) => scan.page_index,
            PageOutcome::Failed(err) => err.page_index(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PageOutcome::Failed(_))
    }
}

/// Document-level aggregate of all page scans.
///
/// Derived, not persisted: `full_text` is the page texts joined by `\n` in
/// ascending page order; `qr_set` is the deduplicated union of all payloads
/// (exact string equality, order irrelevant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedDocument {
    pub full_text: String,
    pub qr_set: BTreeSet<String>,
}

/// Terminal output of the validation stage.
///
/// Invariant: `valid_links ∪ invalid_links == qr_set` and the two sets are
/// disjoint — every QR payload is classified exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Partition key of the document (its original object key).
    pub document_key: String,
    pub valid_links: BTreeSet<String>,
    pub invalid_links: BTreeSet<String>,
    pub key_values: BTreeMap<String, String>,
}

/// Per-document state machine driven by the coordinator.
///
/// `Received → Converting → Extracting → Aggregating → Validating →
/// Persisted`, with terminal failure states. No state is skipped; a stage
/// failure transitions directly to its terminal failure state and halts
/// the pipeline for that document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentState {
    Received,
    Converting,
    Extracting,
    Aggregating,
    Validating,
    Persisted,
    ConversionFailed,
    PartialExtractionFailure,
    PersistFailed,
}

impl DocumentState {
    /// Whether this state ends the pipeline for the document.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DocumentState::Persisted
                | DocumentState::ConversionFailed
                | DocumentState::PartialExtractionFailure
                | DocumentState::PersistFailed
        )
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentState::Received => "received",
            DocumentState::Converting => "converting",
            DocumentState::Extracting => "extracting",
            DocumentState::Aggregating => "aggregating",
            DocumentState::Validating => "validating",
            DocumentState::Persisted => "persisted",
            DocumentState::ConversionFailed => "conversion-failed",
            DocumentState::PartialExtractionFailure => "partial-extraction-failure",
            DocumentState::PersistFailed => "persist-failed",
        };
        f.write_str(s)
    }
}

/// Wall-clock and volume statistics for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages produced by conversion.
    pub total_pages: usize,
    /// Unique QR payloads across all pages.
    pub qr_payloads: usize,
    /// Payloads classified valid.
    pub valid_links: usize,
    /// Payloads classified invalid.
    pub invalid_links: usize,
    /// Key-value pairs in the final mapping.
    pub key_values: usize,
    pub convert_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_outcome_index_covers_both_arms() {
        let ok = PageOutcome::Scanned(PageScan {
            page_index: 2,
            text: String::new(),
            qr_payloads: vec![],
        });
        let bad = PageOutcome::Failed(PageError::FetchFailed {
            page: 7,
            detail: "timeout".into(),
        });
        assert_eq!(ok.page_index(), 2);
        assert_eq!(bad.page_index(), 7);
        assert!(!ok.is_failed());
        assert!(bad.is_failed());
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(DocumentState::Persisted.is_terminal());
        assert!(DocumentState::PersistFailed.is_terminal());
        assert!(!DocumentState::Extracting.is_terminal());
    }

    #[test]
    fn state_display_is_kebab_case() {
        assert_eq!(
            DocumentState::PartialExtractionFailure.to_string(),
            "partial-extraction-failure"
        );
    }
}
