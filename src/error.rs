//! Error types for the docqr-pipeline library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the document cannot be processed as a
//!   whole (conversion failed, one or more pages could not be extracted,
//!   the durable write failed). Returned as `Err(PipelineError)` from the
//!   coordinator and the stage entry points.
//!
//! * [`PageError`] — **Non-fatal at the page level**: a single page failed
//!   (unreadable image, fetch glitch) while the other pages are fine.
//!   Captured inside [`crate::types::PageOutcome`] so the extraction stage
//!   can observe every page before anything becomes fatal.
//!
//! The separation is deliberate: extraction is failure-isolated per page,
//! but aggregation turns *any* captured page failure into the fatal
//! [`PipelineError::PartialExtractionFailure`] — a missing page never
//! silently becomes an empty string.

use crate::store::StoreError;
use crate::types::DocumentState;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docqr-pipeline library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::types::PageOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Ingest errors ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is neither a PDF nor a raster image.
    #[error("File is not a PDF or a supported image: '{path}'\nFirst bytes: {magic:?}")]
    NotADocument { path: PathBuf, magic: [u8; 4] },

    // ── Stage errors ──────────────────────────────────────────────────────
    /// Document-level rendering failure. Fatal: partial page sets are never
    /// returned from conversion.
    #[error("Conversion failed for '{key}': {detail}")]
    ConversionFailed { key: String, detail: String },

    /// One or more pages failed during extraction. Carries exactly the
    /// failed page indexes (1-based) for operator diagnosis.
    #[error("Extraction failed for {} page(s): {pages:?}", pages.len())]
    PartialExtractionFailure { pages: Vec<usize> },

    /// The durable write of the validation record failed. Surfaced to the
    /// caller so the trigger layer can re-deliver; the pipeline is
    /// idempotent per document key, so a full restart is always safe.
    #[error("Failed to persist record '{pk}': {source}")]
    PersistFailed {
        pk: String,
        #[source]
        source: StoreError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An extraction engine could not be constructed (missing or corrupt
    /// model files).
    #[error("Extraction engine setup failed: {0}")]
    EngineSetup(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The terminal document state corresponding to this error.
    ///
    /// Errors raised before conversion starts (ingest, config) map to
    /// [`DocumentState::ConversionFailed`] since that is the first stage
    /// the document never got through.
    pub fn terminal_state(&self) -> DocumentState {
        match self {
            PipelineError::PartialExtractionFailure { .. } => {
                DocumentState::PartialExtractionFailure
            }
            PipelineError::PersistFailed { .. } => DocumentState::PersistFailed,
            _ => DocumentState::ConversionFailed,
        }
    }
}

/// A captured failure for a single page.
///
/// Stored inside [`crate::types::PageOutcome::Failed`] when a page fails.
/// Extraction continues for all other pages; aggregation decides what the
/// captured failures mean for the document.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page image could not be fetched from the blob store.
    #[error("Page {page}: fetch failed: {detail}")]
    FetchFailed { page: usize, detail: String },

    /// The page image bytes could not be decoded at all.
    ///
    /// Benign cases (a readable image with no text and no QR codes) are
    /// *not* errors — both extraction fields simply come back empty.
    #[error("Page {page}: unreadable image: {detail}")]
    UnreadableImage { page: usize, detail: String },

    /// The transform itself failed (engine error, panicked task).
    #[error("Page {page}: transform failed: {detail}")]
    TransformFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-based index of the page this failure belongs to.
    pub fn page_index(&self) -> usize {
        match self {
            PageError::FetchFailed { page, .. }
            | PageError::UnreadableImage { page, .. }
            | PageError::TransformFailed { page, .. } => *page,
        }
    }

    /// Stable machine-readable kind, used in logs and failure summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PageError::FetchFailed { .. } => "fetch_failed",
            PageError::UnreadableImage { .. } => "unreadable_image",
            PageError::TransformFailed { .. } => "transform_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_extraction_failure_display() {
        let e = PipelineError::PartialExtractionFailure { pages: vec![2, 5] };
        let msg = e.to_string();
        assert!(msg.contains("2 page(s)"), "got: {msg}");
        assert!(msg.contains("[2, 5]"), "got: {msg}");
    }

    #[test]
    fn conversion_failed_display() {
        let e = PipelineError::ConversionFailed {
            key: "uploads/bad.pdf".into(),
            detail: "corrupt xref".into(),
        };
        assert!(e.to_string().contains("uploads/bad.pdf"));
        assert!(e.to_string().contains("corrupt xref"));
    }

    #[test]
    fn page_error_index_and_kind() {
        let e = PageError::UnreadableImage {
            page: 3,
            detail: "truncated PNG".into(),
        };
        assert_eq!(e.page_index(), 3);
        assert_eq!(e.kind(), "unreadable_image");
    }

    #[test]
    fn terminal_states() {
        assert_eq!(
            PipelineError::PartialExtractionFailure { pages: vec![1] }.terminal_state(),
            DocumentState::PartialExtractionFailure
        );
        assert_eq!(
            PipelineError::ConversionFailed {
                key: "k".into(),
                detail: "d".into()
            }
            .terminal_state(),
            DocumentState::ConversionFailed
        );
    }
}
