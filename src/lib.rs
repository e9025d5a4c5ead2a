//! # docqr-pipeline
//!
//! Extract text and QR codes from documents (PDF or image) and validate
//! the QR links against key-value pairs parsed from the text.
//!
//! ## Why this crate?
//!
//! Documents that carry QR codes — invoices, shipping labels, tickets —
//! routinely embed the same identifiers in both the printed text and the
//! encoded link. Cross-checking the two catches mislabeled and tampered
//! documents cheaply: a QR link with no anchor in the page text is a
//! red flag. This crate runs that cross-check as a fan-out/fan-in pipeline
//! over the document's pages and writes one durable, idempotent record per
//! document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document (PDF or image)
//!  │
//!  ├─ 1. Convert   rasterise pages via pdfium (CPU-bound, spawn_blocking),
//!  │               or alias the original key if it is already an image
//!  ├─ 2. Extract   per-page OCR + QR decode, concurrent with a bounded
//!  │               worker limit; failures captured per page, never thrown
//!  ├─ 3. Aggregate page texts joined in page order + deduplicated QR set,
//!  │               or fail listing exactly the failed pages
//!  ├─ 4. Validate  parse key-value pairs, classify each QR payload
//!  └─ 5. Persist   one record per document key, idempotent overwrite
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docqr_pipeline::{
//!     ingest, EngineTransform, PdfiumRenderer, PipelineConfig, PipelineCoordinator,
//!     FsBlobStore, JsonRecordStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let blob_store: Arc<dyn docqr_pipeline::BlobStore> =
//!         Arc::new(FsBlobStore::new(".docqr/blobs"));
//!     let record_store = Arc::new(JsonRecordStore::new(".docqr/records"));
//!     let transform = Arc::new(EngineTransform::with_defaults()?);
//!
//!     let config = PipelineConfig::default();
//!     let doc = ingest::stage_document(&blob_store, "documents", "invoice.pdf", 120).await?;
//!
//!     let coordinator = PipelineCoordinator::new(
//!         blob_store,
//!         record_store,
//!         Arc::new(PdfiumRenderer::new()),
//!         transform,
//!         config,
//!     );
//!     let run = coordinator.run(&doc).await?;
//!     println!("{} valid link(s)", run.record.valid_links.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `docqr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `engines` | on      | Real extraction: ocrs/rten OCR + rqrr QR decoding |
//!
//! Library consumers that inject their own [`PageTransform`] can disable
//! both:
//! ```toml
//! docqr-pipeline = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod ingest;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use coordinator::{PipelineCoordinator, PipelineRun};
pub use error::{PageError, PipelineError};
pub use events::{
    ConvertedEvent, OriginalRef, PageResultEvent, PersistedRecord, QrEvent, TextEvent,
    ValidationInputEvent,
};
pub use pipeline::aggregate::aggregate_pages;
pub use pipeline::convert::{convert_document, DocumentRenderer, PdfiumRenderer};
pub use pipeline::extract::extract_pages;
pub use pipeline::normalize::normalize_text;
pub use pipeline::transform::PageTransform;
pub use pipeline::validate::{
    check_qr_links, fold_key_values, parse_key_value_pairs, validate_document, KeyValuePair,
    LinkPredicate, ValueSubstring,
};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use store::{
    BlobStore, FsBlobStore, JsonRecordStore, MemoryBlobStore, MemoryRecordStore, RecordStore,
    StoreError,
};
pub use types::{
    AggregatedDocument, DocumentRef, DocumentState, PageImageRef, PageOutcome, PageScan, RunStats,
    ValidationOutcome,
};

#[cfg(feature = "engines")]
pub use pipeline::transform::{EngineTransform, OcrModelConfig};
