//! The per-document coordinator: drives conversion → extraction →
//! aggregation → validation and persists the final record.
//!
//! One coordinator invocation owns the full lifecycle of one document's
//! in-flight entities; nothing is shared across documents. The state
//! machine is strictly linear — no state is skipped — and a stage failure
//! transitions straight to its terminal failure state, halting the
//! pipeline for that document. Extraction is failure-isolated per page,
//! but the document as a whole is fail-fast.
//!
//! Re-running the same document is always safe: the record store contract
//! is idempotent overwrite by partition key, and every stage is a pure
//! function of the source document, so a re-delivery after `PersistFailed`
//! produces an identical record.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::{ConvertedEvent, OriginalRef, PersistedRecord, ValidationInputEvent};
use crate::pipeline::aggregate::aggregate_pages;
use crate::pipeline::convert::{convert_document, DocumentRenderer};
use crate::pipeline::extract::extract_pages;
use crate::pipeline::transform::PageTransform;
use crate::pipeline::validate::validate_document;
use crate::store::{BlobStore, RecordStore};
use crate::types::{DocumentRef, DocumentState, PageOutcome, PageScan, RunStats};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// The record as durably written.
    pub record: PersistedRecord,
    /// Always [`DocumentState::Persisted`]; failures come back as errors.
    pub state: DocumentState,
    pub stats: RunStats,
}

/// Drives the processing pipeline for one document at a time.
///
/// All collaborators are injected: blob store, record store, renderer, and
/// page transform are trait objects so each stage is independently
/// testable and the coordinator itself contains no I/O code.
pub struct PipelineCoordinator {
    blob_store: Arc<dyn BlobStore>,
    record_store: Arc<dyn RecordStore>,
    renderer: Arc<dyn DocumentRenderer>,
    transform: Arc<dyn PageTransform>,
    config: PipelineConfig,
}

impl PipelineCoordinator {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        record_store: Arc<dyn RecordStore>,
        renderer: Arc<dyn DocumentRenderer>,
        transform: Arc<dyn PageTransform>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            blob_store,
            record_store,
            renderer,
            transform,
            config,
        }
    }

    /// Process one document end to end.
    ///
    /// On success the validation record has been durably written exactly
    /// once under the document's key. On failure the returned error names
    /// the failed stage (and page indexes where applicable); no partial
    /// record is ever persisted.
    pub async fn run(&self, doc: &DocumentRef) -> Result<PipelineRun, PipelineError> {
        match self.run_inner(doc).await {
            Ok(run) => Ok(run),
            Err(err) => {
                warn!(
                    "Pipeline halted for '{}' in state '{}': {}",
                    doc.key,
                    err.terminal_state(),
                    err
                );
                Err(err)
            }
        }
    }

    async fn run_inner(&self, doc: &DocumentRef) -> Result<PipelineRun, PipelineError> {
        let total_start = Instant::now();
        let mut state = DocumentState::Received;
        info!("Processing document '{}' from '{}'", doc.key, doc.location);

        // ── Step 1: Convert to page images ───────────────────────────────
        state = transition(&doc.key, state, DocumentState::Converting);
        let convert_start = Instant::now();
        let pages = convert_document(&self.blob_store, &self.renderer, &self.config, doc).await?;
        let convert_duration_ms = convert_start.elapsed().as_millis() as u64;
        debug!(event = ?ConvertedEvent::from_pages(&pages), "Conversion stage complete");

        // ── Step 2: Extract text + QR payloads per page ──────────────────
        state = transition(&doc.key, state, DocumentState::Extracting);
        let extract_start = Instant::now();
        let outcomes = extract_pages(&self.blob_store, &self.transform, &self.config, &pages).await;
        let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

        // ── Step 3: Aggregate into document text and QR set ──────────────
        state = transition(&doc.key, state, DocumentState::Aggregating);
        let aggregated = aggregate_pages(&outcomes)?;

        // ── Step 4: Validate QR links against parsed key-values ──────────
        state = transition(&doc.key, state, DocumentState::Validating);
        let scans = successful_scans(&outcomes);
        let validation_input = ValidationInputEvent::new(
            OriginalRef {
                bucket: doc.location.clone(),
                key: doc.key.clone(),
            },
            &scans,
        );
        debug!(event = ?validation_input, "Validation stage input");
        let outcome = validate_document(&doc.key, &aggregated, self.config.link_predicate.as_ref());

        // ── Step 5: Persist the record ───────────────────────────────────
        let record = PersistedRecord::from(&outcome);
        self.record_store
            .put_record(&record.pk, &record)
            .await
            .map_err(|source| PipelineError::PersistFailed {
                pk: record.pk.clone(),
                source,
            })?;
        state = transition(&doc.key, state, DocumentState::Persisted);

        let stats = RunStats {
            total_pages: pages.len(),
            qr_payloads: aggregated.qr_set.len(),
            valid_links: record.valid_links.len(),
            invalid_links: record.invalid_links.len(),
            key_values: record.key_values.len(),
            convert_duration_ms,
            extract_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Persisted '{}': {} page(s), {} valid / {} invalid link(s), {}ms total",
            record.pk,
            stats.total_pages,
            stats.valid_links,
            stats.invalid_links,
            stats.total_duration_ms
        );

        Ok(PipelineRun {
            record,
            state,
            stats,
        })
    }
}

fn transition(key: &str, from: DocumentState, to: DocumentState) -> DocumentState {
    debug!("Document '{key}' state: {from} -> {to}");
    to
}

/// The scans of an all-successful outcome sequence, in page order.
fn successful_scans(outcomes: &[PageOutcome]) -> Vec<PageScan> {
    let mut scans: Vec<PageScan> = outcomes
        .iter()
        .filter_map(|o| match o {
            PageOutcome::Scanned(scan) => Some(scan.clone()),
            PageOutcome::Failed(_) => None,
        })
        .collect();
    scans.sort_by_key(|s| s.page_index);
    scans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;
    use crate::store::{MemoryBlobStore, MemoryRecordStore};
    use crate::types::PageScan;
    use image::{DynamicImage, RgbaImage};

    struct StubRenderer {
        pages: usize,
    }

    impl DocumentRenderer for StubRenderer {
        fn render(&self, _bytes: &[u8], _max_pixels: u32) -> Result<Vec<DynamicImage>, String> {
            Ok((0..self.pages)
                .map(|_| DynamicImage::ImageRgba8(RgbaImage::new(4, 4)))
                .collect())
        }
    }

    /// Transform scripted by page index, independent of image bytes.
    struct IndexedTransform {
        script: Vec<Result<(&'static str, Vec<&'static str>), ()>>,
    }

    impl PageTransform for IndexedTransform {
        fn scan_page(&self, page_index: usize, _bytes: &[u8]) -> Result<PageScan, PageError> {
            match &self.script[page_index - 1] {
                Ok((text, qrs)) => Ok(PageScan {
                    page_index,
                    text: text.to_string(),
                    qr_payloads: qrs.iter().map(|s| s.to_string()).collect(),
                }),
                Err(()) => Err(PageError::UnreadableImage {
                    page: page_index,
                    detail: "scripted".into(),
                }),
            }
        }
    }

    async fn coordinator_with(
        script: Vec<Result<(&'static str, Vec<&'static str>), ()>>,
    ) -> (PipelineCoordinator, Arc<MemoryRecordStore>, DocumentRef) {
        let blob_store = Arc::new(MemoryBlobStore::new());
        blob_store
            .put("docs", "uploads/doc.pdf", b"%PDF stub".to_vec(), "application/pdf")
            .await
            .unwrap();
        let record_store = Arc::new(MemoryRecordStore::new());
        let pages = script.len();
        let coordinator = PipelineCoordinator::new(
            blob_store,
            record_store.clone(),
            Arc::new(StubRenderer { pages }),
            Arc::new(IndexedTransform { script }),
            PipelineConfig::default(),
        );
        (coordinator, record_store, DocumentRef::new("docs", "uploads/doc.pdf"))
    }

    #[tokio::test]
    async fn happy_path_reaches_persisted() {
        let (coordinator, record_store, doc) = coordinator_with(vec![
            Ok(("Order:99", vec!["http://x/99"])),
            Ok(("Note: fine", vec![])),
        ])
        .await;

        let run = coordinator.run(&doc).await.unwrap();

        assert_eq!(run.state, DocumentState::Persisted);
        assert_eq!(run.stats.total_pages, 2);
        assert_eq!(run.record.valid_links, vec!["http://x/99".to_string()]);

        let stored = record_store.get_record("uploads/doc.pdf").await.unwrap();
        assert_eq!(stored.unwrap(), run.record);
    }

    #[tokio::test]
    async fn page_failure_halts_before_validation_and_persists_nothing() {
        let (coordinator, record_store, doc) =
            coordinator_with(vec![Ok(("fine", vec![])), Err(())]).await;

        let err = coordinator.run(&doc).await.unwrap_err();
        match err {
            PipelineError::PartialExtractionFailure { pages } => assert_eq!(pages, vec![2]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(record_store.get_record("uploads/doc.pdf").await.unwrap().is_none());
    }
}
