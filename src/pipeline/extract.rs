//! Extraction stage: fan-out the page transform over all pages, fan-in
//! every outcome.
//!
//! Every page is dispatched as an independent task; `buffer_unordered`
//! bounds how many are in flight at once so page count never translates
//! into unbounded memory or blob-store pressure. One page's failure never
//! aborts the others — each outcome is captured where it happened — and
//! the stage returns only after *all* pages have reported, because the
//! aggregation stage needs to observe every page before anything becomes
//! fatal. No internal retries: re-delivery is the trigger layer's job.
//!
//! The returned sequence is re-sorted by page index. Completion order of
//! concurrent tasks is nondeterministic and is never allowed to leak into
//! the document-level result.

use crate::config::PipelineConfig;
use crate::error::PageError;
use crate::pipeline::transform::PageTransform;
use crate::store::BlobStore;
use crate::types::{PageImageRef, PageOutcome};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Run the page transform over every page, concurrently.
///
/// Returns exactly one [`PageOutcome`] per input page, ordered by page
/// index.
pub async fn extract_pages(
    blob_store: &Arc<dyn BlobStore>,
    transform: &Arc<dyn PageTransform>,
    config: &PipelineConfig,
    pages: &[PageImageRef],
) -> Vec<PageOutcome> {
    let total = pages.len();
    debug!("Extracting {total} page(s) with concurrency {}", config.concurrency);
    if let Some(cb) = &config.progress_callback {
        cb.on_extraction_start(total);
    }

    let mut outcomes: Vec<PageOutcome> = stream::iter(pages.iter().cloned().map(|page| {
        let blob_store = Arc::clone(blob_store);
        let transform = Arc::clone(transform);
        let progress = config.progress_callback.clone();
        async move {
            if let Some(cb) = &progress {
                cb.on_page_start(page.page_index, total);
            }
            let outcome = scan_one_page(&blob_store, &transform, &page).await;
            match &outcome {
                PageOutcome::Scanned(scan) => {
                    if let Some(cb) = &progress {
                        cb.on_page_complete(scan.page_index, total, scan.text.len(), scan.qr_payloads.len());
                    }
                }
                PageOutcome::Failed(err) => {
                    warn!("Page outcome captured as failure: {err}");
                    if let Some(cb) = &progress {
                        cb.on_page_failed(err.page_index(), total, &err.to_string());
                    }
                }
            }
            outcome
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    // Deterministic ordering by page index, not arrival order.
    outcomes.sort_by_key(|o| o.page_index());

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    if let Some(cb) = &config.progress_callback {
        cb.on_extraction_complete(total, failed);
    }
    outcomes
}

/// Fetch one page image and run the transform on the blocking pool.
///
/// Never returns an error — every failure mode is captured as a
/// [`PageOutcome::Failed`].
async fn scan_one_page(
    blob_store: &Arc<dyn BlobStore>,
    transform: &Arc<dyn PageTransform>,
    page: &PageImageRef,
) -> PageOutcome {
    let bytes = match blob_store.get(&page.location, &page.key).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return PageOutcome::Failed(PageError::FetchFailed {
                page: page.page_index,
                detail: e.to_string(),
            })
        }
    };

    let transform = Arc::clone(transform);
    let page_index = page.page_index;
    match tokio::task::spawn_blocking(move || transform.scan_page(page_index, &bytes)).await {
        Ok(Ok(scan)) => PageOutcome::Scanned(scan),
        Ok(Err(err)) => PageOutcome::Failed(err),
        Err(join_err) => PageOutcome::Failed(PageError::TransformFailed {
            page: page_index,
            detail: format!("transform task panicked: {join_err}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;
    use crate::types::PageScan;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Transform that reads the staged bytes as UTF-8: lines starting with
    /// `QR:` become payloads, a `FAIL` body becomes an unreadable page.
    /// Sleeps briefly so later pages routinely finish before earlier ones.
    struct ScriptedTransform {
        delay_ms: u64,
    }

    impl PageTransform for ScriptedTransform {
        fn scan_page(&self, page_index: usize, image_bytes: &[u8]) -> Result<PageScan, PageError> {
            if self.delay_ms > 0 {
                // Stagger completion inversely to page order.
                std::thread::sleep(Duration::from_millis(
                    self.delay_ms * (10 - page_index as u64 % 10),
                ));
            }
            let body = String::from_utf8_lossy(image_bytes);
            if body.starts_with("FAIL") {
                return Err(PageError::UnreadableImage {
                    page: page_index,
                    detail: "scripted failure".into(),
                });
            }
            let mut text_lines = Vec::new();
            let mut qr_payloads = Vec::new();
            for line in body.lines() {
                match line.strip_prefix("QR:") {
                    Some(payload) => qr_payloads.push(payload.to_string()),
                    None => text_lines.push(line),
                }
            }
            Ok(PageScan {
                page_index,
                text: text_lines.join("\n"),
                qr_payloads,
            })
        }
    }

    async fn stage_pages(store: &MemoryBlobStore, bodies: &[&str]) -> Vec<PageImageRef> {
        let mut pages = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            let key = format!("processed/doc-page-{}.png", i + 1);
            store
                .put("docs", &key, body.as_bytes().to_vec(), "image/png")
                .await
                .unwrap();
            pages.push(PageImageRef {
                location: "docs".into(),
                key,
                page_index: i + 1,
            });
        }
        pages
    }

    #[tokio::test]
    async fn one_outcome_per_page_in_index_order() {
        let memory = Arc::new(MemoryBlobStore::new());
        let pages = stage_pages(&memory, &["one", "two", "three", "four"]).await;
        let blob_store: Arc<dyn BlobStore> = memory;
        let transform: Arc<dyn PageTransform> = Arc::new(ScriptedTransform { delay_ms: 5 });
        let config = PipelineConfig::builder().concurrency(4).build().unwrap();

        let outcomes = extract_pages(&blob_store, &transform, &config, &pages).await;

        assert_eq!(outcomes.len(), 4);
        let indexes: Vec<usize> = outcomes.iter().map(|o| o.page_index()).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_page() {
        let memory = Arc::new(MemoryBlobStore::new());
        let pages = stage_pages(&memory, &["good", "FAIL", "also good"]).await;
        let blob_store: Arc<dyn BlobStore> = memory;
        let transform: Arc<dyn PageTransform> = Arc::new(ScriptedTransform { delay_ms: 0 });
        let config = PipelineConfig::default();

        let outcomes = extract_pages(&blob_store, &transform, &config, &pages).await;

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_failed());
        assert!(outcomes[1].is_failed());
        assert!(!outcomes[2].is_failed());
    }

    #[tokio::test]
    async fn missing_page_image_becomes_fetch_failure() {
        let memory = Arc::new(MemoryBlobStore::new());
        let mut pages = stage_pages(&memory, &["present"]).await;
        pages.push(PageImageRef {
            location: "docs".into(),
            key: "processed/doc-page-2.png".into(),
            page_index: 2,
        });
        let blob_store: Arc<dyn BlobStore> = memory;
        let transform: Arc<dyn PageTransform> = Arc::new(ScriptedTransform { delay_ms: 0 });
        let config = PipelineConfig::default();

        let outcomes = extract_pages(&blob_store, &transform, &config, &pages).await;

        match &outcomes[1] {
            PageOutcome::Failed(PageError::FetchFailed { page, .. }) => assert_eq!(*page, 2),
            other => panic!("expected fetch failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrency_stays_within_the_configured_bound() {
        struct GaugeTransform {
            current: AtomicUsize,
            peak: AtomicUsize,
        }

        impl PageTransform for GaugeTransform {
            fn scan_page(&self, page_index: usize, _bytes: &[u8]) -> Result<PageScan, PageError> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(PageScan {
                    page_index,
                    text: String::new(),
                    qr_payloads: vec![],
                })
            }
        }

        let memory = Arc::new(MemoryBlobStore::new());
        let pages = stage_pages(&memory, &["a", "b", "c", "d", "e", "f"]).await;
        let blob_store: Arc<dyn BlobStore> = memory;
        let gauge = Arc::new(GaugeTransform {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let transform: Arc<dyn PageTransform> = gauge.clone();
        let config = PipelineConfig::builder().concurrency(2).build().unwrap();

        let outcomes = extract_pages(&blob_store, &transform, &config, &pages).await;

        assert_eq!(outcomes.len(), 6);
        assert!(
            gauge.peak.load(Ordering::SeqCst) <= 2,
            "peak concurrency {} exceeded bound",
            gauge.peak.load(Ordering::SeqCst)
        );
    }
}
