//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! real-time events as the extraction stage fans out over pages.
//!
//! Callbacks are the least-invasive integration point: callers can forward
//! events to a channel, a WebSocket, or a terminal progress bar without the
//! library knowing how the host application communicates. The trait is
//! `Send + Sync` because page events fire concurrently from worker tasks.

use std::sync::Arc;

/// Called by the extraction stage as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_page_complete` and `on_page_failed` may be
/// called concurrently from different threads; implementations must protect
/// shared mutable state with appropriate synchronisation primitives.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before any page is dispatched.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page's transform is invoked.
    fn on_page_start(&self, page_index: usize, total_pages: usize) {
        let _ = (page_index, total_pages);
    }

    /// Called when a page scan completes. `text_len` is the byte length of
    /// the extracted text and `qr_count` the number of decoded payloads.
    fn on_page_complete(&self, page_index: usize, total_pages: usize, text_len: usize, qr_count: usize) {
        let _ = (page_index, total_pages, text_len, qr_count);
    }

    /// Called when a page's outcome is a captured failure.
    fn on_page_failed(&self, page_index: usize, total_pages: usize, error: &str) {
        let _ = (page_index, total_pages, error);
    }

    /// Called once after every page has reported an outcome.
    fn on_extraction_complete(&self, total_pages: usize, failed_pages: usize) {
        let _ = (total_pages, failed_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
