//! Configuration for one pipeline invocation.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, serialise the plain fields for
//! logging, and diff two runs to understand why their outputs differ.

use crate::error::PipelineError;
use crate::pipeline::validate::{LinkPredicate, ValueSubstring};
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Configuration for document processing.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docqr_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(4)
///     .max_rendered_pixels(1600)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Number of page transforms in flight at once. Default: 8.
    ///
    /// Pages are independent and CPU/IO-bound, so fanning out cuts
    /// wall-clock time roughly linearly — but each in-flight page holds its
    /// image bytes in memory and one blob-store connection, so the bound
    /// caps both. Lower it for very large page images; raise it when the
    /// blob store is fast and pages are small.
    pub concurrency: usize,

    /// Maximum rendered page dimension (width or height) in pixels. Default: 2000.
    ///
    /// A safety cap independent of the source page size. An A0 poster could
    /// rasterise to tens of thousands of pixels per edge and exhaust memory;
    /// this field caps either dimension, scaling the other proportionally.
    pub max_rendered_pixels: u32,

    /// Key prefix for rendered page images. Default: `processed`.
    ///
    /// Page `i` of `uploads/abc.pdf` is stored under
    /// `{prefix}/uploads/abc-page-{i}.png`.
    pub processed_prefix: String,

    /// Extensions (lowercase, no dot) treated as already-rasterised images.
    /// Default: `png`, `jpg`, `jpeg`.
    ///
    /// A source key with one of these extensions skips rendering entirely
    /// and is processed as a single page aliasing the original object — no
    /// re-encoding, no storage duplication.
    pub raster_extensions: Vec<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Predicate deciding whether a QR payload is a valid link with respect
    /// to the parsed key-value mapping. Default: [`ValueSubstring`].
    pub link_predicate: Arc<dyn LinkPredicate>,

    /// Optional progress callback for per-page extraction events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_rendered_pixels: 2000,
            processed_prefix: "processed".to_string(),
            raster_extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
            download_timeout_secs: 120,
            link_predicate: Arc::new(ValueSubstring),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("processed_prefix", &self.processed_prefix)
            .field("raster_extensions", &self.raster_extensions)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("link_predicate", &"<dyn LinkPredicate>")
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `key` refers to an already-rasterised image.
    pub fn is_raster_key(&self, key: &str) -> bool {
        let lower = key.to_ascii_lowercase();
        self.raster_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn processed_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.processed_prefix = prefix.into();
        self
    }

    pub fn raster_extensions(mut self, exts: Vec<String>) -> Self {
        self.config.raster_extensions = exts.into_iter().map(|e| e.to_ascii_lowercase()).collect();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn link_predicate(mut self, predicate: Arc<dyn LinkPredicate>) -> Self {
        self.config.link_predicate = predicate;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.processed_prefix.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "processed_prefix must not be empty".into(),
            ));
        }
        if c.processed_prefix.contains('/') {
            return Err(PipelineError::InvalidConfig(
                "processed_prefix must be a single path segment".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.processed_prefix, "processed");
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let config = PipelineConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn empty_prefix_rejected() {
        let result = PipelineConfig::builder().processed_prefix("").build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn nested_prefix_rejected() {
        let result = PipelineConfig::builder().processed_prefix("a/b").build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn raster_key_detection_is_case_insensitive() {
        let config = PipelineConfig::default();
        assert!(config.is_raster_key("uploads/scan.PNG"));
        assert!(config.is_raster_key("uploads/photo.jpeg"));
        assert!(!config.is_raster_key("uploads/doc.pdf"));
        assert!(!config.is_raster_key("uploads/png"));
    }

    #[test]
    fn custom_raster_extensions_lowercased() {
        let config = PipelineConfig::builder()
            .raster_extensions(vec!["TIFF".into()])
            .build()
            .unwrap();
        assert!(config.is_raster_key("x.tiff"));
        assert!(!config.is_raster_key("x.png"));
    }
}
