//! Conversion stage: turn one source document into an ordered sequence of
//! page images in the blob store.
//!
//! Two paths:
//!
//! * **Raster short-circuit** — a source key whose extension marks it as an
//!   image already is returned as a single page aliasing the original
//!   object. No rendering, no re-encoding, no storage duplication, and the
//!   operation is trivially idempotent.
//! * **Rendering** — otherwise every page is rasterised in order via the
//!   injected [`DocumentRenderer`], PNG-encoded, and stored under
//!   `{prefix}/{stem}-page-{index}.png`. A failure on any page is fatal to
//!   the whole conversion; partial page sets are never returned.
//!
//! Rendering runs inside `spawn_blocking`: pdfium wraps a C++ library with
//! thread-local state that must not run on async worker threads.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::store::BlobStore;
use crate::types::{DocumentRef, PageImageRef};
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info};

/// Rasterise a document's pages, in order.
///
/// Returns one image per page or a human-readable failure description; the
/// stage wraps the latter into [`PipelineError::ConversionFailed`].
/// Implementations are blocking and are always called from the blocking
/// thread pool.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, bytes: &[u8], max_pixels: u32) -> Result<Vec<DynamicImage>, String>;
}

/// Convert one document into page image references.
pub async fn convert_document(
    blob_store: &Arc<dyn BlobStore>,
    renderer: &Arc<dyn DocumentRenderer>,
    config: &PipelineConfig,
    doc: &DocumentRef,
) -> Result<Vec<PageImageRef>, PipelineError> {
    if config.is_raster_key(&doc.key) {
        info!("'{}' is already an image - skipping render", doc.key);
        return Ok(vec![PageImageRef {
            location: doc.location.clone(),
            key: doc.key.clone(),
            page_index: 1,
        }]);
    }

    let bytes = blob_store
        .get(&doc.location, &doc.key)
        .await
        .map_err(|e| PipelineError::ConversionFailed {
            key: doc.key.clone(),
            detail: format!("failed to fetch document: {e}"),
        })?;

    let renderer = Arc::clone(renderer);
    let max_pixels = config.max_rendered_pixels;
    let images = tokio::task::spawn_blocking(move || renderer.render(&bytes, max_pixels))
        .await
        .map_err(|e| PipelineError::Internal(format!("render task panicked: {e}")))?
        .map_err(|detail| PipelineError::ConversionFailed {
            key: doc.key.clone(),
            detail,
        })?;

    if images.is_empty() {
        return Err(PipelineError::ConversionFailed {
            key: doc.key.clone(),
            detail: "document has no pages".into(),
        });
    }
    info!("Rendered {} page(s) from '{}'", images.len(), doc.key);

    let mut pages = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let page_index = i + 1;
        let png = encode_png(image).map_err(|e| PipelineError::ConversionFailed {
            key: doc.key.clone(),
            detail: format!("PNG encoding failed for page {page_index}: {e}"),
        })?;

        let page_key = derived_page_key(&config.processed_prefix, &doc.key, page_index);
        blob_store
            .put(&doc.location, &page_key, png, "image/png")
            .await
            .map_err(|e| PipelineError::ConversionFailed {
                key: doc.key.clone(),
                detail: format!("failed to store page {page_index}: {e}"),
            })?;
        debug!("Rendered page {page_index} -> {page_key}");

        pages.push(PageImageRef {
            location: doc.location.clone(),
            key: page_key,
            page_index,
        });
    }

    Ok(pages)
}

/// PNG-encode a rendered page. Lossless on purpose: compression artefacts
/// on rendered text degrade OCR accuracy far more than file size matters.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Derived storage key for rendered page `page_index` of `original_key`:
/// `{prefix}/{stem}-page-{index}.png`, where the stem is the original key
/// minus its extension (directories included).
pub fn derived_page_key(prefix: &str, original_key: &str, page_index: usize) -> String {
    format!("{prefix}/{}-page-{page_index}.png", strip_extension(original_key))
}

fn strip_extension(key: &str) -> &str {
    let file_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[file_start..].rfind('.') {
        // A leading dot names a hidden file, not an extension.
        Some(dot) if dot > 0 => &key[..file_start + dot],
        _ => key,
    }
}

// ── pdfium-backed renderer ───────────────────────────────────────────────

pub use pdfium::PdfiumRenderer;

mod pdfium {
    use super::DocumentRenderer;
    use image::DynamicImage;
    use pdfium_render::prelude::*;
    use std::path::Path;

    /// Renders PDF pages via the pdfium library.
    ///
    /// The pdfium binding is created per render call; `pdfium-render`
    /// resolves the shared library at runtime (system path or
    /// `PDFIUM_LIB_PATH`). The binding holds thread-local state, which is
    /// why [`DocumentRenderer`] implementations run inside
    /// `spawn_blocking`.
    pub struct PdfiumRenderer;

    impl PdfiumRenderer {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for PdfiumRenderer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DocumentRenderer for PdfiumRenderer {
        fn render(&self, bytes: &[u8], max_pixels: u32) -> Result<Vec<DynamicImage>, String> {
            // pdfium wants a file-system path; a TempDir guarantees cleanup
            // on every exit path, panics included.
            let temp_dir = tempfile::TempDir::new().map_err(|e| format!("tempdir: {e}"))?;
            let pdf_path = temp_dir.path().join("document.pdf");
            std::fs::write(&pdf_path, bytes).map_err(|e| format!("temp write: {e}"))?;

            render_file(&pdf_path, max_pixels)
        }
    }

    fn render_file(pdf_path: &Path, max_pixels: u32) -> Result<Vec<DynamicImage>, String> {
        let pdfium = Pdfium::default();
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| format!("failed to open document: {e:?}"))?;

        let pages = document.pages();
        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (i, page) in pages.iter().enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| format!("rasterisation failed for page {}: {e:?}", i + 1))?;
            images.push(bitmap.as_image());
        }

        Ok(images)
    }
}
