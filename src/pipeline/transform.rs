//! The per-page extraction contract and its engine-backed implementation.
//!
//! [`PageTransform`] is the seam between the pipeline and whatever does the
//! actual optical work. The pipeline core never depends on a specific OCR
//! or QR library — tests and embedders inject their own transform; the
//! `engines` feature provides [`EngineTransform`], which combines:
//!
//! * `ocrs` + `rten` for text recognition (pure-Rust neural OCR; the
//!   engine loads two `.rten` model files once and is reused per page), and
//! * `rqrr` for QR detection/decoding on the grayscale image.
//!
//! The trait is synchronous on purpose: implementations are CPU-bound, and
//! the extraction stage moves each call onto the blocking thread pool so
//! async workers are never stalled.

use crate::error::PageError;
use crate::types::PageScan;

/// Extract text and QR payloads from one page image.
///
/// Contract: benign empty results (a readable image with no text and no QR
/// codes) are `Ok` with empty fields; [`PageError::UnreadableImage`] is
/// returned only when the bytes cannot be decoded as an image at all.
/// Implementations must be side-effect-free beyond transient I/O.
pub trait PageTransform: Send + Sync {
    fn scan_page(&self, page_index: usize, image_bytes: &[u8]) -> Result<PageScan, PageError>;
}

#[cfg(feature = "engines")]
pub use engine::{EngineTransform, OcrModelConfig};

#[cfg(feature = "engines")]
mod engine {
    use super::PageTransform;
    use crate::error::{PageError, PipelineError};
    use crate::types::PageScan;
    use image::DynamicImage;
    use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
    use rten::Model;
    use std::path::{Path, PathBuf};
    use tracing::{debug, info};

    const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
    const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

    /// Locations of the two `.rten` model files the OCR engine needs.
    ///
    /// The default points at the `ocrs` cache directory
    /// (`$XDG_CACHE_HOME/ocrs`, typically `~/.cache/ocrs`), which is where
    /// a one-off `ocrs-cli` run downloads them.
    #[derive(Debug, Clone)]
    pub struct OcrModelConfig {
        pub detection_model_path: PathBuf,
        pub recognition_model_path: PathBuf,
    }

    impl Default for OcrModelConfig {
        fn default() -> Self {
            Self::from_dir(default_model_dir())
        }
    }

    impl OcrModelConfig {
        /// Expects `dir` to contain `text-detection.rten` and
        /// `text-recognition.rten`.
        pub fn from_dir(dir: impl AsRef<Path>) -> Self {
            let dir = dir.as_ref();
            Self {
                detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
                recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
            }
        }

        /// Verify that both model files exist.
        pub fn validate(&self) -> Result<(), PipelineError> {
            for path in [&self.detection_model_path, &self.recognition_model_path] {
                if !path.exists() {
                    return Err(PipelineError::EngineSetup(format!(
                        "OCR model not found at {}; run `ocrs-cli` once to download models",
                        path.display()
                    )));
                }
            }
            Ok(())
        }
    }

    fn default_model_dir() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            PathBuf::from(xdg).join("ocrs")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".cache").join("ocrs")
        } else {
            PathBuf::from("ocrs-models")
        }
    }

    /// The real page transform: ocrs OCR plus rqrr QR decoding.
    ///
    /// Model loading is the expensive step — construct once, share via
    /// `Arc`, reuse for every page of every document.
    pub struct EngineTransform {
        ocr: OcrEngine,
    }

    impl EngineTransform {
        /// Load OCR models from the paths in `config`.
        pub fn new(config: OcrModelConfig) -> Result<Self, PipelineError> {
            config.validate()?;

            info!("Loading OCR models");
            let detection_model = Model::load_file(&config.detection_model_path).map_err(|e| {
                PipelineError::EngineSetup(format!(
                    "failed to load detection model from {}: {e}",
                    config.detection_model_path.display()
                ))
            })?;
            let recognition_model =
                Model::load_file(&config.recognition_model_path).map_err(|e| {
                    PipelineError::EngineSetup(format!(
                        "failed to load recognition model from {}: {e}",
                        config.recognition_model_path.display()
                    ))
                })?;

            let ocr = OcrEngine::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                ..Default::default()
            })
            .map_err(|e| PipelineError::EngineSetup(format!("failed to initialise OCR engine: {e}")))?;

            Ok(Self { ocr })
        }

        /// Load OCR models from the default cache directory.
        pub fn with_defaults() -> Result<Self, PipelineError> {
            Self::new(OcrModelConfig::default())
        }

        fn recognize_text(&self, page_index: usize, image: &DynamicImage) -> Result<String, PageError> {
            let rgb = image.to_rgb8();
            let (width, height) = rgb.dimensions();

            let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|e| {
                PageError::TransformFailed {
                    page: page_index,
                    detail: format!("OCR image source ({width}x{height}): {e}"),
                }
            })?;
            let input = self
                .ocr
                .prepare_input(source)
                .map_err(|e| PageError::TransformFailed {
                    page: page_index,
                    detail: format!("OCR preprocessing: {e}"),
                })?;
            self.ocr
                .get_text(&input)
                .map_err(|e| PageError::TransformFailed {
                    page: page_index,
                    detail: format!("OCR recognition: {e}"),
                })
        }

        fn decode_qr(&self, page_index: usize, image: &DynamicImage) -> Vec<String> {
            let luma = image.to_luma8();
            let (width, height) = luma.dimensions();
            let mut prepared =
                rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                    luma.get_pixel(x as u32, y as u32).0[0]
                });
            let grids = prepared.detect_grids();
            let mut payloads = Vec::with_capacity(grids.len());
            for grid in grids {
                match grid.decode() {
                    Ok((_meta, content)) => payloads.push(content),
                    // A grid that fails to decode is treated like no QR
                    // code at all, matching the benign-empty contract.
                    Err(e) => debug!("Page {page_index}: undecodable QR grid: {e}"),
                }
            }
            payloads
        }
    }

    impl PageTransform for EngineTransform {
        fn scan_page(&self, page_index: usize, image_bytes: &[u8]) -> Result<PageScan, PageError> {
            let image =
                image::load_from_memory(image_bytes).map_err(|e| PageError::UnreadableImage {
                    page: page_index,
                    detail: e.to_string(),
                })?;

            let text = self.recognize_text(page_index, &image)?;
            let qr_payloads = self.decode_qr(page_index, &image);
            debug!(
                "Page {page_index}: {} text bytes, {} QR payload(s)",
                text.len(),
                qr_payloads.len()
            );

            Ok(PageScan {
                page_index,
                text,
                qr_payloads,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn model_config_from_dir() {
            let config = OcrModelConfig::from_dir("/tmp/models");
            assert_eq!(
                config.detection_model_path,
                PathBuf::from("/tmp/models/text-detection.rten")
            );
            assert_eq!(
                config.recognition_model_path,
                PathBuf::from("/tmp/models/text-recognition.rten")
            );
        }

        #[test]
        fn validate_reports_missing_models() {
            let config = OcrModelConfig::from_dir("/nonexistent/ocr-models");
            assert!(config.validate().is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTransform;

    impl PageTransform for EchoTransform {
        fn scan_page(&self, page_index: usize, image_bytes: &[u8]) -> Result<PageScan, PageError> {
            Ok(PageScan {
                page_index,
                text: String::from_utf8_lossy(image_bytes).into_owned(),
                qr_payloads: vec![],
            })
        }
    }

    #[test]
    fn trait_objects_are_injectable() {
        let transform: Box<dyn PageTransform> = Box::new(EchoTransform);
        let scan = transform.scan_page(1, b"hello").unwrap();
        assert_eq!(scan.page_index, 1);
        assert_eq!(scan.text, "hello");
    }
}
