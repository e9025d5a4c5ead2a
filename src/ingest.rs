//! Ingest: normalise a user-supplied path or URL and stage it in the blob
//! store, where the pipeline picks it up.
//!
//! Mirrors how documents enter the production system — an upload under the
//! `uploads/` prefix whose key then becomes the partition key of the final
//! record. URL inputs are downloaded to a `TempDir` first so cleanup
//! happens automatically when the resolved handle is dropped, even on
//! panic. PDF inputs are magic-byte checked before staging so callers get
//! a typed error rather than a renderer crash later.

use crate::error::PipelineError;
use crate::store::{content_type_for_key, BlobStore};
use crate::types::DocumentRef;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// Key prefix for staged source documents.
pub const UPLOAD_PREFIX: &str = "uploads";

/// The resolved input — either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedDocument {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the file lives in a temp directory that is kept
    /// alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedDocument {
    /// Path to the document file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedDocument::Local(p) => p,
            ResolvedDocument::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn is_raster_filename(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".png", ".jpg", ".jpeg"].iter().any(|ext| lower.ends_with(ext))
}

/// Resolve the input string to a local document file.
///
/// If the input is a URL, download it to a temporary directory. If it is a
/// local file, validate it exists and is readable.
pub async fn resolve_document(
    input: &str,
    timeout_secs: u64,
) -> Result<ResolvedDocument, PipelineError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedDocument, PipelineError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(PipelineError::FileNotFound { path });
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !is_raster_filename(&file_name) {
        // Non-image inputs must be PDFs; check the magic bytes up front.
        use std::io::Read;
        let mut magic = [0u8; 4];
        let mut file = std::fs::File::open(&path)
            .map_err(|_| PipelineError::FileNotFound { path: path.clone() })?;
        if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
            return Err(PipelineError::NotADocument { path, magic });
        }
    }

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedDocument::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedDocument, PipelineError> {
    info!("Downloading document from: {url}");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PipelineError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = extract_filename(url);

    let temp_dir = TempDir::new().map_err(|e| PipelineError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !is_raster_filename(&filename) && (bytes.len() < 4 || &bytes[..4] != b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(PipelineError::NotADocument {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| PipelineError::Internal(format!("failed to write temp file: {e}")))?;
    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedDocument::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Extract a reasonable filename from the URL path, defaulting to
/// `downloaded.pdf` when the last segment carries no extension.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

/// Resolve `input` and stage it in the blob store under
/// `uploads/{filename}`, returning the [`DocumentRef`] the pipeline
/// consumes. The staged key is also the partition key of the final record.
pub async fn stage_document(
    blob_store: &Arc<dyn BlobStore>,
    location: &str,
    input: &str,
    timeout_secs: u64,
) -> Result<DocumentRef, PipelineError> {
    let resolved = resolve_document(input, timeout_secs).await?;
    let path = resolved.path();

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PipelineError::InvalidInput {
            input: input.to_string(),
        })?;
    let key = format!("{UPLOAD_PREFIX}/{filename}");

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::Internal(format!("failed to read document: {e}")))?;

    blob_store
        .put(location, &key, bytes, content_type_for_key(&key))
        .await
        .map_err(|e| PipelineError::Internal(format!("failed to stage document: {e}")))?;
    info!("Staged '{input}' as '{key}'");

    Ok(DocumentRef::new(location, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;
    use std::io::Write;

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_extraction() {
        assert_eq!(extract_filename("https://x.example/a/b/report.pdf"), "report.pdf");
        assert_eq!(extract_filename("https://x.example/a/b/"), "downloaded.pdf");
        assert_eq!(extract_filename("https://x.example/noext"), "downloaded.pdf");
    }

    #[test]
    fn missing_local_file_is_typed() {
        let err = resolve_local("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not a pdf at all").unwrap();

        let err = resolve_local(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, PipelineError::NotADocument { .. }));
    }

    #[test]
    fn raster_files_skip_the_magic_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"png-ish bytes").unwrap();

        let resolved = resolve_local(path.to_str().unwrap()).unwrap();
        assert_eq!(resolved.path(), path);
    }

    #[tokio::test]
    async fn stage_document_uses_uploads_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        std::fs::write(&path, b"%PDF-1.7 content").unwrap();

        let memory = Arc::new(MemoryBlobStore::new());
        let blob_store: Arc<dyn BlobStore> = memory.clone();
        let doc = stage_document(&blob_store, "docs", path.to_str().unwrap(), 5)
            .await
            .unwrap();

        assert_eq!(doc.key, "uploads/invoice.pdf");
        assert_eq!(doc.location, "docs");
        assert_eq!(
            memory.get("docs", "uploads/invoice.pdf").await.unwrap(),
            b"%PDF-1.7 content"
        );
    }
}
