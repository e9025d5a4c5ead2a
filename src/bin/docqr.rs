//! CLI binary for docqr-pipeline.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, wires the filesystem-backed stores and the real
//! extraction engines, and prints the persisted record.

use anyhow::{Context, Result};
use clap::Parser;
use docqr_pipeline::{
    ingest, BlobStore, EngineTransform, FsBlobStore, JsonRecordStore, OcrModelConfig,
    PdfiumRenderer, PipelineConfig, PipelineCoordinator, PipelineProgressCallback,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar over the extraction fan-out.
/// Pages complete out of order; the bar only ever counts outcomes.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
    }

    fn on_page_complete(&self, page_index: usize, total: usize, text_len: usize, qr_count: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page_index,
            total,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{qr_count} QR")),
        ));
        self.bar.inc(1);
    }

    fn on_page_failed(&self, page_index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_index,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, failed_pages: usize) {
        self.bar.finish_and_clear();
        if failed_pages == 0 {
            eprintln!(
                "{} {} pages extracted",
                green("✔"),
                bold(&total_pages.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} failed)",
                red("✘"),
                bold(&(total_pages - failed_pages).to_string()),
                total_pages,
                red(&failed_pages.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a local document, storing blobs and records under .docqr/
  docqr invoice.pdf

  # Process a scanned image (skips PDF rendering)
  docqr scan.png

  # Process from a URL
  docqr https://files.example.com/invoice.pdf

  # JSON record on stdout, no progress bar
  docqr --json --no-progress invoice.pdf

  # Custom store root and OCR model directory
  docqr --store-dir /var/lib/docqr --ocr-models ~/models invoice.pdf

SETUP:
  OCR models (~20 MB) are loaded from ~/.cache/ocrs by default. Download
  them once with:  cargo install ocrs-cli && ocrs any-image.png
  The pdfium shared library is resolved at runtime; point PDFIUM_LIB_PATH
  at an existing copy if it is not on the default search path.
"#;

/// Extract text and QR codes from a document and validate the QR links.
#[derive(Parser, Debug)]
#[command(
    name = "docqr",
    version,
    about = "Extract text and QR codes from documents and validate QR links",
    long_about = "Convert a document (PDF or image) to page images, run OCR and QR \
decoding over every page concurrently, aggregate the results, and validate each QR \
link against key-value pairs parsed from the document text. The final record is \
persisted once per document key.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local document path (PDF, PNG, JPEG) or HTTP/HTTPS URL.
    input: String,

    /// Root directory for blobs and records.
    #[arg(long, env = "DOCQR_STORE_DIR", default_value = ".docqr")]
    store_dir: PathBuf,

    /// Logical storage location (bucket) for this document.
    #[arg(long, env = "DOCQR_BUCKET", default_value = "documents")]
    bucket: String,

    /// Number of concurrent page extractions.
    #[arg(short, long, env = "DOCQR_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Maximum rendered page dimension in pixels.
    #[arg(long, env = "DOCQR_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Directory containing text-detection.rten and text-recognition.rten.
    #[arg(long, env = "DOCQR_OCR_MODELS")]
    ocr_models: Option<PathBuf>,

    /// Print the persisted record as JSON on stdout.
    #[arg(long, env = "DOCQR_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "DOCQR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCQR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the record itself.
    #[arg(short, long, env = "DOCQR_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCQR_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active;
    // the bar provides the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build stores and engines ─────────────────────────────────────────
    let blob_store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(cli.store_dir.join("blobs")));
    let record_store = Arc::new(JsonRecordStore::new(cli.store_dir.join("records")));

    let transform = match &cli.ocr_models {
        Some(dir) => EngineTransform::new(OcrModelConfig::from_dir(dir)),
        None => EngineTransform::with_defaults(),
    }
    .context("Failed to initialise the extraction engines")?;

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .max_rendered_pixels(cli.max_pixels)
        .download_timeout_secs(cli.download_timeout);

    if show_progress {
        let cb = CliProgressCallback::new();
        builder = builder.progress_callback(cb as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Stage the document and run the pipeline ──────────────────────────
    let doc = ingest::stage_document(&blob_store, &cli.bucket, &cli.input, cli.download_timeout)
        .await
        .context("Failed to stage the document")?;

    let coordinator = PipelineCoordinator::new(
        blob_store,
        record_store,
        Arc::new(PdfiumRenderer::new()),
        Arc::new(transform),
        config,
    );

    let run = coordinator
        .run(&doc)
        .await
        .context("Pipeline failed")?;

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run.record).context("Failed to serialize record")?
        );
    } else {
        println!("Record:        {}", run.record.pk);
        println!("Pages:         {}", run.stats.total_pages);
        println!("Key-values:    {}", run.stats.key_values);
        println!(
            "Valid links:   {}",
            if run.record.valid_links.is_empty() {
                dim("(none)")
            } else {
                run.record.valid_links.join(", ")
            }
        );
        println!(
            "Invalid links: {}",
            if run.record.invalid_links.is_empty() {
                dim("(none)")
            } else {
                run.record.invalid_links.join(", ")
            }
        );
        if !cli.quiet {
            eprintln!(
                "{}",
                dim(&format!(
                    "convert {}ms · extract {}ms · total {}ms",
                    run.stats.convert_duration_ms,
                    run.stats.extract_duration_ms,
                    run.stats.total_duration_ms
                ))
            );
        }
    }

    Ok(())
}
