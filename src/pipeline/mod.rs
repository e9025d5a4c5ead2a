//! Pipeline stages for document processing.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap
//! implementations (e.g. switch the rendering backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! convert ──▶ extract ──▶ aggregate ──▶ validate
//! (pages)    (fan-out)    (fan-in)      (classify)
//! ```
//!
//! 1. [`convert`]   — turn one source document into an ordered sequence of
//!    page images; rendering runs in `spawn_blocking` because pdfium is
//!    not async-safe
//! 2. [`transform`] — the per-page extraction contract (OCR text + QR
//!    payloads) and its engine-backed implementation
//! 3. [`extract`]   — bounded-concurrency fan-out of the transform over all
//!    pages, joined by a barrier that waits for every outcome
//! 4. [`aggregate`] — merge per-page results into document text and a
//!    deduplicated QR set, or fail listing the failed pages
//! 5. [`normalize`] — deterministic OCR-text cleanup feeding the parser
//! 6. [`validate`]  — parse key-value pairs and classify each QR payload

pub mod aggregate;
pub mod convert;
pub mod extract;
pub mod normalize;
pub mod transform;
pub mod validate;
