//! Typed records for every stage boundary and the persisted result.
//!
//! Each pipeline stage consumes and produces one of these explicit shapes;
//! internal logic never operates on loosely-typed maps. Field names (and
//! their serialized spelling, down to `pageResults` vs `qr_results`) are a
//! wire contract shared with the trigger layer and must not drift.

use crate::types::{PageImageRef, PageScan, ValidationOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conversion stage output: ordered page image keys.
///
/// Serializes as `{"images": ["processed/abc-page-1.png", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedEvent {
    pub images: Vec<String>,
}

impl ConvertedEvent {
    pub fn from_pages(pages: &[PageImageRef]) -> Self {
        Self {
            images: pages.iter().map(|p| p.key.clone()).collect(),
        }
    }
}

/// Per-page OCR output: `{"text": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEvent {
    pub text: String,
}

/// Per-page QR scanner output: `{"qr_results": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrEvent {
    pub qr_results: Vec<String>,
}

/// One entry of the validation input, merging both per-page outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResultEvent {
    pub qr_results: Vec<String>,
    pub text: String,
}

impl From<&PageScan> for PageResultEvent {
    fn from(scan: &PageScan) -> Self {
        Self {
            qr_results: scan.qr_payloads.clone(),
            text: scan.text.clone(),
        }
    }
}

/// The original document reference as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalRef {
    pub bucket: String,
    pub key: String,
}

/// Validation stage input:
/// `{"original": {bucket, key}, "pageResults": [{qr_results, text}, ...]}`.
///
/// Entries are ordered by page index; one entry per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationInputEvent {
    pub original: OriginalRef,
    #[serde(rename = "pageResults")]
    pub page_results: Vec<PageResultEvent>,
}

impl ValidationInputEvent {
    pub fn new(original: OriginalRef, scans: &[PageScan]) -> Self {
        Self {
            original,
            page_results: scans.iter().map(PageResultEvent::from).collect(),
        }
    }
}

/// The durable record written once per document, keyed by `pk`.
///
/// Serializes as
/// `{"pk": ..., "validLinks": [...], "invalidLinks": [...], "keyValues": {...}}`.
/// Link lists are sorted (set semantics; order carries no meaning) so
/// repeated runs over the same document produce byte-identical records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub pk: String,
    #[serde(rename = "validLinks")]
    pub valid_links: Vec<String>,
    #[serde(rename = "invalidLinks")]
    pub invalid_links: Vec<String>,
    #[serde(rename = "keyValues")]
    pub key_values: BTreeMap<String, String>,
}

impl From<&ValidationOutcome> for PersistedRecord {
    fn from(outcome: &ValidationOutcome) -> Self {
        Self {
            pk: outcome.document_key.clone(),
            valid_links: outcome.valid_links.iter().cloned().collect(),
            invalid_links: outcome.invalid_links.iter().cloned().collect(),
            key_values: outcome.key_values.clone(),
        }
    }
}
