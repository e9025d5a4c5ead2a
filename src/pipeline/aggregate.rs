//! Aggregation stage: fan-in of per-page outcomes into a document-level
//! result.
//!
//! Strictness is deliberate: downstream validation depends on complete
//! text, so one failed page fails the whole document with the exact list
//! of failed indexes rather than producing a silently partial document.

use crate::error::PipelineError;
use crate::types::{AggregatedDocument, PageOutcome, PageScan};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Merge per-page outcomes into an [`AggregatedDocument`].
///
/// If any outcome is a failure, returns
/// [`PipelineError::PartialExtractionFailure`] carrying the failed page
/// indexes in ascending order. Otherwise joins page texts with `\n` in
/// ascending page order (re-sorted here — arrival order is never trusted)
/// and unions all QR payloads into a deduplicated set.
pub fn aggregate_pages(outcomes: &[PageOutcome]) -> Result<AggregatedDocument, PipelineError> {
    let mut failed: Vec<usize> = outcomes
        .iter()
        .filter(|o| o.is_failed())
        .map(|o| o.page_index())
        .collect();

    if !failed.is_empty() {
        failed.sort_unstable();
        warn!("Aggregation rejected document: {} failed page(s): {:?}", failed.len(), failed);
        return Err(PipelineError::PartialExtractionFailure { pages: failed });
    }

    let mut scans: Vec<&PageScan> = outcomes
        .iter()
        .map(|o| match o {
            PageOutcome::Scanned(scan) => scan,
            // Unreachable: failures were rejected above.
            PageOutcome::Failed(err) => unreachable!("failed page {} after check", err.page_index()),
        })
        .collect();
    scans.sort_by_key(|s| s.page_index);

    let full_text = scans
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let qr_set: BTreeSet<String> = scans
        .iter()
        .flat_map(|s| s.qr_payloads.iter().cloned())
        .collect();

    debug!(
        "Aggregated {} page(s): {} text bytes, {} unique QR payload(s)",
        scans.len(),
        full_text.len(),
        qr_set.len()
    );

    Ok(AggregatedDocument { full_text, qr_set })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;

    fn scanned(page: usize, text: &str, qrs: &[&str]) -> PageOutcome {
        PageOutcome::Scanned(PageScan {
            page_index: page,
            text: text.to_string(),
            qr_payloads: qrs.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn failed(page: usize) -> PageOutcome {
        PageOutcome::Failed(PageError::UnreadableImage {
            page,
            detail: "bad bytes".into(),
        })
    }

    #[test]
    fn joins_text_in_page_order_regardless_of_arrival_order() {
        // Outcomes arrive out of order, as they would from concurrent tasks.
        let outcomes = vec![
            scanned(3, "three", &[]),
            scanned(1, "one", &[]),
            scanned(2, "two", &[]),
        ];
        let doc = aggregate_pages(&outcomes).unwrap();
        assert_eq!(doc.full_text, "one\ntwo\nthree");
    }

    #[test]
    fn unions_and_dedupes_qr_payloads() {
        let outcomes = vec![
            scanned(1, "", &["http://a", "http://b"]),
            scanned(2, "", &["http://b", "http://c"]),
        ];
        let doc = aggregate_pages(&outcomes).unwrap();
        let expected: BTreeSet<String> = ["http://a", "http://b", "http://c"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(doc.qr_set, expected);
    }

    #[test]
    fn empty_pages_still_contribute_separators() {
        let outcomes = vec![scanned(1, "a", &[]), scanned(2, "", &[]), scanned(3, "c", &[])];
        let doc = aggregate_pages(&outcomes).unwrap();
        assert_eq!(doc.full_text, "a\n\nc");
    }

    #[test]
    fn any_failure_fails_the_document_with_exact_indexes() {
        let outcomes = vec![
            scanned(1, "one", &[]),
            failed(4),
            scanned(3, "three", &[]),
            failed(2),
        ];
        let err = aggregate_pages(&outcomes).unwrap_err();
        match err {
            PipelineError::PartialExtractionFailure { pages } => {
                assert_eq!(pages, vec![2, 4]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn single_page_document_has_no_trailing_newline() {
        let outcomes = vec![scanned(1, "only", &[])];
        let doc = aggregate_pages(&outcomes).unwrap();
        assert_eq!(doc.full_text, "only");
    }
}
