//! Validation stage: parse key-value pairs from document text and classify
//! each QR payload as a valid or invalid link against them.
//!
//! Two sub-operations, both pure:
//!
//! * [`parse_key_value_pairs`] — delimiter-based line scan over the text.
//! * [`check_qr_links`] — partition the QR set using a pluggable
//!   [`LinkPredicate`]; totality and mutual exclusivity hold for any
//!   predicate since each payload is tested exactly once.

use crate::pipeline::normalize::normalize_text;
use crate::types::{AggregatedDocument, ValidationOutcome};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// One `key: value` pair extracted from a text line. Keys are
/// case-sensitive and may repeat across the document; folding into the
/// final mapping is last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

/// Decides whether a QR payload is a valid link with respect to the parsed
/// key-value mapping.
///
/// Must be a pure function of `(payload, key_values)` — no I/O, no hidden
/// state — so classification is reproducible across re-deliveries of the
/// same document.
pub trait LinkPredicate: Send + Sync {
    fn is_valid(&self, payload: &str, key_values: &BTreeMap<String, String>) -> bool;
}

/// Default predicate: a payload is valid iff at least one parsed value is
/// non-empty and occurs as a substring of the payload.
///
/// This accepts links that embed an extracted identifier (an order number,
/// a reference code) anywhere in the URL while rejecting payloads with no
/// anchor in the document text.
pub struct ValueSubstring;

impl LinkPredicate for ValueSubstring {
    fn is_valid(&self, payload: &str, key_values: &BTreeMap<String, String>) -> bool {
        key_values
            .values()
            .any(|v| !v.is_empty() && payload.contains(v.as_str()))
    }
}

/// Scan `text` line by line for key/value pairs.
///
/// A line containing `:` or `=` yields one pair split at the first such
/// delimiter, with both sides trimmed. Lines without a delimiter are
/// ignored; so are pairs whose trimmed key is blank. The returned sequence
/// preserves source order — duplicates are resolved later by
/// [`fold_key_values`].
pub fn parse_key_value_pairs(text: &str) -> Vec<KeyValuePair> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        let Some(idx) = line.find([':', '=']) else {
            continue;
        };
        let key = line[..idx].trim();
        if key.is_empty() {
            continue;
        }
        let value = line[idx + 1..].trim();
        pairs.push(KeyValuePair {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    pairs
}

/// Fold an ordered pair sequence into a mapping, later pairs overwriting
/// earlier ones with the same key (last-write-wins).
pub fn fold_key_values(pairs: Vec<KeyValuePair>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        map.insert(pair.key, pair.value);
    }
    map
}

/// Partition the QR set into `(valid, invalid)` using `predicate`.
///
/// Every payload lands in exactly one of the two sets: the union equals
/// the input set and the intersection is empty.
pub fn check_qr_links(
    qr_set: &BTreeSet<String>,
    key_values: &BTreeMap<String, String>,
    predicate: &dyn LinkPredicate,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut valid = BTreeSet::new();
    let mut invalid = BTreeSet::new();
    for payload in qr_set {
        if predicate.is_valid(payload, key_values) {
            valid.insert(payload.clone());
        } else {
            invalid.insert(payload.clone());
        }
    }
    (valid, invalid)
}

/// Run the full validation stage over an aggregated document.
///
/// Normalises the text, parses and folds key-value pairs, then classifies
/// the QR set.
pub fn validate_document(
    document_key: &str,
    aggregated: &AggregatedDocument,
    predicate: &dyn LinkPredicate,
) -> ValidationOutcome {
    let normalized = normalize_text(&aggregated.full_text);
    let pairs = parse_key_value_pairs(&normalized);
    debug!("Parsed {} key-value pair(s) from document text", pairs.len());
    let key_values = fold_key_values(pairs);

    let (valid_links, invalid_links) = check_qr_links(&aggregated.qr_set, &key_values, predicate);
    debug!(
        "Classified QR payloads: {} valid, {} invalid",
        valid_links.len(),
        invalid_links.len()
    );

    ValidationOutcome {
        document_key: document_key.to_string(),
        valid_links,
        invalid_links,
        key_values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_splits_at_first_delimiter() {
        let pairs = parse_key_value_pairs("url: http://x/y:z");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key, "url");
        assert_eq!(pairs[0].value, "http://x/y:z");
    }

    #[test]
    fn parse_accepts_equals_delimiter() {
        let pairs = parse_key_value_pairs("Order = 42");
        assert_eq!(
            pairs,
            vec![KeyValuePair {
                key: "Order".into(),
                value: "42".into()
            }]
        );
    }

    #[test]
    fn parse_ignores_lines_without_delimiter_and_blank_keys() {
        let pairs = parse_key_value_pairs("no delimiter here\n: orphan value\nA:1");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key, "A");
    }

    #[test]
    fn parse_keeps_empty_values() {
        let pairs = parse_key_value_pairs("Signed:");
        assert_eq!(pairs[0].value, "");
    }

    #[test]
    fn fold_is_last_write_wins() {
        let pairs = parse_key_value_pairs("A:1\nB:2\nA:3");
        let map = fold_key_values(pairs);
        assert_eq!(map, kv(&[("A", "3"), ("B", "2")]));
    }

    #[test]
    fn keys_are_case_sensitive() {
        let map = fold_key_values(parse_key_value_pairs("order:1\nOrder:2"));
        assert_eq!(map, kv(&[("order", "1"), ("Order", "2")]));
    }

    #[test]
    fn check_links_partitions_totally_and_disjointly() {
        let qr_set: BTreeSet<String> = ["http://a/123", "http://b/999", "junk"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let key_values = kv(&[("Order", "123")]);

        let (valid, invalid) = check_qr_links(&qr_set, &key_values, &ValueSubstring);

        assert!(valid.contains("http://a/123"));
        assert!(invalid.contains("http://b/999"));
        assert!(invalid.contains("junk"));

        let union: BTreeSet<String> = valid.union(&invalid).cloned().collect();
        assert_eq!(union, qr_set);
        assert!(valid.intersection(&invalid).next().is_none());
    }

    #[test]
    fn empty_values_never_match() {
        let qr_set: BTreeSet<String> = ["http://a/123".to_string()].into_iter().collect();
        let key_values = kv(&[("Signed", "")]);
        let (valid, invalid) = check_qr_links(&qr_set, &key_values, &ValueSubstring);
        assert!(valid.is_empty());
        assert_eq!(invalid.len(), 1);
    }

    #[test]
    fn custom_predicate_is_honoured() {
        struct AcceptAll;
        impl LinkPredicate for AcceptAll {
            fn is_valid(&self, _payload: &str, _kv: &BTreeMap<String, String>) -> bool {
                true
            }
        }
        let qr_set: BTreeSet<String> = ["anything".to_string()].into_iter().collect();
        let (valid, invalid) = check_qr_links(&qr_set, &BTreeMap::new(), &AcceptAll);
        assert_eq!(valid.len(), 1);
        assert!(invalid.is_empty());
    }

    #[test]
    fn validate_document_end_to_end() {
        let aggregated = AggregatedDocument {
            full_text: "Order:123\nNote: see above".into(),
            qr_set: ["http://good.example/123".to_string()].into_iter().collect(),
        };
        let outcome = validate_document("uploads/invoice.pdf", &aggregated, &ValueSubstring);

        assert_eq!(outcome.document_key, "uploads/invoice.pdf");
        assert_eq!(
            outcome.key_values,
            kv(&[("Order", "123"), ("Note", "see above")])
        );
        assert!(outcome.valid_links.contains("http://good.example/123"));
        assert!(outcome.invalid_links.is_empty());
    }
}
