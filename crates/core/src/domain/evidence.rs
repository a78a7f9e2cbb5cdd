use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One web source surfaced during gathering. Identity is the URL: two items
/// with the same URL are the same source no matter which query found them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

/// Deduplicates by URL keeping the first occurrence, then truncates to `cap`.
/// Input order is preserved, so callers that merge per-query batches in query
/// order get a deterministic result regardless of fetch completion order.
pub fn dedup_evidence(items: Vec<EvidenceItem>, cap: usize) -> Vec<EvidenceItem> {
    let mut seen_urls = BTreeSet::new();
    let mut unique = Vec::new();

    for item in items {
        if !seen_urls.insert(item.url.clone()) {
            continue;
        }
        unique.push(item);
        if unique.len() == cap {
            break;
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::{dedup_evidence, EvidenceItem};

    fn item(url: &str, title: &str) -> EvidenceItem {
        EvidenceItem {
            url: url.to_string(),
            title: title.to_string(),
            snippet: format!("{title} snippet"),
            published_date: None,
        }
    }

    #[test]
    fn first_occurrence_wins_on_duplicate_urls() {
        let merged = vec![
            item("https://example.eu/a", "first"),
            item("https://example.eu/b", "other"),
            item("https://example.eu/a", "second"),
        ];

        let unique = dedup_evidence(merged, 15);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].title, "first");
        assert_eq!(unique[1].url, "https://example.eu/b");
    }

    #[test]
    fn caps_after_dedup_not_before() {
        // 20 raw results, 5 of them duplicates: 15 unique survive the cap.
        let mut merged = Vec::new();
        for index in 0..15 {
            merged.push(item(&format!("https://example.eu/{index}"), "unique"));
        }
        for index in 0..5 {
            merged.push(item(&format!("https://example.eu/{index}"), "duplicate"));
        }

        let unique = dedup_evidence(merged, 15);
        assert_eq!(unique.len(), 15);
        assert!(unique.iter().all(|i| i.title == "unique"));
    }

    #[test]
    fn truncates_excess_unique_results() {
        let merged: Vec<_> =
            (0..30).map(|index| item(&format!("https://example.eu/{index}"), "n")).collect();

        let unique = dedup_evidence(merged, 15);
        assert_eq!(unique.len(), 15);
        assert_eq!(unique[0].url, "https://example.eu/0");
        assert_eq!(unique[14].url, "https://example.eu/14");
    }
}
