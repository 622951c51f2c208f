//! Grounding-source aggregation for a single session.
//!
//! Search metadata arrives attached to arbitrary chunks, often repeated
//! across chunks. The aggregator keeps the first record seen per `uri`.

use std::collections::HashSet;

use tracing::trace;

use amicus_shared::SourceRecord;

/// First-write-wins set of [`SourceRecord`]s keyed by `uri`, in insertion order.
#[derive(Debug, Default)]
pub struct SourceAggregator {
    seen: HashSet<String>,
    ordered: Vec<SourceRecord>,
}

impl SourceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Records with an empty `uri` and repeats of a known
    /// `uri` are ignored.
    pub fn add_record(&mut self, rec: SourceRecord) {
        if rec.uri.is_empty() {
            trace!(title = %rec.title, "dropping source without uri");
            return;
        }
        if self.seen.contains(&rec.uri) {
            return;
        }
        self.seen.insert(rec.uri.clone());
        self.ordered.push(rec);
    }

    /// Add every record from an iterator, in order.
    pub fn add_records(&mut self, records: impl IntoIterator<Item = SourceRecord>) {
        for rec in records {
            self.add_record(rec);
        }
    }

    /// Current sources in first-insertion order.
    pub fn snapshot(&self) -> Vec<SourceRecord> {
        self.ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse_to_first_seen() {
        let mut agg = SourceAggregator::new();
        agg.add_record(SourceRecord::new("https://corteidh.or.cr/a", "Caso A"));
        agg.add_record(SourceRecord::new("https://ohchr.org/b", "Informe B"));
        agg.add_record(SourceRecord::new("https://corteidh.or.cr/a", "Caso A (otra vez)"));
        agg.add_record(SourceRecord::new("https://ohchr.org/b", "B renamed"));

        let snap = agg.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].uri, "https://corteidh.or.cr/a");
        assert_eq!(snap[0].title, "Caso A");
        assert_eq!(snap[1].title, "Informe B");
    }

    #[test]
    fn empty_uri_is_discarded() {
        let mut agg = SourceAggregator::new();
        agg.add_record(SourceRecord::new("", "sin enlace"));
        assert!(agg.is_empty());

        agg.add_records(vec![
            SourceRecord::new("", "x"),
            SourceRecord::new("https://x.org", "x"),
        ]);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn snapshot_keeps_insertion_order_under_interleaving() {
        let uris = ["c", "a", "b", "a", "c", "d", "b"];
        let mut agg = SourceAggregator::new();
        for (i, uri) in uris.iter().enumerate() {
            agg.add_record(SourceRecord::new(format!("https://{uri}.org"), i.to_string()));
        }

        let snap = agg.snapshot();
        let got: Vec<&str> = snap.iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(
            got,
            ["https://c.org", "https://a.org", "https://b.org", "https://d.org"]
        );
        // Titles are from the first occurrence of each uri.
        let titles: Vec<&str> = snap.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["0", "1", "2", "5"]);
    }
}
