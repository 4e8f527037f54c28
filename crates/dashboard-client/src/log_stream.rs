//! Watermark-based incremental merge for the streamed log panels.
//!
//! The bridge re-sends a sliding window of recent entries on every frame and
//! again after every reconnect. Entries carry no id; their timestamp is the
//! identity proxy. A [`LogStreamMerger`] keeps a single scalar cursor (the
//! watermark) per stream and drops anything at or below it.
//!
//! # Cursor policy
//!
//! After a batch is processed the watermark moves to the timestamp of the
//! batch's **last** element, not the largest one seen. A batch whose tail is
//! out of order therefore advances the cursor only as far as that tail. The
//! cursor never moves backwards: a tail older than the current watermark
//! leaves it unchanged.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default retained entries per stream.
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// An entry ordered by a monotonic timestamp in seconds.
pub trait Timestamped {
    /// Timestamp used both for ordering and for duplicate suppression.
    fn timestamp(&self) -> f64;
}

/// One decoded CAN frame (log stream A).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanLogEntry {
    /// Receive time.
    #[serde(deserialize_with = "crate::lenient::float")]
    pub ts: f64,
    /// DBC message name.
    #[serde(alias = "name", deserialize_with = "crate::lenient::opt_text")]
    pub msg_name: Option<String>,
    /// Raw arbitration id, used when the name is unknown.
    #[serde(alias = "id")]
    pub msg_id: Option<serde_json::Value>,
    /// Sending ECU.
    #[serde(deserialize_with = "crate::lenient::text")]
    pub sender: String,
    /// Decoded signal values.
    #[serde(alias = "payload")]
    pub signals: Option<serde_json::Value>,
}

impl Timestamped for CanLogEntry {
    fn timestamp(&self) -> f64 {
        self.ts
    }
}

/// One system event (log stream B).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventEntry {
    /// Event time.
    #[serde(deserialize_with = "crate::lenient::float")]
    pub ts: f64,
    /// Event category (`fault`, `dtc`, `state`, `anomaly`, `sap`, `info`).
    #[serde(rename = "type", deserialize_with = "crate::lenient::text")]
    pub kind: String,
    /// Human-readable text.
    #[serde(alias = "message", deserialize_with = "crate::lenient::text")]
    pub msg: String,
}

impl Timestamped for EventEntry {
    fn timestamp(&self) -> f64 {
        self.ts
    }
}

/// Outcome of merging one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Entries newly appended (and to be rendered).
    pub appended: usize,
    /// Oldest entries evicted to respect the cap.
    pub evicted: usize,
    /// Whether the render surface should scroll to the newest entry.
    pub scroll_to_newest: bool,
}

/// Deduplicating, bounded merge of one log stream.
#[derive(Debug, Clone)]
pub struct LogStreamMerger<E> {
    entries: VecDeque<E>,
    watermark: f64,
    max_entries: usize,
}

impl<E: Timestamped + Clone> LogStreamMerger<E> {
    /// Create an empty merger retaining at most `max_entries` entries.
    ///
    /// A cap of zero is raised to one.
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: VecDeque::with_capacity(max_entries),
            watermark: 0.0,
            max_entries,
        }
    }

    /// Merge one delivered batch.
    ///
    /// Entries with `timestamp <= watermark` are skipped. The watermark then
    /// moves to the last element's timestamp (see the module docs), and the
    /// retained window is trimmed from the oldest end.
    pub fn merge(&mut self, batch: &[E]) -> MergeReport {
        let mut report = MergeReport::default();

        for entry in batch {
            if entry.timestamp() <= self.watermark {
                continue;
            }
            self.entries.push_back(entry.clone());
            report.appended += 1;
        }

        if let Some(last) = batch.last() {
            let tail = last.timestamp();
            if tail > self.watermark {
                self.watermark = tail;
            }
        }

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
            report.evicted += 1;
        }

        report.scroll_to_newest = report.appended > 0;
        if report.appended > 0 {
            tracing::trace!(
                appended = report.appended,
                evicted = report.evicted,
                watermark = self.watermark,
                "merged log batch"
            );
        }
        report
    }

    /// Current cursor.
    #[must_use]
    pub fn watermark(&self) -> f64 {
        self.watermark
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &E> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The `n` most recently appended entries, oldest first.
    pub fn newest(&self, n: usize) -> impl Iterator<Item = &E> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been retained yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured cap.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(ts: f64) -> EventEntry {
        EventEntry {
            ts,
            kind: "info".into(),
            msg: format!("event at {ts}"),
        }
    }

    fn timestamps(m: &LogStreamMerger<EventEntry>) -> Vec<f64> {
        m.entries().map(|e| e.ts).collect()
    }

    #[test]
    fn test_appends_new_entries_and_advances_watermark() {
        let mut m = LogStreamMerger::new(10);
        let report = m.merge(&[ev(1.0), ev(2.0), ev(3.0)]);
        assert_eq!(report.appended, 3);
        assert!(report.scroll_to_newest);
        assert_eq!(m.watermark(), 3.0);
        assert_eq!(timestamps(&m), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_overlapping_window_after_reconnect_is_deduplicated() {
        let mut m = LogStreamMerger::new(10);
        m.merge(&[ev(1.0), ev(2.0), ev(3.0)]);
        let report = m.merge(&[ev(2.0), ev(3.0), ev(4.0), ev(5.0)]);
        assert_eq!(report.appended, 2);
        assert_eq!(timestamps(&m), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(m.watermark(), 5.0);
    }

    #[test]
    fn test_fully_repeated_batch_renders_nothing() {
        let mut m = LogStreamMerger::new(10);
        m.merge(&[ev(1.0), ev(2.0)]);
        let report = m.merge(&[ev(1.0), ev(2.0)]);
        assert_eq!(report, MergeReport::default());
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut m: LogStreamMerger<EventEntry> = LogStreamMerger::new(10);
        m.merge(&[ev(4.0)]);
        let report = m.merge(&[]);
        assert_eq!(report.appended, 0);
        assert_eq!(m.watermark(), 4.0);
    }

    #[test]
    fn test_watermark_follows_last_element_not_maximum() {
        let mut m = LogStreamMerger::new(10);
        m.merge(&[ev(5.0), ev(10.0), ev(7.0)]);
        assert_eq!(m.watermark(), 7.0);
        // 8.0 is above the cursor even though 10.0 was already rendered.
        let report = m.merge(&[ev(8.0)]);
        assert_eq!(report.appended, 1);
        assert_eq!(timestamps(&m), vec![5.0, 10.0, 7.0, 8.0]);
    }

    #[test]
    fn test_watermark_never_moves_backwards() {
        let mut m = LogStreamMerger::new(10);
        m.merge(&[ev(10.0)]);
        m.merge(&[ev(3.0)]);
        assert_eq!(m.watermark(), 10.0);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_cap_evicts_earliest_entries() {
        let cap = 5;
        let mut m = LogStreamMerger::new(cap);
        let batch: Vec<EventEntry> = (1..=cap + 3).map(|i| ev(i as f64)).collect();
        let report = m.merge(&batch);
        assert_eq!(report.appended, cap + 3);
        assert_eq!(report.evicted, 3);
        assert_eq!(m.len(), cap);
        assert_eq!(timestamps(&m), vec![4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_cap_holds_across_many_batches() {
        let mut m = LogStreamMerger::new(3);
        for i in 0..20 {
            let base = f64::from(i) * 2.0;
            m.merge(&[ev(base + 1.0), ev(base + 2.0)]);
            assert!(m.len() <= 3);
        }
        assert_eq!(timestamps(&m), vec![38.0, 39.0, 40.0]);
    }

    #[test]
    fn test_newest() {
        let mut m = LogStreamMerger::new(10);
        m.merge(&[ev(1.0), ev(2.0), ev(3.0)]);
        let newest: Vec<f64> = m.newest(2).map(|e| e.ts).collect();
        assert_eq!(newest, vec![2.0, 3.0]);
        assert_eq!(m.newest(10).count(), 3);
    }

    #[test]
    fn test_can_entry_aliases() {
        let entry: CanLogEntry = serde_json::from_str(
            r#"{"ts":1.0,"id":"0x300","sender":"RZC","payload":{"rpm":10}}"#,
        )
        .unwrap();
        assert_eq!(entry.msg_id, Some(serde_json::json!("0x300")));
        assert!(entry.msg_name.is_none());
        assert!(entry.signals.is_some());

        let entry: EventEntry =
            serde_json::from_str(r#"{"ts":2.0,"type":"dtc","message":"DTC 0xE301"}"#).unwrap();
        assert_eq!(entry.kind, "dtc");
        assert_eq!(entry.msg, "DTC 0xE301");
    }
}
