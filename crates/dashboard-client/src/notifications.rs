//! Quality-notification store fed by two independent paths.
//!
//! - **Incremental**: notification batches embedded in telemetry frames are
//!   merged by identity (replace in place, else append).
//! - **Full refresh**: a periodic poll of the notification query endpoint
//!   replaces the whole store with its result.
//!
//! Poll failures never reach the store or the user; the upstream system is
//! allowed to be intermittently unreachable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One quality notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    /// Unique key, e.g. `QN-00001`.
    #[serde(
        alias = "identity",
        alias = "id",
        deserialize_with = "crate::lenient::text"
    )]
    pub notification_id: String,
    /// Originating diagnostic trouble code.
    #[serde(deserialize_with = "crate::lenient::opt_text")]
    pub dtc_code: Option<String>,
    /// Short description.
    #[serde(deserialize_with = "crate::lenient::opt_text")]
    pub description: Option<String>,
    /// Defect text, shown when no description is present.
    #[serde(deserialize_with = "crate::lenient::opt_text")]
    pub defect_text: Option<String>,
    /// Plant code.
    #[serde(deserialize_with = "crate::lenient::opt_text")]
    pub plant: Option<String>,
    /// Priority, `1` (very high) to `4` (low).
    #[serde(deserialize_with = "crate::lenient::opt_text")]
    pub priority: Option<String>,
    /// Lifecycle status code.
    #[serde(deserialize_with = "crate::lenient::opt_text")]
    pub status: Option<String>,
    /// ISO-8601 creation time.
    #[serde(deserialize_with = "crate::lenient::opt_text")]
    pub created_at: Option<String>,
}

/// OData `{"d": {"results": [...]}}` envelope returned by the query endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationEnvelope {
    /// Payload.
    pub d: NotificationResults,
}

/// Inner part of [`NotificationEnvelope`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationResults {
    /// Records, newest first. Records that fail to decode are skipped.
    #[serde(default, deserialize_with = "crate::lenient::list")]
    pub results: Vec<Notification>,
}

/// Which path produced the latest store update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// Batch embedded in a telemetry frame.
    Stream,
    /// Periodic full refresh.
    Poll,
}

/// Store of notifications keyed by identity, in display order.
#[derive(Debug, Clone, Default)]
pub struct NotificationReconciler {
    records: Vec<Notification>,
    index: HashMap<String, usize>,
    last_source: Option<UpdateSource>,
}

impl NotificationReconciler {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Incremental path: replace records with a known identity, append the rest.
    ///
    /// Returns the number of records appended.
    pub fn apply_batch(&mut self, batch: &[Notification]) -> usize {
        let mut appended = 0;
        for record in batch {
            match self.index.get(&record.notification_id) {
                Some(&pos) => self.records[pos] = record.clone(),
                None => {
                    self.index
                        .insert(record.notification_id.clone(), self.records.len());
                    self.records.push(record.clone());
                    appended += 1;
                }
            }
        }
        self.last_source = Some(UpdateSource::Stream);
        appended
    }

    /// Full-refresh path: the poll result becomes the store, wholesale.
    ///
    /// Duplicate identities inside the poll result collapse to the later record.
    pub fn replace_all(&mut self, records: Vec<Notification>) {
        self.records.clear();
        self.index.clear();
        self.last_source = None;
        self.apply_batch(&records);
        self.last_source = Some(UpdateSource::Poll);
    }

    /// Records in display order.
    #[must_use]
    pub fn records(&self) -> &[Notification] {
        &self.records
    }

    /// Look up one record by identity.
    #[must_use]
    pub fn get(&self, notification_id: &str) -> Option<&Notification> {
        self.index.get(notification_id).map(|&pos| &self.records[pos])
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the empty-state placeholder should be shown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Path that produced the current contents, if any update happened yet.
    #[must_use]
    pub fn last_source(&self) -> Option<UpdateSource> {
        self.last_source
    }
}
