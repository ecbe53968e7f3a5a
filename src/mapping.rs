//! Class label to actuator signal mapping.
//!
//! The signal table is the primary tunable surface of the bridge: it decides
//! which detector class labels actuate the sorter and with which signal. The
//! table is built once at startup and never mutated afterwards.
//!
//! An entry mapping to the empty string means "known label, explicitly no
//! action". A label absent from the table is an unmapped label: the control
//! loop skips it with a warning instead of failing the iteration.

use anyhow::{anyhow, Result};
use std::collections::HashMap;

use crate::validate_signal;

/// Immutable label -> signal lookup.
#[derive(Clone, Debug)]
pub struct SignalTable {
    entries: HashMap<String, String>,
}

impl SignalTable {
    /// Build a table from configured entries, validating every signal.
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut map = HashMap::new();
        for (label, signal) in entries {
            if label.trim().is_empty() {
                return Err(anyhow!("signal table entry has an empty label"));
            }
            validate_signal(&signal)
                .map_err(|e| anyhow!("signal table entry for {:?}: {}", label, e))?;
            if map.insert(label.clone(), signal).is_some() {
                return Err(anyhow!("signal table has duplicate label {:?}", label));
            }
        }
        Ok(Self { entries: map })
    }

    /// The table for the deployed sorter model.
    ///
    /// `non_recyclable` is intentionally absent: that class never actuates and
    /// is reported as unmapped so operators notice it in the logs.
    pub fn defaults() -> Self {
        let entries = [
            ("metals_and_plastic", "plastic"),
            ("other", ""),
            ("glass", ""),
            ("paper", "paper"),
            ("bio", "bio"),
            ("unknown", "metal"),
        ];
        Self {
            entries: entries
                .into_iter()
                .map(|(label, signal)| (label.to_string(), signal.to_string()))
                .collect(),
        }
    }

    /// Look up the signal for a class label.
    ///
    /// Returns `Some("")` for labels that explicitly map to no action and
    /// `None` for labels the table does not know. Never panics.
    pub fn map(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(String::as_str)
    }

    /// Labels from `vocabulary` that have no table entry.
    ///
    /// Used at startup to surface configuration gaps against the detector's
    /// label vocabulary before the first frame is processed.
    pub fn missing_labels<'a>(&self, vocabulary: &'a [String]) -> Vec<&'a str> {
        vocabulary
            .iter()
            .map(String::as_str)
            .filter(|label| !self.entries.contains_key(*label))
            .collect()
    }

    /// Iterate the configured entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(label, signal)| (label.as_str(), signal.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
