use crate::command::{CommandDescriptor, CommandKey};
use std::collections::BTreeMap;

/// Running aggregate for one PID.
#[derive(Debug, Clone, PartialEq)]
pub struct PidStats {
    pub pid: String,
    pub name: String,
    pub unit: String,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl PidStats {
    fn empty(command: &CommandDescriptor, unit: &str) -> Self {
        Self {
            pid: command.code(),
            name: command.name.clone(),
            unit: unit.to_string(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    fn update(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Per-PID min/max/sum/count across one recording session.
#[derive(Debug, Default, Clone)]
pub struct StatsAggregator {
    entries: BTreeMap<CommandKey, PidStats>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one value. The unit of the first value seen for a PID is kept.
    pub fn record(&mut self, command: &CommandDescriptor, value: f64, unit: &str) {
        self.entries
            .entry(command.key())
            .or_insert_with(|| PidStats::empty(command, unit))
            .update(value);
    }

    pub fn get(&self, key: CommandKey) -> Option<&PidStats> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every entry, ordered by command key.
    pub fn summary(&self) -> Vec<PidStats> {
        self.entries.values().cloned().collect()
    }
}
