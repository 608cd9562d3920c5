//! The append-only log store for one execution and its filtered view.
//!
//! Append order is authoritative: timestamps may be skewed by transport and
//! are never used for ordering. Filtering keeps every entry and only
//! recomputes which positions are visible. A filter change marks the view
//! stale and the next [`LogEngine::view`] rescans once; appends under an
//! unchanged filter test only the new entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use super::filter::{LogFilter, Matcher};
use super::{EntryId, IngestError, LogEntry, LogLevel};
use crate::log::*;

/// Counts of incremental checks versus full rescans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Entries tested one at a time as they were appended.
    pub incremental_checks: u64,
    /// Full passes over the store after a filter change.
    pub full_rescans: u64,
    /// Entries tested during full passes.
    pub full_rescan_entries: u64,
}

/// Outcome of ingesting a batch. Rejected records do not affect accepted
/// ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<IngestError>,
}

#[derive(Debug, Default)]
pub struct LogEngine {
    entries: Vec<LogEntry>,
    positions: HashMap<EntryId, usize>,
    filter: LogFilter,
    matcher: Matcher,
    visible: Vec<usize>,
    stale: bool,
    hosts: BTreeSet<String>,
    level_counts: BTreeMap<LogLevel, usize>,
    stats: FilterStats,
}

impl LogEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: LogFilter) -> Self {
        let mut engine = Self::new();
        engine.set_filter(filter);
        engine
    }

    /// Append one entry in arrival order. A reused id is rejected and the
    /// store is left untouched.
    pub fn append(&mut self, entry: LogEntry) -> Result<(), IngestError> {
        if self.positions.contains_key(&entry.id) {
            warn!("log engine: rejecting duplicate entry id {}", entry.id);
            return Err(IngestError::DuplicateId(entry.id));
        }

        let position = self.entries.len();
        if !self.stale {
            self.stats.incremental_checks += 1;
            if self.matcher.matches(&entry) {
                self.visible.push(position);
            }
        }

        if let Some(host) = &entry.host {
            if !self.hosts.contains(host) {
                self.hosts.insert(host.clone());
            }
        }
        *self.level_counts.entry(entry.level).or_default() += 1;
        self.positions.insert(entry.id, position);
        self.entries.push(entry);
        Ok(())
    }

    /// Decode and append raw records one by one.
    #[tracing::instrument(skip_all)]
    pub fn ingest_batch<I>(&mut self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = Value>,
    {
        let mut report = IngestReport::default();
        for record in records {
            let appended = serde_json::from_value::<LogEntry>(record)
                .map_err(|e| {
                    warn!("log engine: rejecting malformed entry: {}", e);
                    IngestError::Malformed {
                        reason: e.to_string(),
                    }
                })
                .and_then(|entry| self.append(entry));
            match appended {
                Ok(()) => report.accepted += 1,
                Err(err) => report.rejected.push(err),
            }
        }
        debug!(
            "log engine: batch accepted {}, rejected {}",
            report.accepted,
            report.rejected.len()
        );
        report
    }

    /// Replace the filter. Display-only changes keep the current view.
    pub fn set_filter(&mut self, filter: LogFilter) {
        if !self.filter.same_selection(&filter) {
            self.matcher = Matcher::new(&filter);
            self.stale = true;
        }
        self.filter = filter;
    }

    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    /// The filtered view, in append order.
    pub fn view(&mut self) -> View<'_> {
        self.refresh();
        View {
            entries: &self.entries,
            visible: &self.visible,
        }
    }

    fn refresh(&mut self) {
        if !self.stale {
            return;
        }
        let matcher = &self.matcher;
        self.visible = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| matcher.matches(entry))
            .map(|(position, _)| position)
            .collect();
        self.stats.full_rescans += 1;
        self.stats.full_rescan_entries += self.entries.len() as u64;
        self.stale = false;
    }

    pub fn get(&self, id: EntryId) -> Option<&LogEntry> {
        self.positions.get(&id).map(|&position| &self.entries[position])
    }

    /// Every ingested entry regardless of the filter.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct hosts seen so far.
    pub fn hosts(&self) -> &BTreeSet<String> {
        &self.hosts
    }

    pub fn level_counts(&self) -> &BTreeMap<LogLevel, usize> {
        &self.level_counts
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }
}

/// A borrowed, restartable view of the entries matching the current filter.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    entries: &'a [LogEntry],
    visible: &'a [usize],
}

impl<'a> View<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a LogEntry> + 'a {
        let (entries, visible) = (self.entries, self.visible);
        visible.iter().map(move |&position| &entries[position])
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn last(&self) -> Option<&'a LogEntry> {
        self.visible.last().map(|&position| &self.entries[position])
    }

    /// Visible entries after the first `skip`, for renderers that draw
    /// incrementally.
    pub fn since(&self, skip: usize) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.iter().skip(skip)
    }
}

impl<'a> IntoIterator for View<'a> {
    type Item = &'a LogEntry;
    type IntoIter = Box<dyn Iterator<Item = &'a LogEntry> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
