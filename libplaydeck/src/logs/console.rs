//! Console state on top of a [`LogEngine`]: whether the viewport follows
//! the newest entry, which entries are selected, and what bulk copy/export
//! operate on.

use std::collections::BTreeSet;

use serde_json::Value;
use time::OffsetDateTime;

use super::engine::{IngestReport, LogEngine, View};
use super::export::{self, ExportArtifact, ExportError};
use super::filter::LogFilter;
use super::{EntryId, IngestError, LogEntry};
use crate::lifecycle::ExecutionId;

/// Distance from the bottom, in rendered units, still counted as "at the
/// bottom".
pub const BOTTOM_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPosition {
    pub offset: u32,
    pub viewport_height: u32,
    pub content_height: u32,
}

impl ScrollPosition {
    pub fn distance_from_bottom(&self) -> u32 {
        self.content_height
            .saturating_sub(self.offset.saturating_add(self.viewport_height))
    }
}

/// Follow mode. Any scroll away from the bottom turns it off, and only
/// [`Autoscroll::jump_to_bottom`] turns it back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Autoscroll {
    enabled: bool,
    threshold: u32,
}

impl Default for Autoscroll {
    fn default() -> Self {
        Self::with_threshold(BOTTOM_THRESHOLD)
    }
}

impl Autoscroll {
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn on_scroll(&mut self, position: ScrollPosition) {
        if self.enabled && position.distance_from_bottom() >= self.threshold {
            self.enabled = false;
        }
    }

    pub fn jump_to_bottom(&mut self) {
        self.enabled = true;
    }
}

/// Selected entry ids. Membership survives filter changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<EntryId>,
}

impl Selection {
    pub fn toggle(&mut self, id: EntryId) {
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    /// Add every entry of `view`.
    pub fn select_all_visible(&mut self, view: View<'_>) {
        self.ids.extend(view.iter().map(|entry| entry.id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &BTreeSet<EntryId> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// The log pane of one execution.
#[derive(Debug, Default)]
pub struct LogConsole {
    engine: LogEngine,
    autoscroll: Autoscroll,
    selection: Selection,
}

impl LogConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: LogFilter) -> Self {
        Self {
            engine: LogEngine::with_filter(filter),
            ..Self::default()
        }
    }

    pub fn engine(&self) -> &LogEngine {
        &self.engine
    }

    pub fn autoscroll(&self) -> &Autoscroll {
        &self.autoscroll
    }

    pub fn autoscroll_mut(&mut self) -> &mut Autoscroll {
        &mut self.autoscroll
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn append(&mut self, entry: LogEntry) -> Result<(), IngestError> {
        self.engine.append(entry)
    }

    pub fn ingest_batch<I>(&mut self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = Value>,
    {
        self.engine.ingest_batch(records)
    }

    pub fn set_filter(&mut self, filter: LogFilter) {
        self.engine.set_filter(filter);
    }

    pub fn view(&mut self) -> View<'_> {
        self.engine.view()
    }

    pub fn toggle_selected(&mut self, id: EntryId) {
        self.selection.toggle(id);
    }

    pub fn select_all_visible(&mut self) {
        let view = self.engine.view();
        self.selection.select_all_visible(view);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Entries bulk actions apply to: the visible selected entries when
    /// anything is selected, otherwise everything visible.
    pub fn bulk_targets(&mut self) -> Vec<&LogEntry> {
        let selection = &self.selection;
        let view = self.engine.view();
        if selection.is_empty() {
            view.iter().collect()
        } else {
            view.iter().filter(|entry| selection.contains(entry.id)).collect()
        }
    }

    /// Text for the clipboard, rendered with the current display options.
    pub fn copy_text(&mut self) -> String {
        let display = self.engine.filter().display;
        export::render(self.bulk_targets(), &display)
    }

    pub fn export(
        &mut self,
        context: &str,
        execution_id: ExecutionId,
        at: OffsetDateTime,
    ) -> Result<ExportArtifact, ExportError> {
        let display = self.engine.filter().display;
        ExportArtifact::build(context, execution_id, at, self.bulk_targets(), &display)
    }
}
