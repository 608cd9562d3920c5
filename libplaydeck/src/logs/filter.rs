use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::UtcOffset;

use super::{LogEntry, LogLevel};

/// Display toggles. They change how entries render, never which entries
/// match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub show_timestamp: bool,
    pub show_host: bool,
    pub show_level: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_timestamp: true,
            show_host: true,
            show_level: true,
        }
    }
}

/// A non-destructive predicate over the log stream. Empty sets place no
/// restriction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub search: String,
    pub levels: BTreeSet<LogLevel>,
    pub hosts: BTreeSet<String>,
    pub display: DisplayOptions,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search<S: Into<String>>(mut self, search: S) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_levels<I: IntoIterator<Item = LogLevel>>(mut self, levels: I) -> Self {
        self.levels = levels.into_iter().collect();
        self
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_display(mut self, display: DisplayOptions) -> Self {
        self.display = display;
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        Matcher::new(self).matches(entry)
    }

    /// Whether `other` selects exactly the same entries as `self`.
    pub fn same_selection(&self, other: &LogFilter) -> bool {
        self.search == other.search && self.levels == other.levels && self.hosts == other.hosts
    }

    pub fn is_unrestricted(&self) -> bool {
        self.search.is_empty() && self.levels.is_empty() && self.hosts.is_empty()
    }

    /// Short summary for status lines, e.g. `ERROR,WARNING @web-1 /timeout/`.
    pub fn label(&self) -> String {
        if self.is_unrestricted() {
            return "ALL".to_string();
        }
        let mut parts = vec![];
        if !self.levels.is_empty() {
            let levels: Vec<&str> = self.levels.iter().map(|l| l.as_str()).collect();
            parts.push(levels.join(","));
        }
        if !self.hosts.is_empty() {
            let hosts: Vec<String> = self.hosts.iter().map(|h| format!("@{h}")).collect();
            parts.push(hosts.join(" "));
        }
        if !self.search.is_empty() {
            parts.push(format!("/{}/", self.search));
        }
        parts.join(" ")
    }
}

/// `matches(entry, filter)` as a free function.
pub fn matches(entry: &LogEntry, filter: &LogFilter) -> bool {
    filter.matches(entry)
}

/// A [`LogFilter`] prepared for repeated matching. The search needle is
/// lowercased once.
#[derive(Clone, Debug, Default)]
pub(crate) struct Matcher {
    needle: Option<String>,
    levels: BTreeSet<LogLevel>,
    hosts: BTreeSet<String>,
}

impl Matcher {
    pub(crate) fn new(filter: &LogFilter) -> Self {
        Self {
            needle: (!filter.search.is_empty()).then(|| filter.search.to_lowercase()),
            levels: filter.levels.clone(),
            hosts: filter.hosts.clone(),
        }
    }

    pub(crate) fn matches(&self, entry: &LogEntry) -> bool {
        self.matches_level(entry) && self.matches_host(entry) && self.matches_search(entry)
    }

    fn matches_level(&self, entry: &LogEntry) -> bool {
        self.levels.is_empty() || self.levels.contains(&entry.level)
    }

    // Entries without a host are never excluded by the host clause.
    fn matches_host(&self, entry: &LogEntry) -> bool {
        match &entry.host {
            Some(host) if !self.hosts.is_empty() => self.hosts.contains(host),
            _ => true,
        }
    }

    fn matches_search(&self, entry: &LogEntry) -> bool {
        let Some(needle) = &self.needle else {
            return true;
        };
        let contains = |field: &str| field.to_lowercase().contains(needle.as_str());
        contains(&entry.message)
            || entry.host.as_deref().is_some_and(contains)
            || entry.task.as_deref().is_some_and(contains)
            || entry.module.as_deref().is_some_and(contains)
    }
}

/// Render one entry as a line of text: timestamp, level, host, task, then
/// message. Disabled or absent fields are skipped.
pub fn format_entry(entry: &LogEntry, display: &DisplayOptions) -> String {
    let mut parts = vec![];
    if display.show_timestamp {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let stamp = entry
            .timestamp
            .to_offset(UtcOffset::UTC)
            .format(format)
            .unwrap_or_else(|_| entry.timestamp.unix_timestamp().to_string());
        parts.push(format!("[{stamp}]"));
    }
    if display.show_level {
        parts.push(format!("[{}]", entry.level));
    }
    if display.show_host {
        if let Some(host) = &entry.host {
            parts.push(format!("[{host}]"));
        }
    }
    if let Some(task) = &entry.task {
        parts.push(format!("[{task}]"));
    }
    parts.push(entry.message.clone());
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn entry(id: u64, level: LogLevel, message: &str) -> LogEntry {
        LogEntry::new(id, datetime!(2024-03-01 12:00:05 UTC), level, message)
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let filter = LogFilter::new().with_search("NGINX");
        assert!(filter.matches(&entry(1, LogLevel::Info, "installing nginx")));
        assert!(filter.matches(&entry(2, LogLevel::Task, "ok").in_task("Install Nginx")));
        assert!(filter.matches(&entry(3, LogLevel::Info, "ok").from_module("nginx_conf")));
        assert!(filter.matches(&entry(4, LogLevel::Info, "ok").on_host("nginx-edge")));
        assert!(!filter.matches(&entry(5, LogLevel::Info, "installing apache")));
    }

    #[test]
    fn test_host_clause_passes_entries_without_host() {
        let filter = LogFilter::new().with_hosts(["web-1"]);
        assert!(filter.matches(&entry(1, LogLevel::Play, "PLAY [all]")));
        assert!(filter.matches(&entry(2, LogLevel::Info, "ok").on_host("web-1")));
        assert!(!filter.matches(&entry(3, LogLevel::Info, "ok").on_host("web-2")));
    }

    #[test]
    fn test_clauses_are_anded() {
        let filter = LogFilter::new()
            .with_search("timeout")
            .with_levels([LogLevel::Error])
            .with_hosts(["db-1"]);
        assert!(filter.matches(&entry(1, LogLevel::Error, "timeout").on_host("db-1")));
        assert!(!filter.matches(&entry(2, LogLevel::Warning, "timeout").on_host("db-1")));
        assert!(!filter.matches(&entry(3, LogLevel::Error, "refused").on_host("db-1")));
        assert!(!filter.matches(&entry(4, LogLevel::Error, "timeout").on_host("db-2")));
    }

    #[test]
    fn test_display_options_do_not_affect_matching() {
        let e = entry(1, LogLevel::Error, "boom").on_host("web-1");
        let hidden = DisplayOptions {
            show_timestamp: false,
            show_host: false,
            show_level: false,
        };
        let filter = LogFilter::new().with_hosts(["web-1"]);
        assert_eq!(
            filter.matches(&e),
            filter.clone().with_display(hidden).matches(&e)
        );
        assert!(filter.same_selection(&filter.clone().with_display(hidden)));
    }

    #[test]
    fn test_format_entry_field_order() {
        let e = entry(1, LogLevel::Error, "unreachable")
            .on_host("web-1")
            .in_task("Gather facts");
        assert_eq!(
            "[2024-03-01 12:00:05] [ERROR] [web-1] [Gather facts] unreachable",
            format_entry(&e, &DisplayOptions::default())
        );
        let bare = DisplayOptions {
            show_timestamp: false,
            show_host: false,
            show_level: true,
        };
        assert_eq!("[ERROR] [Gather facts] unreachable", format_entry(&e, &bare));
    }

    #[test]
    fn test_label() {
        assert_eq!("ALL", LogFilter::new().label());
        let filter = LogFilter::new()
            .with_levels([LogLevel::Warning, LogLevel::Error])
            .with_hosts(["web-1"])
            .with_search("timeout");
        assert_eq!("WARNING,ERROR @web-1 /timeout/", filter.label());
    }
}
