//! Host selection: reduces either an explicit host pick list or a host
//! group into the concrete set of host ids an execution targets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::inventory::{GroupId, Host, HostId, Inventory};
use crate::log::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Hosts,
    Group,
}

/// The user's target selection. Resolution against an [`Inventory`] is
/// recomputed on every call, so group selections track inventory changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSelector {
    mode: SelectionMode,
    filter: String,
    selected: BTreeSet<HostId>,
    group: Option<GroupId>,
}

impl HostSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// Explicitly picked hosts. Only meaningful in [`SelectionMode::Hosts`].
    pub fn selected(&self) -> &BTreeSet<HostId> {
        &self.selected
    }

    /// Switch selection mode. The two representations are never reconciled:
    /// entering group mode starts with no group, entering hosts mode starts
    /// with no hosts.
    pub fn set_mode(&mut self, mode: SelectionMode) {
        if self.mode == mode {
            return;
        }
        debug!("host selector: switching mode {:?} -> {:?}", self.mode, mode);
        match mode {
            SelectionMode::Group => self.group = None,
            SelectionMode::Hosts => self.selected.clear(),
        }
        self.mode = mode;
    }

    pub fn set_filter<S: Into<String>>(&mut self, filter: S) {
        self.filter = filter.into();
    }

    /// Hosts whose name or address contains the filter text, ignoring case.
    pub fn visible<'a>(&self, inventory: &'a Inventory) -> Vec<&'a Host> {
        let needle = self.filter.to_lowercase();
        inventory
            .hosts()
            .iter()
            .filter(|host| host.matches_lowercase(&needle))
            .collect()
    }

    /// Flip one host in or out of the explicit selection.
    pub fn toggle(&mut self, id: HostId) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
    }

    /// Add every visible host to the selection, keeping what was already
    /// selected.
    pub fn select_all(&mut self, inventory: &Inventory) {
        let visible: Vec<HostId> = self.visible(inventory).iter().map(|h| *h.id()).collect();
        self.selected.extend(visible);
    }

    /// Remove only the visible hosts from the selection. Hosts hidden by the
    /// current filter stay selected.
    pub fn deselect_all(&mut self, inventory: &Inventory) {
        for host in self.visible(inventory) {
            self.selected.remove(host.id());
        }
    }

    pub fn select_group(&mut self, group: Option<GroupId>) {
        self.group = group;
    }

    /// The concrete, deduplicated target set for the current mode.
    pub fn resolve(&self, inventory: &Inventory) -> BTreeSet<HostId> {
        match self.mode {
            SelectionMode::Hosts => self.selected.clone(),
            SelectionMode::Group => match self.group {
                Some(group) => inventory.hosts_in_group(group),
                None => BTreeSet::new(),
            },
        }
    }
}
