//! Read-only view of the host inventory. Hosts and groups are owned by an
//! external inventory service; the execution core only reads them.

use std::collections::BTreeSet;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type HostId = u64;
pub type GroupId = u64;
pub type Port = u16;

pub fn default_ssh_port() -> Port {
    22
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    #[default]
    Offline,
}

#[derive(Getters, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    id: HostId,
    name: String,
    address: String,
    #[serde(default = "self::default_ssh_port")]
    port: Port,
    #[serde(default)]
    group_id: Option<GroupId>,
    #[serde(default)]
    status: HostStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    last_connected: Option<OffsetDateTime>,
}

impl Host {
    pub fn new<S: Into<String>>(id: HostId, name: S, address: S) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            port: default_ssh_port(),
            group_id: None,
            status: HostStatus::default(),
            last_connected: None,
        }
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.port = port;
        self
    }

    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_status(mut self, status: HostStatus) -> Self {
        self.status = status;
        self
    }

    pub fn connected_at(mut self, at: OffsetDateTime) -> Self {
        self.last_connected = Some(at);
        self
    }

    /// Whether this host's name or address contains `needle`. The needle
    /// must already be lowercased.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.name.to_lowercase().contains(needle)
            || self.address.to_lowercase().contains(needle)
    }
}

#[derive(Getters, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    id: GroupId,
    name: String,
}

impl HostGroup {
    pub fn new<S: Into<String>>(id: GroupId, name: S) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Hosts and groups as delivered by the inventory. Group membership is a
/// reference on each host, not a list held by the group.
#[derive(Getters, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    hosts: Vec<Host>,
    #[serde(default)]
    groups: Vec<HostGroup>,
}

impl Inventory {
    pub fn new(hosts: Vec<Host>, groups: Vec<HostGroup>) -> Self {
        Self { hosts, groups }
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.iter().find(|host| host.id == id)
    }

    pub fn group(&self, id: GroupId) -> Option<&HostGroup> {
        self.groups.iter().find(|group| group.id == id)
    }

    /// Every host whose group reference equals `group_id`.
    pub fn hosts_in_group(&self, group_id: GroupId) -> BTreeSet<HostId> {
        self.hosts
            .iter()
            .filter(|host| host.group_id == Some(group_id))
            .map(|host| host.id)
            .collect()
    }

    /// Display names for the given ids. Unknown ids are rendered as `#<id>`.
    pub fn names_for<'a, I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a HostId>,
    {
        ids.into_iter()
            .map(|id| match self.host(*id) {
                Some(host) => host.name.clone(),
                None => format!("#{id}"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_that_group_membership_follows_host_reference() {
        let inventory = Inventory::new(
            vec![
                Host::new(1, "web-1", "10.0.0.1").in_group(7),
                Host::new(2, "web-2", "10.0.0.2").in_group(7),
                Host::new(3, "db-1", "10.0.1.1").in_group(8),
                Host::new(4, "bastion", "10.0.2.1"),
            ],
            vec![HostGroup::new(7, "web"), HostGroup::new(8, "db")],
        );
        assert_eq!(BTreeSet::from([1, 2]), inventory.hosts_in_group(7));
        assert_eq!(BTreeSet::from([3]), inventory.hosts_in_group(8));
        assert!(inventory.hosts_in_group(9).is_empty());
        assert_eq!("web", inventory.group(7).unwrap().name().as_str());
    }

    #[test]
    fn test_that_inventory_parses_with_defaults() {
        let raw = r#"{
            "hosts": [
                {"id": 1, "name": "web-1", "address": "10.0.0.1", "group_id": 7},
                {"id": 2, "name": "web-2", "address": "10.0.0.2", "port": 2222,
                 "status": "online", "last_connected": "2024-03-01T12:00:00Z"}
            ],
            "groups": [{"id": 7, "name": "web"}]
        }"#;
        let inventory: Inventory = serde_json::from_str(raw).unwrap();
        let first = inventory.host(1).unwrap();
        assert_eq!(22, *first.port());
        assert_eq!(HostStatus::Offline, *first.status());
        assert_eq!(Some(7), *first.group_id());
        let second = inventory.host(2).unwrap();
        assert_eq!(2222, *second.port());
        assert_eq!(HostStatus::Online, *second.status());
        assert!(second.last_connected().is_some());
        assert_eq!(
            vec!["web-2".to_string(), "#9".to_string()],
            inventory.names_for(&[2, 9])
        );
    }
}
