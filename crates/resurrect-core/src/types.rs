//! Typed shapes of the proxy daemon's control API.
//!
//! Each endpoint decodes into its own struct; there is no generic
//! dispatch on response type. `ProxySnapshot` doubles as the on-disk
//! checkpoint document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Group kind whose active member can be switched via the control API.
/// Only groups of this kind are replayed from a checkpoint.
pub const SELECTOR_KIND: &str = "Selector";

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootResponse {
    pub hello: String,
}

/// A single entry of `GET /proxies`.
///
/// Groups carry `all` and `now`; leaf proxies (e.g. a Shadowsocks node)
/// only carry `type`, so both default to empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyGroup {
    /// "Selector", "URLTest", "Fallback", "Direct", ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Child names, in daemon order.
    #[serde(rename = "all", default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    /// Currently active child.
    #[serde(rename = "now", default, skip_serializing_if = "String::is_empty")]
    pub current: String,
}

impl ProxyGroup {
    /// Whether this group's selection is switchable (and so restorable).
    pub fn is_selector(&self) -> bool {
        self.kind == SELECTOR_KIND
    }
}

/// Body of `GET /proxies`, keyed by group name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxySnapshot {
    #[serde(default)]
    pub proxies: BTreeMap<String, ProxyGroup>,
}

impl ProxySnapshot {
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Project the snapshot to `group → current child` for every entry
    /// that has a current child.
    pub fn selections(&self) -> BTreeMap<String, String> {
        self.proxies
            .iter()
            .filter(|(_, g)| !g.current.is_empty())
            .map(|(name, g)| (name.clone(), g.current.clone()))
            .collect()
    }

    /// Selector groups only, as `(group, current child)` pairs.
    pub fn selector_selections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.proxies
            .iter()
            .filter(|(_, g)| g.is_selector() && !g.current.is_empty())
            .map(|(name, g)| (name.as_str(), g.current.as_str()))
    }
}

/// Body of `PUT /proxies/<group>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionUpdate {
    pub name: String,
}

/// Body of `GET /configs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DaemonConfigs {
    pub port: u16,
    pub socks_port: u16,
    pub redir_port: u16,
    pub tproxy_port: u16,
    pub mixed_port: u16,
    pub allow_lan: bool,
    pub bind_address: String,
    pub mode: String,
    pub log_level: String,
    pub ipv6: bool,
    pub interface_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROXIES_BODY: &str = r#"{
        "proxies": {
            "DIRECT": {"type": "Direct", "history": [], "udp": true},
            "GLOBAL": {"type": "Selector", "all": ["DIRECT", "Proxy"], "now": "DIRECT"},
            "Proxy": {"type": "Selector", "all": ["NodeA", "NodeB"], "now": "NodeB"},
            "Auto": {"type": "URLTest", "all": ["NodeA", "NodeB"], "now": "NodeA"},
            "NodeA": {"type": "Shadowsocks"},
            "NodeB": {"type": "Vmess"}
        }
    }"#;

    #[test]
    fn decode_proxies_with_leaf_nodes() {
        let snapshot: ProxySnapshot = serde_json::from_str(PROXIES_BODY).unwrap();
        assert_eq!(snapshot.len(), 6);

        let proxy = &snapshot.proxies["Proxy"];
        assert!(proxy.is_selector());
        assert_eq!(proxy.members, vec!["NodeA", "NodeB"]);
        assert_eq!(proxy.current, "NodeB");

        let leaf = &snapshot.proxies["NodeA"];
        assert!(!leaf.is_selector());
        assert!(leaf.members.is_empty());
        assert!(leaf.current.is_empty());
    }

    #[test]
    fn selections_skip_entries_without_current() {
        let snapshot: ProxySnapshot = serde_json::from_str(PROXIES_BODY).unwrap();
        let selections = snapshot.selections();
        assert_eq!(selections.len(), 3);
        assert_eq!(selections["Auto"], "NodeA");
        assert!(!selections.contains_key("DIRECT"));
    }

    #[test]
    fn selector_selections_exclude_other_kinds() {
        let snapshot: ProxySnapshot = serde_json::from_str(PROXIES_BODY).unwrap();
        let pairs: Vec<_> = snapshot.selector_selections().collect();
        assert_eq!(pairs, vec![("GLOBAL", "DIRECT"), ("Proxy", "NodeB")]);
    }

    #[test]
    fn leaf_serializes_without_empty_fields() {
        let leaf = ProxyGroup {
            kind: "Direct".to_string(),
            members: Vec::new(),
            current: String::new(),
        };
        assert_eq!(serde_json::to_string(&leaf).unwrap(), r#"{"type":"Direct"}"#);
    }

    #[test]
    fn decode_configs_kebab_case() {
        let body = r#"{
            "port": 7890, "socks-port": 7891, "redir-port": 0, "tproxy-port": 0,
            "mixed-port": 7892, "allow-lan": true, "bind-address": "*",
            "mode": "rule", "log-level": "info", "ipv6": false,
            "interface-name": ""
        }"#;
        let configs: DaemonConfigs = serde_json::from_str(body).unwrap();
        assert_eq!(configs.socks_port, 7891);
        assert_eq!(configs.mixed_port, 7892);
        assert!(configs.allow_lan);
        assert_eq!(configs.mode, "rule");
    }

    #[test]
    fn decode_configs_tolerates_missing_fields() {
        let configs: DaemonConfigs = serde_json::from_str(r#"{"mode": "global"}"#).unwrap();
        assert_eq!(configs.mode, "global");
        assert_eq!(configs.port, 0);
    }
}
