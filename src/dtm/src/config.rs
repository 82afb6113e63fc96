use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::{PortNo, Result};

/// One WAN tunnel of a remote-DC pair, pinned to a switch egress port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunnel {
    pub name: String,
    pub local_end: Ipv4Addr,
    pub remote_end: Ipv4Addr,
    pub egress_port: PortNo,
}

/// Two tunnels toward one remote data center, reached through one DA router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub remote_dc_prefix: Ipv4Net,
    pub da_router: String,
    pub tunnels: Vec<Tunnel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    ReactiveWithReference,
    ReactiveWithoutReference,
    ProactiveWithReference,
    ProactiveWithoutReference,
}

impl OperationMode {
    pub fn is_proactive(&self) -> bool {
        matches!(
            self,
            OperationMode::ProactiveWithReference | OperationMode::ProactiveWithoutReference
        )
    }

    pub fn uses_reference(&self) -> bool {
        matches!(
            self,
            OperationMode::ReactiveWithReference | OperationMode::ProactiveWithReference
        )
    }
}

impl Default for OperationMode {
    fn default() -> Self {
        OperationMode::ReactiveWithReference
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigData {
    #[serde(default)]
    pub entries: Vec<ConfigEntry>,
    #[serde(default)]
    pub operation_mode: Option<OperationMode>,
    /// Local-DC ingress ports per DA router, required by the proactive modes.
    #[serde(default)]
    pub local_dc_ports: HashMap<String, Vec<PortNo>>,
}

impl ConfigData {
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn effective_mode(&self) -> OperationMode {
        self.operation_mode.unwrap_or_default()
    }
}

/// The active, validated tunnel topology. `set` either replaces the whole
/// configuration or rejects it, never both.
#[derive(Debug, Default)]
pub struct ConfigStore {
    data: Option<ConfigData>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&mut self, config: ConfigData) -> Result<()> {
        validate(&config)?;
        log::info!(
            "installing configuration: {} entries, mode {:?}",
            config.entries.len(),
            config.effective_mode()
        );
        self.data = Some(config);
        Ok(())
    }

    pub fn get(&self) -> Option<&ConfigData> {
        self.data.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.data.is_some()
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        self.data.as_ref().map(|d| d.entries.as_slice()).unwrap_or(&[])
    }

    pub fn effective_mode(&self) -> OperationMode {
        self.data
            .as_ref()
            .map(|d| d.effective_mode())
            .unwrap_or_default()
    }

    /// Longest-prefix match of a destination address against the configured
    /// remote-DC prefixes.
    pub fn entry_for(&self, dst: Ipv4Addr) -> Option<&ConfigEntry> {
        self.entries()
            .iter()
            .filter(|e| e.remote_dc_prefix.contains(&dst))
            .max_by_key(|e| e.remote_dc_prefix.prefix_len())
    }

    /// Resolves a tunnel-end prefix carried by a vector value to the tunnel
    /// whose remote end it covers. Returns entry and tunnel indices.
    pub fn resolve_tunnel_end(&self, prefix: &Ipv4Net) -> Option<(usize, usize)> {
        for (ei, entry) in self.entries().iter().enumerate() {
            for (ti, tunnel) in entry.tunnels.iter().enumerate() {
                if prefix.contains(&tunnel.remote_end) {
                    return Some((ei, ti));
                }
            }
        }
        None
    }

    /// All egress ports referenced by the active configuration.
    pub fn egress_ports(&self) -> Vec<PortNo> {
        self.entries()
            .iter()
            .flat_map(|e| e.tunnels.iter().map(|t| t.egress_port))
            .collect()
    }
}

fn validate(config: &ConfigData) -> Result<()> {
    if config.entries.is_empty() {
        return Err(Error::InvalidConfig("no entries".to_string()));
    }
    for entry in &config.entries {
        if entry.da_router.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "entry {} has no DA router id",
                entry.remote_dc_prefix
            )));
        }
        if entry.tunnels.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "entry {} has no tunnels",
                entry.remote_dc_prefix
            )));
        }
        if entry.tunnels.len() != 2 {
            return Err(Error::InvalidConfig(format!(
                "entry {} has {} tunnels, exactly 2 are supported",
                entry.remote_dc_prefix,
                entry.tunnels.len()
            )));
        }
    }

    let mut names = HashSet::new();
    let mut ports = HashSet::new();
    for tunnel in config.entries.iter().flat_map(|e| e.tunnels.iter()) {
        if !names.insert(&tunnel.name) {
            return Err(Error::InvalidConfig(format!(
                "tunnel name {} is not unique",
                tunnel.name
            )));
        }
        if !ports.insert(tunnel.egress_port) {
            return Err(Error::InvalidConfig(format!(
                "egress port {} is not unique",
                tunnel.egress_port
            )));
        }
    }

    if config.effective_mode().is_proactive() {
        for entry in &config.entries {
            match config.local_dc_ports.get(&entry.da_router) {
                Some(ports) if !ports.is_empty() => {}
                _ => {
                    return Err(Error::InvalidConfig(format!(
                        "no local DC ports for DA router {}",
                        entry.da_router
                    )))
                }
            }
        }
    }

    Ok(())
}
