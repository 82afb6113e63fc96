use std::collections::HashMap;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::config::ConfigStore;
use crate::error::Error;
use crate::{PortNo, Result};

/// One vector component, keyed by a tunnel-end prefix. The prefix is matched
/// against the remote end address of the configured tunnels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorValue {
    pub tunnel_end_prefix: Ipv4Net,
    pub value: i64,
}

/// Target traffic magnitudes per tunnel end, produced by the economic
/// analyzer. Only the ratio between the two values of a pair matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceVector {
    pub values: Vec<VectorValue>,
}

/// Signed short-term correction, zero-summing per tunnel pair. The positive
/// side names the tunnel that has to catch up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationVector {
    pub values: Vec<VectorValue>,
}

/// Merged vector state, kept both by prefix (as received) and by egress port
/// (as consumed by the decision path). Setters validate fully before touching
/// any map.
#[derive(Debug, Default)]
pub struct VectorStore {
    pub(crate) reference_by_prefix: HashMap<Ipv4Net, i64>,
    pub(crate) reference_by_port: HashMap<PortNo, i64>,
    pub(crate) compensation_by_prefix: HashMap<Ipv4Net, i64>,
    pub(crate) compensation_by_port: HashMap<PortNo, i64>,
    pub(crate) compensating_by_port: HashMap<PortNo, bool>,
    pub(crate) baseline_by_port: HashMap<PortNo, u64>,
}

/// A vector value resolved against the configuration.
struct Resolved {
    prefix: Ipv4Net,
    value: i64,
    entry: usize,
    port: PortNo,
}

impl VectorStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Merges a reference vector. `None` is a deliberate no-op so upstream
    /// can heartbeat without forcing an update.
    pub fn set_reference(
        &mut self,
        config: &ConfigStore,
        vector: Option<&ReferenceVector>,
    ) -> Result<()> {
        let vector = match vector {
            Some(v) => v,
            None => return Ok(()),
        };
        let resolved = resolve_values(config, &vector.values, "reference")?;
        for r in &resolved {
            if r.value < 0 {
                return Err(Error::InvalidVector(format!(
                    "reference value {} for {} is negative",
                    r.value, r.prefix
                )));
            }
        }
        for r in resolved {
            log::debug!("reference: {} -> {} (port {})", r.prefix, r.value, r.port);
            self.reference_by_prefix.insert(r.prefix, r.value);
            self.reference_by_port.insert(r.port, r.value);
        }
        Ok(())
    }

    /// Merges a compensation vector and captures the byte-counter baseline
    /// for the covered ports from `snapshot`. `None` is a no-op.
    pub fn set_compensation(
        &mut self,
        config: &ConfigStore,
        vector: Option<&CompensationVector>,
        snapshot: &HashMap<PortNo, u64>,
    ) -> Result<()> {
        let vector = match vector {
            Some(v) => v,
            None => return Ok(()),
        };
        let resolved = resolve_values(config, &vector.values, "compensation")?;

        let mut by_entry: HashMap<usize, Vec<&Resolved>> = HashMap::new();
        for r in &resolved {
            by_entry.entry(r.entry).or_default().push(r);
        }
        for values in by_entry.values() {
            let sum: i64 = values.iter().map(|r| r.value).sum();
            if sum != 0 {
                return Err(Error::InvalidVector(format!(
                    "compensation pair for {} sums to {}, not zero",
                    values[0].prefix, sum
                )));
            }
        }

        for (_, values) in by_entry {
            let active = values.iter().any(|r| r.value != 0);
            for r in values {
                log::debug!(
                    "compensation: {} -> {} (port {}, active: {})",
                    r.prefix,
                    r.value,
                    r.port,
                    active
                );
                self.compensation_by_prefix.insert(r.prefix, r.value);
                self.compensation_by_port.insert(r.port, r.value);
                self.compensating_by_port.insert(r.port, active);
                self.baseline_by_port
                    .insert(r.port, snapshot.get(&r.port).copied().unwrap_or(0));
            }
        }
        Ok(())
    }

    /// Marks a pair's compensation as exhausted and restarts its traffic
    /// baseline at the current counters.
    pub fn end_compensation(&mut self, ports: [PortNo; 2], snapshot: &HashMap<PortNo, u64>) {
        for port in ports.iter() {
            self.compensating_by_port.insert(*port, false);
            self.baseline_by_port
                .insert(*port, snapshot.get(port).copied().unwrap_or(0));
        }
    }

    /// Rebinds the store to a new configuration: per-prefix values whose
    /// prefix still resolves are kept and their port mappings rebuilt,
    /// everything else is dropped.
    pub fn rebind(&mut self, config: &ConfigStore) {
        let port_of = |config: &ConfigStore, prefix: &Ipv4Net| -> Option<PortNo> {
            config
                .resolve_tunnel_end(prefix)
                .map(|(ei, ti)| config.entries()[ei].tunnels[ti].egress_port)
        };

        self.reference_by_prefix
            .retain(|prefix, _| port_of(config, prefix).is_some());
        self.reference_by_port = self
            .reference_by_prefix
            .iter()
            .filter_map(|(prefix, &v)| port_of(config, prefix).map(|p| (p, v)))
            .collect();

        self.compensation_by_prefix
            .retain(|prefix, _| port_of(config, prefix).is_some());
        self.compensation_by_port = self
            .compensation_by_prefix
            .iter()
            .filter_map(|(prefix, &v)| port_of(config, prefix).map(|p| (p, v)))
            .collect();

        let ports: std::collections::HashSet<PortNo> =
            config.egress_ports().into_iter().collect();
        self.compensating_by_port.retain(|port, _| ports.contains(port));
        self.baseline_by_port.retain(|port, _| ports.contains(port));
    }

    pub fn reference_for_port(&self, port: PortNo) -> Option<i64> {
        self.reference_by_port.get(&port).copied()
    }

    pub fn compensation_for_port(&self, port: PortNo) -> i64 {
        self.compensation_by_port.get(&port).copied().unwrap_or(0)
    }

    pub fn is_compensating(&self, port: PortNo) -> bool {
        self.compensating_by_port.get(&port).copied().unwrap_or(false)
    }

    pub fn baseline(&self, port: PortNo) -> u64 {
        self.baseline_by_port.get(&port).copied().unwrap_or(0)
    }
}

fn resolve_values(
    config: &ConfigStore,
    values: &[VectorValue],
    kind: &str,
) -> Result<Vec<Resolved>> {
    if values.is_empty() {
        return Err(Error::InvalidVector(format!("{} vector has no values", kind)));
    }
    let mut resolved = Vec::with_capacity(values.len());
    for value in values {
        let (entry, tunnel) = config.resolve_tunnel_end(&value.tunnel_end_prefix).ok_or_else(
            || {
                Error::InvalidVector(format!(
                    "{} prefix {} covers no configured tunnel",
                    kind, value.tunnel_end_prefix
                ))
            },
        )?;
        let port = config.entries()[entry].tunnels[tunnel].egress_port;
        if resolved.iter().any(|r: &Resolved| r.port == port) {
            return Err(Error::InvalidVector(format!(
                "{} vector covers port {} twice",
                kind, port
            )));
        }
        resolved.push(Resolved {
            prefix: value.tunnel_end_prefix,
            value: value.value,
            entry,
            port,
        });
    }

    // Both tunnels of a pair are updated together or not at all.
    let mut touched: HashMap<usize, usize> = HashMap::new();
    for r in &resolved {
        *touched.entry(r.entry).or_insert(0) += 1;
    }
    for (entry, count) in touched {
        if count != 2 {
            return Err(Error::InvalidVector(format!(
                "{} vector covers only one tunnel of entry {}",
                kind,
                config.entries()[entry].remote_dc_prefix
            )));
        }
    }
    Ok(resolved)
}
