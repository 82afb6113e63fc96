use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, RwLock};

use ipnet::Ipv4Net;

use crate::classifier;
use crate::config::{ConfigData, ConfigEntry, ConfigStore, OperationMode};
use crate::error::Error;
use crate::selector::{self, PairState};
use crate::switch::Switch;
use crate::vectors::{CompensationVector, ReferenceVector, VectorStore};
use crate::{PortNo, Result};

/// Config and vector state behind one lock, so a decision never observes a
/// config/vector pair mismatch.
#[derive(Debug, Default)]
struct EngineState {
    config: ConfigStore,
    vectors: VectorStore,
}

/// The traffic-splitting decision engine. One instance per controller,
/// shared through an `Arc` between the packet-in dispatch path, the vector
/// update feed and the statistics poller.
pub struct Dtm {
    state: Mutex<EngineState>,
    stats: RwLock<HashMap<PortNo, u64>>,
    switch: Mutex<Option<Arc<dyn Switch>>>,
}

impl Dtm {
    pub fn new() -> Self {
        Dtm {
            state: Mutex::new(EngineState::default()),
            stats: RwLock::new(HashMap::new()),
            switch: Mutex::new(None),
        }
    }

    /// Installs a new tunnel topology. Vector state for prefixes that
    /// survive the change is kept, everything else is dropped.
    pub fn set_config(&self, config: ConfigData) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.config.set(config)?;
        state.vectors.rebind(&state.config);
        Ok(())
    }

    pub fn set_reference(&self, vector: Option<&ReferenceVector>) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.vectors.set_reference(&state.config, vector)
    }

    /// Installs a compensation vector, capturing the byte-counter baseline
    /// for the covered ports from the current snapshot.
    pub fn set_compensation(&self, vector: Option<&CompensationVector>) -> Result<()> {
        let snapshot = self.stats.read().unwrap().clone();
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.vectors.set_compensation(&state.config, vector, &snapshot)
    }

    /// Binds the switch whose counters drive the decisions. Rebinding
    /// requires an explicit `unbind` first, otherwise counter epochs from
    /// two switches would silently mix.
    pub fn bind(&self, switch: Arc<dyn Switch>) -> Result<()> {
        let mut guard = self.switch.lock().unwrap();
        if guard.is_some() {
            return Err(Error::IllegalState("switch already bound"));
        }
        log::info!("switch bound");
        *guard = Some(switch);
        Ok(())
    }

    pub fn unbind(&self) {
        log::info!("switch unbound");
        *self.switch.lock().unwrap() = None;
    }

    pub fn bound_switch(&self) -> Option<Arc<dyn Switch>> {
        self.switch.lock().unwrap().clone()
    }

    /// Egress ports of the active configuration, the set the poller queries.
    pub fn egress_ports(&self) -> Vec<PortNo> {
        self.state.lock().unwrap().config.egress_ports()
    }

    /// Commits one polled counter value, unless `source` is no longer the
    /// bound switch: results in flight across an unbind are dropped.
    pub fn commit_transmitted_bytes(&self, source: &Arc<dyn Switch>, port: PortNo, bytes: u64) {
        let bound = self.switch.lock().unwrap();
        match bound.as_ref() {
            Some(switch) if Arc::ptr_eq(switch, source) => {}
            _ => {
                log::debug!("dropping stale counter for port {}", port);
                return;
            }
        }
        drop(bound);
        self.stats.write().unwrap().insert(port, bytes);
    }

    /// Test/tooling entry: records a counter value without a switch check.
    pub fn record_transmitted_bytes(&self, port: PortNo, bytes: u64) {
        self.stats.write().unwrap().insert(port, bytes);
    }

    pub fn transmitted_bytes(&self) -> HashMap<PortNo, u64> {
        self.stats.read().unwrap().clone()
    }

    pub fn baselines(&self) -> HashMap<PortNo, u64> {
        self.state.lock().unwrap().vectors.baseline_by_port.clone()
    }

    /// Picks the egress port for one destination address (reactive modes).
    /// An unmanaged destination is a quiet non-decision, not an error.
    pub fn decide(&self, dst: Ipv4Addr) -> Result<Option<PortNo>> {
        let snapshot = self.stats.read().unwrap().clone();
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if !state.config.is_set() {
            return Err(Error::IllegalState("no configuration installed"));
        }
        let mode = state.config.effective_mode();
        if mode.is_proactive() {
            return Err(Error::IllegalState(
                "per-packet decisions are disabled in proactive modes",
            ));
        }
        let entry = match state.config.entry_for(dst) {
            Some(entry) => entry,
            None => {
                log::debug!("no configured prefix matches {}", dst);
                return Ok(None);
            }
        };
        let port = decide_entry(entry, &mut state.vectors, &snapshot, mode);
        log::debug!("decision for {}: port {}", dst, port);
        Ok(Some(port))
    }

    /// Picks the egress port for a raw packet-in frame. Non-IPv4 frames are
    /// non-decisions.
    pub fn decide_packet(&self, frame: &[u8]) -> Result<Option<PortNo>> {
        match classifier::ipv4_dst(frame) {
            Some(dst) => self.decide(dst),
            None => Ok(None),
        }
    }

    /// Computes the egress port for every configured entry in one pass
    /// (proactive modes), for bulk pre-installation of forwarding rules.
    pub fn decide_all(&self) -> Result<HashMap<Ipv4Net, PortNo>> {
        let snapshot = self.stats.read().unwrap().clone();
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if !state.config.is_set() {
            return Err(Error::IllegalState("no configuration installed"));
        }
        let mode = state.config.effective_mode();
        if !mode.is_proactive() {
            return Err(Error::IllegalState(
                "bulk decisions are only available in proactive modes",
            ));
        }
        let mut decisions = HashMap::new();
        for i in 0..state.config.entries().len() {
            let entry = &state.config.entries()[i];
            let prefix = entry.remote_dc_prefix;
            let port = decide_entry(entry, &mut state.vectors, &snapshot, mode);
            decisions.insert(prefix, port);
        }
        log::debug!("bulk decision: {:?}", decisions);
        Ok(decisions)
    }
}

impl Default for Dtm {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the decision core for one entry and applies its side effect: an
/// exhausted compensation clears the pair's flag and restarts its baseline
/// at the current counters.
fn decide_entry(
    entry: &ConfigEntry,
    vectors: &mut VectorStore,
    snapshot: &HashMap<PortNo, u64>,
    mode: OperationMode,
) -> PortNo {
    let ports = [entry.tunnels[0].egress_port, entry.tunnels[1].egress_port];
    let reference = match (
        vectors.reference_for_port(ports[0]),
        vectors.reference_for_port(ports[1]),
    ) {
        (Some(r0), Some(r1)) => Some([r0, r1]),
        _ => None,
    };
    let counters = [
        snapshot.get(&ports[0]).copied().unwrap_or(0),
        snapshot.get(&ports[1]).copied().unwrap_or(0),
    ];
    let pair = PairState {
        ports,
        reference,
        compensation: [
            vectors.compensation_for_port(ports[0]),
            vectors.compensation_for_port(ports[1]),
        ],
        compensating: vectors.is_compensating(ports[0]) || vectors.is_compensating(ports[1]),
        traffic: [
            counters[0].saturating_sub(vectors.baseline(ports[0])),
            counters[1].saturating_sub(vectors.baseline(ports[1])),
        ],
    };
    let verdict = selector::decide_pair(mode, &pair);
    if verdict.compensation_ended {
        vectors.end_compensation(ports, snapshot);
    }
    verdict.port
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::one_dc_config;

    #[test]
    fn decide_without_config_is_illegal() {
        let engine = Dtm::new();
        let err = engine.decide("10.10.1.100".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn decide_all_in_reactive_mode_is_illegal() {
        let engine = Dtm::new();
        engine.set_config(one_dc_config()).unwrap();
        let err = engine.decide_all().unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn unmanaged_destination_is_a_non_decision() {
        let engine = Dtm::new();
        engine.set_config(one_dc_config()).unwrap();
        assert_eq!(engine.decide("192.168.1.1".parse().unwrap()).unwrap(), None);
    }
}
