use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::Dtm;

/// Default polling interval for port statistics, in milliseconds.
pub const PORT_STATISTICS_POLLING_INTERVAL: u64 = 1000;

/// Periodically refreshes the engine's byte-counter cache from the bound
/// switch. Polling is suspended while no switch is bound; a failed query for
/// one port keeps that port's cached value and does not stop the others.
pub struct PortStatsPoller {
    interval_ms: u64,
    handle: Option<std::thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl PortStatsPoller {
    pub fn new(interval_ms: u64) -> Self {
        PortStatsPoller {
            interval_ms,
            handle: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the polling thread.
    pub fn run(&mut self, engine: Arc<Dtm>) {
        log::info!(
            "starting port statistics poller, interval {} ms",
            self.interval_ms
        );

        let sleep_ms = std::time::Duration::from_millis(self.interval_ms);
        let stop = Arc::clone(&self.stop);

        self.handle = Some(std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                if let Some(switch) = engine.bound_switch() {
                    for port in engine.egress_ports() {
                        match switch.transmitted_bytes(port) {
                            Ok(bytes) => {
                                log::trace!("port {}: tx bytes {}", port, bytes);
                                engine.commit_transmitted_bytes(&switch, port, bytes);
                            }
                            Err(e) => {
                                log::warn!("statistics query for port {} failed: {}", port, e)
                            }
                        }
                    }
                }
                std::thread::sleep(sleep_ms);
            }
        }));
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn join(self) -> std::thread::Result<()> {
        self.handle
            .expect("port statistics poller failed to start")
            .join()
    }
}
