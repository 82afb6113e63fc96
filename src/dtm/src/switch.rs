use std::io;

use crate::PortNo;

/// Source of cumulative transmitted-byte counters, typically the one
/// OpenFlow switch the engine drives. Implementations may block; the
/// statistics poller calls them from its own thread, never the decision
/// path.
pub trait Switch: Send + Sync {
    fn transmitted_bytes(&self, port: PortNo) -> io::Result<u64>;
}
