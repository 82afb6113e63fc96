use std::io;
use std::process::Command;

use thiserror::Error;

use crate::switch::Switch;
use crate::PortNo;

// ovs-ofctl dump-ports br0 1
// OFPST_PORT reply (xid=0x2): 1 ports
//   port  1: rx pkts=13, bytes=1026, drop=0, errs=0, frame=0, over=0, crc=0
//            tx pkts=10, bytes=796, drop=0, errs=0, coll=0

/// Counter source backed by `ovs-ofctl dump-ports` on one bridge.
pub struct OvsSwitch {
    bridge: String,
}

#[derive(Error, Debug)]
pub enum DumpPortsParseError {
    #[error("no tx statistics line in output")]
    NoTxLine,
    #[error("no bytes field in tx statistics: {0}")]
    NoBytesField(String),
    #[error("bad bytes value: {0}")]
    BadBytesValue(String),
}

fn parse_tx_bytes(output: &str) -> Result<u64, DumpPortsParseError> {
    let tx = output
        .lines()
        .map(|line| line.trim())
        .find(|line| line.starts_with("tx "))
        .ok_or(DumpPortsParseError::NoTxLine)?;
    let field = tx
        .split(", ")
        .find_map(|tok| tok.trim().strip_prefix("bytes="))
        .ok_or_else(|| DumpPortsParseError::NoBytesField(tx.to_owned()))?;
    field
        .parse()
        .map_err(|_| DumpPortsParseError::BadBytesValue(field.to_owned()))
}

impl OvsSwitch {
    pub fn new(bridge: &str) -> Self {
        OvsSwitch {
            bridge: bridge.to_owned(),
        }
    }
}

impl Switch for OvsSwitch {
    fn transmitted_bytes(&self, port: PortNo) -> io::Result<u64> {
        let output = Command::new("ovs-ofctl")
            .arg("dump-ports")
            .arg(&self.bridge)
            .arg(port.to_string())
            .output()?;
        if !output.status.success() {
            let err = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("ovs-ofctl dump-ports failed: {}", err.trim()),
            ));
        }
        let out = String::from_utf8_lossy(&output.stdout);
        log::trace!("dump-ports {} {}: {}", self.bridge, port, out);
        parse_tx_bytes(&out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
