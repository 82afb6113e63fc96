use std::net::SocketAddr;
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "dtmd", about = "Inter-domain traffic-splitting agent.")]
pub struct Opts {
    /// Tunnel topology file, toml
    #[structopt(short = "c", long = "config")]
    pub config: PathBuf,

    /// OVS bridge carrying the WAN tunnels
    #[structopt(short = "b", long = "bridge", default_value = "br0")]
    pub bridge: String,

    /// Listen address for config and vector updates
    #[structopt(short = "l", long = "listen", default_value = "0.0.0.0:6643")]
    pub listen: SocketAddr,

    /// Port statistics polling interval in milliseconds
    #[structopt(short = "i", long = "interval", default_value = "1000")]
    pub interval_ms: u64,
}
