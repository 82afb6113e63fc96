pub mod argument;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod ovs;
pub mod selector;
pub mod stats;
pub mod switch;
pub mod vectors;

pub use config::{ConfigData, ConfigEntry, OperationMode, Tunnel};
pub use engine::Dtm;
pub use error::Error;
pub use switch::Switch;
pub use vectors::{CompensationVector, ReferenceVector, VectorValue};

/// OpenFlow 1.0 port number of a switch port.
pub type PortNo = u16;

pub type Result<T> = std::result::Result<T, Error>;
