use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid vector: {0}")]
    InvalidVector(String),
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),
}
