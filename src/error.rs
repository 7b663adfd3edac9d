//! Reportable error taxonomy (see design doc §7).
//!
//! `Configuration` and the interface/listener-side `Io` variants are fatal:
//! they abort startup before any socket exists. `Io` is also reused, non-
//! fatally, for Forwarder-side setup failures, which only terminate the
//! offending Forwarder thread — callers in `session` log and discard it
//! rather than propagating it to `main`.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("interface {0:?} not found or has no IPv4 address")]
    InterfaceNotFound(String),

    #[error("failed to enumerate network interfaces: {0}")]
    InterfaceLookup(#[source] std::io::Error),

    #[error("socket setup failed: {0}")]
    Io(#[source] std::io::Error),
}

impl RelayError {
    pub fn configuration(msg: impl fmt::Display) -> Self {
        RelayError::Configuration(msg.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io(err)
    }
}
