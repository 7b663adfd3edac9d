//! IGMPv3-driven multicast stream re-injector.
//!
//! Listens for IGMPv3 membership reports on a LAN segment, treats them as
//! channel-change commands, and relays the corresponding udpxy HTTP stream
//! as native UDP multicast on that segment.

pub mod cli;
pub mod config;
pub mod error;
pub mod iface;
pub mod session;

pub use cli::Config;
pub use error::RelayError;
