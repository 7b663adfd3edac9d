//! Session lifecycle: one Forwarder active at a time, started and stopped
//! by the controller in response to debounced IGMP events.

pub mod controller;
pub mod forwarder;

pub use controller::SessionController;
pub use forwarder::{ForwarderConfig, ForwarderSession};
