//! Drives the IGMP listener loop and reacts to its events with a single-slot
//! session state machine: at most one Forwarder runs at a time.

use log::{error, info};

use crate::cli::Config;
use crate::iface::{IgmpEvent, IgmpListener, InterfaceBinding};
use crate::session::forwarder::{ForwarderConfig, ForwarderSession};

/// Owns the (at most one) running Forwarder and reacts to listener events.
pub struct SessionController {
    config: Config,
    udpxy_interface_ipv4: std::net::Ipv4Addr,
    stream_interface_ipv4: std::net::Ipv4Addr,
    current: Option<ForwarderSession>,
}

impl SessionController {
    pub fn new(
        config: Config,
        udpxy_binding: InterfaceBinding,
        stream_binding: InterfaceBinding,
    ) -> Self {
        SessionController {
            config,
            udpxy_interface_ipv4: udpxy_binding.ipv4,
            stream_interface_ipv4: stream_binding.ipv4,
            current: None,
        }
    }

    /// Drives the listener loop forever, reacting to each debounced event in
    /// arrival order. Only returns if `listener.next_event()` were ever to
    /// return control (it does not, by design).
    pub fn run(&mut self, listener: &mut IgmpListener) {
        loop {
            let event = listener.next_event();
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: IgmpEvent) {
        match event {
            IgmpEvent::JoinRequest(group) => {
                if let Some(session) = self.current.take() {
                    info!("switching channel to {group}, cancelling forwarder for {}", session.group);
                    session.cancel();
                    session.join();
                } else {
                    info!("starting forwarder for {group}");
                }
                self.start_forwarder(group);
            }
            IgmpEvent::LeaveRequest => {
                if let Some(session) = self.current.take() {
                    info!("leave request, cancelling forwarder for {}", session.group);
                    session.cancel();
                    session.join();
                }
            }
        }
    }

    fn start_forwarder(&mut self, group: std::net::Ipv4Addr) {
        let forwarder_config = ForwarderConfig {
            group,
            stream_port: self.config.stream_port,
            udpxy_address: self.config.udpxy_address,
            udpxy_port: self.config.udpxy_port,
            udpxy_interface_name: self.config.udpxy_interface.clone(),
            udpxy_interface_ipv4: self.udpxy_interface_ipv4,
            stream_interface_ipv4: self.stream_interface_ipv4,
        };
        match ForwarderSession::spawn(forwarder_config) {
            Ok(session) => self.current = Some(session),
            Err(e) => {
                error!("failed to start forwarder for {group}: {e}");
                self.current = None;
            }
        }
    }
}
