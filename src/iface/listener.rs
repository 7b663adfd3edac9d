//! Raw-socket IGMPv3 reception and the debounce state machine that turns a
//! stream of membership reports into join/leave commands for the session
//! controller.

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use log::{debug, warn};
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{ALL_IGMPV3_ROUTERS, IGMP_RECV_BUFFER_LEN};
use crate::error::RelayError;
use crate::iface::resolver::InterfaceBinding;
use crate::iface::wire::{self, RecordType};

/// A debounced command out of the listener; `SessionController` acts on
/// these without any knowledge of IGMP wire details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgmpEvent {
    JoinRequest(Ipv4Addr),
    LeaveRequest,
}

/// Counts consecutive matching reports of each kind. A logical event fires
/// only on the second consecutive report of its kind; a report of the other
/// kind does not reset the first counter (see module docs on why: end hosts
/// commonly send each membership change twice).
#[derive(Debug, Default, Clone, Copy)]
struct PendingCounters {
    join_count: u8,
    leave_count: u8,
}

impl PendingCounters {
    fn on_join(&mut self, group: Ipv4Addr) -> Option<IgmpEvent> {
        self.join_count += 1;
        if self.join_count >= 2 {
            self.join_count = 0;
            Some(IgmpEvent::JoinRequest(group))
        } else {
            None
        }
    }

    fn on_leave(&mut self) -> Option<IgmpEvent> {
        self.leave_count += 1;
        if self.leave_count >= 2 {
            self.leave_count = 0;
            Some(IgmpEvent::LeaveRequest)
        } else {
            None
        }
    }
}

/// Best-effort check; raw sockets need `CAP_NET_RAW` (commonly just root),
/// and the `Socket::new` call below will fail with a clearer I/O error
/// regardless, but this gives the operator an earlier, friendlier hint.
fn warn_if_not_root() {
    if unsafe { libc::geteuid() } != 0 {
        warn!("not running as root; opening the raw IGMP socket may fail (needs CAP_NET_RAW)");
    }
}

/// Listens for IGMPv3 membership reports on one interface and yields
/// debounced join/leave commands.
pub struct IgmpListener {
    socket: Socket,
    bound_ipv4: Ipv4Addr,
    counters: PendingCounters,
    pending: VecDeque<IgmpEvent>,
}

impl IgmpListener {
    /// Opens the raw IGMP socket, binds it to `iface_name` at the link
    /// layer where supported, resolves the interface's IPv4 address and
    /// joins the all-IGMPv3-routers group on it. Any failure here is fatal.
    pub fn new(iface_name: &str) -> Result<Self, RelayError> {
        warn_if_not_root();

        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(libc::IPPROTO_IGMP)))?;

        #[cfg(target_os = "linux")]
        socket.bind_device(Some(iface_name.as_bytes()))?;

        let binding = InterfaceBinding::resolve(iface_name)?;
        socket.join_multicast_v4(&ALL_IGMPV3_ROUTERS, &binding.ipv4)?;

        Ok(IgmpListener {
            socket,
            bound_ipv4: binding.ipv4,
            counters: PendingCounters::default(),
            pending: VecDeque::new(),
        })
    }

    /// Blocks until a debounced join/leave command is ready.
    pub fn next_event(&mut self) -> IgmpEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }
            self.read_and_process_datagram();
        }
    }

    fn read_and_process_datagram(&mut self) {
        let mut buf = [std::mem::MaybeUninit::uninit(); IGMP_RECV_BUFFER_LEN];
        let n = match self.socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("igmp recv failed: {e}");
                return;
            }
        };
        // SAFETY: `recv` initialized the first `n` bytes.
        let buf: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, n) };

        let Some(header_len) = wire::ipv4_header_len(buf) else {
            debug!("dropping igmp datagram: bad ip header");
            return;
        };
        let Some(source) = wire::ipv4_source(&buf[..header_len]) else {
            debug!("dropping igmp datagram: truncated ip header");
            return;
        };
        if source == self.bound_ipv4 {
            return;
        }

        let Some(records) = wire::parse_membership_report(&buf[header_len..]) else {
            debug!("dropping igmp datagram: not a v3 membership report");
            return;
        };

        for record in records {
            let event = match record.record_type {
                RecordType::ChangeToExcludeMode => self.counters.on_join(record.multicast_address),
                RecordType::ChangeToIncludeMode if record.number_of_sources == 0 => {
                    self.counters.on_leave()
                }
                _ => None,
            };
            if let Some(event) = event {
                self.pending.push_back(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn join_fires_on_second_consecutive_report() {
        let mut counters = PendingCounters::default();
        let group = Ipv4Addr::new(239, 255, 0, 1);
        assert_eq!(counters.on_join(group), None);
        assert_eq!(counters.on_join(group), Some(IgmpEvent::JoinRequest(group)));
        assert_eq!(counters.join_count, 0);
    }

    #[test]
    fn leave_fires_on_second_consecutive_report() {
        let mut counters = PendingCounters::default();
        assert_eq!(counters.on_leave(), None);
        assert_eq!(counters.on_leave(), Some(IgmpEvent::LeaveRequest));
        assert_eq!(counters.leave_count, 0);
    }

    #[test]
    fn other_kind_report_does_not_reset_pending_counter() {
        let mut counters = PendingCounters::default();
        let group = Ipv4Addr::new(239, 255, 0, 1);
        assert_eq!(counters.on_join(group), None);
        assert_eq!(counters.on_leave(), None);
        // join_count should still be 1, so the next join fires.
        assert_eq!(counters.on_join(group), Some(IgmpEvent::JoinRequest(group)));
    }

    #[rstest]
    #[case(1, None)]
    #[case(2, Some(()))]
    fn join_counter_fires_exactly_on_count_two(#[case] reports: u8, #[case] expect_fire: Option<()>) {
        let mut counters = PendingCounters::default();
        let group = Ipv4Addr::new(239, 255, 0, 9);
        let mut fired = None;
        for _ in 0..reports {
            if let Some(event) = counters.on_join(group) {
                fired = Some(event);
            }
        }
        assert_eq!(fired.is_some(), expect_fire.is_some());
    }

    #[test]
    fn counters_never_exceed_one_after_processing() {
        let mut counters = PendingCounters::default();
        let group = Ipv4Addr::new(239, 255, 0, 1);
        counters.on_join(group);
        assert!(counters.join_count < 2);
        counters.on_join(group);
        assert!(counters.join_count < 2);
    }
}
