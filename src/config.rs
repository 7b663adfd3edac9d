//! Compile-time constants shared across the listener, controller and forwarder.

use std::net::Ipv4Addr;

/// The all-IGMPv3-routers group (RFC 3376 §4.2.14). The listener joins this
/// group on the stream interface so the kernel delivers membership reports
/// to our raw socket instead of discarding them.
pub const ALL_IGMPV3_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 22);

/// IGMP message type for an IGMPv3 membership report (RFC 3376 §4.2).
pub const IGMP_MEMBERSHIP_REPORT_V3: u8 = 0x22;

/// Size of the fixed IGMPv3 membership report header that follows the IP
/// header: type(1) + reserved(1) + checksum(2) + reserved(2) + numgrps(2).
pub const IGMP_REPORT_HEADER_LEN: usize = 8;

/// Size of the fixed part of a single IGMPv3 group record: record_type(1) +
/// aux_data_len(1) + number_of_sources(2) + multicast_address(4).
pub const IGMP_RECORD_HEADER_LEN: usize = 8;

/// Read buffer for the raw IGMP socket. Large enough for an IPv4 header plus
/// a report carrying a handful of group records; well above the 64-byte
/// floor the design calls for.
pub const IGMP_RECV_BUFFER_LEN: usize = 1500;

/// Default udpxy TCP port, matching udpxy's own default.
pub const DEFAULT_UDPXY_PORT: u16 = 4022;

/// Bytes read per Forwarder TCP recv call; each call's payload becomes one
/// outgoing UDP datagram once the body has started.
pub const FORWARD_CHUNK_LEN: usize = 4096;

/// HTTP boundary between udpxy's response headers and the raw stream body.
pub const BODY_MARKER: &[u8] = b"application/octet-stream\r\n\r\n";

/// Default log level when neither `RUST_LOG` nor `--verbose` is given.
pub const DEFAULT_LOG_LEVEL: &str = "info";
