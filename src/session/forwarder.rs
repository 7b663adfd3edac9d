//! Pulls an HTTP-tunneled udpxy stream over TCP and re-emits its body as
//! native UDP multicast datagrams.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::warn;
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{BODY_MARKER, FORWARD_CHUNK_LEN};
use crate::error::RelayError;

/// Everything a Forwarder needs, resolved up front by the controller so the
/// forwarder thread itself never has to touch interface lookups.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub group: Ipv4Addr,
    pub stream_port: u16,
    pub udpxy_address: Ipv4Addr,
    pub udpxy_port: u16,
    pub udpxy_interface_name: String,
    pub udpxy_interface_ipv4: Ipv4Addr,
    pub stream_interface_ipv4: Ipv4Addr,
}

/// A running Forwarder: the handle used by the controller to cancel and
/// join it. Dropping this without calling `cancel`/`join` leaks nothing —
/// the thread still owns and will eventually close both sockets — but the
/// controller always cancels and joins before reusing the session slot.
pub struct ForwarderSession {
    pub group: Ipv4Addr,
    cancel: Arc<AtomicBool>,
    shutdown_handle: TcpStream,
    join_handle: JoinHandle<()>,
}

impl ForwarderSession {
    /// Builds both sockets, fires the HTTP request and spawns the
    /// forwarding thread. Returns `Err` only for the startup phase;
    /// failures inside the loop are logged and simply end the thread.
    pub fn spawn(config: ForwarderConfig) -> Result<Self, RelayError> {
        let tcp_socket = connect_to_udpxy(&config)?;
        let udp_socket = bind_multicast_sender(config.stream_interface_ipv4)?;

        let tcp_stream: TcpStream = tcp_socket.into();
        let shutdown_handle = tcp_stream.try_clone()?;

        send_http_request(&tcp_stream, config.group, config.stream_port)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = Arc::clone(&cancel);
        let group = config.group;
        let stream_port = config.stream_port;

        let join_handle = std::thread::Builder::new()
            .name(format!("forwarder-{group}"))
            .spawn(move || {
                forward_loop(tcp_stream, udp_socket, group, stream_port, thread_cancel);
            })
            .map_err(RelayError::Io)?;

        Ok(ForwarderSession {
            group,
            cancel,
            shutdown_handle,
            join_handle,
        })
    }

    /// Requests prompt termination: sets the cancellation flag and shuts
    /// down the TCP connection so a blocking `recv` unblocks immediately.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.shutdown_handle.shutdown(std::net::Shutdown::Both);
    }

    /// Blocks until the forwarder thread has exited. Must be called after
    /// `cancel` before the slot is considered empty (I3).
    pub fn join(self) {
        let _ = self.join_handle.join();
    }
}

fn connect_to_udpxy(config: &ForwarderConfig) -> Result<Socket, RelayError> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;

    #[cfg(target_os = "linux")]
    socket.bind_device(Some(config.udpxy_interface_name.as_bytes()))?;

    let bind_addr: SocketAddr = SocketAddrV4::new(config.udpxy_interface_ipv4, 0).into();
    socket.bind(&bind_addr.into())?;

    let peer_addr: SocketAddr = SocketAddrV4::new(config.udpxy_address, config.udpxy_port).into();
    socket.connect(&peer_addr.into())?;

    Ok(socket)
}

fn bind_multicast_sender(stream_interface_ipv4: Ipv4Addr) -> Result<UdpSocket, RelayError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_loop_v4(false)?;
    socket.set_multicast_if_v4(&stream_interface_ipv4)?;
    let bind_addr: SocketAddr = SocketAddrV4::new(stream_interface_ipv4, 0).into();
    socket.bind(&bind_addr.into())?;
    Ok(socket.into())
}

fn send_http_request(mut tcp: &TcpStream, group: Ipv4Addr, port: u16) -> Result<(), RelayError> {
    use std::io::Write;
    let request = format!("GET /udp/{group}:{port} HTTP/1.0\r\n\r\n");
    tcp.write_all(request.as_bytes())?;
    Ok(())
}

/// Runs until cancelled or the peer closes the connection. Everything it
/// owns is dropped on return regardless of which exit path was taken.
fn forward_loop(
    mut tcp: TcpStream,
    udp: UdpSocket,
    group: Ipv4Addr,
    port: u16,
    cancel: Arc<AtomicBool>,
) {
    use std::io::{ErrorKind, Read};

    let dest = SocketAddrV4::new(group, port);
    let mut body_started = false;
    let mut carry: Vec<u8> = Vec::with_capacity(BODY_MARKER.len().saturating_sub(1));
    let mut chunk = vec![0u8; FORWARD_CHUNK_LEN];

    loop {
        if cancel.load(Ordering::SeqCst) {
            return;
        }

        let n = match tcp.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                warn!("forwarder tcp recv interrupted: {e}");
                continue;
            }
            Err(e) => {
                warn!("forwarder tcp recv failed: {e}");
                continue;
            }
        };

        if body_started {
            if let Err(e) = udp.send_to(&chunk[..n], dest) {
                warn!("forwarder udp sendto failed: {e}");
            }
            continue;
        }

        carry.extend_from_slice(&chunk[..n]);
        match find_marker(&carry) {
            Some(marker_end) => {
                body_started = true;
                if marker_end < carry.len() {
                    if let Err(e) = udp.send_to(&carry[marker_end..], dest) {
                        warn!("forwarder udp sendto failed: {e}");
                    }
                }
                carry.clear();
            }
            None => {
                let keep = BODY_MARKER.len().saturating_sub(1).min(carry.len());
                let tail_start = carry.len() - keep;
                carry.drain(..tail_start);
            }
        }
    }
}

/// Returns the index just past the end of the marker if found.
fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(BODY_MARKER.len())
        .position(|w| w == BODY_MARKER)
        .map(|start| start + BODY_MARKER.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use rstest::rstest;

    #[test]
    fn find_marker_locates_boundary() {
        let buf = b"HTTP/1.0 200 OK\r\ncontent-type: application/octet-stream\r\n\r\npayload";
        let idx = find_marker(buf).unwrap();
        assert_eq!(&buf[idx..], b"payload");
    }

    #[test]
    fn find_marker_returns_none_without_boundary() {
        let buf = b"HTTP/1.0 200 OK\r\n";
        assert!(find_marker(buf).is_none());
    }

    #[test]
    fn end_to_end_forward_loop_relays_body_after_marker() {
        let tcp_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let tcp_addr = tcp_listener.local_addr().unwrap();

        let udp_recv = UdpSocket::bind("127.0.0.1:0").unwrap();
        let udp_recv_addr = udp_recv.local_addr().unwrap();
        udp_recv
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = tcp_listener.accept().unwrap();
            let mut request = [0u8; 256];
            let _ = stream.read(&mut request);
            stream
                .write_all(b"HTTP/1.0 200 OK\r\ncontent-type: application/octet-stream\r\n\r\nhello")
                .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
        });

        let tcp_client = TcpStream::connect(tcp_addr).unwrap();
        let udp_sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        // Repurpose the forwarding loop with a loopback destination instead
        // of multicast, which is all the loop logic actually depends on.
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_clone = Arc::clone(&cancel);
        let forward_thread = std::thread::spawn(move || {
            forward_loop(
                tcp_client,
                udp_sender,
                udp_recv_addr.ip_addr_v4_or_loopback(),
                udp_recv_addr.port(),
                cancel_clone,
            );
        });

        let mut buf = [0u8; 1024];
        let (n, _) = udp_recv.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");

        cancel.store(true, Ordering::SeqCst);
        server.join().unwrap();
        let _ = forward_thread.join();
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(BODY_MARKER.len() - 1)]
    #[case(BODY_MARKER.len())]
    fn forward_loop_finds_marker_split_across_two_tcp_writes(#[case] split_within_marker: usize) {
        let prefix = b"HTTP/1.0 200 OK\r\ncontent-type: ".to_vec();
        let mut before_body = prefix.clone();
        before_body.extend_from_slice(BODY_MARKER);
        let body = b"payload-body-1234".to_vec();

        // Split somewhere inside (or right at the end of) the marker so the
        // first write ends mid-marker and the second write carries the rest,
        // exercising the rolling carry buffer rather than a single chunk.
        let split_at = prefix.len() + split_within_marker;
        let (first_chunk, rest) = before_body.split_at(split_at);
        let mut second_chunk = rest.to_vec();
        second_chunk.extend_from_slice(&body);

        let tcp_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let tcp_addr = tcp_listener.local_addr().unwrap();

        let udp_recv = UdpSocket::bind("127.0.0.1:0").unwrap();
        let udp_recv_addr = udp_recv.local_addr().unwrap();
        udp_recv
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = tcp_listener.accept().unwrap();
            let mut request = [0u8; 256];
            let _ = stream.read(&mut request);
            stream.write_all(&first_chunk).unwrap();
            stream.flush().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
            stream.write_all(&second_chunk).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
        });

        let tcp_client = TcpStream::connect(tcp_addr).unwrap();
        let udp_sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_clone = Arc::clone(&cancel);
        let forward_thread = std::thread::spawn(move || {
            forward_loop(
                tcp_client,
                udp_sender,
                udp_recv_addr.ip_addr_v4_or_loopback(),
                udp_recv_addr.port(),
                cancel_clone,
            );
        });

        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while received.len() < body.len() {
            let (n, _) = udp_recv.recv_from(&mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, body);

        cancel.store(true, Ordering::SeqCst);
        server.join().unwrap();
        let _ = forward_thread.join();
    }

    trait Ipv4OrLoopback {
        fn ip_addr_v4_or_loopback(&self) -> Ipv4Addr;
    }

    impl Ipv4OrLoopback for SocketAddr {
        fn ip_addr_v4_or_loopback(&self) -> Ipv4Addr {
            match self.ip() {
                std::net::IpAddr::V4(v4) => v4,
                std::net::IpAddr::V6(_) => Ipv4Addr::LOCALHOST,
            }
        }
    }
}
