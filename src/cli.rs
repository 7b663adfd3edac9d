//! Command-line configuration, built the way the reference codebase's own
//! example binaries build theirs: a `getopts::Options` table, parsed against
//! `env::args()`, yielding a typed config or a fatal `Configuration` error.

use std::net::Ipv4Addr;

use getopts::Options;

use crate::config::DEFAULT_UDPXY_PORT;
use crate::error::RelayError;

/// Fully parsed, validated configuration for one run of the relay.
#[derive(Debug, Clone)]
pub struct Config {
    pub udpxy_interface: String,
    pub udpxy_address: Ipv4Addr,
    pub udpxy_port: u16,
    pub stream_interface: String,
    pub stream_port: u16,
    pub log_level: String,
}

/// `Ok(None)` means the caller asked for `--help`: usage was already
/// printed and the process should exit 0 without doing anything else.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Option<Config>, RelayError> {
    let args: Vec<String> = args.into_iter().collect();
    let program = args.first().cloned().unwrap_or_else(|| "igmp-relay".into());

    let mut opts = Options::new();
    opts.reqopt("", "udpxy-interface", "NIC for the outbound TCP connection to udpxy", "IFACE");
    opts.reqopt("", "udpxy-address", "udpxy host (IPv4 dotted quad)", "ADDR");
    opts.optopt(
        "",
        "udpxy-port",
        &format!("udpxy TCP port (default {DEFAULT_UDPXY_PORT})"),
        "PORT",
    );
    opts.reqopt("", "stream-interface", "NIC to listen for IGMPv3 on and emit multicast UDP on", "IFACE");
    opts.reqopt("", "stream-port", "UDP port for the GET URL and the outgoing datagrams", "PORT");
    opts.optflag("v", "verbose", "raise the default log level to debug");
    opts.optflag("h", "help", "print this help and exit");

    // `Options::parse` validates `reqopt` fields unconditionally, before a
    // caller can inspect `-h`/`--help` on the returned `Matches` — so
    // `--help` alone would fail with a missing-option error rather than
    // printing usage. Scan the raw args for help first and short-circuit.
    if args[1..].iter().any(|a| a == "-h" || a == "--help") {
        print!("{}", opts.usage(&format!("Usage: {program} [options]")));
        return Ok(None);
    }

    let matches = opts
        .parse(&args[1..])
        .map_err(|e| RelayError::configuration(e))?;

    let udpxy_interface = matches.opt_str("udpxy-interface").expect("reqopt");
    let stream_interface = matches.opt_str("stream-interface").expect("reqopt");

    let udpxy_address_raw = matches.opt_str("udpxy-address").expect("reqopt");
    let udpxy_address: Ipv4Addr = udpxy_address_raw
        .parse()
        .map_err(|_| RelayError::configuration(format!("invalid --udpxy-address {udpxy_address_raw:?}")))?;

    let udpxy_port = match matches.opt_str("udpxy-port") {
        Some(raw) => raw
            .parse()
            .map_err(|_| RelayError::configuration(format!("invalid --udpxy-port {raw:?}")))?,
        None => DEFAULT_UDPXY_PORT,
    };

    let stream_port_raw = matches.opt_str("stream-port").expect("reqopt");
    let stream_port: u16 = stream_port_raw
        .parse()
        .map_err(|_| RelayError::configuration(format!("invalid --stream-port {stream_port_raw:?}")))?;

    let log_level = if matches.opt_present("v") {
        "debug".to_string()
    } else {
        crate::config::DEFAULT_LOG_LEVEL.to_string()
    };

    Ok(Some(Config {
        udpxy_interface,
        udpxy_address,
        udpxy_port,
        stream_interface,
        stream_port,
        log_level,
    }))
}
