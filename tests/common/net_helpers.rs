//! Loopback socket helpers

use rhms_telemetry::config::ReceiverConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

/// Receiver settings bound to loopback on a free port with short timeouts
pub fn loopback_config() -> ReceiverConfig {
    ReceiverConfig {
        port: free_port(),
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        read_timeout_ms: 20,
        start_timeout_ms: 2000,
        stop_timeout_ms: 2000,
        ..Default::default()
    }
}

/// Send one datagram to `addr` from an ephemeral socket
pub fn send_datagram(addr: SocketAddr, payload: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.send_to(payload, addr).unwrap();
}
