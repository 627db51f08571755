use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Best-effort LAN address of this host.
///
/// Connecting a UDP socket sends no packets; it only asks the OS which local
/// interface would route to the target. Falls back to loopback.
pub fn local_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("10.255.255.255:1")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
