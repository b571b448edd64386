//! Local UDP socket the game process talks to.
//!
//! Each relayed peer is surfaced to the game as one of these sockets:
//! the game sends to the socket's port as if it were a LAN peer, and a
//! worker pumps the datagrams over the relayed connection. Sockets are
//! non-blocking and bound inside a configured port range so several
//! peers can coexist without colliding.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::ops::RangeInclusive;
use tracing::debug;

/// Socket buffer size requested from the kernel (256 KiB).
const SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// Non-blocking UDP socket bound on a private local port.
#[derive(Debug)]
pub struct LanSocket {
    socket: UdpSocket,
    port: u16,
    recv_buf: Vec<u8>,
}

impl LanSocket {
    /// Bind the first free port in `range`, skipping ports listed in
    /// `in_use`. With `loopback_only` the socket binds 127.0.0.1,
    /// otherwise all interfaces.
    ///
    /// # Errors
    /// Fails with `AddrInUse` when every port in the range is taken.
    pub fn bind_in_range(
        range: RangeInclusive<u16>,
        in_use: &[u16],
        loopback_only: bool,
    ) -> io::Result<Self> {
        for port in range.clone() {
            if in_use.contains(&port) {
                continue;
            }
            match Self::bind(port, loopback_only) {
                Ok(socket) => return Ok(socket),
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("no free UDP port in {}..={}", range.start(), range.end()),
        ))
    }

    /// Bind one specific port.
    ///
    /// # Errors
    /// Fails if the port is taken or socket options cannot be applied.
    pub fn bind(port: u16, loopback_only: bool) -> io::Result<Self> {
        let ip: IpAddr = if loopback_only {
            Ipv4Addr::LOCALHOST.into()
        } else {
            Ipv4Addr::UNSPECIFIED.into()
        };
        let addr = SocketAddr::new(ip, port);

        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_nonblocking(true)?;
        socket2.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
        socket2.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
        socket2.bind(&addr.into())?;

        let socket: UdpSocket = socket2.into();
        let port = socket.local_addr()?.port();
        debug!(%addr, port, "bound local game socket");

        Ok(Self {
            socket,
            port,
            recv_buf: vec![0u8; crate::MAX_DATAGRAM_SIZE],
        })
    }

    /// Send one datagram to `addr`.
    ///
    /// # Errors
    /// Propagates the socket error; `WouldBlock` means the send buffer
    /// is full.
    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    /// Receive the next waiting datagram, if any.
    ///
    /// Returns the payload length and sender; the payload itself is in
    /// [`recv_buffer`](Self::recv_buffer). `WouldBlock` means nothing
    /// is waiting.
    ///
    /// # Errors
    /// Propagates the socket error.
    pub fn recv_from(&mut self) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(&mut self.recv_buf)
    }

    /// Payload storage for the most recent [`recv_from`](Self::recv_from).
    #[must_use]
    pub fn recv_buffer(&self) -> &[u8] {
        &self.recv_buf
    }

    /// Port this socket is bound on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Full local address of the socket.
    ///
    /// # Errors
    /// Propagates the socket error.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
