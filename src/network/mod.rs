//! Byte sources for the command line runner: file, stdin or UDP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, Stdin};
use tokio::net::UdpSocket;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Stdin,
    Udp(SocketAddr),
}

impl InputSource {
    /// `-` selects stdin, anything else is a file path.
    pub fn from_path(path: &str) -> Self {
        if path == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(path))
        }
    }
}

/// An opened [`InputSource`].
pub enum Input {
    File(File),
    Stdin(Stdin),
    Udp(UdpSocket),
}

impl Input {
    pub async fn open(source: &InputSource) -> anyhow::Result<Self> {
        Ok(match source {
            InputSource::File(path) => {
                info!(path = %path.display(), "reading transport stream file");
                Input::File(File::open(path).await?)
            }
            InputSource::Stdin => {
                info!("reading transport stream from stdin");
                Input::Stdin(tokio::io::stdin())
            }
            InputSource::Udp(addr) => {
                let socket = create_udp_socket(addr)?;
                info!(%addr, "listening for transport stream datagrams");
                Input::Udp(UdpSocket::from_std(socket.into())?)
            }
        })
    }

    /// Reads the next chunk. `Ok(0)` means end of input; a socket never ends.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Input::File(file) => file.read(buf).await,
            Input::Stdin(stdin) => stdin.read(buf).await,
            Input::Udp(sock) => loop {
                let n = sock.recv(buf).await?;
                if n > 0 {
                    return Ok(n);
                }
            },
        }
    }
}

/// Creates and configures a UDP socket for TS packet reception.
/// Handles both unicast and multicast addresses.
pub fn create_udp_socket(addr: &SocketAddr) -> anyhow::Result<Socket> {
    let ip = match addr.ip() {
        IpAddr::V4(v4) => v4,
        _ => anyhow::bail!("only IPv4 is supported"),
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&(*addr).into())?;

    if ip.is_multicast() {
        socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
    }

    socket.set_nonblocking(true)?;
    Ok(socket)
}
