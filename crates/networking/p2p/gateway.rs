//! Listening socket lifecycle.

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info};

use crate::error::BankError;

const LISTEN_BACKLOG: u32 = 50;

/// Owns the node's listening address. The listener itself is handed to the
/// accept loop; shutting the node down cancels that loop rather than
/// closing the socket out from under it.
#[derive(Debug, Clone)]
pub struct Gateway {
    host: Ipv4Addr,
    port: u16,
}

impl Gateway {
    pub fn new(host: Ipv4Addr, port: u16) -> Self {
        Self { host, port }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Binds and starts listening. Failure here is fatal to startup.
    pub fn open(&self) -> Result<TcpListener, BankError> {
        let addr = SocketAddr::new(IpAddr::V4(self.host), self.port);
        let listener = listener(addr).inspect_err(|e| {
            error!("Error opening tcp socket at {addr}: {e}");
        })?;
        info!("Server is listening at {}", self.address());
        Ok(listener)
    }
}

fn listener(tcp_addr: SocketAddr) -> io::Result<TcpListener> {
    let tcp_socket = TcpSocket::new_v4()?;
    tcp_socket.set_reuseaddr(true).ok();
    tcp_socket.bind(tcp_addr)?;
    tcp_socket.listen(LISTEN_BACKLOG)
}
