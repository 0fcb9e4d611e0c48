//! One-shot request/response client for talking to peer banks.

use std::{io, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::warn;

/// Peer responses are read into a single fixed buffer; a response line never
/// legitimately exceeds this.
const RESPONSE_BUFFER_SIZE: usize = 1024;

/// Opens a fresh TCP connection per request, sends one CRLF-terminated
/// command and reads one reply. Any timeout or I/O failure yields `None`.
#[derive(Debug, Clone)]
pub struct BankConnector {
    timeout: Duration,
}

impl BankConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn send_command(&self, bank_ip: &str, port: u16, command: &str) -> Option<String> {
        match self.request(bank_ip, port, command).await {
            Ok(response) => Some(response),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                warn!("Timeout connecting to {bank_ip}:{port}");
                None
            }
            Err(e) => {
                warn!("Connection error to {bank_ip}:{port}: {e}");
                None
            }
        }
    }

    async fn request(&self, bank_ip: &str, port: u16, command: &str) -> io::Result<String> {
        let exchange = async {
            let mut stream = TcpStream::connect((bank_ip, port)).await?;
            stream.write_all(format!("{command}\r\n").as_bytes()).await?;
            let mut buffer = [0u8; RESPONSE_BUFFER_SIZE];
            let read = stream.read(&mut buffer).await?;
            Ok(String::from_utf8_lossy(&buffer[..read]).trim().to_string())
        };
        match timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "request timed out")),
        }
    }

    /// `BC` round-trip: the peer's bank code, if it answers like a bank.
    pub async fn get_bank_code(&self, bank_ip: &str, port: u16) -> Option<String> {
        let response = self.send_command(bank_ip, port, "BC").await?;
        response
            .strip_prefix("BC ")
            .map(|code| code.trim().to_string())
    }

    /// `BA` round-trip: the peer's total amount.
    pub async fn get_bank_amount(&self, bank_ip: &str, port: u16) -> Option<u64> {
        let response = self.send_command(bank_ip, port, "BA").await?;
        response.strip_prefix("BA ")?.trim().parse().ok()
    }

    /// `BN` round-trip: the peer's client count.
    pub async fn get_client_count(&self, bank_ip: &str, port: u16) -> Option<u64> {
        let response = self.send_command(bank_ip, port, "BN").await?;
        response.strip_prefix("BN ")?.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    /// One-shot peer stub that answers every connection with `reply`.
    async fn spawn_stub_peer(reply: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let port = listener.local_addr().expect("stub addr").port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buffer = [0u8; 64];
                let _ = stream.read(&mut buffer).await;
                let _ = stream.write_all(reply.as_bytes()).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn typed_wrappers_parse_peer_replies() {
        let connector = BankConnector::new(Duration::from_secs(1));

        let port = spawn_stub_peer("BC 10.1.2.9\r\n").await;
        assert_eq!(
            connector.get_bank_code("127.0.0.1", port).await,
            Some("10.1.2.9".to_string())
        );

        let port = spawn_stub_peer("BA 123456\r\n").await;
        assert_eq!(
            connector.get_bank_amount("127.0.0.1", port).await,
            Some(123_456)
        );

        let port = spawn_stub_peer("BN 42\r\n").await;
        assert_eq!(connector.get_client_count("127.0.0.1", port).await, Some(42));
    }

    #[tokio::test]
    async fn wrong_prefix_yields_none() {
        let connector = BankConnector::new(Duration::from_secs(1));
        let port = spawn_stub_peer("ER Banned\r\n").await;
        assert_eq!(connector.get_bank_code("127.0.0.1", port).await, None);
    }

    #[tokio::test]
    async fn unreachable_peer_yields_none() {
        let connector = BankConnector::new(Duration::from_millis(200));
        // Nothing listens on this port.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
            listener.local_addr().expect("probe addr").port()
        };
        assert_eq!(connector.send_command("127.0.0.1", port, "BC").await, None);
    }
}
