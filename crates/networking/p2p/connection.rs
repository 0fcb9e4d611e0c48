//! Per-connection command loop.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use bankd_config::BankConfig;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, error, warn};

use crate::{
    commands::CommandFactory,
    connector::BankConnector,
    protocol::{format_command, is_command_for_us, parse_command},
    security::SecurityGuard,
};

/// Requests are read in chunks of up to this size; anything longer is
/// truncated by the read and fails parsing on its own.
const READ_BUFFER_SIZE: usize = 1024;

/// Sliding window over which requests are counted for rate limiting.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Codes a peer bank will accept on behalf of one of its accounts.
const PROXYABLE_CODES: [&str; 3] = ["AD", "AW", "AB"];

/// Handles one client socket: reads requests, enforces the rate limit and
/// the ban list, dispatches local commands, relays foreign ones, and writes
/// responses back. Every exit path releases the active-connection counter
/// and the socket.
pub struct ClientConnection {
    stream: TcpStream,
    config: Arc<BankConfig>,
    factory: CommandFactory,
    security: SecurityGuard,
    connector: BankConnector,
    active_connections: Arc<AtomicUsize>,
}

impl ClientConnection {
    pub fn new(
        stream: TcpStream,
        config: Arc<BankConfig>,
        factory: CommandFactory,
        security: SecurityGuard,
        active_connections: Arc<AtomicUsize>,
    ) -> Self {
        let connector = BankConnector::new(config.network_timeout());
        Self {
            stream,
            config,
            factory,
            security,
            connector,
            active_connections,
        }
    }

    pub async fn handle(mut self) {
        let peer_ip = match self.stream.peer_addr() {
            Ok(addr) => addr.ip().to_string(),
            Err(_) => {
                warn!("Client disconnected before handling started");
                return;
            }
        };

        self.active_connections.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.serve(&peer_ip).await {
            debug!("Client connection error: {e}");
        }
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
        debug!("Connection closed");
    }

    async fn serve(&mut self, peer_ip: &str) -> io::Result<()> {
        let client_timeout = self.config.client_timeout();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut request_timestamps: Vec<Instant> = Vec::new();
        let mut bad_commands: u32 = 0;

        loop {
            let read = match timeout(client_timeout, self.stream.read(&mut buffer)).await {
                Ok(Ok(0)) => return Ok(()),
                Ok(Ok(read)) => read,
                Ok(Err(e)) => return Err(e),
                // Idle clients are dropped without ceremony.
                Err(_) => return Ok(()),
            };

            if self.security.is_banned(peer_ip).await {
                self.send_line("ER Banned").await?;
                return Ok(());
            }

            let now = Instant::now();
            request_timestamps.retain(|t| now.duration_since(*t) < RATE_LIMIT_WINDOW);
            request_timestamps.push(now);
            if request_timestamps.len() > self.config.max_requests_per_minute {
                self.security.ban_ip(peer_ip).await;
                self.send_line("ER Rate limit exceeded").await?;
                return Ok(());
            }

            let Ok(message) = std::str::from_utf8(&buffer[..read]) else {
                error!("Dropping client {peer_ip}: request is not valid UTF-8");
                return Ok(());
            };
            let message = message.trim();
            if message.is_empty() {
                continue;
            }

            let (code, args) = parse_command(message);
            let is_for_our_bank =
                is_command_for_us(&self.config.bank_code(), args.first().map(String::as_str));

            let response = if is_for_our_bank {
                match self.factory.create(&code, &args) {
                    None => {
                        bad_commands += 1;
                        "ER Invalid command".to_string()
                    }
                    Some(Err(e)) => {
                        bad_commands += 1;
                        format!("ER {e}")
                    }
                    Some(Ok(command)) => {
                        bad_commands = bad_commands.saturating_sub(1);
                        command.execute().await
                    }
                }
            } else {
                self.handle_proxy_request(&code, &args).await
            };

            if bad_commands >= self.config.max_bad_commands {
                self.security.ban_ip(peer_ip).await;
                self.send_line("ER Too many errors.").await?;
                return Ok(());
            }

            self.send_line(&response).await?;
        }
    }

    /// Relays a command to the bank owning the target account, preferring a
    /// cached port and falling back to a linear scan of the allowed range.
    async fn handle_proxy_request(&self, code: &str, args: &[String]) -> String {
        if !PROXYABLE_CODES.contains(&code) {
            return "ER Command cannot be proxied".to_string();
        }
        let Some(first_arg) = args.first() else {
            return "ER Missing arguments for proxy request".to_string();
        };

        let target_ip = first_arg
            .rsplit('/')
            .next()
            .unwrap_or(first_arg)
            .to_string();
        let original_message = format_command(code, args);

        if let Some(cached_port) = self.security.get_known_port(&target_ip).await {
            debug!("Relaying {code} to {target_ip}:{cached_port}");
            if let Some(response) = self.try_relay(&target_ip, cached_port, &original_message).await
            {
                return response;
            }
            // The cached route went stale; drop it and rescan the range.
            self.security.forget_known_port(&target_ip).await;
            return self
                .relay_scanning_ports(&target_ip, &original_message)
                .await
                .unwrap_or_else(|| "ER Bank not found on any allowed port".to_string());
        }

        self.relay_scanning_ports(&target_ip, &original_message)
            .await
            .unwrap_or_else(|| "ER Target bank unreachable".to_string())
    }

    /// Tries every port in the configured scan range in order, caching the
    /// first one that answers.
    async fn relay_scanning_ports(&self, ip: &str, message: &str) -> Option<String> {
        let [start_port, end_port] = self.config.network_scan_port_range;
        for port in start_port..=end_port {
            debug!("Relaying to {ip}:{port}");
            if let Some(response) = self.try_relay(ip, port, message).await {
                self.security.save_known_port(ip, port).await;
                return Some(response);
            }
        }
        None
    }

    /// One relay attempt; peer errors count as no answer.
    async fn try_relay(&self, ip: &str, port: u16, message: &str) -> Option<String> {
        let response = self.connector.send_command(ip, port, message).await?;
        if response.starts_with("ER") {
            return None;
        }
        Some(response)
    }

    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
    }
}
