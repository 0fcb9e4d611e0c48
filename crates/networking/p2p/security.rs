//! Shared security state: the IP blacklist and the known-port cache.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::warn;

/// IP blacklist with lazy expiry plus the last-known-port cache used to
/// shortcut peer lookups. Cloning shares the underlying maps, so every
/// worker and handler observes the same bans and cached routes.
#[derive(Debug, Clone)]
pub struct SecurityGuard {
    blacklist: Arc<Mutex<HashMap<String, Instant>>>,
    known_ports: Arc<Mutex<HashMap<String, u16>>>,
    ban_duration: Duration,
}

impl SecurityGuard {
    pub fn new(ban_duration: Duration) -> Self {
        Self {
            blacklist: Arc::new(Mutex::new(HashMap::new())),
            known_ports: Arc::new(Mutex::new(HashMap::new())),
            ban_duration,
        }
    }

    /// Whether `ip` is currently banned. Expired entries are removed on
    /// lookup rather than by a background sweep.
    pub async fn is_banned(&self, ip: &str) -> bool {
        let mut blacklist = self.blacklist.lock().await;
        match blacklist.get(ip) {
            Some(ban_end) if Instant::now() < *ban_end => true,
            Some(_) => {
                blacklist.remove(ip);
                false
            }
            None => false,
        }
    }

    pub async fn ban_ip(&self, ip: &str) {
        let ban_end = Instant::now() + self.ban_duration;
        self.blacklist.lock().await.insert(ip.to_string(), ban_end);
        warn!("Banning {ip} for {} seconds", self.ban_duration.as_secs());
    }

    /// Remembers the port a peer bank last answered on.
    pub async fn save_known_port(&self, ip: &str, port: u16) {
        self.known_ports.lock().await.insert(ip.to_string(), port);
    }

    pub async fn get_known_port(&self, ip: &str) -> Option<u16> {
        self.known_ports.lock().await.get(ip).copied()
    }

    /// Drops a cached port that stopped answering. The cache is an
    /// optimization, never a source of truth.
    pub async fn forget_known_port(&self, ip: &str) {
        self.known_ports.lock().await.remove(ip);
    }
}
