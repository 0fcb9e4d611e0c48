//! The bank node: wires the gateway, worker pool, store and security state
//! together and runs the accept loop.

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use bankd_common::{AccountNumber, Balance};
use bankd_config::BankConfig;
use bankd_storage::Store;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

use crate::{
    error::BankError, gateway::Gateway, security::SecurityGuard, workers::WorkerPool,
};

/// Snapshot of the node's state for the monitoring surface.
#[derive(Debug, Clone, Serialize)]
pub struct BankStats {
    pub bank_code: String,
    pub total_amount: Balance,
    pub client_count: u64,
    pub active_connections: usize,
}

/// One bank node. `open` blocks on the accept loop until `close` is called;
/// the monitoring accessors can be used concurrently from other tasks.
pub struct Bank {
    config: Arc<BankConfig>,
    store: Store,
    security: SecurityGuard,
    gateway: Gateway,
    workers: WorkerPool,
    active_connections: Arc<AtomicUsize>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    start_time: OnceLock<Instant>,
}

impl Bank {
    pub fn new(config: BankConfig, store: Store) -> Self {
        let config = Arc::new(config);
        let security = SecurityGuard::new(config.ban_duration());
        let active_connections = Arc::new(AtomicUsize::new(0));
        let tracker = TaskTracker::new();
        let gateway = Gateway::new(config.host, config.port);
        let workers = WorkerPool::new(
            config.clone(),
            store.clone(),
            security.clone(),
            active_connections.clone(),
            tracker.clone(),
        );
        info!("Bank initialized");
        Self {
            config,
            store,
            security,
            gateway,
            workers,
            active_connections,
            tracker,
            cancel: CancellationToken::new(),
            start_time: OnceLock::new(),
        }
    }

    /// Warms the cache, starts the workers, binds the gateway and serves
    /// until [`close`](Bank::close) cancels the accept loop. Startup
    /// failures (cache load, bind) are returned and fatal.
    pub async fn open(&self) -> Result<(), BankError> {
        self.store.load_cache().await?;
        self.workers.start(&self.tracker).await;
        let listener = self.gateway.open()?;
        let _ = self.start_time.set(Instant::now());
        self.listen(listener).await;
        Ok(())
    }

    async fn listen(&self, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Listener socket closed, stopping loop");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.workers.distribute_socket(stream).await,
                    Err(e) => error!("Listener socket error: {e}"),
                },
            }
        }
    }

    /// Stops the accept loop, shuts the workers down and stops tracking
    /// handler tasks. In-flight handlers finish their current exchange.
    pub async fn close(&self) {
        info!("Closing bank...");
        self.cancel.cancel();
        self.workers.stop().await;
        self.tracker.close();
        info!("Bank closed successfully");
    }

    pub async fn stats(&self) -> BankStats {
        BankStats {
            bank_code: self.config.bank_code(),
            total_amount: self.store.total_amount().await.unwrap_or_default(),
            client_count: self.store.client_count().await.unwrap_or_default(),
            active_connections: self.active_connections.load(Ordering::SeqCst),
        }
    }

    pub async fn accounts_paged(&self, offset: usize, limit: usize) -> Vec<(AccountNumber, Balance)> {
        self.store.accounts_paged(offset, limit).await
    }

    pub async fn accounts_count(&self) -> usize {
        self.store.cached_account_count().await
    }

    pub fn gateway_address(&self) -> String {
        self.gateway.address()
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.start_time.get().copied()
    }

    /// Shared security state, exposed so an embedding process can inspect
    /// or seed it.
    pub fn security(&self) -> &SecurityGuard {
        &self.security
    }
}
