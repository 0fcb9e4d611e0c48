//! The worker pool: a fixed set of tasks that own the connection handlers.
//!
//! The accept loop stays single; accepted sockets are handed round-robin to
//! one of `bank_workers` workers over per-worker channels. Each worker keeps
//! its own store handle and its own command factory, and spawns one handler
//! task per socket. A `Shutdown` message on the channel stops a worker.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bankd_config::BankConfig;
use bankd_storage::Store;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::{
    commands::{BankCodeContext, CommandFactory, NetworkContext, StorageContext},
    connection::ClientConnection,
    scanner::NetworkScanner,
    security::SecurityGuard,
};

/// Sockets queued per worker before the distributor blocks.
const SOCKET_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub enum WorkerMessage {
    Connection(TcpStream),
    Shutdown,
}

pub struct WorkerPool {
    senders: Vec<mpsc::Sender<WorkerMessage>>,
    /// Workers created up front, drained when the pool is started.
    workers: Mutex<Vec<Worker>>,
    next_worker: AtomicUsize,
}

impl WorkerPool {
    pub fn new(
        config: Arc<BankConfig>,
        store: Store,
        security: SecurityGuard,
        active_connections: Arc<AtomicUsize>,
        tracker: TaskTracker,
    ) -> Self {
        let mut senders = Vec::with_capacity(config.bank_workers);
        let mut workers = Vec::with_capacity(config.bank_workers);
        for id in 0..config.bank_workers {
            let (sender, receiver) = mpsc::channel(SOCKET_CHANNEL_CAPACITY);
            senders.push(sender);
            workers.push(Worker {
                id,
                receiver,
                config: config.clone(),
                store: store.clone(),
                security: security.clone(),
                active_connections: active_connections.clone(),
                tracker: tracker.clone(),
            });
        }
        Self {
            senders,
            workers: Mutex::new(workers),
            next_worker: AtomicUsize::new(0),
        }
    }

    /// Launches every worker. Calling this twice is a no-op: the workers
    /// were drained by the first call.
    pub async fn start(&self, tracker: &TaskTracker) {
        for worker in self.workers.lock().await.drain(..) {
            tracker.spawn(worker.run());
        }
    }

    /// Hands an accepted socket to the next worker, round-robin.
    pub async fn distribute_socket(&self, stream: TcpStream) {
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        if self.senders[index]
            .send(WorkerMessage::Connection(stream))
            .await
            .is_err()
        {
            warn!("Worker {index} is gone; dropping connection");
        }
    }

    /// Sends the shutdown sentinel to every worker.
    pub async fn stop(&self) {
        for sender in &self.senders {
            let _ = sender.send(WorkerMessage::Shutdown).await;
        }
    }
}

struct Worker {
    id: usize,
    receiver: mpsc::Receiver<WorkerMessage>,
    config: Arc<BankConfig>,
    store: Store,
    security: SecurityGuard,
    active_connections: Arc<AtomicUsize>,
    tracker: TaskTracker,
}

impl Worker {
    /// The contexts hold this worker's own store handle, so the factory is
    /// built here rather than inherited from the parent.
    fn init_command_factory(&self) -> CommandFactory {
        let bank_code = self.config.bank_code();
        let scanner = NetworkScanner::new(
            self.config.network_scan_port_range,
            self.config.network_scan_subnet.clone(),
            self.config.network_timeout(),
            self.security.clone(),
        );
        CommandFactory::new(
            BankCodeContext {
                bank_code: bank_code.clone(),
            },
            StorageContext {
                bank_code: bank_code.clone(),
                store: self.store.clone(),
            },
            NetworkContext {
                our_ip: bank_code,
                scanner,
            },
        )
    }

    async fn run(mut self) {
        let factory = self.init_command_factory();
        info!("Worker {} started", self.id);

        while let Some(message) = self.receiver.recv().await {
            match message {
                WorkerMessage::Connection(stream) => {
                    let connection = ClientConnection::new(
                        stream,
                        self.config.clone(),
                        factory.clone(),
                        self.security.clone(),
                        self.active_connections.clone(),
                    );
                    self.tracker.spawn(connection.handle());
                }
                WorkerMessage::Shutdown => break,
            }
        }
        info!("Worker {} stopped", self.id);
    }
}
