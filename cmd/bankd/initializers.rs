use bankd_config::BankConfig;
use bankd_storage::{EngineType, Store, StoreError};
use tracing_subscriber::{EnvFilter, filter::Directive};

use crate::cli::Options;

pub fn init_tracing(opts: &Options) {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(opts.log_level))
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Opens the account store. A `storage_path` of `memory` selects the
/// in-memory engine, everything else is a redb database file.
pub fn init_store(config: &BankConfig) -> Result<Store, StoreError> {
    let engine_type = if config.storage_path == "memory" {
        EngineType::InMemory
    } else {
        EngineType::RedB
    };
    Store::new(&config.storage_path, engine_type)
}
