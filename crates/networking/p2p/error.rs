use bankd_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to open gateway socket: {0}")]
    Gateway(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}
