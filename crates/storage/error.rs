use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account not found")]
    AccountNotFound,
    #[error("account already exists")]
    AccountAlreadyExists,
    #[error("insufficient balance")]
    LackOfFunds,
    #[error("account number collisions exhausted all retries")]
    TooManyCollisions,
    #[error("balance overflow")]
    BalanceOverflow,
    #[error("failed to lock account cache")]
    LockError,
    #[error("{0}")]
    Custom(String),
    #[error("database error: {0}")]
    Database(#[from] Box<redb::DatabaseError>),
    #[error("transaction error: {0}")]
    Transaction(#[from] Box<redb::TransactionError>),
    #[error("table error: {0}")]
    Table(#[from] Box<redb::TableError>),
    #[error("storage error: {0}")]
    Storage(#[from] Box<redb::StorageError>),
    #[error("commit error: {0}")]
    Commit(#[from] Box<redb::CommitError>),
}
