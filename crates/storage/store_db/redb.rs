use std::{path::Path, sync::Arc};

use bankd_common::{AccountNumber, Balance};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::{api::StoreEngine, error::StoreError};

const ACCOUNTS_TABLE: TableDefinition<AccountNumber, Balance> = TableDefinition::new("accounts");

/// Durable account table backed by redb.
///
/// Every mutation runs in its own write transaction, so single-row updates
/// are atomic and concurrent writers are serialized by the engine. All
/// transactions run on the blocking pool to keep the async workers clear of
/// file I/O.
#[derive(Debug)]
pub struct RedBStore {
    db: Arc<Database>,
}

impl RedBStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(Box::new)?;
        // Create the table up front so read transactions never miss it.
        let write_txn = db.begin_write().map_err(Box::new)?;
        write_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
        write_txn.commit().map_err(Box::new)?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Database>) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(db))
            .await
            .map_err(|e| StoreError::Custom(format!("task panicked: {e}")))?
    }
}

#[async_trait::async_trait]
impl StoreEngine for RedBStore {
    async fn insert_account(&self, account: AccountNumber) -> Result<(), StoreError> {
        self.run_blocking(move |db| {
            let write_txn = db.begin_write().map_err(Box::new)?;
            {
                let mut table = write_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
                if table.get(account).map_err(Box::new)?.is_some() {
                    return Err(StoreError::AccountAlreadyExists);
                }
                table.insert(account, 0).map_err(Box::new)?;
            }
            write_txn.commit().map_err(Box::new)?;
            Ok(())
        })
        .await
    }

    async fn remove_account(&self, account: AccountNumber) -> Result<bool, StoreError> {
        self.run_blocking(move |db| {
            let write_txn = db.begin_write().map_err(Box::new)?;
            let removed = {
                let mut table = write_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
                table.remove(account).map_err(Box::new)?.is_some()
            };
            write_txn.commit().map_err(Box::new)?;
            Ok(removed)
        })
        .await
    }

    async fn deposit(
        &self,
        account: AccountNumber,
        amount: Balance,
    ) -> Result<Option<Balance>, StoreError> {
        self.run_blocking(move |db| {
            let write_txn = db.begin_write().map_err(Box::new)?;
            let new_balance = {
                let mut table = write_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
                let current = table.get(account).map_err(Box::new)?.map(|row| row.value());
                match current {
                    Some(balance) => {
                        let new_balance = balance
                            .checked_add(amount)
                            .ok_or(StoreError::BalanceOverflow)?;
                        table.insert(account, new_balance).map_err(Box::new)?;
                        Some(new_balance)
                    }
                    None => None,
                }
            };
            write_txn.commit().map_err(Box::new)?;
            Ok(new_balance)
        })
        .await
    }

    async fn withdraw(
        &self,
        account: AccountNumber,
        amount: Balance,
    ) -> Result<Option<Balance>, StoreError> {
        self.run_blocking(move |db| {
            let write_txn = db.begin_write().map_err(Box::new)?;
            let new_balance = {
                let mut table = write_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
                let current = table.get(account).map_err(Box::new)?.map(|row| row.value());
                match current {
                    Some(balance) if balance >= amount => {
                        let new_balance = balance - amount;
                        table.insert(account, new_balance).map_err(Box::new)?;
                        Some(new_balance)
                    }
                    _ => None,
                }
            };
            write_txn.commit().map_err(Box::new)?;
            Ok(new_balance)
        })
        .await
    }

    async fn get_balance(&self, account: AccountNumber) -> Result<Option<Balance>, StoreError> {
        self.run_blocking(move |db| {
            let read_txn = db.begin_read().map_err(Box::new)?;
            let table = read_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
            Ok(table.get(account).map_err(Box::new)?.map(|row| row.value()))
        })
        .await
    }

    async fn total_amount(&self) -> Result<Balance, StoreError> {
        self.run_blocking(|db| {
            let read_txn = db.begin_read().map_err(Box::new)?;
            let table = read_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
            let mut total = 0u64;
            for row in table.iter().map_err(Box::new)? {
                let (_, balance) = row.map_err(Box::new)?;
                total = total.saturating_add(balance.value());
            }
            Ok(total)
        })
        .await
    }

    async fn account_count(&self) -> Result<u64, StoreError> {
        self.run_blocking(|db| {
            let read_txn = db.begin_read().map_err(Box::new)?;
            let table = read_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
            Ok(table.len().map_err(Box::new)?)
        })
        .await
    }

    async fn load_all(&self) -> Result<Vec<(AccountNumber, Balance)>, StoreError> {
        self.run_blocking(|db| {
            let read_txn = db.begin_read().map_err(Box::new)?;
            let table = read_txn.open_table(ACCOUNTS_TABLE).map_err(Box::new)?;
            let mut rows = Vec::new();
            for row in table.iter().map_err(Box::new)? {
                let (account, balance) = row.map_err(Box::new)?;
                rows.push((account.value(), balance.value()));
            }
            Ok(rows)
        })
        .await
    }
}
