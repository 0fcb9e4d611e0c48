//! Minimal interface durable backends must provide.
//!
//! Backends only implement low-level single-row primitives; the consistency
//! discipline between the durable table and the shared cache lives in
//! [`Store`](crate::Store). Every mutation is atomic at the backend level:
//! either the row change commits or nothing is observable.

use std::fmt::Debug;

use bankd_common::{AccountNumber, Balance};

use crate::error::StoreError;

#[async_trait::async_trait]
pub trait StoreEngine: Debug + Send + Sync {
    /// Inserts a new account with balance zero.
    ///
    /// Fails with [`StoreError::AccountAlreadyExists`] when the key is taken.
    async fn insert_account(&self, account: AccountNumber) -> Result<(), StoreError>;

    /// Deletes the account row. Returns whether a row was actually removed.
    async fn remove_account(&self, account: AccountNumber) -> Result<bool, StoreError>;

    /// Adds `amount` to the balance of `account` in one transaction.
    /// Returns the new balance, or `None` when the account does not exist.
    async fn deposit(
        &self,
        account: AccountNumber,
        amount: Balance,
    ) -> Result<Option<Balance>, StoreError>;

    /// Subtracts `amount` from the balance of `account` in one transaction,
    /// only if the current balance covers it. Returns the new balance, or
    /// `None` when the account is missing or the funds are insufficient.
    async fn withdraw(
        &self,
        account: AccountNumber,
        amount: Balance,
    ) -> Result<Option<Balance>, StoreError>;

    /// Reads the durable balance of `account`.
    async fn get_balance(&self, account: AccountNumber) -> Result<Option<Balance>, StoreError>;

    /// Sum of every balance in the table.
    async fn total_amount(&self) -> Result<Balance, StoreError>;

    /// Number of account rows.
    async fn account_count(&self) -> Result<u64, StoreError>;

    /// Every row in the table, used to warm the shared cache at startup.
    async fn load_all(&self) -> Result<Vec<(AccountNumber, Balance)>, StoreError>;
}
