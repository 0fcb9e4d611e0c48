use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use bankd_common::{AccountNumber, Balance};

use crate::{api::StoreEngine, error::StoreError};

/// Account table held entirely in memory. Used by tests and the `memory`
/// datadir mode; rows are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryStore(Mutex<HashMap<AccountNumber, Balance>>);

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, HashMap<AccountNumber, Balance>>, StoreError> {
        self.0.lock().map_err(|_| StoreError::LockError)
    }
}

#[async_trait::async_trait]
impl StoreEngine for InMemoryStore {
    async fn insert_account(&self, account: AccountNumber) -> Result<(), StoreError> {
        let mut accounts = self.inner()?;
        if accounts.contains_key(&account) {
            return Err(StoreError::AccountAlreadyExists);
        }
        accounts.insert(account, 0);
        Ok(())
    }

    async fn remove_account(&self, account: AccountNumber) -> Result<bool, StoreError> {
        Ok(self.inner()?.remove(&account).is_some())
    }

    async fn deposit(
        &self,
        account: AccountNumber,
        amount: Balance,
    ) -> Result<Option<Balance>, StoreError> {
        let mut accounts = self.inner()?;
        let Some(balance) = accounts.get_mut(&account) else {
            return Ok(None);
        };
        *balance = balance.checked_add(amount).ok_or(StoreError::BalanceOverflow)?;
        Ok(Some(*balance))
    }

    async fn withdraw(
        &self,
        account: AccountNumber,
        amount: Balance,
    ) -> Result<Option<Balance>, StoreError> {
        let mut accounts = self.inner()?;
        match accounts.get_mut(&account) {
            Some(balance) if *balance >= amount => {
                *balance -= amount;
                Ok(Some(*balance))
            }
            _ => Ok(None),
        }
    }

    async fn get_balance(&self, account: AccountNumber) -> Result<Option<Balance>, StoreError> {
        Ok(self.inner()?.get(&account).copied())
    }

    async fn total_amount(&self) -> Result<Balance, StoreError> {
        Ok(self.inner()?.values().sum())
    }

    async fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.inner()?.len() as u64)
    }

    async fn load_all(&self) -> Result<Vec<(AccountNumber, Balance)>, StoreError> {
        Ok(self
            .inner()?
            .iter()
            .map(|(account, balance)| (*account, *balance))
            .collect())
    }
}
