use std::{collections::HashMap, path::Path, sync::Arc};

use bankd_common::{ACCOUNT_NUMBER_MAX, ACCOUNT_NUMBER_MIN, AccountNumber, Balance};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    api::StoreEngine,
    error::StoreError,
    store_db::{in_memory::InMemoryStore, redb::RedBStore},
};

/// How many fresh random account numbers are tried before a create gives up.
pub const MAX_CREATE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    InMemory,
    RedB,
}

/// Durable account table plus the process-wide balance cache.
///
/// Cloning is cheap and hands out another handle to the same engine and the
/// same cache; each worker keeps its own clone. Mutations commit to the
/// durable table first and only then touch the cache, so a cached read may
/// lag a concurrent commit but never precede one. The cache mutex is never
/// held across durable I/O.
#[derive(Debug, Clone)]
pub struct Store {
    engine: Arc<dyn StoreEngine>,
    cache: Arc<Mutex<HashMap<AccountNumber, Balance>>>,
}

impl Store {
    pub fn new(path: impl AsRef<Path>, engine_type: EngineType) -> Result<Self, StoreError> {
        let engine: Arc<dyn StoreEngine> = match engine_type {
            EngineType::InMemory => Arc::new(InMemoryStore::new()),
            EngineType::RedB => Arc::new(RedBStore::new(path)?),
        };
        info!("Database storage structure is ready");
        Ok(Self {
            engine,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Bulk-loads every durable row into the shared cache. Called once
    /// before the node starts serving; failure is fatal to startup.
    pub async fn load_cache(&self) -> Result<(), StoreError> {
        let rows = self.engine.load_all().await?;
        if rows.is_empty() {
            warn!("Database does not contain any data");
        }
        let mut cache = self.cache.lock().await;
        cache.clear();
        cache.extend(rows);
        info!("Account cache has been loaded ({} accounts)", cache.len());
        Ok(())
    }

    /// Creates an account under a fresh random number in
    /// `[ACCOUNT_NUMBER_MIN, ACCOUNT_NUMBER_MAX]`, retrying on key
    /// collisions up to [`MAX_CREATE_ATTEMPTS`] times.
    pub async fn create_account(&self) -> Result<AccountNumber, StoreError> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let candidate =
                rand::thread_rng().gen_range(ACCOUNT_NUMBER_MIN..=ACCOUNT_NUMBER_MAX);
            match self.engine.insert_account(candidate).await {
                Ok(()) => {
                    self.cache.lock().await.insert(candidate, 0);
                    return Ok(candidate);
                }
                Err(StoreError::AccountAlreadyExists) => {
                    warn!("Collision detected for {candidate}");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::TooManyCollisions)
    }

    pub async fn remove_account(&self, account: AccountNumber) -> Result<(), StoreError> {
        if self.engine.remove_account(account).await? {
            self.cache.lock().await.remove(&account);
            Ok(())
        } else {
            Err(StoreError::AccountNotFound)
        }
    }

    pub async fn deposit(&self, account: AccountNumber, amount: Balance) -> Result<(), StoreError> {
        match self.engine.deposit(account, amount).await? {
            Some(new_balance) => {
                self.update_cached_balance(account, new_balance).await;
                Ok(())
            }
            None => Err(StoreError::AccountNotFound),
        }
    }

    pub async fn withdraw(
        &self,
        account: AccountNumber,
        amount: Balance,
    ) -> Result<(), StoreError> {
        match self.engine.withdraw(account, amount).await? {
            Some(new_balance) => {
                self.update_cached_balance(account, new_balance).await;
                Ok(())
            }
            // The conditional update did not apply; probe the row to tell
            // a missing account from insufficient funds.
            None => match self.engine.get_balance(account).await? {
                Some(_) => Err(StoreError::LackOfFunds),
                None => Err(StoreError::AccountNotFound),
            },
        }
    }

    /// Balance as seen by the cache; `None` when the account is unknown.
    pub async fn get_balance(&self, account: AccountNumber) -> Option<Balance> {
        self.cache.lock().await.get(&account).copied()
    }

    pub async fn total_amount(&self) -> Result<Balance, StoreError> {
        self.engine.total_amount().await
    }

    pub async fn client_count(&self) -> Result<u64, StoreError> {
        self.engine.account_count().await
    }

    /// Sorted snapshot page of the cache, for the monitoring surface.
    pub async fn accounts_paged(
        &self,
        offset: usize,
        limit: usize,
    ) -> Vec<(AccountNumber, Balance)> {
        let mut snapshot: Vec<(AccountNumber, Balance)> = {
            let cache = self.cache.lock().await;
            cache.iter().map(|(account, balance)| (*account, *balance)).collect()
        };
        snapshot.sort_by_key(|(account, _)| *account);
        snapshot.into_iter().skip(offset).take(limit).collect()
    }

    pub async fn cached_account_count(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn update_cached_balance(&self, account: AccountNumber, new_balance: Balance) {
        let mut cache = self.cache.lock().await;
        if let Some(balance) = cache.get_mut(&account) {
            *balance = new_balance;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn memory_store() -> Store {
        Store::new("", EngineType::InMemory).unwrap()
    }

    #[tokio::test]
    async fn created_account_is_in_range_and_cached_at_zero() {
        let store = memory_store();
        let account = store.create_account().await.unwrap();
        assert!((ACCOUNT_NUMBER_MIN..=ACCOUNT_NUMBER_MAX).contains(&account));
        assert_eq!(store.get_balance(account).await, Some(0));
        assert_eq!(store.client_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cache_and_durable_balance_agree_after_mutations() {
        let store = memory_store();
        let account = store.create_account().await.unwrap();

        store.deposit(account, 500).await.unwrap();
        store.withdraw(account, 200).await.unwrap();
        store.deposit(account, 50).await.unwrap();

        let cached = store.get_balance(account).await;
        let durable = store.engine.get_balance(account).await.unwrap();
        assert_eq!(cached, Some(350));
        assert_eq!(cached, durable);
        assert_eq!(store.total_amount().await.unwrap(), 350);
    }

    #[tokio::test]
    async fn withdraw_is_refused_when_funds_are_short() {
        let store = memory_store();
        let account = store.create_account().await.unwrap();
        store.deposit(account, 100).await.unwrap();

        let result = store.withdraw(account, 101).await;
        assert!(matches!(result, Err(StoreError::LackOfFunds)));
        // Balance untouched on refusal.
        assert_eq!(store.get_balance(account).await, Some(100));
    }

    #[tokio::test]
    async fn withdraw_from_unknown_account_reports_not_found() {
        let store = memory_store();
        let result = store.withdraw(10_000, 1).await;
        assert!(matches!(result, Err(StoreError::AccountNotFound)));
    }

    #[tokio::test]
    async fn removing_twice_reports_not_found() {
        let store = memory_store();
        let account = store.create_account().await.unwrap();
        store.remove_account(account).await.unwrap();
        assert!(matches!(
            store.remove_account(account).await,
            Err(StoreError::AccountNotFound)
        ));
        assert_eq!(store.get_balance(account).await, None);
    }

    #[tokio::test]
    async fn deposit_to_unknown_account_reports_not_found() {
        let store = memory_store();
        assert!(matches!(
            store.deposit(12_345, 10).await,
            Err(StoreError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn load_cache_mirrors_existing_rows() {
        let store = memory_store();
        let a = store.create_account().await.unwrap();
        let b = store.create_account().await.unwrap();
        store.deposit(a, 70).await.unwrap();

        // A second handle over the same engine starts with a cold cache.
        let other = Store {
            engine: store.engine.clone(),
            cache: Arc::new(Mutex::new(HashMap::new())),
        };
        assert_eq!(other.get_balance(a).await, None);
        other.load_cache().await.unwrap();
        assert_eq!(other.get_balance(a).await, Some(70));
        assert_eq!(other.get_balance(b).await, Some(0));
        assert_eq!(other.cached_account_count().await, 2);
    }

    #[tokio::test]
    async fn accounts_are_paged_in_key_order() {
        let store = memory_store();
        for _ in 0..5 {
            store.create_account().await.unwrap();
        }
        let page = store.accounts_paged(1, 3).await;
        assert_eq!(page.len(), 3);
        let all = store.accounts_paged(0, 10).await;
        assert!(all.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
