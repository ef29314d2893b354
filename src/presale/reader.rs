//! Observable contract data
//!
//! Three resources are kept: the sale snapshot, the connected account's
//! vesting record and its native balance. Each has at most one read in
//! flight; a caller arriving during a read for the same address waits for it
//! and gets its result. A failed read leaves the previous value in place.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use alloy_primitives::{Address, U256};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::contract::{ContractSnapshot, PresaleContract, VestingRecord};
use crate::error::Error;
use crate::notify::Notifier;
use crate::wallet::ConnectionManager;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of the last read that was allowed to land
struct Settled {
    generation: u64,
    key: Address,
    error: Option<String>,
}

/// One polled value plus its in-flight guard
///
/// Values are keyed by the address they were read for (the contract for the
/// sale, the account for vesting and balance). `clear()` starts a new
/// generation; reads begun in an older one are discarded when they finish.
struct Resource<T> {
    value: watch::Sender<Option<T>>,
    owner: StdMutex<Option<Address>>,
    generation: AtomicU64,
    in_flight: Mutex<()>,
    settled: StdMutex<Option<Settled>>,
}

impl<T: Clone> Resource<T> {
    fn new() -> Self {
        let (value, _) = watch::channel(None);
        Self {
            value,
            owner: StdMutex::new(None),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(()),
            settled: StdMutex::new(None),
        }
    }

    fn current(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    /// The stored value, if it was read for `key`
    fn current_for(&self, key: Address) -> Option<T> {
        let value = self.value.borrow();
        if *lock(&self.owner) == Some(key) {
            (*value).clone()
        } else {
            None
        }
    }

    async fn load<F, Fut>(&self, key: Address, fetch: F) -> Result<Option<T>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let generation = self.generation.load(Ordering::SeqCst);
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let guard = self.in_flight.lock().await;
                if let Some(result) = self.settled_for(generation, key) {
                    return result;
                }
                guard
            }
        };
        if self.generation.load(Ordering::SeqCst) != generation {
            return Ok(None);
        }

        let result = fetch().await;
        self.settle(generation, key, result)
    }

    /// Result of the read a waiter coalesced onto, if it was for the same key
    /// and generation
    fn settled_for(&self, generation: u64, key: Address) -> Option<Result<Option<T>, Error>> {
        let settled = lock(&self.settled);
        let settled = settled
            .as_ref()
            .filter(|s| s.generation == generation && s.key == key)?;
        Some(match &settled.error {
            Some(message) => Err(Error::Rpc(message.clone())),
            None => Ok(self.current_for(key)),
        })
    }

    fn settle(
        &self,
        generation: u64,
        key: Address,
        result: Result<T, Error>,
    ) -> Result<Option<T>, Error> {
        let mut landed = false;
        self.value.send_if_modified(|slot| {
            landed = self.generation.load(Ordering::SeqCst) == generation;
            if !landed {
                return false;
            }
            *lock(&self.settled) = Some(Settled {
                generation,
                key,
                error: result.as_ref().err().map(ToString::to_string),
            });
            match &result {
                Ok(value) => {
                    *lock(&self.owner) = Some(key);
                    *slot = Some(value.clone());
                    true
                }
                Err(_) => false,
            }
        });

        if !landed {
            debug!("Discarding read for {} started before the last reset", key);
            return Ok(None);
        }
        result.map(Some)
    }

    fn clear(&self) {
        self.value.send_modify(|slot| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *lock(&self.owner) = None;
            *slot = None;
        });
    }
}

pub struct PresaleReader {
    connection: Arc<ConnectionManager>,
    /// Used for sale reads while no wallet is connected
    fallback: Option<PresaleContract>,
    notifier: Notifier,
    sale: Resource<ContractSnapshot>,
    vesting: Resource<VestingRecord>,
    balance: Resource<U256>,
}

impl PresaleReader {
    pub fn new(
        connection: Arc<ConnectionManager>,
        fallback: Option<PresaleContract>,
        notifier: Notifier,
    ) -> Self {
        Self {
            connection,
            fallback,
            notifier,
            sale: Resource::new(),
            vesting: Resource::new(),
            balance: Resource::new(),
        }
    }

    fn contract(&self) -> Option<PresaleContract> {
        self.connection.contract().or_else(|| self.fallback.clone())
    }

    fn connected(&self) -> Option<(PresaleContract, Address)> {
        let contract = self.connection.contract()?;
        let account = contract.account()?;
        Some((contract, account))
    }

    /// Sale snapshot and, with an account connected, its vesting record
    pub async fn refresh(&self) -> Result<(), Error> {
        let (sale, vesting) = tokio::join!(self.refresh_sale(), self.refresh_vesting());
        sale?;
        vesting?;
        Ok(())
    }

    pub async fn refresh_sale(&self) -> Result<Option<ContractSnapshot>, Error> {
        let Some(contract) = self.contract() else {
            debug!("No contract handle, skipping sale refresh");
            return Ok(self.sale.current());
        };

        let key = contract.address();
        let result = self
            .sale
            .load(key, || async move { contract.snapshot().await })
            .await;
        if let Err(e) = &result {
            warn!("Sale data refresh failed: {}", e);
            self.notifier.error("Error fetching contract data");
        }
        result
    }

    pub async fn refresh_vesting(&self) -> Result<Option<VestingRecord>, Error> {
        let Some((contract, account)) = self.connected() else {
            return Ok(None);
        };

        let result = self
            .vesting
            .load(account, || async move { contract.vesting_info(account).await })
            .await;
        if let Err(e) = &result {
            warn!("Vesting refresh for {} failed: {}", account, e);
            self.notifier.error("Error fetching vesting information");
        }
        result
    }

    /// Balance failures are only logged; the value refreshes every few seconds
    pub async fn refresh_balance(&self) -> Result<Option<U256>, Error> {
        let Some((contract, account)) = self.connected() else {
            return Ok(None);
        };

        let result = self
            .balance
            .load(account, || async move { contract.account_balance().await })
            .await;
        if let Err(e) = &result {
            warn!("Balance refresh for {} failed: {}", account, e);
        }
        result
    }

    /// One-off read of the contract's current token price
    pub async fn token_price(&self) -> Result<Option<U256>, Error> {
        match self.contract() {
            Some(contract) => contract.current_token_price().await.map(Some),
            None => Ok(None),
        }
    }

    /// Forget all account and sale data
    pub fn reset(&self) {
        self.sale.clear();
        self.vesting.clear();
        self.balance.clear();
    }

    /// Forget data tied to the connected account
    pub fn reset_account(&self) {
        self.vesting.clear();
        self.balance.clear();
    }

    pub fn sale(&self) -> Option<ContractSnapshot> {
        self.sale.current()
    }

    /// Vesting record of the connected account
    pub fn vesting(&self) -> Option<VestingRecord> {
        self.vesting.current_for(self.connection.account()?)
    }

    /// Native balance of the connected account
    pub fn balance(&self) -> Option<U256> {
        self.balance.current_for(self.connection.account()?)
    }

    pub fn subscribe_sale(&self) -> watch::Receiver<Option<ContractSnapshot>> {
        self.sale.value.subscribe()
    }

    pub fn subscribe_vesting(&self) -> watch::Receiver<Option<VestingRecord>> {
        self.vesting.value.subscribe()
    }

    pub fn subscribe_balance(&self) -> watch::Receiver<Option<U256>> {
        self.balance.value.subscribe()
    }
}
