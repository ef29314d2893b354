//! SRA presale client
//!
//! Entry point tying the wallet connection, the contract read facade and the
//! purchase/claim workflows together around one configuration.

use std::sync::Arc;

use tracing::debug;

use crate::config::PresaleConfig;
use crate::error::Error;
use crate::notify::Notifier;
use crate::poll::Poller;
use crate::presale::{
    signer_lock, ClaimWorkflow, PresaleContract, PresaleReader, PurchaseWorkflow,
};
use crate::units;
use crate::wallet::{ConnectOutcome, ConnectionManager, HostEnvironment, WalletProvider};

/// Main presale client
pub struct PresaleClient {
    config: Arc<PresaleConfig>,
    notifier: Notifier,
    connection: Arc<ConnectionManager>,
    reader: Arc<PresaleReader>,
    purchase: Arc<PurchaseWorkflow>,
    claim: Arc<ClaimWorkflow>,
}

impl PresaleClient {
    fn new(
        config: PresaleConfig,
        host: Arc<dyn HostEnvironment>,
        read_provider: Option<Arc<dyn WalletProvider>>,
        notifier: Notifier,
    ) -> Self {
        let config = Arc::new(config);
        let connection = ConnectionManager::new(config.clone(), host, notifier.clone());

        let fallback = read_provider
            .map(|provider| PresaleContract::read_only(provider, config.contract_address));
        let reader = Arc::new(PresaleReader::new(
            connection.clone(),
            fallback,
            notifier.clone(),
        ));

        let lock = signer_lock();
        let purchase = Arc::new(PurchaseWorkflow::new(
            config.clone(),
            connection.clone(),
            reader.clone(),
            notifier.clone(),
            lock.clone(),
        ));
        let claim = Arc::new(ClaimWorkflow::new(
            connection.clone(),
            reader.clone(),
            notifier.clone(),
            lock,
        ));

        Self {
            config,
            notifier,
            connection,
            reader,
            purchase,
            claim,
        }
    }

    pub fn config(&self) -> &PresaleConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn reader(&self) -> &Arc<PresaleReader> {
        &self.reader
    }

    pub fn purchase(&self) -> &Arc<PurchaseWorkflow> {
        &self.purchase
    }

    pub fn claim(&self) -> &Arc<ClaimWorkflow> {
        &self.claim
    }

    pub async fn connect(&self) -> Result<ConnectOutcome, Error> {
        self.connection.connect().await
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
        self.reader.reset_account();
    }

    /// Refresh sale, vesting and balance once
    pub async fn refresh(&self) -> Result<(), Error> {
        let (contract, balance) =
            tokio::join!(self.reader.refresh(), self.reader.refresh_balance());
        contract?;
        balance?;
        Ok(())
    }

    /// Start polling and connection tracking
    ///
    /// Everything started here stops when the returned guard is dropped.
    pub fn start(&self) -> SessionGuard {
        let polling = &self.config.polling;
        let mut poller = Poller::new();

        let reader = self.reader.clone();
        poller.every("sale", polling.sale_interval(), move || {
            let reader = reader.clone();
            async move {
                if let Err(e) = reader.refresh_sale().await {
                    debug!("Polled sale refresh failed: {}", e);
                }
            }
        });

        let reader = self.reader.clone();
        poller.every("vesting", polling.vesting_interval(), move || {
            let reader = reader.clone();
            async move {
                if let Err(e) = reader.refresh_vesting().await {
                    debug!("Polled vesting refresh failed: {}", e);
                }
            }
        });

        let reader = self.reader.clone();
        poller.every("balance", polling.balance_interval(), move || {
            let reader = reader.clone();
            async move {
                if let Err(e) = reader.refresh_balance().await {
                    debug!("Polled balance refresh failed: {}", e);
                }
            }
        });

        let reader = self.reader.clone();
        let mut state = self.connection.subscribe_state();
        poller.spawn("connection", async move {
            let mut last_account = state.borrow().account();
            while state.changed().await.is_ok() {
                let (account, connected) = {
                    let current = state.borrow_and_update();
                    (current.account(), current.is_connected())
                };
                if account == last_account {
                    continue;
                }
                debug!("Session account changed: {:?} -> {:?}", last_account, account);
                last_account = account;
                reader.reset_account();
                if connected {
                    let (contract, balance) =
                        tokio::join!(reader.refresh(), reader.refresh_balance());
                    if let Err(e) = contract.and(balance.map(|_| ())) {
                        debug!("Refresh for new account failed: {}", e);
                    }
                }
            }
        });

        SessionGuard {
            poller,
            reader: self.reader.clone(),
        }
    }

    /// Summary of the session state
    pub fn get_summary(&self) -> serde_json::Value {
        let state = self.connection.state();
        let sale = self.reader.sale();
        let vesting = self.reader.vesting();
        let digits = self.config.display.max_fraction_digits;

        serde_json::json!({
            "chain_id": self.config.chain.chain_id,
            "contract_address": self.config.contract_address.to_string(),
            "token_address": self.config.token_address.to_string(),
            "connected": state.is_connected(),
            "account": state.account().map(|a| a.to_string()),
            "wrong_network": state.wrong_network(self.config.chain.chain_id),
            "sale": sale.map(|s| serde_json::json!({
                "active": s.sale_active,
                "emergency_mode": s.emergency_mode,
                "remaining_tokens": units::format_display(s.remaining_tokens, digits),
                "tokens_per_bnb": units::format_display(s.tokens_per_bnb, digits),
                "min_contribution": units::format_display(s.min_contribution, digits),
                "max_contribution": units::format_display(s.max_contribution, digits),
                "fetched_at": s.fetched_at.to_rfc3339(),
            })),
            "vesting": vesting.map(|v| serde_json::json!({
                "total": units::format_display(v.total_amount, digits),
                "claimed": units::format_display(v.claimed_amount, digits),
                "claimable": units::format_display(v.claimable_now, digits),
                "next_unlock": units::format_unlock_time(v.next_unlock_time),
            })),
            "balance": self.reader.balance().map(|b| units::format_display(b, digits)),
        })
    }
}

/// Running session tasks; dropping the guard stops them and clears the
/// session's contract data
pub struct SessionGuard {
    poller: Poller,
    reader: Arc<PresaleReader>,
}

impl SessionGuard {
    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    /// Stop every task and wait for them to exit
    pub async fn stop(mut self) {
        std::mem::take(&mut self.poller).shutdown().await;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.reader.reset();
    }
}

/// Builder pattern for PresaleClient construction
pub struct PresaleClientBuilder {
    config: Option<PresaleConfig>,
    host: Option<Arc<dyn HostEnvironment>>,
    read_provider: Option<Arc<dyn WalletProvider>>,
    notifier: Option<Notifier>,
}

impl PresaleClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            host: None,
            read_provider: None,
            notifier: None,
        }
    }

    pub fn with_config(mut self, config: PresaleConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Environment used to discover the wallet
    pub fn with_host(mut self, host: Arc<dyn HostEnvironment>) -> Self {
        self.host = Some(host);
        self
    }

    /// Provider for sale reads before a wallet is connected
    pub fn with_read_provider(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.read_provider = Some(provider);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<PresaleClient, Error> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let host = self
            .host
            .ok_or_else(|| Error::Config("A host environment is required".to_string()))?;

        Ok(PresaleClient::new(
            config,
            host,
            self.read_provider,
            self.notifier.unwrap_or_default(),
        ))
    }

    /// Build with configuration discovered from files and the environment
    pub fn build_auto(self) -> Result<PresaleClient, Error> {
        if self.config.is_some() {
            return self.build();
        }
        let config = PresaleConfig::load()?;
        self.with_config(config).build()
    }
}

impl Default for PresaleClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
