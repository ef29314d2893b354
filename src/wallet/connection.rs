//! Wallet connection state machine
//!
//! `Disconnected -> Connecting -> Connected`, with the wrong-network flag
//! derived from the last chain id the wallet reported. The manager is the
//! only owner of the signer-bound contract handle; everyone else gets clones
//! through [`ConnectionManager::contract`] for the duration of one call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use alloy_primitives::Address;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::host::{detect_provider, Detection, HostEnvironment};
use super::{Signer, Subscription, WalletEvent, WalletProvider};
use crate::config::PresaleConfig;
use crate::error::Error;
use crate::notify::Notifier;
use crate::presale::PresaleContract;

/// Snapshot of the wallet session
///
/// Fields are private so that `connected` always comes with an account and a
/// contract handle.
#[derive(Clone, Default)]
pub struct ConnectionState {
    provider: Option<Arc<dyn WalletProvider>>,
    signer: Option<Signer>,
    contract: Option<PresaleContract>,
    account: Option<Address>,
    chain_id: Option<u64>,
    connected: bool,
    connecting: bool,
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Disconnected, remembering the chain the wallet last reported
    pub fn disconnected_on(chain_id: u64) -> Self {
        Self {
            chain_id: Some(chain_id),
            ..Self::default()
        }
    }

    fn connecting_from(previous: &ConnectionState) -> Self {
        Self {
            chain_id: previous.chain_id,
            connecting: true,
            ..Self::default()
        }
    }

    fn connected(
        provider: Arc<dyn WalletProvider>,
        signer: Signer,
        contract: PresaleContract,
        chain_id: u64,
    ) -> Self {
        Self {
            account: Some(signer.account()),
            provider: Some(provider),
            signer: Some(signer),
            contract: Some(contract),
            chain_id: Some(chain_id),
            connected: true,
            connecting: false,
        }
    }

    pub fn provider(&self) -> Option<&Arc<dyn WalletProvider>> {
        self.provider.as_ref()
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    pub fn contract(&self) -> Option<&PresaleContract> {
        self.contract.as_ref()
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    /// The wallet reported a chain other than `target`
    pub fn wrong_network(&self, target: u64) -> bool {
        matches!(self.chain_id, Some(id) if id != target)
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("account", &self.account)
            .field("chain_id", &self.chain_id)
            .field("connected", &self.connected)
            .field("connecting", &self.connecting)
            .finish()
    }
}

/// Result of a `connect()` call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(Address),
    AlreadyConnected(Address),
    /// Another attempt is running; this call did nothing
    AlreadyInProgress,
    /// No provider here; the user was sent to the wallet app or its store page
    Redirected,
    /// A disconnect or wallet event ended the attempt before it finished
    Superseded,
}

struct ActiveSession {
    _subscription: Subscription,
    cancel: CancellationToken,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct ConnectionManager {
    config: Arc<PresaleConfig>,
    host: Arc<dyn HostEnvironment>,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<ActiveSession>>,
    /// Bumped whenever the session is torn down; an attempt only publishes
    /// while the epoch it started under is current
    epoch: AtomicU64,
    notifier: Notifier,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<PresaleConfig>,
        host: Arc<dyn HostEnvironment>,
        notifier: Notifier,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::disconnected());
        Arc::new(Self {
            config,
            host,
            state,
            session: Mutex::new(None),
            epoch: AtomicU64::new(0),
            notifier,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn target_chain_id(&self) -> u64 {
        self.config.chain.chain_id
    }

    pub fn is_wrong_network(&self) -> bool {
        self.state.borrow().wrong_network(self.target_chain_id())
    }

    /// Clone of the live contract handle
    pub fn contract(&self) -> Option<PresaleContract> {
        self.state.borrow().contract.clone()
    }

    pub fn signer(&self) -> Option<Signer> {
        self.state.borrow().signer.clone()
    }

    pub fn account(&self) -> Option<Address> {
        self.state.borrow().account
    }

    /// Connect the wallet
    ///
    /// Calling this while an attempt is running, or after the session is
    /// connected, does nothing.
    pub async fn connect(self: &Arc<Self>) -> Result<ConnectOutcome, Error> {
        let mut skipped = None;
        let mut epoch = 0;
        self.state.send_if_modified(|state| {
            if state.connecting {
                skipped = Some(ConnectOutcome::AlreadyInProgress);
                return false;
            }
            if let (true, Some(account)) = (state.connected, state.account) {
                skipped = Some(ConnectOutcome::AlreadyConnected(account));
                return false;
            }
            epoch = self.epoch.load(Ordering::SeqCst);
            let next = ConnectionState::connecting_from(state);
            *state = next;
            true
        });
        if let Some(outcome) = skipped {
            debug!("connect() ignored: {:?}", outcome);
            return Ok(outcome);
        }

        match self.establish(epoch).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if !self.is_current(epoch) => {
                debug!("Abandoned connection attempt failed: {}", e);
                Ok(ConnectOutcome::Superseded)
            }
            Err(e) => {
                warn!("Wallet connection failed: {}", e);
                let chain_id = self.state.borrow().chain_id;
                self.end_attempt(epoch, chain_id);
                self.notifier.error(e.user_message());
                Err(e)
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    async fn establish(self: &Arc<Self>, epoch: u64) -> Result<ConnectOutcome, Error> {
        let provider = match detect_provider(self.host.as_ref(), &self.config.wallet).await {
            Detection::Injected(provider) => provider,
            Detection::NotFound => return Err(Error::ProviderNotFound),
            Detection::RedirectedToWallet | Detection::RedirectedToStore(_) => {
                self.end_attempt(epoch, None);
                return Ok(ConnectOutcome::Redirected);
            }
        };
        if !self.is_current(epoch) {
            return Ok(ConnectOutcome::Superseded);
        }

        let accounts = provider.request_accounts().await.map_err(|e| {
            if e.is_user_rejection() {
                Error::UserRejected
            } else {
                Error::Provider(e)
            }
        })?;
        let account = *accounts
            .first()
            .ok_or_else(|| Error::Wallet("Wallet returned no accounts".to_string()))?;

        if !self.is_current(epoch) {
            debug!("Connection attempt superseded after account request");
            return Ok(ConnectOutcome::Superseded);
        }

        let target = self.target_chain_id();
        let mut chain_id = provider.chain_id().await?;
        if !self.update_if_current(epoch, |state| state.chain_id = Some(chain_id)) {
            return Ok(ConnectOutcome::Superseded);
        }

        if chain_id != target {
            info!("Wallet on chain {}, switching to {}", chain_id, target);
            self.switch_network(provider.as_ref()).await?;
            chain_id = provider.chain_id().await?;
            if chain_id != target {
                return Err(Error::NetworkSwitchFailed(format!(
                    "wallet still on chain {} after switching to {}",
                    chain_id, target
                )));
            }
        }

        let code = provider.get_code(self.config.contract_address).await?;
        if code.is_empty() {
            return Err(Error::ContractNotFound {
                address: self.config.contract_address,
                chain_id,
            });
        }

        let signer = Signer::new(provider.clone(), account);
        let contract = PresaleContract::with_signer(signer.clone(), self.config.contract_address);

        let (sink, events) = mpsc::unbounded_channel();
        let subscription = provider.subscribe(sink);
        let cancel = CancellationToken::new();
        self.spawn_event_listener(events, cancel.clone());

        let mut pending = Some(ActiveSession {
            _subscription: subscription,
            cancel,
        });
        let mut previous = None;
        let connected = ConnectionState::connected(provider.clone(), signer, contract, chain_id);
        let published = self.update_if_current(epoch, |state| {
            previous = self.swap_session(pending.take());
            *state = connected;
        });
        drop(previous);
        if !published {
            debug!("Connection attempt superseded before publishing");
            drop(pending);
            return Ok(ConnectOutcome::Superseded);
        }

        info!("Wallet connected: {} via {}", account, provider.name());
        self.notifier.success("Wallet connected");
        Ok(ConnectOutcome::Connected(account))
    }

    /// Switch to the target chain, registering it first if the wallet does not know it
    async fn switch_network(&self, provider: &dyn WalletProvider) -> Result<(), Error> {
        let chain = &self.config.chain;
        match provider.switch_chain(chain.chain_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unrecognized_chain() => {
                debug!("Chain {} unknown to wallet, registering it", chain.chain_id_hex());
                provider
                    .add_chain(chain)
                    .await
                    .map_err(|e| Error::NetworkSwitchFailed(e.to_string()))?;
                provider
                    .switch_chain(chain.chain_id)
                    .await
                    .map_err(|e| Error::NetworkSwitchFailed(e.to_string()))
            }
            Err(e) => Err(Error::NetworkSwitchFailed(e.to_string())),
        }
    }

    fn spawn_event_listener(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<WalletEvent>,
        cancel: CancellationToken,
    ) {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => {
                        let (Some(event), Some(manager)) = (event, manager.upgrade()) else {
                            break;
                        };
                        manager.handle_event(event);
                    }
                }
            }
            debug!("Wallet event listener stopped");
        });
    }

    /// Apply a wallet notification to the session
    pub fn handle_event(&self, event: WalletEvent) {
        let current = self.state();
        match event {
            WalletEvent::ChainChanged(chain_id) => {
                if current.connected && current.chain_id == Some(chain_id) {
                    return;
                }
                info!("Wallet switched to chain {}, resetting session", chain_id);
                let was_active = current.connected || current.connecting;
                self.end_session(Some(chain_id));
                if was_active {
                    self.notifier.info("Network changed. Please reconnect your wallet");
                }
            }
            WalletEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    info!("Wallet reported no accounts, disconnecting");
                    self.disconnect();
                }
                Some(first) if current.account.is_some() && current.account != Some(*first) => {
                    info!("Active account changed to {}, resetting session", first);
                    self.end_session(current.chain_id);
                    self.notifier.info("Account changed. Please reconnect your wallet");
                }
                Some(_) => {}
            },
            WalletEvent::Disconnect => {
                info!("Wallet provider disconnected");
                self.disconnect();
            }
        }
    }

    /// End the session and release the provider subscription
    pub fn disconnect(&self) {
        let was_connected = self.state.borrow().connected;
        self.end_session(None);
        if was_connected {
            self.notifier.info("Wallet disconnected");
        }
    }

    /// Apply `update` only while `epoch` is the current attempt
    ///
    /// The check runs under the state lock, the same lock a teardown takes.
    fn update_if_current(&self, epoch: u64, update: impl FnOnce(&mut ConnectionState)) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(epoch) {
                return false;
            }
            update(state);
            true
        })
    }

    /// Tear down the attempt started under `epoch`, unless something else already did
    fn end_attempt(&self, epoch: u64, chain_id: Option<u64>) {
        self.teardown(Some(epoch), chain_id);
    }

    fn end_session(&self, chain_id: Option<u64>) {
        self.teardown(None, chain_id);
    }

    fn teardown(&self, epoch: Option<u64>, chain_id: Option<u64>) {
        let next = match chain_id {
            Some(id) => ConnectionState::disconnected_on(id),
            None => ConnectionState::disconnected(),
        };
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if epoch.is_some_and(|epoch| !self.is_current(epoch)) {
                return false;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            previous = self.swap_session(None);
            *state = next;
            true
        });
        drop(previous);
    }

    fn swap_session(&self, session: Option<ActiveSession>) -> Option<ActiveSession> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, session)
    }
}
