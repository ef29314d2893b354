//! Wallet provider abstraction
//!
//! A wallet provider is the agent holding the user's keys: it grants account
//! access, knows the active chain, signs and broadcasts transactions, and
//! pushes chain/account change notifications. Everything else in the crate
//! talks to it through [`WalletProvider`].

pub mod classify;
pub mod connection;
pub mod host;
pub mod rpc;
pub mod signer;
pub mod tx;

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::ChainParams;

pub use classify::{classify, TxFailure};
pub use connection::{ConnectOutcome, ConnectionManager, ConnectionState};
pub use host::{detect_provider, Detection, HostEnvironment, MobilePlatform};
pub use rpc::RpcWallet;
pub use signer::LocalSigner;

/// EIP-1193 code for a request the user declined
pub const USER_REJECTED_CODE: i64 = 4001;

/// EIP-3326 code for a chain the wallet does not know yet
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// Symbolic code attached to transport failures
pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";

/// Error code carried by a provider error: numeric RPC codes or symbolic ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Rpc(i64),
    Named(String),
}

/// Error raised by a wallet provider or the contract behind it
///
/// Mirrors the shape of errors surfaced by injected wallets: an optional code,
/// a top-level message, a nested `data.message` and a contract revert reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletError {
    pub code: Option<ErrorCode>,
    pub message: Option<String>,
    pub data_message: Option<String>,
    pub reason: Option<String>,
}

impl WalletError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(ErrorCode::Rpc(code)),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn user_rejected() -> Self {
        Self::with_code(USER_REJECTED_CODE, "user rejected the request")
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::with_code(
            UNRECOGNIZED_CHAIN_CODE,
            format!("Unrecognized chain ID {:#x}", chain_id),
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            code: Some(ErrorCode::Named(NETWORK_ERROR_CODE.to_string())),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn reverted(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            message: Some(format!("execution reverted: {}", reason)),
            reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn with_data_message(mut self, message: impl Into<String>) -> Self {
        self.data_message = Some(message.into());
        self
    }

    pub fn rpc_code(&self) -> Option<i64> {
        match self.code {
            Some(ErrorCode::Rpc(code)) => Some(code),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.rpc_code() == Some(USER_REJECTED_CODE)
            || self
                .message
                .as_deref()
                .map(|m| m.to_lowercase().contains("user rejected"))
                .unwrap_or(false)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.rpc_code() == Some(UNRECOGNIZED_CHAIN_CODE)
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .message
            .as_deref()
            .or(self.data_message.as_deref())
            .or(self.reason.as_deref())
            .unwrap_or("wallet error");
        match &self.code {
            Some(ErrorCode::Rpc(code)) => write!(f, "{} (code {})", text, code),
            Some(ErrorCode::Named(code)) => write!(f, "{} ({})", text, code),
            None => write!(f, "{}", text),
        }
    }
}

impl std::error::Error for WalletError {}

/// Notification pushed by the wallet provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    ChainChanged(u64),
    AccountsChanged(Vec<Address>),
    Disconnect,
}

pub type EventSink = mpsc::UnboundedSender<WalletEvent>;

/// Handle for an event subscription; unsubscribes when dropped
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// State-changing call to be signed by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Current network fee parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeData {
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Interface consumed from a wallet provider
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Ask the user for account access
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Currently active chain
    async fn chain_id(&self) -> Result<u64, WalletError>;

    /// Ask the wallet to switch to `chain_id`
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    /// Register chain metadata so it can be switched to
    async fn add_chain(&self, params: &ChainParams) -> Result<(), WalletError>;

    /// Start delivering chain/account notifications to `sink`
    fn subscribe(&self, sink: EventSink) -> Subscription;

    async fn get_code(&self, address: Address) -> Result<Bytes, WalletError>;

    /// Read-only contract call
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WalletError>;

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, WalletError>;

    async fn get_balance(&self, address: Address) -> Result<U256, WalletError>;

    async fn fee_data(&self) -> Result<FeeData, WalletError>;

    /// Sign and broadcast; resolves once the transaction is accepted
    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, WalletError>;

    /// Wait until the transaction is mined
    async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceipt, WalletError>;
}

/// Authorised handle producing transactions for one account
#[derive(Clone)]
pub struct Signer {
    provider: Arc<dyn WalletProvider>,
    account: Address,
}

impl Signer {
    pub fn new(provider: Arc<dyn WalletProvider>, account: Address) -> Self {
        Self { provider, account }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }

    /// Build a request from this account
    pub fn request(&self, to: Address, data: Bytes, value: U256) -> TxRequest {
        TxRequest {
            from: self.account,
            to,
            value,
            data,
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("provider", &self.provider.name())
            .field("account", &self.account)
            .finish()
    }
}
