use alloy_primitives::Address;
use thiserror::Error;

use crate::units::UnitsError;
use crate::wallet::classify::TxFailure;
use crate::wallet::WalletError;

/// Errors produced by the presale client
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("EVM error: {0}")]
    Evm(String),

    #[error("No wallet provider found")]
    ProviderNotFound,

    #[error("Request rejected by user")]
    UserRejected,

    #[error("Network switch failed: {0}")]
    NetworkSwitchFailed(String),

    #[error("No contract deployed at {address} on chain {chain_id}")]
    ContractNotFound { address: Address, chain_id: u64 },

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Another transaction is already in flight")]
    Busy,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Transaction(#[from] TxFailure),

    #[error("Provider error: {0}")]
    Provider(#[from] WalletError),

    #[error("Other error: {0}")]
    Other(String),
}

/// Reasons a contribution amount is refused before reaching the wallet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("The contract is currently in emergency mode. Transactions are temporarily suspended.")]
    EmergencyPaused,

    #[error("The sale is not active")]
    SaleInactive,

    #[error("Please enter a valid amount greater than 0")]
    InvalidAmount,

    #[error("Minimum contribution is {min} BNB")]
    BelowMinimum { min: String },

    #[error("Maximum contribution is {max} BNB")]
    AboveMaximum { max: String },
}

impl From<UnitsError> for ValidationError {
    fn from(_: UnitsError) -> Self {
        ValidationError::InvalidAmount
    }
}

impl Error {
    /// Message suitable for a transient user notification
    pub fn user_message(&self) -> String {
        match self {
            Error::Transaction(failure) => failure.user_message(),
            Error::Provider(err) => crate::wallet::classify::classify(err).user_message(),
            other => other.to_string(),
        }
    }
}
