pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod poll;
pub mod presale;
pub mod units;
pub mod wallet;

// Main client exports
pub use client::{PresaleClient, PresaleClientBuilder, SessionGuard};
pub use config::{ChainParams, PresaleConfig};
pub use error::{Error, ValidationError};
pub use notify::{Notification, NotificationKind, Notifier};

// Contract and workflow exports
pub use presale::{
    validate_amount, ClaimOutcome, ClaimWorkflow, ContractSnapshot, CostEstimate,
    PresaleContract, PresaleReader, PurchaseIntent, PurchaseLimits, PurchaseWorkflow,
    SubmissionState, VestingRecord,
};

// Wallet exports
pub use wallet::{
    ConnectOutcome, ConnectionManager, ConnectionState, HostEnvironment, LocalSigner, RpcWallet,
    TxFailure, WalletError, WalletEvent, WalletProvider,
};

// Re-export common primitive types
pub use alloy_primitives::{Address, B256, U256};
