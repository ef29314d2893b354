//! Static configuration for the presale client
//!
//! The target chain, contract address and contribution defaults are fixed
//! configuration, never discovered at runtime. Values come from built-in
//! defaults, optionally overridden by a config file and `SRA_*` environment
//! variables (see [`env`]).

pub mod chain;
pub mod env;

pub use chain::{ChainParams, NativeCurrency};

use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::units;

/// Presale contract on BNB Smart Chain
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("aa5b9f8cea06543c194a93f209049901ee569d57");

/// SRA token contract
pub const DEFAULT_TOKEN_ADDRESS: Address = address!("424516fbe635c5642723ab6c1b413ff61b177dd6");

/// Complete client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresaleConfig {
    /// Required network; the only chain the client operates on
    pub chain: ChainParams,
    /// Presale contract address
    pub contract_address: Address,
    /// Token sold by the presale
    pub token_address: Address,
    pub limits: ContributionLimits,
    pub polling: PollingConfig,
    pub wallet: WalletConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

impl Default for PresaleConfig {
    fn default() -> Self {
        Self {
            chain: ChainParams::bsc_mainnet(),
            contract_address: DEFAULT_CONTRACT_ADDRESS,
            token_address: DEFAULT_TOKEN_ADDRESS,
            limits: ContributionLimits::default(),
            polling: PollingConfig::default(),
            wallet: WalletConfig::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Contribution bounds used when the live contract values cannot be read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContributionLimits {
    /// Minimum contribution in BNB (decimal string)
    pub default_min: String,
    /// Maximum contribution in BNB (decimal string)
    pub default_max: String,
}

impl Default for ContributionLimits {
    fn default() -> Self {
        Self {
            default_min: "0.1".to_string(),
            default_max: "5".to_string(),
        }
    }
}

impl ContributionLimits {
    pub fn min_wei(&self) -> Result<U256, Error> {
        units::parse_amount(&self.default_min)
            .map_err(|e| Error::Config(format!("Invalid default minimum contribution: {}", e)))
    }

    pub fn max_wei(&self) -> Result<U256, Error> {
        units::parse_amount(&self.default_max)
            .map_err(|e| Error::Config(format!("Invalid default maximum contribution: {}", e)))
    }
}

/// Refresh periods for the polled contract data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub sale_interval_secs: u64,
    pub vesting_interval_secs: u64,
    pub balance_interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            sale_interval_secs: 30,
            vesting_interval_secs: 60,
            balance_interval_secs: 10,
        }
    }
}

impl PollingConfig {
    pub fn sale_interval(&self) -> Duration {
        Duration::from_secs(self.sale_interval_secs)
    }

    pub fn vesting_interval(&self) -> Duration {
        Duration::from_secs(self.vesting_interval_secs)
    }

    pub fn balance_interval(&self) -> Duration {
        Duration::from_secs(self.balance_interval_secs)
    }
}

/// Wallet discovery and transaction confirmation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Prefix of the wallet app deep link; the dapp host is appended
    pub deep_link_base: String,
    /// Host used in the deep link when the environment does not report one
    pub dapp_host: Option<String>,
    pub ios_store_url: String,
    pub android_store_url: String,
    /// How long to wait for the wallet app before sending the user to the store
    pub store_redirect_delay_ms: u64,
    /// Give up waiting for a receipt after this long
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            deep_link_base: "https://metamask.app.link/dapp/".to_string(),
            dapp_host: None,
            ios_store_url: "https://apps.apple.com/app/metamask/id1438144202".to_string(),
            android_store_url: "https://play.google.com/store/apps/details?id=io.metamask"
                .to_string(),
            store_redirect_delay_ms: 2_500,
            confirmation_timeout_secs: 300,
            receipt_poll_interval_ms: 2_000,
        }
    }
}

impl WalletConfig {
    pub fn store_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.store_redirect_delay_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

/// Presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub token_symbol: String,
    pub native_symbol: String,
    /// Approximate USD price of one BNB; fee estimates are shown in BNB when unset
    pub native_usd_price: Option<f64>,
    pub max_fraction_digits: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            token_symbol: "SRA".to_string(),
            native_symbol: "BNB".to_string(),
            native_usd_price: None,
            max_fraction_digits: 6,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (compact, pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}
