//! Token purchase: validation, cost estimate, submission and confirmation

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use alloy_primitives::{B256, U256};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::contract::PurchaseLimits;
use super::reader::PresaleReader;
use super::{tx_failure, SignerLock, Submission};
use crate::config::PresaleConfig;
use crate::error::{Error, ValidationError};
use crate::notify::Notifier;
use crate::units;
use crate::wallet::classify::TxFailure;
use crate::wallet::{ConnectionManager, TxReceipt};

/// Digits shown for BNB amounts in estimates and bound messages
const DISPLAY_DIGITS: usize = 6;

/// Amount the user entered for the next purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseIntent {
    pub bnb_amount: String,
    pub validated: bool,
}

/// Progress of the current purchase
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Validating,
    Submitting,
    PendingConfirmation(B256),
    Confirmed(B256),
    Reverted(B256),
    Rejected(TxFailure),
}

impl SubmissionState {
    /// Whether the submit control should be disabled
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SubmissionState::Validating
                | SubmissionState::Submitting
                | SubmissionState::PendingConfirmation(_)
        )
    }
}

/// Affordability of a purchase including network fees
#[derive(Debug, Clone, PartialEq)]
pub enum CostEstimate {
    Affordable {
        gas_cost: U256,
        total: U256,
        /// `Gas: ~$0.12`, or the fee in BNB without a configured USD price
        display: String,
    },
    /// The balance does not even cover the amount itself
    InsufficientBalance { balance: U256 },
    /// The balance covers the amount but not amount plus fees
    NeedsMore { total: U256, balance: U256 },
    /// Estimation failed; submission stays possible
    Unavailable,
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostEstimate::Affordable { display, .. } => write!(f, "{}", display),
            CostEstimate::InsufficientBalance { balance } => write!(
                f,
                "Insufficient balance ({} BNB)",
                units::format_display(*balance, DISPLAY_DIGITS)
            ),
            CostEstimate::NeedsMore { total, balance } => write!(
                f,
                "Need {} BNB (have {} BNB)",
                units::format_display(*total, DISPLAY_DIGITS),
                units::format_display(*balance, DISPLAY_DIGITS)
            ),
            CostEstimate::Unavailable => write!(f, "Unable to estimate gas"),
        }
    }
}

/// Check an entered amount against the sale limits
///
/// Emergency mode wins over every amount check; the bounds are inclusive.
pub fn validate_amount(amount: &str, limits: &PurchaseLimits) -> Result<U256, ValidationError> {
    if limits.emergency_mode {
        return Err(ValidationError::EmergencyPaused);
    }

    let value = units::parse_amount(amount)?;
    if value.is_zero() {
        return Err(ValidationError::InvalidAmount);
    }

    if value < limits.min_contribution {
        return Err(ValidationError::BelowMinimum {
            min: units::format_display(limits.min_contribution, DISPLAY_DIGITS),
        });
    }

    if value > limits.max_contribution {
        return Err(ValidationError::AboveMaximum {
            max: units::format_display(limits.max_contribution, DISPLAY_DIGITS),
        });
    }

    Ok(value)
}

pub struct PurchaseWorkflow {
    config: Arc<PresaleConfig>,
    connection: Arc<ConnectionManager>,
    reader: Arc<PresaleReader>,
    notifier: Notifier,
    intent: watch::Sender<Option<PurchaseIntent>>,
    state: watch::Sender<SubmissionState>,
    in_flight: AtomicBool,
    signer_lock: SignerLock,
}

impl PurchaseWorkflow {
    pub fn new(
        config: Arc<PresaleConfig>,
        connection: Arc<ConnectionManager>,
        reader: Arc<PresaleReader>,
        notifier: Notifier,
        signer_lock: SignerLock,
    ) -> Self {
        let (intent, _) = watch::channel(None);
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            config,
            connection,
            reader,
            notifier,
            intent,
            state,
            in_flight: AtomicBool::new(false),
            signer_lock,
        }
    }

    /// Record the amount the user typed
    pub fn set_amount(&self, amount: impl Into<String>) {
        self.intent.send_replace(Some(PurchaseIntent {
            bnb_amount: amount.into(),
            validated: false,
        }));
    }

    pub fn intent(&self) -> Option<PurchaseIntent> {
        self.intent.borrow().clone()
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Live limits, or the configured defaults when the contract cannot be read
    ///
    /// Without a live read the sale flags come from the last snapshot; with
    /// no snapshot either, the sale counts as inactive.
    pub async fn limits(&self) -> Result<PurchaseLimits, Error> {
        if let Some(contract) = self.connection.contract() {
            match contract.purchase_limits().await {
                Ok(limits) => return Ok(limits),
                Err(e) => warn!("Reading contribution limits failed, using defaults: {}", e),
            }
        }

        let snapshot = self.reader.sale();
        Ok(PurchaseLimits {
            min_contribution: self.config.limits.min_wei()?,
            max_contribution: self.config.limits.max_wei()?,
            emergency_mode: snapshot.as_ref().is_some_and(|s| s.emergency_mode),
            sale_active: snapshot.as_ref().is_some_and(|s| s.sale_active),
        })
    }

    pub async fn validate(&self, amount: &str) -> Result<U256, Error> {
        let limits = self.limits().await?;
        Ok(validate_amount(amount, &limits)?)
    }

    /// Tokens the amount buys at the last known rate
    pub fn estimate_tokens(&self, amount: &str) -> Option<U256> {
        let rate = self.reader.sale()?.tokens_per_bnb;
        let value = units::parse_amount(amount).ok()?;
        Some(units::estimate_tokens(value, rate))
    }

    /// Estimate total cost; never fails, degrades to `Unavailable`
    pub async fn estimate_cost(&self, amount: &str) -> CostEstimate {
        match self.try_estimate_cost(amount).await {
            Ok(estimate) => estimate,
            Err(e) => {
                debug!("Gas estimation failed: {}", e);
                CostEstimate::Unavailable
            }
        }
    }

    async fn try_estimate_cost(&self, amount: &str) -> Result<CostEstimate, Error> {
        let contract = self.connection.contract().ok_or(Error::NotConnected)?;
        let value = units::parse_amount(amount).map_err(ValidationError::from)?;
        if value.is_zero() {
            return Err(ValidationError::InvalidAmount.into());
        }

        let balance = contract.account_balance().await?;
        if balance < value {
            return Ok(CostEstimate::InsufficientBalance { balance });
        }

        let fees = contract.provider().fee_data().await?;
        let max_fee = fees
            .max_fee_per_gas
            .filter(|_| fees.max_priority_fee_per_gas.is_some())
            .ok_or_else(|| Error::Rpc("Unable to get network fee data".to_string()))?;

        let gas = contract.estimate_buy_gas(value).await?;
        let gas_cost = U256::from(gas).saturating_mul(max_fee);
        let total = gas_cost.saturating_add(value);

        if balance < total {
            return Ok(CostEstimate::NeedsMore { total, balance });
        }

        Ok(CostEstimate::Affordable {
            gas_cost,
            total,
            display: self.describe_fee(gas_cost),
        })
    }

    fn describe_fee(&self, gas_cost: U256) -> String {
        let display = &self.config.display;
        match display.native_usd_price {
            Some(price) => {
                let bnb = units::format_amount(gas_cost).parse::<f64>().unwrap_or(0.0);
                format!("Gas: ~${:.2}", bnb * price)
            }
            None => format!(
                "Gas: ~{} {}",
                units::format_display(gas_cost, DISPLAY_DIGITS),
                display.native_symbol
            ),
        }
    }

    /// Buy tokens for `amount` BNB
    ///
    /// Only one purchase runs at a time, and never alongside a claim; a
    /// concurrent call fails with [`Error::Busy`]. The entered amount is kept
    /// on failure and cleared once the transaction confirms.
    pub async fn submit(&self, amount: &str) -> Result<TxReceipt, Error> {
        let _submission = Submission::begin(&self.in_flight, &self.signer_lock)?;
        self.set_amount(amount);
        self.state.send_replace(SubmissionState::Validating);

        let value = match self.prepare(amount).await {
            Ok(value) => value,
            Err(e) => {
                self.state.send_replace(SubmissionState::Idle);
                self.notifier.error(e.user_message());
                return Err(e);
            }
        };

        self.intent.send_modify(|intent| {
            if let Some(intent) = intent {
                intent.validated = true;
            }
        });
        self.state.send_replace(SubmissionState::Submitting);

        let outcome = self.send_and_confirm(value).await;
        match &outcome {
            Ok(receipt) => {
                self.intent.send_replace(None);
                self.notifier.success("Transaction successful!");
                if let Err(e) = self.reader.refresh().await {
                    debug!("Refresh after purchase failed: {}", e);
                }
                if let Err(e) = self.reader.refresh_balance().await {
                    debug!("Balance refresh after purchase failed: {}", e);
                }
                info!("Purchase of {} BNB confirmed in {}", amount, receipt.hash);
            }
            Err(e) => self.notifier.error(e.user_message()),
        }
        outcome
    }

    async fn prepare(&self, amount: &str) -> Result<U256, Error> {
        if self.connection.contract().is_none() {
            return Err(Error::NotConnected);
        }
        let limits = self.limits().await?;
        if !limits.sale_active {
            return Err(ValidationError::SaleInactive.into());
        }
        Ok(validate_amount(amount, &limits)?)
    }

    async fn send_and_confirm(&self, value: U256) -> Result<TxReceipt, Error> {
        let contract = self.connection.contract().ok_or(Error::NotConnected)?;

        let hash = match contract.buy_tokens(value).await {
            Ok(hash) => hash,
            Err(e) => return Err(self.reject(&e)),
        };

        self.state
            .send_replace(SubmissionState::PendingConfirmation(hash));
        self.notifier.info("Transaction in progress...");

        let receipt = match contract.wait(hash).await {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.reject(&e)),
        };

        if receipt.success {
            self.state.send_replace(SubmissionState::Confirmed(hash));
            Ok(receipt)
        } else {
            self.state.send_replace(SubmissionState::Reverted(hash));
            Err(Error::Transaction(TxFailure::ContractRevert(
                "Transaction failed".to_string(),
            )))
        }
    }

    fn reject(&self, error: &Error) -> Error {
        let failure = tx_failure(error);
        warn!("Purchase failed: {}", failure);
        self.state
            .send_replace(SubmissionState::Rejected(failure.clone()));
        Error::Transaction(failure)
    }
}
