//! Presale contract helpers
//!
//! Typed access to the presale contract's view and mutating functions
//! through whatever [`WalletProvider`] the session is connected with.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sra_presale::config::{PresaleConfig, WalletConfig};
//! use sra_presale::presale::PresaleContract;
//! use sra_presale::wallet::{RpcWallet, WalletProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PresaleConfig::default();
//! let wallet: Arc<dyn WalletProvider> =
//!     Arc::new(RpcWallet::new(config.chain.clone(), &WalletConfig::default())?);
//!
//! let presale = PresaleContract::read_only(wallet, config.contract_address);
//! let snapshot = presale.snapshot().await?;
//! println!("Sale active: {}", snapshot.sale_active);
//! println!("Tokens per BNB: {}", snapshot.tokens_per_bnb);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Error;
use crate::wallet::{Signer, TxReceipt, WalletProvider};

sol! {
    #[derive(Debug)]
    interface IPresale {
        // View functions
        function saleActive() external view returns (bool);
        function emergencyMode() external view returns (bool);
        function tokensPerBNB() external view returns (uint256);
        function minBnbPerUser() external view returns (uint256);
        function maxBnbPerUser() external view returns (uint256);
        function remainingSRATokens() external view returns (uint256);
        function getCurrentTokenPrice() external view returns (uint256);
        function getVestingInfo(address user) external view returns (
            uint256 totalAmount,
            uint256 claimedAmount,
            uint256 claimableNow,
            uint256 nextUnlock,
            uint256 remainingAmount,
            uint256 priceAtPurchase
        );

        // State-changing functions
        function buyTokens() external payable;
        function claimTokens() external;
    }
}

/// Sale-wide contract state, amounts in 1e18 fixed point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSnapshot {
    pub remaining_tokens: U256,
    pub sale_active: bool,
    pub emergency_mode: bool,
    pub tokens_per_bnb: U256,
    pub min_contribution: U256,
    pub max_contribution: U256,
    /// When the values were read
    pub fetched_at: DateTime<Utc>,
}

/// Contribution bounds and sale flags read together before a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseLimits {
    pub min_contribution: U256,
    pub max_contribution: U256,
    pub emergency_mode: bool,
    pub sale_active: bool,
}

/// Vesting position of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VestingRecord {
    pub total_amount: U256,
    pub claimed_amount: U256,
    pub claimable_now: U256,
    /// Unix timestamp of the next unlock, zero when none is pending
    pub next_unlock_time: u64,
    pub remaining_amount: U256,
    pub price_at_purchase: U256,
}

impl VestingRecord {
    /// Build a record, rejecting values that break the vesting invariants
    pub fn new(
        total_amount: U256,
        claimed_amount: U256,
        claimable_now: U256,
        next_unlock: U256,
        remaining_amount: U256,
        price_at_purchase: U256,
    ) -> Result<Self, Error> {
        if claimed_amount > total_amount || claimable_now > total_amount - claimed_amount {
            return Err(Error::Evm(format!(
                "inconsistent vesting data: total {}, claimed {}, claimable {}",
                total_amount, claimed_amount, claimable_now
            )));
        }

        Ok(Self {
            total_amount,
            claimed_amount,
            claimable_now,
            next_unlock_time: next_unlock.saturating_to::<u64>(),
            remaining_amount,
            price_at_purchase,
        })
    }

    pub fn has_claimable(&self) -> bool {
        !self.claimable_now.is_zero()
    }

    /// Whether the account ever bought tokens
    pub fn is_empty(&self) -> bool {
        self.total_amount.is_zero()
    }
}

impl TryFrom<IPresale::getVestingInfoReturn> for VestingRecord {
    type Error = Error;

    fn try_from(info: IPresale::getVestingInfoReturn) -> Result<Self, Self::Error> {
        VestingRecord::new(
            info.totalAmount,
            info.claimedAmount,
            info.claimableNow,
            info.nextUnlock,
            info.remainingAmount,
            info.priceAtPurchase,
        )
    }
}

/// Presale contract handle
///
/// Read calls work through any provider; `buy_tokens`/`claim_tokens` need the
/// handle to be bound to a [`Signer`].
#[derive(Clone)]
pub struct PresaleContract {
    provider: Arc<dyn WalletProvider>,
    signer: Option<Signer>,
    address: Address,
}

impl PresaleContract {
    pub fn read_only(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self {
            provider,
            signer: None,
            address,
        }
    }

    /// Handle able to send transactions from the signer's account
    pub fn with_signer(signer: Signer, address: Address) -> Self {
        Self {
            provider: signer.provider().clone(),
            signer: Some(signer),
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Account bound to this handle, if any
    pub fn account(&self) -> Option<Address> {
        self.signer.as_ref().map(Signer::account)
    }

    async fn call<T: SolCall>(&self, call: T) -> Result<T::Return, Error> {
        let data = Bytes::from(call.abi_encode());
        let result = self.provider.call(self.address, data).await?;
        T::abi_decode_returns(&result, false)
            .map_err(|e| Error::Evm(format!("Failed to decode contract call result: {}", e)))
    }

    fn signer(&self) -> Result<&Signer, Error> {
        self.signer.as_ref().ok_or(Error::NotConnected)
    }

    // ========== View Functions ==========

    pub async fn sale_active(&self) -> Result<bool, Error> {
        let result = self.call(IPresale::saleActiveCall {}).await?;
        Ok(result._0)
    }

    pub async fn emergency_mode(&self) -> Result<bool, Error> {
        let result = self.call(IPresale::emergencyModeCall {}).await?;
        Ok(result._0)
    }

    pub async fn tokens_per_bnb(&self) -> Result<U256, Error> {
        let result = self.call(IPresale::tokensPerBNBCall {}).await?;
        Ok(result._0)
    }

    pub async fn min_bnb_per_user(&self) -> Result<U256, Error> {
        let result = self.call(IPresale::minBnbPerUserCall {}).await?;
        Ok(result._0)
    }

    pub async fn max_bnb_per_user(&self) -> Result<U256, Error> {
        let result = self.call(IPresale::maxBnbPerUserCall {}).await?;
        Ok(result._0)
    }

    pub async fn remaining_tokens(&self) -> Result<U256, Error> {
        let result = self.call(IPresale::remainingSRATokensCall {}).await?;
        Ok(result._0)
    }

    /// Current token price as reported by the contract
    pub async fn current_token_price(&self) -> Result<U256, Error> {
        let result = self.call(IPresale::getCurrentTokenPriceCall {}).await?;
        Ok(result._0)
    }

    pub async fn vesting_info(&self, user: Address) -> Result<VestingRecord, Error> {
        let result = self.call(IPresale::getVestingInfoCall { user }).await?;
        VestingRecord::try_from(result)
    }

    /// Read every sale field concurrently
    pub async fn snapshot(&self) -> Result<ContractSnapshot, Error> {
        let (remaining_tokens, sale_active, emergency_mode, tokens_per_bnb, min, max) =
            futures::try_join!(
                self.remaining_tokens(),
                self.sale_active(),
                self.emergency_mode(),
                self.tokens_per_bnb(),
                self.min_bnb_per_user(),
                self.max_bnb_per_user(),
            )?;

        Ok(ContractSnapshot {
            remaining_tokens,
            sale_active,
            emergency_mode,
            tokens_per_bnb,
            min_contribution: min,
            max_contribution: max,
            fetched_at: Utc::now(),
        })
    }

    pub async fn purchase_limits(&self) -> Result<PurchaseLimits, Error> {
        let (min_contribution, max_contribution, emergency_mode, sale_active) = futures::try_join!(
            self.min_bnb_per_user(),
            self.max_bnb_per_user(),
            self.emergency_mode(),
            self.sale_active(),
        )?;

        Ok(PurchaseLimits {
            min_contribution,
            max_contribution,
            emergency_mode,
            sale_active,
        })
    }

    // ========== State-Changing Functions ==========

    /// Gas units `buyTokens` would use with `value` attached
    pub async fn estimate_buy_gas(&self, value: U256) -> Result<u64, Error> {
        let signer = self.signer()?;
        let data = Bytes::from(IPresale::buyTokensCall {}.abi_encode());
        let request = signer.request(self.address, data, value);
        Ok(self.provider.estimate_gas(&request).await?)
    }

    /// Send `buyTokens` with `value` wei attached
    pub async fn buy_tokens(&self, value: U256) -> Result<B256, Error> {
        let signer = self.signer()?;
        let data = Bytes::from(IPresale::buyTokensCall {}.abi_encode());
        let hash = self
            .provider
            .send_transaction(signer.request(self.address, data, value))
            .await?;
        debug!("buyTokens submitted: {}", hash);
        Ok(hash)
    }

    pub async fn claim_tokens(&self) -> Result<B256, Error> {
        let signer = self.signer()?;
        let data = Bytes::from(IPresale::claimTokensCall {}.abi_encode());
        let hash = self
            .provider
            .send_transaction(signer.request(self.address, data, U256::ZERO))
            .await?;
        debug!("claimTokens submitted: {}", hash);
        Ok(hash)
    }

    /// Wait for a submitted transaction to be mined
    pub async fn wait(&self, hash: B256) -> Result<TxReceipt, Error> {
        Ok(self.provider.wait_for_receipt(hash).await?)
    }

    /// Native balance of the bound account
    pub async fn account_balance(&self) -> Result<U256, Error> {
        let account = self.signer()?.account();
        Ok(self.provider.get_balance(account).await?)
    }

    pub(crate) fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }
}

impl std::fmt::Debug for PresaleContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresaleContract")
            .field("address", &self.address)
            .field("provider", &self.provider.name())
            .field("account", &self.account())
            .finish()
    }
}
