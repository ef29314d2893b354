//! Vesting claims

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::reader::PresaleReader;
use super::{tx_failure, SignerLock, Submission};
use crate::error::Error;
use crate::notify::Notifier;
use crate::wallet::classify::TxFailure;
use crate::wallet::{ConnectionManager, TxReceipt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(TxReceipt),
    /// Nothing is claimable; no transaction was sent
    NothingToClaim,
}

pub struct ClaimWorkflow {
    connection: Arc<ConnectionManager>,
    reader: Arc<PresaleReader>,
    notifier: Notifier,
    in_flight: AtomicBool,
    signer_lock: SignerLock,
}

impl ClaimWorkflow {
    pub fn new(
        connection: Arc<ConnectionManager>,
        reader: Arc<PresaleReader>,
        notifier: Notifier,
        signer_lock: SignerLock,
    ) -> Self {
        Self {
            connection,
            reader,
            notifier,
            in_flight: AtomicBool::new(false),
            signer_lock,
        }
    }

    /// Whether the claim control is enabled
    pub fn can_claim(&self) -> bool {
        self.connection.contract().is_some()
            && self
                .reader
                .vesting()
                .map(|record| record.has_claimable())
                .unwrap_or(false)
    }

    pub async fn claim(&self) -> Result<ClaimOutcome, Error> {
        let contract = self.connection.contract().ok_or(Error::NotConnected)?;

        let record = match self.reader.vesting() {
            Some(record) => Some(record),
            None => self.reader.refresh_vesting().await?,
        };
        if !record.map(|r| r.has_claimable()).unwrap_or(false) {
            debug!("Nothing claimable, claim skipped");
            return Ok(ClaimOutcome::NothingToClaim);
        }

        let _submission = Submission::begin(&self.in_flight, &self.signer_lock)?;

        let result = async {
            let hash = contract.claim_tokens().await?;
            self.notifier.info("Claiming tokens...");
            contract.wait(hash).await
        }
        .await;

        match result {
            Ok(receipt) if receipt.success => {
                info!("Claim confirmed in {}", receipt.hash);
                self.notifier.success("Tokens claimed successfully!");
                if let Err(e) = self.reader.refresh_vesting().await {
                    debug!("Vesting refresh after claim failed: {}", e);
                }
                if let Err(e) = self.reader.refresh_balance().await {
                    debug!("Balance refresh after claim failed: {}", e);
                }
                Ok(ClaimOutcome::Claimed(receipt))
            }
            Ok(receipt) => {
                warn!("Claim transaction {} reverted", receipt.hash);
                self.notifier.error("Error claiming tokens");
                Err(Error::Transaction(TxFailure::ContractRevert(
                    "Error claiming tokens".to_string(),
                )))
            }
            Err(e) => {
                let failure = tx_failure(&e);
                warn!("Claim failed: {}", failure);
                self.notifier.error(failure.user_message());
                Err(Error::Transaction(failure))
            }
        }
    }
}
