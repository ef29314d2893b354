//! Presale contract access and the workflows built on it

pub mod claim;
pub mod contract;
pub mod purchase;
pub mod reader;

pub use claim::{ClaimOutcome, ClaimWorkflow};
pub use contract::{ContractSnapshot, PresaleContract, PurchaseLimits, VestingRecord};
pub use purchase::{validate_amount, CostEstimate, PurchaseIntent, PurchaseWorkflow, SubmissionState};
pub use reader::PresaleReader;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::Error;
use crate::wallet::classify::{classify, TxFailure};

/// Lock shared by every workflow that sends transactions from the session's account
pub type SignerLock = Arc<Mutex<()>>;

pub fn signer_lock() -> SignerLock {
    Arc::new(Mutex::new(()))
}

/// Held while one workflow owns its submission slot and the signer
pub(crate) struct Submission<'a> {
    flag: &'a AtomicBool,
    _signer: OwnedMutexGuard<()>,
}

impl<'a> Submission<'a> {
    /// Claim the workflow's slot, then the shared signer; `Busy` if either is taken
    pub(crate) fn begin(flag: &'a AtomicBool, signer: &SignerLock) -> Result<Self, Error> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }

        match signer.clone().try_lock_owned() {
            Ok(guard) => Ok(Self {
                flag,
                _signer: guard,
            }),
            Err(_) => {
                flag.store(false, Ordering::Release);
                Err(Error::Busy)
            }
        }
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Failure category for an error raised while sending or confirming
pub(crate) fn tx_failure(error: &Error) -> TxFailure {
    match error {
        Error::Provider(err) => classify(err),
        Error::Transaction(failure) => failure.clone(),
        Error::UserRejected => TxFailure::UserRejected,
        other => TxFailure::Unknown(other.to_string()),
    }
}
