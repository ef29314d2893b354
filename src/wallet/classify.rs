//! Maps wallet/contract errors onto the categories shown to users.

use thiserror::Error;

use super::{ErrorCode, WalletError, NETWORK_ERROR_CODE};

const DEFAULT_MESSAGE: &str = "An error occurred during the transaction. Please try again";

/// User-facing failure category of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxFailure {
    #[error("Insufficient BNB balance for this transaction")]
    InsufficientFunds,

    #[error("Transaction rejected by user")]
    UserRejected,

    #[error("Gas estimation failed. Your transaction might fail or the network is congested")]
    GasEstimationFailed,

    #[error("Network error. Please check your connection and try again")]
    NetworkError,

    #[error("{0}")]
    ContractRevert(String),

    #[error("{0}")]
    Unknown(String),
}

impl TxFailure {
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

fn contains(text: &Option<String>, needle: &str) -> bool {
    text.as_deref().map(|t| t.contains(needle)).unwrap_or(false)
}

/// Classify a raised error
///
/// Checks run in a fixed priority order because the markers overlap (an
/// insufficient-funds error usually also mentions gas): insufficient funds,
/// user rejection, gas, network, revert reason, then any message.
pub fn classify(error: &WalletError) -> TxFailure {
    if contains(&error.data_message, "insufficient funds") || contains(&error.message, "insufficient funds") {
        return TxFailure::InsufficientFunds;
    }

    if error.rpc_code() == Some(super::USER_REJECTED_CODE) || contains(&error.message, "user rejected") {
        return TxFailure::UserRejected;
    }

    if contains(&error.message, "gas") || contains(&error.data_message, "gas") {
        return TxFailure::GasEstimationFailed;
    }

    let network_code = matches!(&error.code, Some(ErrorCode::Named(code)) if code == NETWORK_ERROR_CODE);
    if contains(&error.message, "network") || network_code {
        return TxFailure::NetworkError;
    }

    if let Some(reason) = error.reason.as_deref().filter(|r| !r.is_empty()) {
        return TxFailure::ContractRevert(reason.to_string());
    }

    let message = error
        .data_message
        .as_deref()
        .filter(|m| !m.is_empty())
        .or(error.message.as_deref().filter(|m| !m.is_empty()))
        .unwrap_or(DEFAULT_MESSAGE);
    TxFailure::Unknown(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_wins_over_gas() {
        let err = WalletError::new("insufficient funds for gas * price + value");
        assert_eq!(classify(&err), TxFailure::InsufficientFunds);

        let nested = WalletError::new("execution failed").with_data_message("insufficient funds");
        assert_eq!(classify(&nested), TxFailure::InsufficientFunds);
    }

    #[test]
    fn test_user_rejection() {
        assert_eq!(classify(&WalletError::user_rejected()), TxFailure::UserRejected);
        assert_eq!(
            classify(&WalletError::new("user rejected transaction")),
            TxFailure::UserRejected
        );
        // Rejection outranks a gas marker in the same message
        assert_eq!(
            classify(&WalletError::with_code(4001, "gas prompt dismissed")),
            TxFailure::UserRejected
        );
    }

    #[test]
    fn test_gas_before_network() {
        let err = WalletError::new("cannot estimate gas on this network");
        assert_eq!(classify(&err), TxFailure::GasEstimationFailed);
    }

    #[test]
    fn test_network() {
        assert_eq!(classify(&WalletError::network("timeout")), TxFailure::NetworkError);
        assert_eq!(
            classify(&WalletError::new("could not detect network")),
            TxFailure::NetworkError
        );
    }

    #[test]
    fn test_revert_reason() {
        let err = WalletError {
            reason: Some("Sale not active".to_string()),
            message: Some("call exception".to_string()),
            ..Default::default()
        };
        assert_eq!(classify(&err), TxFailure::ContractRevert("Sale not active".to_string()));
    }

    #[test]
    fn test_fallback_messages() {
        let data = WalletError::new("outer").with_data_message("inner detail");
        assert_eq!(classify(&data), TxFailure::Unknown("inner detail".to_string()));

        assert_eq!(
            classify(&WalletError::new("something odd")),
            TxFailure::Unknown("something odd".to_string())
        );

        assert_eq!(
            classify(&WalletError::default()),
            TxFailure::Unknown(DEFAULT_MESSAGE.to_string())
        );
    }
}
