use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Native currency metadata announced when registering a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Chain metadata in the shape of `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl ChainParams {
    /// BNB Smart Chain mainnet
    pub fn bsc_mainnet() -> Self {
        Self {
            chain_id: 56,
            chain_name: "BNB Smart Chain".to_string(),
            native_currency: NativeCurrency {
                name: "BNB".to_string(),
                symbol: "BNB".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://bsc-dataseed.binance.org".to_string()],
            block_explorer_urls: vec!["https://bscscan.com".to_string()],
        }
    }

    /// Chain id as the `0x`-prefixed hex string wallets expect
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }

    /// Explorer page for an address
    pub fn explorer_address_url(&self, address: &Address) -> Option<String> {
        self.block_explorer_urls
            .first()
            .map(|base| format!("{}/address/{}", base.trim_end_matches('/'), address))
    }

    /// Explorer page for a transaction
    pub fn explorer_tx_url(&self, hash: &alloy_primitives::B256) -> Option<String> {
        self.block_explorer_urls
            .first()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), hash))
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::bsc_mainnet()
    }
}
