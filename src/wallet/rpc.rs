//! Wallet provider backed by a JSON-RPC node and a local key
//!
//! Used where no injected wallet exists (the CLI). Chain switching swaps the
//! node endpoint; transactions are signed locally as EIP-1559 and broadcast
//! with `eth_sendRawTransaction`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::{BlockNumberOrTag, TransactionRequest};
use alloy_transport::TransportError;
use alloy_transport_http::{Client, Http};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::signer::LocalSigner;
use super::tx::Eip1559Transaction;
use super::{
    EventSink, FeeData, Subscription, TxReceipt, TxRequest, WalletError, WalletEvent,
    WalletProvider,
};
use crate::config::{ChainParams, WalletConfig};
use crate::error::Error;

/// EIP-1193 code for a request needing an account the provider does not hold
const UNAUTHORIZED_CODE: i64 = 4100;

type HttpProvider = RootProvider<Http<Client>>;

struct ActiveChain {
    params: ChainParams,
    provider: HttpProvider,
}

type Listeners = Arc<Mutex<HashMap<u64, EventSink>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeeParams {
    gas_price: u128,
    max_fee: u128,
    tip: u128,
}

impl FeeParams {
    fn legacy(gas_price: u128) -> Self {
        Self {
            gas_price,
            max_fee: gas_price,
            tip: gas_price,
        }
    }

    /// Twice the latest base fee plus the median tip; the gas price when the
    /// node reports no base fee
    fn from_history(gas_price: u128, base_fee: Option<u128>, tip: Option<u128>) -> Self {
        match (base_fee, tip) {
            (Some(base_fee), Some(tip)) if base_fee > 0 => Self {
                gas_price,
                max_fee: base_fee.saturating_mul(2).saturating_add(tip),
                tip,
            },
            _ => Self::legacy(gas_price),
        }
    }
}

/// JSON-RPC wallet provider
pub struct RpcWallet {
    known_chains: RwLock<HashMap<u64, ChainParams>>,
    active: RwLock<ActiveChain>,
    signer: Option<LocalSigner>,
    watch_address: Option<Address>,
    listeners: Listeners,
    next_listener: AtomicU64,
    receipt_timeout: Duration,
    receipt_poll_interval: Duration,
}

impl RpcWallet {
    /// Create a provider connected to `chain`'s primary RPC endpoint
    pub fn new(chain: ChainParams, wallet_config: &WalletConfig) -> Result<Self, Error> {
        let provider = http_provider(&chain)?;
        let mut known_chains = HashMap::new();
        known_chains.insert(chain.chain_id, chain.clone());

        Ok(Self {
            known_chains: RwLock::new(known_chains),
            active: RwLock::new(ActiveChain {
                params: chain,
                provider,
            }),
            signer: None,
            watch_address: None,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(0),
            receipt_timeout: wallet_config.confirmation_timeout(),
            receipt_poll_interval: wallet_config.receipt_poll_interval(),
        })
    }

    /// Sign transactions with a local key
    pub fn with_signer(mut self, signer: LocalSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Expose an account for reads only
    pub fn with_watch_address(mut self, address: Address) -> Self {
        self.watch_address = Some(address);
        self
    }

    /// Chain the provider currently talks to
    pub fn active_chain(&self) -> ChainParams {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .params
            .clone()
    }

    /// Drop account access and tell subscribers
    pub fn disconnect(&self) {
        info!("RPC wallet disconnected");
        self.emit(WalletEvent::Disconnect);
    }

    fn account(&self) -> Option<Address> {
        self.signer
            .as_ref()
            .map(LocalSigner::address)
            .or(self.watch_address)
    }

    fn provider(&self) -> HttpProvider {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .provider
            .clone()
    }

    fn emit(&self, event: WalletEvent) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|_, sink| sink.send(event.clone()).is_ok());
    }

    /// Current fee levels in wei, from one gas price and one fee history read
    async fn fee_params(&self) -> Result<FeeParams, WalletError> {
        let provider = self.provider();
        let gas_price = provider.get_gas_price().await.map_err(rpc_error)?;

        match provider
            .get_fee_history(1, BlockNumberOrTag::Latest, &[50.0])
            .await
        {
            Ok(history) => {
                let base_fee = history.base_fee_per_gas.last().copied();
                let tip = history
                    .reward
                    .as_ref()
                    .and_then(|r| r.last())
                    .and_then(|r| r.first())
                    .copied();
                Ok(FeeParams::from_history(gas_price, base_fee, tip))
            }
            Err(e) => {
                debug!("Fee history unavailable, using gas price: {}", e);
                Ok(FeeParams::legacy(gas_price))
            }
        }
    }
}

fn http_provider(chain: &ChainParams) -> Result<HttpProvider, Error> {
    let rpc_url = chain
        .primary_rpc_url()
        .ok_or_else(|| Error::Config(format!("No RPC URL for chain {}", chain.chain_id)))?;
    let url = reqwest::Url::parse(rpc_url)
        .map_err(|e| Error::Config(format!("Invalid RPC URL: {}", e)))?;
    Ok(ProviderBuilder::new().on_http(url))
}

fn to_u64<T: TryInto<u64>>(value: T) -> Result<u64, WalletError> {
    value
        .try_into()
        .map_err(|_| WalletError::new("RPC value does not fit in u64"))
}

fn call_request(tx: &TxRequest) -> TransactionRequest {
    TransactionRequest {
        from: Some(tx.from),
        to: Some(TxKind::Call(tx.to)),
        value: Some(tx.value),
        input: tx.data.clone().into(),
        ..Default::default()
    }
}

/// Text after `execution reverted:` in a node error message
fn revert_reason(message: &str) -> Option<String> {
    message
        .strip_prefix("execution reverted")
        .map(|rest| rest.trim_start_matches(':').trim().to_string())
        .filter(|reason| !reason.is_empty())
}

/// Translate a transport failure into the wallet error shape
fn rpc_error(err: TransportError) -> WalletError {
    if err.is_transport_error() {
        return WalletError::network(err.to_string());
    }

    if let Some(payload) = err.as_error_resp() {
        let message = payload.message.to_string();
        let mut wallet_error = WalletError::with_code(payload.code, message.clone());
        wallet_error.reason = revert_reason(&message);
        return wallet_error;
    }

    WalletError::new(err.to_string())
}

#[async_trait]
impl WalletProvider for RpcWallet {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.account()
            .map(|account| vec![account])
            .ok_or_else(|| WalletError::with_code(UNAUTHORIZED_CODE, "No account configured"))
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        self.provider().get_chain_id().await.map_err(rpc_error)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        if self.active_chain().chain_id == chain_id {
            return Ok(());
        }

        let params = self
            .known_chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| WalletError::unrecognized_chain(chain_id))?;

        let provider = http_provider(&params).map_err(|e| WalletError::new(e.to_string()))?;
        *self.active.write().unwrap_or_else(PoisonError::into_inner) =
            ActiveChain { params, provider };

        info!("Switched RPC wallet to chain {}", chain_id);
        self.emit(WalletEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn add_chain(&self, params: &ChainParams) -> Result<(), WalletError> {
        http_provider(params).map_err(|e| WalletError::new(e.to_string()))?;
        self.known_chains
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(params.chain_id, params.clone());
        debug!("Registered chain {} ({})", params.chain_id, params.chain_name);
        Ok(())
    }

    fn subscribe(&self, sink: EventSink) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sink);

        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        })
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, WalletError> {
        self.provider().get_code_at(address).await.map_err(rpc_error)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WalletError> {
        let request = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: data.into(),
            ..Default::default()
        };
        self.provider().call(&request).await.map_err(rpc_error)
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, WalletError> {
        let gas = self
            .provider()
            .estimate_gas(&call_request(tx))
            .await
            .map_err(rpc_error)?;
        to_u64(gas)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, WalletError> {
        self.provider().get_balance(address).await.map_err(rpc_error)
    }

    async fn fee_data(&self) -> Result<FeeData, WalletError> {
        let fees = self.fee_params().await?;
        Ok(FeeData {
            gas_price: Some(U256::from(fees.gas_price)),
            max_fee_per_gas: Some(U256::from(fees.max_fee)),
            max_priority_fee_per_gas: Some(U256::from(fees.tip)),
        })
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, WalletError> {
        let signer = self
            .signer
            .as_ref()
            .filter(|signer| signer.address() == tx.from)
            .ok_or_else(|| {
                WalletError::with_code(UNAUTHORIZED_CODE, "No signing key for the sender account")
            })?;

        let provider = self.provider();
        let chain_id = self.active_chain().chain_id;

        let nonce = to_u64(
            provider
                .get_transaction_count(tx.from)
                .await
                .map_err(rpc_error)?,
        )?;
        let gas_limit = self.estimate_gas(&tx).await?;
        let fees = self.fee_params().await?;

        let unsigned = Eip1559Transaction::new(chain_id, nonce)
            .to(Some(tx.to))
            .value(tx.value)
            .data(tx.data)
            .gas_limit(gas_limit)
            .max_fee_per_gas(fees.max_fee)
            .max_priority_fee_per_gas(fees.tip);

        let signed = signer
            .sign_eip1559(&unsigned)
            .map_err(|e| WalletError::new(e.to_string()))?;

        let pending = provider
            .send_raw_transaction(signed.raw())
            .await
            .map_err(rpc_error)?;
        let hash = *pending.tx_hash();

        info!("Broadcast transaction {} (nonce {}, gas {})", hash, nonce, gas_limit);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceipt, WalletError> {
        let provider = self.provider();
        let poll = async {
            loop {
                match provider.get_transaction_receipt(hash).await {
                    Ok(Some(receipt)) => {
                        return Ok(TxReceipt {
                            hash,
                            success: receipt.status(),
                            block_number: receipt.block_number,
                        })
                    }
                    Ok(None) => {}
                    Err(e) if e.is_transport_error() => {
                        warn!("Receipt poll for {} failed, retrying: {}", hash, e);
                    }
                    Err(e) => return Err(rpc_error(e)),
                }
                tokio::time::sleep(self.receipt_poll_interval).await;
            }
        };

        tokio::time::timeout(self.receipt_timeout, poll)
            .await
            .map_err(|_| {
                WalletError::network(format!("Timed out waiting for transaction {}", hash))
            })?
    }
}

impl std::fmt::Debug for RpcWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcWallet")
            .field("chain_id", &self.active_chain().chain_id)
            .field("account", &self.account())
            .field("signer", &self.signer.is_some())
            .finish()
    }
}
