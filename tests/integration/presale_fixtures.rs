//! Test fixtures for presale integration tests
//!
//! A scriptable in-memory wallet provider and host environment, so the
//! connection, purchase and claim flows run without a node or a browser.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tokio::sync::{broadcast, watch, Notify};

use sra_presale::config::ChainParams;
use sra_presale::presale::contract::IPresale;
use sra_presale::units;
use sra_presale::wallet::{
    EventSink, FeeData, HostEnvironment, Subscription, TxReceipt, TxRequest, WalletError,
    WalletEvent, WalletProvider,
};
use sra_presale::{Notification, PresaleClient, PresaleClientBuilder, PresaleConfig};

pub const MOCK_ACCOUNT: Address = Address::repeat_byte(0x22);
pub const OTHER_ACCOUNT: Address = Address::repeat_byte(0x33);

pub const BSC_MAINNET: u64 = 56;
pub const BSC_TESTNET: u64 = 97;

pub const IPHONE_UA: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
pub const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0";

/// Amount in wei from a decimal BNB/SRA string
pub fn bnb(amount: &str) -> U256 {
    units::parse_amount(amount).unwrap()
}

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000u64)
}

fn word(value: U256) -> Vec<u8> {
    value.to_be_bytes::<32>().to_vec()
}

fn encode(values: &[U256]) -> Bytes {
    Bytes::from(values.iter().flat_map(|v| word(*v)).collect::<Vec<u8>>())
}

/// Sale state served by the mock contract
#[derive(Debug, Clone)]
pub struct MockSale {
    pub sale_active: bool,
    pub emergency_mode: bool,
    pub tokens_per_bnb: U256,
    pub min_contribution: U256,
    pub max_contribution: U256,
    pub remaining_tokens: U256,
}

impl MockSale {
    pub fn active() -> Self {
        Self {
            sale_active: true,
            emergency_mode: false,
            tokens_per_bnb: bnb("10000"),
            min_contribution: bnb("0.1"),
            max_contribution: bnb("5"),
            remaining_tokens: bnb("1000000"),
        }
    }

    pub fn inactive() -> Self {
        Self {
            sale_active: false,
            ..Self::active()
        }
    }

    pub fn emergency() -> Self {
        Self {
            emergency_mode: true,
            ..Self::active()
        }
    }
}

/// Vesting record served by the mock contract
#[derive(Debug, Clone)]
pub struct MockVesting {
    pub total: U256,
    pub claimed: U256,
    pub claimable: U256,
    pub next_unlock: u64,
    pub remaining: U256,
    pub price: U256,
}

impl MockVesting {
    pub fn claimable(amount: &str) -> Self {
        Self {
            total: bnb("1000"),
            claimed: U256::ZERO,
            claimable: bnb(amount),
            next_unlock: 1_893_456_000,
            remaining: bnb("1000"),
            price: bnb("0.0001"),
        }
    }

    pub fn locked() -> Self {
        Self::claimable("0")
    }

    pub fn empty() -> Self {
        Self {
            total: U256::ZERO,
            claimed: U256::ZERO,
            claimable: U256::ZERO,
            next_unlock: 0,
            remaining: U256::ZERO,
            price: U256::ZERO,
        }
    }

    fn encode(&self) -> Bytes {
        encode(&[
            self.total,
            self.claimed,
            self.claimable,
            U256::from(self.next_unlock),
            self.remaining,
            self.price,
        ])
    }
}

/// Scriptable wallet provider
pub struct MockWallet {
    accounts: Mutex<Result<Vec<Address>, WalletError>>,
    chain_id: Mutex<u64>,
    known_chains: Mutex<HashSet<u64>>,
    switch_error: Mutex<Option<WalletError>>,
    code: Mutex<Bytes>,
    responses: Mutex<HashMap<[u8; 4], Bytes>>,
    vesting: Mutex<HashMap<Address, Bytes>>,
    call_error: Mutex<Option<WalletError>>,
    balance: Mutex<U256>,
    gas: Mutex<u64>,
    fees: Mutex<FeeData>,
    send_error: Mutex<Option<WalletError>>,
    receipt_success: AtomicBool,
    accounts_gate: Mutex<Option<Arc<Notify>>>,
    receipt_gate: Mutex<Option<Arc<Notify>>>,
    call_gate: Mutex<Option<Arc<Notify>>>,
    balance_gate: Mutex<Option<Arc<Notify>>>,
    sinks: Mutex<Vec<EventSink>>,
    pub sent: Mutex<Vec<TxRequest>>,
    pub calls: AtomicUsize,
    pub balance_reads: AtomicUsize,
    pub switch_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
    pub unsubscribed: Arc<AtomicUsize>,
}

impl MockWallet {
    /// Wallet on BSC mainnet with an active sale deployed
    pub fn new() -> Arc<Self> {
        let wallet = Arc::new(Self {
            accounts: Mutex::new(Ok(vec![MOCK_ACCOUNT])),
            chain_id: Mutex::new(BSC_MAINNET),
            known_chains: Mutex::new([BSC_MAINNET, BSC_TESTNET].into_iter().collect()),
            switch_error: Mutex::new(None),
            code: Mutex::new(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40])),
            responses: Mutex::new(HashMap::new()),
            vesting: Mutex::new(HashMap::new()),
            call_error: Mutex::new(None),
            balance: Mutex::new(bnb("10")),
            gas: Mutex::new(100_000),
            fees: Mutex::new(FeeData {
                gas_price: Some(gwei(3)),
                max_fee_per_gas: Some(gwei(5)),
                max_priority_fee_per_gas: Some(gwei(1)),
            }),
            send_error: Mutex::new(None),
            receipt_success: AtomicBool::new(true),
            accounts_gate: Mutex::new(None),
            receipt_gate: Mutex::new(None),
            call_gate: Mutex::new(None),
            balance_gate: Mutex::new(None),
            sinks: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            balance_reads: AtomicUsize::new(0),
            switch_calls: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
            unsubscribed: Arc::new(AtomicUsize::new(0)),
        });
        wallet.set_sale(MockSale::active());
        wallet.set_vesting(MockVesting::empty());
        wallet
    }

    /// Wallet sitting on `chain_id` that only knows that chain
    pub fn on_unknown_network(chain_id: u64) -> Arc<Self> {
        let wallet = Self::new();
        *wallet.chain_id.lock().unwrap() = chain_id;
        *wallet.known_chains.lock().unwrap() = [chain_id].into_iter().collect();
        wallet
    }

    pub fn set_chain(&self, chain_id: u64) {
        *self.chain_id.lock().unwrap() = chain_id;
    }

    pub fn set_accounts(&self, accounts: Result<Vec<Address>, WalletError>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    pub fn fail_switch(&self, error: WalletError) {
        *self.switch_error.lock().unwrap() = Some(error);
    }

    pub fn remove_code(&self) {
        *self.code.lock().unwrap() = Bytes::new();
    }

    pub fn fail_calls(&self, error: Option<WalletError>) {
        *self.call_error.lock().unwrap() = error;
    }

    pub fn set_balance(&self, balance: U256) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn fail_send(&self, error: WalletError) {
        *self.send_error.lock().unwrap() = Some(error);
    }

    pub fn revert_receipts(&self) {
        self.receipt_success.store(false, Ordering::SeqCst);
    }

    /// Hold `request_accounts` until the returned handle is notified
    pub fn hold_accounts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.accounts_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold `wait_for_receipt` until the returned handle is notified
    pub fn hold_receipts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.receipt_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold the next contract call until the returned handle is notified
    pub fn hold_next_call(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.call_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold `get_balance` until the returned handle is notified
    pub fn hold_balance(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.balance_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_sale(&self, sale: MockSale) {
        let mut responses = self.responses.lock().unwrap();
        let flag = |on: bool| U256::from(on as u8);
        responses.insert(IPresale::saleActiveCall::SELECTOR, encode(&[flag(sale.sale_active)]));
        responses.insert(IPresale::emergencyModeCall::SELECTOR, encode(&[flag(sale.emergency_mode)]));
        responses.insert(IPresale::tokensPerBNBCall::SELECTOR, encode(&[sale.tokens_per_bnb]));
        responses.insert(IPresale::minBnbPerUserCall::SELECTOR, encode(&[sale.min_contribution]));
        responses.insert(IPresale::maxBnbPerUserCall::SELECTOR, encode(&[sale.max_contribution]));
        responses.insert(
            IPresale::remainingSRATokensCall::SELECTOR,
            encode(&[sale.remaining_tokens]),
        );
        responses.insert(
            IPresale::getCurrentTokenPriceCall::SELECTOR,
            encode(&[bnb("0.0001")]),
        );
    }

    /// Vesting record of [`MOCK_ACCOUNT`]
    pub fn set_vesting(&self, vesting: MockVesting) {
        self.set_vesting_for(MOCK_ACCOUNT, vesting);
    }

    pub fn set_vesting_for(&self, account: Address, vesting: MockVesting) {
        self.vesting.lock().unwrap().insert(account, vesting.encode());
    }

    /// Push a notification to every live subscriber
    pub fn emit(&self, event: WalletEvent) {
        for sink in self.sinks.lock().unwrap().iter() {
            let _ = sink.send(event.clone());
        }
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    fn name(&self) -> &str {
        "mock"
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let gate = self.accounts_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.accounts.lock().unwrap().clone()
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(*self.chain_id.lock().unwrap())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        self.switch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.switch_error.lock().unwrap().clone() {
            return Err(error);
        }
        if !self.known_chains.lock().unwrap().contains(&chain_id) {
            return Err(WalletError::unrecognized_chain(chain_id));
        }
        self.set_chain(chain_id);
        Ok(())
    }

    async fn add_chain(&self, params: &ChainParams) -> Result<(), WalletError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.known_chains.lock().unwrap().insert(params.chain_id);
        Ok(())
    }

    fn subscribe(&self, sink: EventSink) -> Subscription {
        self.sinks.lock().unwrap().push(sink);
        let unsubscribed = self.unsubscribed.clone();
        Subscription::new(move || {
            unsubscribed.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn get_code(&self, _address: Address) -> Result<Bytes, WalletError> {
        Ok(self.code.lock().unwrap().clone())
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, WalletError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.call_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(error) = self.call_error.lock().unwrap().clone() {
            return Err(error);
        }
        let selector: [u8; 4] = data[..4].try_into().unwrap();
        if selector == IPresale::getVestingInfoCall::SELECTOR {
            let account = Address::from_slice(&data[16..36]);
            let vesting = self.vesting.lock().unwrap().get(&account).cloned();
            return Ok(vesting.unwrap_or_else(|| MockVesting::empty().encode()));
        }
        self.responses
            .lock()
            .unwrap()
            .get(&selector)
            .cloned()
            .ok_or_else(|| WalletError::reverted("unknown selector"))
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<u64, WalletError> {
        Ok(*self.gas.lock().unwrap())
    }

    async fn get_balance(&self, _address: Address) -> Result<U256, WalletError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        let gate = self.balance_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(*self.balance.lock().unwrap())
    }

    async fn fee_data(&self) -> Result<FeeData, WalletError> {
        Ok(self.fees.lock().unwrap().clone())
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, WalletError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(tx);
        if let Some(error) = self.send_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(B256::repeat_byte(sent.len() as u8))
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceipt, WalletError> {
        let gate = self.receipt_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(TxReceipt {
            hash,
            success: self.receipt_success.load(Ordering::SeqCst),
            block_number: Some(1),
        })
    }
}

/// Host environment with a scriptable provider and user agent
pub struct TestHost {
    provider: Option<Arc<dyn WalletProvider>>,
    user_agent: Option<String>,
    foreground: AtomicBool,
    pub opened: Mutex<Vec<String>>,
}

impl TestHost {
    pub fn with_provider(provider: Arc<dyn WalletProvider>) -> Arc<Self> {
        Arc::new(Self {
            provider: Some(provider),
            user_agent: Some(DESKTOP_UA.to_string()),
            foreground: AtomicBool::new(true),
            opened: Mutex::new(Vec::new()),
        })
    }

    /// Host without a provider, e.g. a plain mobile browser
    pub fn without_provider(user_agent: &str, foreground: bool) -> Arc<Self> {
        Arc::new(Self {
            provider: None,
            user_agent: Some(user_agent.to_string()),
            foreground: AtomicBool::new(foreground),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl HostEnvironment for TestHost {
    fn injected_provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.provider.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn dapp_host(&self) -> Option<String> {
        Some("presale.example.org".to_string())
    }

    fn open_url(&self, url: &str) {
        self.opened.lock().unwrap().push(url.to_string());
    }

    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }
}

/// Client wired to `wallet` through an injecting host
pub fn client_with(wallet: &Arc<MockWallet>) -> PresaleClient {
    client_with_config(wallet, PresaleConfig::default())
}

pub fn client_with_config(wallet: &Arc<MockWallet>, config: PresaleConfig) -> PresaleClient {
    let provider: Arc<dyn WalletProvider> = wallet.clone();
    PresaleClientBuilder::new()
        .with_config(config)
        .with_host(TestHost::with_provider(provider.clone()))
        .with_read_provider(provider)
        .build()
        .unwrap()
}

/// Every notification published so far
pub fn drain(notifications: &mut broadcast::Receiver<Notification>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        messages.push(notification.message);
    }
    messages
}

/// Wait until the watched value satisfies `predicate`
pub async fn wait_until<T>(receiver: &mut watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), receiver.wait_for(predicate))
        .await
        .expect("condition not reached in time")
        .expect("sender dropped");
}
