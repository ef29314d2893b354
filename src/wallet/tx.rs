// Allow deprecated Signature for compatibility with alloy-consensus ecosystem
#![allow(deprecated)]

use alloy_consensus::{SignableTransaction, Signed, TxEip1559};
use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, Bytes, ChainId, Signature, TxKind, B256, U256};

/// Gas limit of a plain value transfer, used until an estimate is applied
const BASE_GAS_LIMIT: u64 = 21_000;

/// EIP-1559 contract call assembled before signing
#[derive(Clone, Debug)]
pub struct Eip1559Transaction {
    pub chain_id: ChainId,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

impl Eip1559Transaction {
    pub fn new(chain_id: u64, nonce: u64) -> Self {
        Self {
            chain_id,
            nonce,
            gas_limit: BASE_GAS_LIMIT,
            max_fee_per_gas: 0,
            max_priority_fee_per_gas: 0,
            to: None,
            value: U256::ZERO,
            data: Bytes::new(),
        }
    }

    pub fn to(mut self, to: Option<Address>) -> Self {
        self.to = to;
        self
    }

    /// Attached native value in wei
    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn data(mut self, data: Bytes) -> Self {
        self.data = data;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn max_fee_per_gas(mut self, max_fee: u128) -> Self {
        self.max_fee_per_gas = max_fee;
        self
    }

    pub fn max_priority_fee_per_gas(mut self, tip: u128) -> Self {
        self.max_priority_fee_per_gas = tip;
        self
    }

    fn as_consensus(&self) -> TxEip1559 {
        TxEip1559 {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            to: self.to.map(TxKind::Call).unwrap_or(TxKind::Create),
            value: self.value,
            access_list: AccessList::default(),
            input: self.data.clone(),
        }
    }

    /// Payload hashed with keccak256 to produce the signing digest
    pub fn encoded_for_signing(&self) -> Vec<u8> {
        self.as_consensus().encoded_for_signing()
    }

    pub fn signature_hash(&self) -> B256 {
        self.as_consensus().signature_hash()
    }

    /// Attach a signature and produce the raw `eth_sendRawTransaction` payload
    pub fn sign(self, signature: Signature) -> SignedEip1559Transaction {
        let tx = self.as_consensus();
        let mut buf = Vec::with_capacity(tx.encoded_len_with_signature(&signature, false));
        tx.encode_with_signature(&signature, &mut buf, false);
        SignedEip1559Transaction {
            signed: tx.into_signed(signature),
            raw: Bytes::from(buf),
        }
    }
}

/// Signed transaction plus its wire encoding
#[derive(Clone, Debug)]
pub struct SignedEip1559Transaction {
    signed: Signed<TxEip1559>,
    raw: Bytes,
}

impl SignedEip1559Transaction {
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn hash(&self) -> B256 {
        *self.signed.hash()
    }

    pub fn signature(&self) -> &Signature {
        self.signed.signature()
    }
}
