// Allow deprecated Signature for compatibility with alloy-consensus ecosystem
#![allow(deprecated)]

use std::str::FromStr;

use alloy_primitives::{Address, Signature};
use bip32::{DerivationPath, Seed, XPrv};
use bip39::Mnemonic;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use secrecy::{ExposeSecret, SecretString};
use sha3::{Digest, Keccak256};
use tiny_keccak::{Hasher, Keccak};
use zeroize::Zeroizing;

use super::tx::{Eip1559Transaction, SignedEip1559Transaction};
use crate::error::Error;

/// HD Path prefix for Ethereum-compatible chains (BIP-44)
const ETHEREUM_HD_PATH: &str = "m/44'/60'/0'/0/";

/// Local secp256k1 key used by the RPC-backed wallet
pub struct LocalSigner {
    signing_key: SigningKey,
    address: Address,
    account_index: u32,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("account_index", &self.account_index)
            .field(
                "public_key",
                &hex::encode(self.signing_key.verifying_key().to_encoded_point(true).as_bytes()),
            )
            .finish()
    }
}

impl LocalSigner {
    /// Derive the key at `m/44'/60'/0'/0/{account_index}`
    pub fn from_mnemonic(mnemonic: &SecretString, account_index: u32) -> Result<Self, Error> {
        let mnemonic = Mnemonic::from_str(mnemonic.expose_secret().trim())
            .map_err(|e| Error::Wallet(format!("Invalid mnemonic: {}", e)))?;

        let seed = Seed::new(mnemonic.to_seed(""));

        let path = format!("{}{}", ETHEREUM_HD_PATH, account_index);
        let path = DerivationPath::from_str(&path)
            .map_err(|e| Error::Wallet(format!("Invalid derivation path: {}", e)))?;

        let derived_key = XPrv::derive_from_path(seed.as_bytes(), &path)
            .map_err(|e| Error::Wallet(format!("Key derivation error: {}", e)))?;

        let key_bytes = Zeroizing::new(derived_key.to_bytes());
        let signing_key = SigningKey::from_slice(key_bytes.as_slice())
            .map_err(|e| Error::Wallet(format!("Failed to create EVM signing key: {}", e)))?;

        let address = ethereum_address(&signing_key)?;

        Ok(Self {
            signing_key,
            address,
            account_index,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn account_index(&self) -> u32 {
        self.account_index
    }

    /// Sign an EIP-1559 transaction and return the full signed payload.
    pub fn sign_eip1559(&self, tx: &Eip1559Transaction) -> Result<SignedEip1559Transaction, Error> {
        let mut digest = Keccak256::new();
        digest.update(tx.encoded_for_signing());

        let (sig, recid) = self
            .signing_key
            .sign_digest_recoverable(digest)
            .map_err(|e| Error::Wallet(format!("Failed to sign transaction: {}", e)))?;

        Ok(tx.clone().sign(Signature::from((sig, recid))))
    }
}

/// Keccak-256 of the uncompressed public key, last 20 bytes
fn ethereum_address(signing_key: &SigningKey) -> Result<Address, Error> {
    let point = signing_key.verifying_key().to_encoded_point(false);
    let pubkey_bytes = point.as_bytes();

    if pubkey_bytes.len() != 65 || pubkey_bytes[0] != 0x04 {
        return Err(Error::Wallet(
            "Invalid public key format for Ethereum address derivation".to_string(),
        ));
    }

    let mut hasher = Keccak::v256();
    hasher.update(&pubkey_bytes[1..]);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);

    Ok(Address::from_slice(&hash[12..]))
}
