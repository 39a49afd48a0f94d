//! Ed25519 transaction signing with Sui intent framing.
//!
//! A transaction signature covers `blake2b256(intent ‖ tx_bytes)` where the
//! intent for transaction data is `[0, 0, 0]`. The serialized signature is
//! `flag ‖ signature ‖ public key`, base64 encoded.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer as _, SigningKey};
use protocol::address::SuiAddress;

type Blake2b256 = Blake2b<U32>;

/// Signature scheme flag for Ed25519.
pub const ED25519_FLAG: u8 = 0x00;
/// Intent prefix: scope transaction data, version 0, app id Sui.
pub const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

const SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("invalid secret key: {0}")]
    InvalidKey(String),
    #[error("transaction bytes are not valid base64: {0}")]
    InvalidTransaction(String),
}

/// Signs sponsored transaction bytes on behalf of one address.
#[async_trait::async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> SuiAddress;

    /// Sign base64 transaction bytes; returns the base64 serialized signature.
    async fn sign_transaction(&self, tx_bytes: &str) -> Result<String, SignerError>;
}

pub struct Ed25519Signer {
    key: SigningKey,
    address: SuiAddress,
}

impl Ed25519Signer {
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        let address = derive_address(&key.verifying_key().to_bytes());
        Self { key, address }
    }

    /// Parse a 32-byte secret given as hex (optionally `0x`-prefixed), as
    /// base64, or as base64 of a keystore entry (`flag ‖ secret`).
    ///
    /// # Errors
    ///
    /// [`SignerError::InvalidKey`] for any other encoding or length, or a
    /// keystore entry for a scheme other than Ed25519.
    pub fn from_secret(raw: &str) -> Result<Self, SignerError> {
        let raw = raw.trim();
        let hex_digits = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = if hex_digits.len() == SECRET_LEN * 2 && hex_digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(hex_digits).map_err(|e| SignerError::InvalidKey(e.to_string()))?
        } else {
            STANDARD.decode(raw).map_err(|e| SignerError::InvalidKey(e.to_string()))?
        };

        let secret: [u8; SECRET_LEN] = match bytes.as_slice() {
            [ED25519_FLAG, rest @ ..] if rest.len() == SECRET_LEN => rest.try_into().map_err(|_| length_error(bytes.len()))?,
            [flag, rest @ ..] if rest.len() == SECRET_LEN => {
                return Err(SignerError::InvalidKey(format!("unsupported key scheme flag {flag}")));
            }
            _ => bytes.as_slice().try_into().map_err(|_| length_error(bytes.len()))?,
        };
        Ok(Self::new(SigningKey::from_bytes(&secret)))
    }

    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Serialized signature over raw transaction bytes.
    #[must_use]
    pub fn sign_bytes(&self, tx_bytes: &[u8]) -> String {
        let signature = self.key.sign(&intent_digest(tx_bytes));
        let mut serialized = Vec::with_capacity(1 + 64 + 32);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(&self.public_key());
        STANDARD.encode(serialized)
    }
}

#[async_trait::async_trait]
impl TransactionSigner for Ed25519Signer {
    fn address(&self) -> SuiAddress {
        self.address
    }

    async fn sign_transaction(&self, tx_bytes: &str) -> Result<String, SignerError> {
        let bytes = STANDARD
            .decode(tx_bytes.trim())
            .map_err(|e| SignerError::InvalidTransaction(e.to_string()))?;
        Ok(self.sign_bytes(&bytes))
    }
}

/// `blake2b256(flag ‖ public_key)`.
#[must_use]
pub fn derive_address(public_key: &[u8; 32]) -> SuiAddress {
    let mut hasher = Blake2b256::new();
    hasher.update([ED25519_FLAG]);
    hasher.update(public_key);
    SuiAddress::new(hasher.finalize().into())
}

/// Digest the signature actually covers.
#[must_use]
pub fn intent_digest(tx_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(TRANSACTION_INTENT);
    hasher.update(tx_bytes);
    hasher.finalize().into()
}

fn length_error(len: usize) -> SignerError {
    SignerError::InvalidKey(format!("expected {SECRET_LEN} secret bytes, got {len}"))
}

#[cfg(test)]
#[path = "signer_test.rs"]
mod tests;
