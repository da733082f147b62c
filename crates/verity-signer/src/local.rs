//! In-process secp256k1 signer.
//!
//! Backs tests and headless tooling; interactive wallets implement
//! [`Signer`](crate::Signer) elsewhere.

use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use verity_types::{bytes_to_hex, hex_to_bytes, Address, Hex, Result, VerityError};

use crate::eip712::keccak256;
use crate::Signer;

/// Signer holding a raw secp256k1 secret key in memory.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Build from a 32-byte secret key, 0x-hex encoded.
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex_to_bytes(secret)?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| VerityError::Other(format!("invalid secret key: {}", e)))?;
        let address = derive_address(key.verifying_key());
        Ok(Self { key, address })
    }
}

/// Ethereum-style address: last 20 bytes of keccak(uncompressed pubkey).
fn derive_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    bytes_to_hex(&hash[12..])
}

#[async_trait]
impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.address.clone()
    }

    async fn sign_digest(&self, digest: [u8; 32]) -> Result<Hex> {
        let (sig, recid): (Signature, RecoveryId) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| VerityError::Other(format!("signing failed: {}", e)))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = 27 + recid.to_byte();
        Ok(bytes_to_hex(&out))
    }
}
