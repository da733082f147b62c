//! Signer adapter for relay-bound meta-transactions.
//!
//! Produces EIP-712 typed-data signatures over [`ForwardRequest`]
//! envelopes. The domain binds to one chain id and one forwarder
//! contract; a signature is worthless anywhere else.

use async_trait::async_trait;
use verity_types::{Address, ForwardRequest, Hex, Result};

pub mod eip712;
pub mod local;

pub use local::LocalSigner;

/// EIP-712 domain for the forwarder contract.
///
/// `name` must match the string baked into the forwarder's constructor,
/// or the contract will reject every signature.
#[derive(Debug, Clone)]
pub struct TypedDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl TypedDomain {
    pub fn new(name: &str, chain_id: u64, verifying_contract: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1".to_string(),
            chain_id,
            verifying_contract: verifying_contract.to_string(),
        }
    }
}

/// Wallet abstraction: anything that can sign a 32-byte digest for a
/// fixed account.
///
/// `sign_digest` may suspend for an arbitrary time (hardware wallets,
/// user confirmation dialogs). A user declining surfaces as
/// `VerityError::SigningRejected`.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The account address signatures are attributed to.
    fn address(&self) -> Address;

    /// Sign a prehashed digest, returning a 65-byte r||s||v signature
    /// as 0x-hex, v in {27, 28}.
    async fn sign_digest(&self, digest: [u8; 32]) -> Result<Hex>;

    /// Sign a forward request under the given domain.
    async fn sign_forward_request(
        &self,
        domain: &TypedDomain,
        request: &ForwardRequest,
    ) -> Result<Hex> {
        let digest = eip712::forward_request_digest(domain, request)?;
        self.sign_digest(digest).await
    }
}
