//! EIP-712 structured-data hashing for the forwarder's `ForwardRequest`.
//!
//! The encoded field order and types must match the relay's schema
//! exactly (`from, to, value, gas, nonce, deadline, data`); any deviation
//! produces a digest the forwarder will refuse.

use sha3::{Digest, Keccak256};
use verity_types::{address_to_bytes, hex_to_bytes, ForwardRequest, Result};

use crate::TypedDomain;

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

const FORWARD_REQUEST_TYPE: &str = "ForwardRequest(address from,address to,uint256 value,\
uint256 gas,uint256 nonce,uint48 deadline,bytes data)";

/// Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Left-pad a u128 to a 32-byte big-endian word.
fn word_u128(v: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&v.to_be_bytes());
    word
}

/// Left-pad 20 address bytes to a 32-byte word.
fn word_address(addr: &str) -> Result<[u8; 32]> {
    let bytes = address_to_bytes(addr)?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// `hashStruct(EIP712Domain)` for the forwarder domain.
pub fn domain_separator(domain: &TypedDomain) -> Result<[u8; 32]> {
    let mut enc = Vec::with_capacity(32 * 5);
    enc.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
    enc.extend_from_slice(&keccak256(domain.name.as_bytes()));
    enc.extend_from_slice(&keccak256(domain.version.as_bytes()));
    enc.extend_from_slice(&word_u128(domain.chain_id as u128));
    enc.extend_from_slice(&word_address(&domain.verifying_contract)?);
    Ok(keccak256(&enc))
}

/// `hashStruct(ForwardRequest)`.
pub fn struct_hash(request: &ForwardRequest) -> Result<[u8; 32]> {
    let data_bytes = hex_to_bytes(&request.data)?;
    let mut enc = Vec::with_capacity(32 * 8);
    enc.extend_from_slice(&keccak256(FORWARD_REQUEST_TYPE.as_bytes()));
    enc.extend_from_slice(&word_address(&request.from)?);
    enc.extend_from_slice(&word_address(&request.to)?);
    enc.extend_from_slice(&word_u128(request.value));
    enc.extend_from_slice(&word_u128(request.gas as u128));
    enc.extend_from_slice(&word_u128(request.nonce as u128));
    enc.extend_from_slice(&word_u128(request.deadline as u128));
    enc.extend_from_slice(&keccak256(&data_bytes));
    Ok(keccak256(&enc))
}

/// Final signing digest: `keccak256(0x1901 || domainSeparator || structHash)`.
pub fn forward_request_digest(
    domain: &TypedDomain,
    request: &ForwardRequest,
) -> Result<[u8; 32]> {
    let mut enc = Vec::with_capacity(2 + 32 + 32);
    enc.extend_from_slice(&[0x19, 0x01]);
    enc.extend_from_slice(&domain_separator(domain)?);
    enc.extend_from_slice(&struct_hash(request)?);
    Ok(keccak256(&enc))
}
