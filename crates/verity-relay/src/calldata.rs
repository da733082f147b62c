//! ABI calldata for the contracts the relay forwards to.
//!
//! Selector is the first four bytes of keccak over the canonical
//! signature; arguments use standard head/tail encoding. Only the handful
//! of calls the client issues are covered.

use verity_signer::eip712::keccak256;
use verity_types::{address_to_bytes, bytes_to_hex, Hex, Result, StakeSide};

/// One ABI-encodable argument.
enum Token {
    Address([u8; 20]),
    Uint(u128),
    Bool(bool),
    Str(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::Str(_))
    }

    /// 32-byte head word for static tokens.
    fn head(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        match self {
            Token::Address(a) => word[12..].copy_from_slice(a),
            Token::Uint(v) => word[16..].copy_from_slice(&v.to_be_bytes()),
            Token::Bool(b) => word[31] = *b as u8,
            Token::Str(_) => unreachable!("dynamic token has no static head"),
        }
        word
    }

    /// Tail bytes for dynamic tokens: length word plus right-padded data.
    fn tail(&self) -> Vec<u8> {
        match self {
            Token::Str(s) => {
                let bytes = s.as_bytes();
                let mut out = Vec::with_capacity(32 + bytes.len().div_ceil(32) * 32);
                let mut len_word = [0u8; 32];
                len_word[16..].copy_from_slice(&(bytes.len() as u128).to_be_bytes());
                out.extend_from_slice(&len_word);
                out.extend_from_slice(bytes);
                let pad = bytes.len().div_ceil(32) * 32 - bytes.len();
                out.extend(std::iter::repeat(0u8).take(pad));
                out
            }
            _ => Vec::new(),
        }
    }
}

fn encode_call(signature: &str, args: &[Token]) -> Hex {
    let selector = &keccak256(signature.as_bytes())[..4];

    let head_len = args.len() * 32;
    let mut heads: Vec<[u8; 32]> = Vec::with_capacity(args.len());
    let mut tail: Vec<u8> = Vec::new();
    for arg in args {
        if arg.is_dynamic() {
            let mut offset = [0u8; 32];
            offset[16..].copy_from_slice(&((head_len + tail.len()) as u128).to_be_bytes());
            heads.push(offset);
            tail.extend_from_slice(&arg.tail());
        } else {
            heads.push(arg.head());
        }
    }

    let mut out = Vec::with_capacity(4 + head_len + tail.len());
    out.extend_from_slice(selector);
    for head in heads {
        out.extend_from_slice(&head);
    }
    out.extend_from_slice(&tail);
    bytes_to_hex(&out)
}

/// `createClaim(string)` on the post registry.
pub fn create_claim(text: &str) -> Hex {
    encode_call("createClaim(string)", &[Token::Str(text.to_string())])
}

/// `createLink(uint256,uint256,bool)` on the post registry.
pub fn create_link(independent_post_id: u64, dependent_post_id: u64, is_challenge: bool) -> Hex {
    encode_call(
        "createLink(uint256,uint256,bool)",
        &[
            Token::Uint(independent_post_id as u128),
            Token::Uint(dependent_post_id as u128),
            Token::Bool(is_challenge),
        ],
    )
}

/// `stake(uint256,uint8,uint256)` on the stake engine.
pub fn stake(post_id: u64, side: StakeSide, amount_wei: u128) -> Hex {
    encode_call(
        "stake(uint256,uint8,uint256)",
        &[
            Token::Uint(post_id as u128),
            Token::Uint(side.as_u8() as u128),
            Token::Uint(amount_wei),
        ],
    )
}

/// `withdraw(uint256,uint8,uint256,bool)` on the stake engine.
pub fn withdraw(post_id: u64, side: StakeSide, amount_wei: u128, lifo: bool) -> Hex {
    encode_call(
        "withdraw(uint256,uint8,uint256,bool)",
        &[
            Token::Uint(post_id as u128),
            Token::Uint(side.as_u8() as u128),
            Token::Uint(amount_wei),
            Token::Bool(lifo),
        ],
    )
}

/// ERC-20 `approve(address,uint256)`.
pub fn approve(spender: &str, amount_wei: u128) -> Result<Hex> {
    Ok(encode_call(
        "approve(address,uint256)",
        &[
            Token::Address(address_to_bytes(spender)?),
            Token::Uint(amount_wei),
        ],
    ))
}

/// ERC-20 `allowance(address,address)` (read call).
pub fn allowance(owner: &str, spender: &str) -> Result<Hex> {
    Ok(encode_call(
        "allowance(address,address)",
        &[
            Token::Address(address_to_bytes(owner)?),
            Token::Address(address_to_bytes(spender)?),
        ],
    ))
}

/// ERC-20 `balanceOf(address)` (read call).
pub fn balance_of(owner: &str) -> Result<Hex> {
    Ok(encode_call(
        "balanceOf(address)",
        &[Token::Address(address_to_bytes(owner)?)],
    ))
}
