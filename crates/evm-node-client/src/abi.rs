//! Minimal ABI call encoding
//!
//! Hand-rolled encoding for the handful of factory/router/pair/ERC-20
//! functions the client calls: a Keccak-256 4-byte selector followed by
//! 32-byte words. Decoding covers the return shapes we read: uints,
//! addresses, and dynamic strings (with a bytes32 fallback for tokens that
//! return their symbol as fixed bytes).

use sha3::{Digest, Keccak256};

use minidex_core::{Address, Amount, NodeError};

/// Compute the 4-byte function selector for a canonical signature,
/// e.g. `approve(address,uint256)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Calldata builder: selector plus left-padded 32-byte argument words.
#[derive(Debug, Clone)]
pub struct CallData {
    bytes: Vec<u8>,
}

impl CallData {
    pub fn new(signature: &str) -> Self {
        Self {
            bytes: selector(signature).to_vec(),
        }
    }

    pub fn push_address(mut self, addr: &Address) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&addr.to_bytes());
        self.bytes.extend_from_slice(&word);
        self
    }

    pub fn push_uint(mut self, value: Amount) -> Self {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        self.bytes.extend_from_slice(&word);
        self
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Decode a `0x`-prefixed hex return payload into raw bytes.
pub fn decode_hex(data: &str) -> Result<Vec<u8>, NodeError> {
    let stripped = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(stripped).map_err(|e| NodeError::Parse(format!("invalid hex payload: {}", e)))
}

/// Split a return payload into 32-byte words.
pub fn decode_words(data: &str) -> Result<Vec<[u8; 32]>, NodeError> {
    let bytes = decode_hex(data)?;
    if bytes.is_empty() || bytes.len() % 32 != 0 {
        return Err(NodeError::Parse(format!(
            "return payload length {} is not a multiple of 32",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(32)
        .map(|c| {
            let mut word = [0u8; 32];
            word.copy_from_slice(c);
            word
        })
        .collect())
}

/// Decode a uint word into an Amount. Values above u128 are rejected
/// rather than silently truncated.
pub fn decode_uint(word: &[u8; 32]) -> Result<Amount, NodeError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(NodeError::Parse("uint exceeds 128 bits".to_string()));
    }
    let mut lower = [0u8; 16];
    lower.copy_from_slice(&word[16..]);
    Ok(Amount::from_be_bytes(lower))
}

/// Decode a uint word expected to fit in u64 (e.g. a pair count).
pub fn decode_u64(word: &[u8; 32]) -> Result<u64, NodeError> {
    let value = decode_uint(word)?;
    u64::try_from(value).map_err(|_| NodeError::Parse("uint exceeds 64 bits".to_string()))
}

/// Decode a uint8 word (e.g. token decimals).
pub fn decode_u8(word: &[u8; 32]) -> Result<u8, NodeError> {
    let value = decode_uint(word)?;
    u8::try_from(value).map_err(|_| NodeError::Parse("uint exceeds 8 bits".to_string()))
}

/// Decode an address word. The 12 high bytes must be zero.
pub fn decode_address(word: &[u8; 32]) -> Result<Address, NodeError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(NodeError::Parse("address word has nonzero padding".to_string()));
    }
    let text = format!("0x{}", hex::encode(&word[12..]));
    Address::parse(&text).map_err(|e| NodeError::Parse(e.to_string()))
}

/// Decode a string return value.
///
/// Standard ABI layout is offset word, length word, then UTF-8 bytes.
/// Some older tokens return `bytes32` instead; a single NUL-padded word is
/// accepted as that fallback.
pub fn decode_string(data: &str) -> Result<String, NodeError> {
    let bytes = decode_hex(data)?;

    // bytes32 fallback
    if bytes.len() == 32 {
        let trimmed: Vec<u8> = bytes.iter().copied().take_while(|b| *b != 0).collect();
        return String::from_utf8(trimmed)
            .map_err(|_| NodeError::Parse("bytes32 string is not UTF-8".to_string()));
    }

    if bytes.len() < 64 {
        return Err(NodeError::Parse("string payload too short".to_string()));
    }

    // Offset and length come straight off the wire; checked arithmetic so
    // a hostile payload yields a parse error instead of a panic.
    let offset = word_as_usize(&bytes[..32])?;
    let start = offset
        .checked_add(32)
        .ok_or_else(|| NodeError::Parse("string offset out of range".to_string()))?;
    if bytes.len() < start {
        return Err(NodeError::Parse("string offset out of range".to_string()));
    }
    let len = word_as_usize(&bytes[offset..start])?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| NodeError::Parse("string length out of range".to_string()))?;
    if bytes.len() < end {
        return Err(NodeError::Parse("string length out of range".to_string()));
    }

    String::from_utf8(bytes[start..end].to_vec())
        .map_err(|_| NodeError::Parse("string is not UTF-8".to_string()))
}

fn word_as_usize(word: &[u8]) -> Result<usize, NodeError> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return Err(NodeError::Parse("oversized dynamic offset".to_string()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(tail) as usize)
}
