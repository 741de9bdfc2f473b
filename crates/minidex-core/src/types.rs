//! Core type definitions for minidex

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

/// Token amount in the token's smallest unit.
///
/// Stored as u128; math that can overflow a product of two amounts uses
/// big-integer intermediates (see the amm calculator).
pub type Amount = u128;

/// Decimals assumed for a token whose metadata could not be fetched.
pub const DEFAULT_DECIMALS: u8 = 18;

/// EVM account or contract address (20 bytes, `0x` + 40 hex chars).
///
/// Always held in canonical lowercase form. Construct via [`Address::parse`],
/// which rejects anything that is not address-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and canonicalize an address string.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        if is_well_formed_address(value) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(ValidationError::MalformedAddress {
                value: value.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The raw 20 bytes of the address.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Infallible: parse() guaranteed 40 hex chars after the prefix.
        if let Ok(bytes) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&bytes);
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Check whether a string is address-shaped: `0x` prefix + 40 hex chars.
///
/// Used by the read-state aggregator before trusting any address-shaped
/// value coming back from the node.
pub fn is_well_formed_address(value: &str) -> bool {
    value.len() == 42
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Transaction hash (32 bytes, `0x` + 64 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let ok = value.len() == 66
            && value.starts_with("0x")
            && value[2..].chars().all(|c| c.is_ascii_hexdigit());
        if ok {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(ValidationError::MalformedAddress {
                value: value.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
