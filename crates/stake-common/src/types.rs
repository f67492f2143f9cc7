//! Shared types for the high-stakes service.
//!
//! Stakes are whole currency units held as `u64`. Identifiers are 31-bit
//! friendly `u32` values parsed from URL path segments.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of characters in a generated session key.
pub const SESSION_KEY_LEN: usize = 20;

/// Characters a session key is drawn from.
pub const SESSION_KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Errors produced when parsing identifiers and stakes from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected an unsigned integer, got {0:?}")]
    NotANumber(String),

    #[error("session key is empty")]
    EmptySessionKey,
}

fn parse_unsigned<T: FromStr>(s: &str) -> Result<T, ParseError> {
    let trimmed = s.trim();
    // `u32::from_str` accepts a leading '+', which is not a valid id.
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::NotANumber(s.to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| ParseError::NotANumber(s.to_string()))
}

/// Parse a stake amount from a request body.
pub fn parse_stake(s: &str) -> Result<u64, ParseError> {
    parse_unsigned(s)
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Raw numeric value.
            #[inline]
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_unsigned(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Identity that owns stakes and sessions.
    CustomerId
);

id_newtype!(
    /// Bet offer under which stakes are ranked independently.
    MarketId
);

/// One customer's best stake in one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StakeEntry {
    pub customer: CustomerId,
    pub stake: u64,
}

impl StakeEntry {
    pub fn new(customer: CustomerId, stake: u64) -> Self {
        Self { customer, stake }
    }
}

impl fmt::Display for StakeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.customer, self.stake)
    }
}

/// Render ranked entries as the comma-separated high-stakes list.
///
/// An empty slice renders as an empty string.
pub fn format_stakes(entries: &[StakeEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Opaque bearer token identifying a live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Draw a fresh key of `SESSION_KEY_LEN` characters from `SESSION_KEY_ALPHABET`.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let key: String = (0..SESSION_KEY_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..SESSION_KEY_ALPHABET.len());
                SESSION_KEY_ALPHABET[idx] as char
            })
            .collect();
        Self(key)
    }

    /// Wrap a key received from a client. Shape is not validated.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::EmptySessionKey);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
