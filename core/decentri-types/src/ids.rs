//! Identifier types used throughout the license core.
//!
//! Token ids minted by the issuer are UUID v7 strings, but tokens issued by
//! other tooling may carry any printable id, so both types wrap a validated
//! string rather than a `Uuid`.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Longest identifier accepted from the wire.
const MAX_ID_LEN: usize = 128;

fn validate(kind: &str, s: &str) -> Result<(), Error> {
    if s.is_empty() {
        return Err(Error::InvalidId(format!("{kind} is empty")));
    }
    if s.len() > MAX_ID_LEN {
        return Err(Error::InvalidId(format!(
            "{kind} exceeds {MAX_ID_LEN} bytes"
        )));
    }
    if !s.chars().all(|c| c.is_ascii_graphic()) {
        return Err(Error::InvalidId(format!(
            "{kind} contains non-printable or non-ASCII characters"
        )));
    }
    Ok(())
}

/// Unique identifier for a license token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    /// Mints a new time-ordered token id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Parses a token id from a string.
    pub fn parse(s: &str) -> Result<Self, Error> {
        validate("token id", s)?;
        Ok(Self(s.to_string()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TokenId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TokenId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate("token id", &s)?;
        Ok(Self(s))
    }
}

impl From<TokenId> for String {
    fn from(id: TokenId) -> Self {
        id.0
    }
}

/// Stable identifier of a machine taking part in election and binding.
///
/// Ordering is lexicographic and is the tie-breaker between contending
/// devices, so it must be identical on every peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Parses a device id from a string.
    pub fn parse(s: &str) -> Result<Self, Error> {
        validate("device id", s)?;
        Ok(Self(s.to_string()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate("device id", &s)?;
        Ok(Self(s))
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl PartialEq<str> for DeviceId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DeviceId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
