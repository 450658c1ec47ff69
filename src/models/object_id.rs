//! Byte-sequence identifiers shared with the relay.
//!
//! On the wire both object ids and device ids are plain byte arrays. The
//! local store cannot index raw byte arrays, so ids are persisted in a
//! normalized bs58check display form instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when parsing byte identifiers
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid bs58check encoding: {0}")]
    InvalidEncoding(String),

    #[error("Identifier must not be empty")]
    Empty,
}

fn encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).with_check().into_string()
}

fn decode(s: &str) -> Result<Vec<u8>, IdError> {
    let bytes = bs58::decode(s.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| IdError::InvalidEncoding(e.to_string()))?;
    if bytes.is_empty() {
        return Err(IdError::Empty);
    }
    Ok(bytes)
}

/// Stable, globally unique identifier of a synced entity.
///
/// Minted once per local entity and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct ObjectId(Vec<u8>);

impl ObjectId {
    /// Mint a fresh random object id (16 bytes).
    pub fn mint() -> Self {
        Self(Uuid::new_v4().as_bytes().to_vec())
    }

    /// Wrap raw bytes received from the relay.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, IdError> {
        if bytes.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Normalized display form used as the local store key.
    pub fn to_bs58check(&self) -> String {
        encode(&self.0)
    }

    pub fn from_bs58check(s: &str) -> Result<Self, IdError> {
        decode(s).map(Self)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58check())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bs58check(s)
    }
}

impl TryFrom<Vec<u8>> for ObjectId {
    type Error = IdError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl From<ObjectId> for Vec<u8> {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Identifier the relay assigns to a device during the initial handshake.
///
/// Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct DeviceId(Vec<u8>);

impl DeviceId {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, IdError> {
        if bytes.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bs58check(&self) -> String {
        encode(&self.0)
    }

    pub fn from_bs58check(s: &str) -> Result<Self, IdError> {
        decode(s).map(Self)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58check())
    }
}

impl TryFrom<Vec<u8>> for DeviceId {
    type Error = IdError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl From<DeviceId> for Vec<u8> {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}
