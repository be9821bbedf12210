use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::envelope::proto;

/// Channel names must be shorter than this many characters.
pub const MAX_CHANNEL_NAME_LEN: usize = 250;

const NONCE_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelNameError {
    #[error("channel name must not be empty")]
    Empty,
    #[error("channel name is {0} characters long; the limit is {MAX_CHANNEL_NAME_LEN}")]
    TooLong(usize),
    #[error("channel name must start with a lowercase letter")]
    BadStart,
    #[error("invalid character {character:?} at index {index} in channel name")]
    InvalidCharacter { index: usize, character: char },
}

/// Cluster-wide unique channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Result<Self, ChannelNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChannelNameError::Empty);
        }
        if name.len() >= MAX_CHANNEL_NAME_LEN {
            return Err(ChannelNameError::TooLong(name.len()));
        }
        if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(ChannelNameError::BadStart);
        }
        if let Some((index, character)) = name
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '-'))
        {
            return Err(ChannelNameError::InvalidCharacter { index, character });
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChannelName {
    type Err = ChannelNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Transaction identifier bound to a fresh nonce and the submitting creator.
///
/// A new id is generated for every submission attempt; ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionId {
    id: String,
    nonce: [u8; NONCE_LEN],
}

impl TransactionId {
    /// Generates a new id for `creator` (a serialized identity).
    #[must_use]
    pub fn generate(creator: &[u8]) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        Self::from_nonce(nonce, creator)
    }

    #[must_use]
    pub fn from_nonce(nonce: [u8; NONCE_LEN], creator: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(nonce);
        hasher.update(creator);
        Self {
            id: hex::encode(hasher.finalize()),
            nonce,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// First block of a channel. Its presence proves the channel exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisBlock(Arc<[u8]>);

impl GenesisBlock {
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Channel configuration update extracted from a config-update envelope.
///
/// Cloning is cheap; every signature collection call shares the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfigUpdate {
    channel_id: String,
    bytes: Arc<[u8]>,
}

impl ChannelConfigUpdate {
    #[must_use]
    pub fn new(channel_id: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            channel_id: channel_id.into(),
            bytes: bytes.into(),
        }
    }

    /// Channel the update was generated for.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// One organization admin's signature over a [`ChannelConfigUpdate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSignature {
    pub msp_id: String,
    pub signature_header: Vec<u8>,
    pub signature: Vec<u8>,
}

impl ConfigSignature {
    #[must_use]
    pub fn to_proto(&self) -> proto::ConfigSignature {
        proto::ConfigSignature {
            signature_header: self.signature_header.clone(),
            signature: self.signature.clone(),
        }
    }
}

/// Ordered, append-only collection of config signatures.
///
/// The ordering service verifies each signature independently, so order
/// carries no meaning beyond recording collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet {
    signatures: Vec<ConfigSignature>,
}

impl SignatureSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, signature: ConfigSignature) {
        self.signatures.push(signature);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigSignature> {
        self.signatures.iter()
    }

    /// MSP ids that contributed at least one signature.
    #[must_use]
    pub fn distinct_msp_ids(&self) -> BTreeSet<&str> {
        self.signatures
            .iter()
            .map(|signature| signature.msp_id.as_str())
            .collect()
    }

    /// Whether at least `quorum` distinct organizations have signed.
    #[must_use]
    pub fn satisfies(&self, quorum: usize) -> bool {
        self.distinct_msp_ids().len() >= quorum
    }
}

impl<'a> IntoIterator for &'a SignatureSet {
    type Item = &'a ConfigSignature;
    type IntoIter = std::slice::Iter<'a, ConfigSignature>;

    fn into_iter(self) -> Self::IntoIter {
        self.signatures.iter()
    }
}
