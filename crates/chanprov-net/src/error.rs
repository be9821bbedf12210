use std::time::Duration;

use chanprov_core::SigningError;
use thiserror::Error;

/// Failure of a single request to a CA, orderer or peer.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("{endpoint} is unreachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} is unavailable (HTTP {status}): {detail}")]
    Unavailable {
        endpoint: String,
        status: u16,
        detail: String,
    },
    #[error("{endpoint} rejected the request (HTTP {status}): {detail}")]
    Rejected {
        endpoint: String,
        status: u16,
        detail: String,
    },
    #[error("invalid TLS trust root for {endpoint}: {detail}")]
    Tls { endpoint: String, detail: String },
    #[error("invalid URL {url:?} for {endpoint}: {detail}")]
    InvalidUrl {
        endpoint: String,
        url: String,
        detail: String,
    },
    #[error("unexpected response from {endpoint}: {detail}")]
    Protocol { endpoint: String, detail: String },
    #[error("signing a request for {endpoint} failed: {source}")]
    Signing {
        endpoint: String,
        #[source]
        source: SigningError,
    },
    #[error("generating an enrollment key pair failed: {0}")]
    KeyGeneration(String),
    #[error("{endpoint} did not deliver a block for channel {channel} within {waited:?}")]
    Timeout {
        endpoint: String,
        channel: String,
        waited: Duration,
    },
    #[error("event hub {0} is disconnected")]
    Disconnected(String),
}

impl NetError {
    /// Whether the failure is a transport problem rather than an answer from
    /// the remote side.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Unavailable { .. } | Self::Tls { .. }
        )
    }
}
