use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use chanprov_core::{ChannelNameError, EnvelopeError, SigningError};
use chanprov_net::NetError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid identity label {label:?}")]
    InvalidLabel { label: String },
    #[error("registrar of {org} is not enrolled; enroll it before registering other identities")]
    RegistrarMissing { org: String },
    #[error("label {label:?} is reserved for the registrar of {org}")]
    ReservedLabel { org: String, label: String },
    #[error("building the certificate authority client of {org} failed: {source}")]
    CaClient {
        org: String,
        #[source]
        source: NetError,
    },
    #[error("certificate authority of {org} is unreachable: {source}")]
    CaUnreachable {
        org: String,
        #[source]
        source: NetError,
    },
    #[error("certificate authority of {org} rejected {label}: {source}")]
    EnrollmentRejected {
        org: String,
        label: String,
        #[source]
        source: NetError,
    },
    #[error("storing {label} in the wallet of {org} failed: {source}")]
    StoreWriteFailed {
        org: String,
        label: String,
        #[source]
        source: StoreError,
    },
    #[error("reading {label} from the wallet of {org} failed: {source}")]
    StoreReadFailed {
        org: String,
        label: String,
        #[source]
        source: StoreError,
    },
    #[error("crypto material for {org} at {} is unusable: {detail}", path.display())]
    MaterialUnavailable {
        org: String,
        path: PathBuf,
        detail: String,
    },
}

impl ProvisionError {
    pub(crate) fn from_ca(org: &str, label: &str, source: NetError) -> Self {
        if source.is_transport() {
            Self::CaUnreachable {
                org: org.to_string(),
                source,
            }
        } else {
            Self::EnrollmentRejected {
                org: org.to_string(),
                label: label.to_string(),
                source,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("channel transaction is unusable: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("channel transaction targets {found}, expected {expected}")]
    ChannelMismatch { expected: String, found: String },
    #[error("organization {0} is not part of the topology")]
    UnknownOrganization(String),
    #[error("no organization is left to sign the channel configuration")]
    NoSigners,
    #[error("resolving the admin of {org} failed: {source}")]
    Provision {
        org: String,
        #[source]
        source: ProvisionError,
    },
    #[error("admin of {org} could not sign the channel configuration: {source}")]
    Signing {
        org: String,
        #[source]
        source: SigningError,
    },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{found} distinct organization signature(s) collected, {required} required")]
    QuorumNotMet { required: usize, found: usize },
    #[error("submitting channel {channel} to the ordering service failed: {source}")]
    Submission {
        channel: String,
        #[source]
        source: NetError,
    },
    #[error("ordering service refused channel {channel} with status {status}: {info}")]
    Refused {
        channel: String,
        status: String,
        info: String,
    },
}

/// Why one peer did not join.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("genesis block of the channel is unavailable: {0}")]
    Genesis(String),
    #[error("opening the event hub failed: {0}")]
    EventHub(#[source] NetError),
    #[error("join request failed: {0}")]
    Join(#[source] NetError),
    #[error("join was not confirmed: {0}")]
    Confirmation(#[source] NetError),
    #[error("join task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug)]
pub struct PeerFailure {
    pub org: String,
    pub peer: String,
    pub error: JoinError,
}

/// At least one peer failed to join; joined peers are kept as they are.
#[derive(Debug)]
pub struct PartialJoinFailure {
    pub channel: String,
    pub joined: Vec<String>,
    pub failed: Vec<PeerFailure>,
}

impl fmt::Display for PartialJoinFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} peer(s) failed to join {}",
            self.failed.len(),
            self.failed.len() + self.joined.len(),
            self.channel
        )?;
        for failure in &self.failed {
            write!(f, "; {}/{}: {}", failure.org, failure.peer, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialJoinFailure {}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    ChannelName(#[from] ChannelNameError),
    #[error("reading channel transaction {}: {source}", path.display())]
    ReadEnvelope {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("connecting to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: NetError,
    },
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Join(#[from] PartialJoinFailure),
}
