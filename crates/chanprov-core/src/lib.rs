//! Core types for provisioning identities and channels on a permissioned
//! ledger network.
//!
//! Nothing in this crate touches the network. It models the organizations
//! described by the topology descriptor, the identities issued to them by
//! their certificate authorities, and the channel configuration artefacts
//! (config-update envelopes, config signatures, transaction ids) that the
//! provisioning workflow passes between collaborators.

pub mod channel;
pub mod envelope;
pub mod identity;
pub mod org;
pub mod signing;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::channel::{
    ChannelConfigUpdate, ChannelName, ChannelNameError, ConfigSignature, GenesisBlock,
    SignatureSet, TransactionId, MAX_CHANNEL_NAME_LEN,
};
pub use crate::envelope::{
    config_update_envelope, extract_config, EnvelopeError, HEADER_TYPE_CONFIG_UPDATE,
};
pub use crate::identity::{
    loaded_admin_label, org_admin_label, EnrollmentSecret, Identity, Role, WalletRecord,
};
pub use crate::org::{
    CaEndpoint, OrdererNode, Organization, PeerNode, Registrar, Topology, TopologyError,
};
pub use crate::signing::{serialized_identity, sign_config, verify_config_signature, SigningError};
