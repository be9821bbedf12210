//! Identity provisioning and channel bootstrap for a permissioned ledger
//! network.
//!
//! A run resolves one admin identity per organization (enrolling it with the
//! organization's certificate authority or importing offline-generated
//! material), collects their signatures over a channel configuration update,
//! creates the channel on the ordering service unless it already exists, and
//! joins every peer to it. Event hubs opened for join confirmation are closed
//! however the run ends.

pub mod assembler;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod join;
pub mod lifecycle;
pub mod network;
pub mod provisioner;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use crate::assembler::{assemble, collect_signature, extract_config, OrgAdmin, OrgSelection, SignedConfig};
pub use crate::cleanup::{CleanupGuard, EventHubRegistry};
pub use crate::config::{ConfigOverrides, ProvisionConfig};
pub use crate::error::{
    AssemblyError, ChannelError, JoinError, PartialJoinFailure, PeerFailure, ProvisionError,
    WorkflowError,
};
pub use crate::join::{JoinController, JoinReport, JoinTarget, PeerJoin};
pub use crate::lifecycle::{ChannelLifecycle, ChannelStatus};
pub use crate::network::{HttpNetwork, Network};
pub use crate::provisioner::{IdentityProvisioner, ProvisionMode};
pub use crate::store::{
    CredentialStore, FileSystemWallet, FileSystemWallets, MemoryWallet, MemoryWallets, StoreError,
    WalletProvider,
};
pub use crate::workflow::{prepare_channel, PrepareReport, PrepareRequest, WorkflowContext};
