//! End-to-end channel preparation: signatures, creation, then peer joins.

use std::sync::Arc;

use tracing::info;

use chanprov_core::{ChannelName, Identity, Organization, Topology};

use crate::assembler::{assemble, extract_config, OrgSelection};
use crate::cleanup::{CleanupGuard, EventHubRegistry};
use crate::config::ProvisionConfig;
use crate::error::{AssemblyError, ProvisionError, WorkflowError};
use crate::join::{JoinController, JoinTarget, PeerJoin};
use crate::lifecycle::{ChannelLifecycle, ChannelStatus};
use crate::network::Network;
use crate::provisioner::{IdentityProvisioner, ProvisionMode};
use crate::store::WalletProvider;

/// Everything a provisioning run needs, built once and shared read-only.
#[derive(Clone)]
pub struct WorkflowContext {
    pub topology: Arc<Topology>,
    pub config: Arc<ProvisionConfig>,
    pub wallets: Arc<dyn WalletProvider>,
    pub network: Arc<dyn Network>,
    pub registry: Arc<EventHubRegistry>,
}

impl WorkflowContext {
    pub fn new(
        topology: Topology,
        config: ProvisionConfig,
        wallets: Arc<dyn WalletProvider>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            topology: Arc::new(topology),
            config: Arc::new(config),
            wallets,
            network,
            registry: Arc::new(EventHubRegistry::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        topology: Topology,
        wallets: Arc<crate::store::MemoryWallets>,
        network: Arc<crate::test_support::FakeNetwork>,
    ) -> Self {
        let mut config = ProvisionConfig::with_defaults("network.json");
        config.channel.settle_delay = std::time::Duration::ZERO;
        Self::new(topology, config, wallets, network)
    }

    /// Organizations taking part in the channel, in topology order.
    pub fn participants(&self) -> Vec<&Organization> {
        self.topology.without(&self.config.channel.exclude_orgs)
    }

    pub fn provisioner(&self, org: &Organization) -> Result<IdentityProvisioner, ProvisionError> {
        let ca = self
            .network
            .ca(org)
            .map_err(|source| ProvisionError::CaClient {
                org: org.name.clone(),
                source,
            })?;
        Ok(
            IdentityProvisioner::new(org.clone(), self.wallets.wallet(org), ca)
                .with_material_dir(&self.config.crypto.material_dir),
        )
    }

    /// The identity that signs and joins on behalf of `org`.
    pub async fn org_admin(
        &self,
        org: &Organization,
        mode: ProvisionMode,
    ) -> Result<Identity, ProvisionError> {
        self.provisioner(org)?.ensure_org_admin(mode).await
    }
}

#[derive(Debug, Clone)]
pub struct PrepareRequest {
    pub channel: ChannelName,
    pub selection: OrgSelection,
    pub mode: ProvisionMode,
}

#[derive(Debug)]
pub struct PrepareReport {
    pub channel: ChannelName,
    pub status: ChannelStatus,
    pub signatures: usize,
    pub joined: Vec<PeerJoin>,
}

/// Creates `request.channel` if needed and joins every participating
/// organization's peers to it.
///
/// Only the selected organizations sign. Participants outside the selection
/// join with their admin resolved after the channel exists.
///
/// Event hubs opened along the way are closed when this returns, fails,
/// panics or is dropped mid-flight.
pub async fn prepare_channel(
    ctx: &WorkflowContext,
    request: &PrepareRequest,
) -> Result<PrepareReport, WorkflowError> {
    let _guard = CleanupGuard::new(Arc::clone(&ctx.registry));
    let channel = &request.channel;

    let path = ctx.config.envelope_path(channel);
    let envelope = tokio::fs::read(&path)
        .await
        .map_err(|source| WorkflowError::ReadEnvelope {
            path: path.clone(),
            source,
        })?;
    let config = extract_config(&envelope, channel)?;
    info!(channel = %channel, path = %path.display(), "loaded channel transaction");

    let signed = assemble(ctx, config, &request.selection, request.mode).await?;
    let submitter = signed
        .submitter()
        .ok_or(AssemblyError::NoSigners)?
        .clone();

    let orderer_node = ctx.topology.orderer();
    let orderer = ctx
        .network
        .orderer(orderer_node)
        .map_err(|source| WorkflowError::Connect {
            target: orderer_node.name.clone(),
            source,
        })?;
    let status = ChannelLifecycle::new(Arc::clone(&orderer), orderer_node.name.clone())
        .with_settle_delay(ctx.config.channel.settle_delay)
        .with_quorum(ctx.config.channel.quorum)
        .ensure_channel(channel, &signed, &submitter)
        .await?;

    let mut targets = Vec::new();
    for org in ctx.participants() {
        let admin = match signed.signers.iter().find(|signer| signer.org == org.name) {
            Some(signer) => signer.identity.clone(),
            None => ctx.org_admin(org, request.mode).await?,
        };
        let mut peers = Vec::with_capacity(org.peers.len());
        for node in &org.peers {
            let peer = ctx
                .network
                .peer(node)
                .map_err(|source| WorkflowError::Connect {
                    target: node.name.clone(),
                    source,
                })?;
            peers.push(peer);
        }
        targets.push(JoinTarget {
            org: org.name.clone(),
            admin,
            peers,
        });
    }

    let joined = JoinController::new(orderer, Arc::clone(&ctx.registry))
        .with_concurrency(ctx.config.join.concurrency)
        .with_event_timeout(ctx.config.join.event_timeout)
        .join_all(channel, targets)
        .await
        .into_result()?;
    info!(channel = %channel, ?status, peers = joined.len(), "channel prepared");

    Ok(PrepareReport {
        channel: channel.clone(),
        status,
        signatures: signed.signatures.len(),
        joined,
    })
}
