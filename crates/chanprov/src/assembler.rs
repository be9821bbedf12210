//! Collection of organization admin signatures over a channel
//! configuration update.

use tracing::info;

use chanprov_core::{
    sign_config, ChannelConfigUpdate, ChannelName, Identity, Organization, SignatureSet,
};

use crate::error::AssemblyError;
use crate::provisioner::ProvisionMode;
use crate::workflow::WorkflowContext;

/// Which organizations sign the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgSelection {
    /// Every participating organization, in topology order.
    All,
    /// Only the named organization.
    Single(String),
}

/// An organization admin that signed the configuration.
#[derive(Debug, Clone)]
pub struct OrgAdmin {
    pub org: String,
    pub identity: Identity,
}

/// Configuration update together with the signatures collected over it.
#[derive(Debug, Clone)]
pub struct SignedConfig {
    pub config: ChannelConfigUpdate,
    pub signatures: SignatureSet,
    /// Signers in collection order.
    pub signers: Vec<OrgAdmin>,
}

impl SignedConfig {
    /// The identity submitting the creation request: the last signer.
    pub fn submitter(&self) -> Option<&Identity> {
        self.signers.last().map(|admin| &admin.identity)
    }
}

/// Extracts the configuration update from a channel transaction and checks
/// that it targets `channel`.
pub fn extract_config(
    envelope_bytes: &[u8],
    channel: &ChannelName,
) -> Result<ChannelConfigUpdate, AssemblyError> {
    let config = chanprov_core::extract_config(envelope_bytes)?;
    if config.channel_id() != channel.as_str() {
        return Err(AssemblyError::ChannelMismatch {
            expected: channel.to_string(),
            found: config.channel_id().to_string(),
        });
    }
    Ok(config)
}

/// Signs `config` as `admin` of `org` and appends the signature.
pub fn collect_signature(
    org: &Organization,
    admin: &Identity,
    config: &ChannelConfigUpdate,
    signatures: &mut SignatureSet,
) -> Result<(), AssemblyError> {
    let signature = sign_config(admin, config).map_err(|source| AssemblyError::Signing {
        org: org.name.clone(),
        source,
    })?;
    signatures.push(signature);
    Ok(())
}

/// Resolves each selected organization's admin and collects its signature.
///
/// Organizations are processed one at a time; the next one starts only after
/// the previous signature is in the set. The first failure aborts the whole
/// assembly and no partial set is returned.
pub async fn assemble(
    ctx: &WorkflowContext,
    config: ChannelConfigUpdate,
    selection: &OrgSelection,
    mode: ProvisionMode,
) -> Result<SignedConfig, AssemblyError> {
    let signers: Vec<&Organization> = match selection {
        OrgSelection::Single(name) => vec![ctx
            .topology
            .organization(name)
            .ok_or_else(|| AssemblyError::UnknownOrganization(name.clone()))?],
        OrgSelection::All => ctx.participants(),
    };
    if signers.is_empty() {
        return Err(AssemblyError::NoSigners);
    }

    let mut signed = SignedConfig {
        config,
        signatures: SignatureSet::new(),
        signers: Vec::with_capacity(signers.len()),
    };
    for org in signers {
        let admin = ctx
            .org_admin(org, mode)
            .await
            .map_err(|source| AssemblyError::Provision {
                org: org.name.clone(),
                source,
            })?;
        collect_signature(org, &admin, &signed.config, &mut signed.signatures)?;
        info!(
            org = %org.name,
            channel = %signed.config.channel_id(),
            "signed channel configuration"
        );
        signed.signers.push(OrgAdmin {
            org: org.name.clone(),
            identity: admin,
        });
    }
    Ok(signed)
}
