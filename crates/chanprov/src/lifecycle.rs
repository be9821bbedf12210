use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use chanprov_core::{serialized_identity, ChannelName, Identity, TransactionId};
use chanprov_net::{ChannelCreateRequest, OrderingService};

use crate::assembler::SignedConfig;
use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Created,
    AlreadyExists,
}

/// Creates a channel on the ordering service unless it already exists.
pub struct ChannelLifecycle {
    orderer: Arc<dyn OrderingService>,
    orderer_name: String,
    settle_delay: Duration,
    quorum: usize,
}

impl ChannelLifecycle {
    pub fn new(orderer: Arc<dyn OrderingService>, orderer_name: impl Into<String>) -> Self {
        Self {
            orderer,
            orderer_name: orderer_name.into(),
            settle_delay: Duration::from_secs(5),
            quorum: 1,
        }
    }

    /// Pause after a successful creation before peers are asked to join.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Minimum number of distinct organizations that must have signed.
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum;
        self
    }

    /// Ensures `channel` exists.
    ///
    /// An existing genesis block short-circuits to
    /// [`ChannelStatus::AlreadyExists`] without a creation request. A failed
    /// existence query is treated as "absent". Each submission uses a fresh
    /// transaction id and is attempted once.
    pub async fn ensure_channel(
        &self,
        channel: &ChannelName,
        signed: &SignedConfig,
        submitter: &Identity,
    ) -> Result<ChannelStatus, ChannelError> {
        match self.orderer.genesis_block(channel, submitter).await {
            Ok(Some(_)) => {
                info!(channel = %channel, "channel already exists");
                return Ok(ChannelStatus::AlreadyExists);
            }
            Ok(None) => info!(channel = %channel, "channel does not exist yet"),
            Err(err) => warn!(
                channel = %channel,
                error = %err,
                "genesis block query failed; assuming the channel does not exist"
            ),
        }

        let found = signed.signatures.distinct_msp_ids().len();
        if !signed.signatures.satisfies(self.quorum) {
            return Err(ChannelError::QuorumNotMet {
                required: self.quorum,
                found,
            });
        }

        let request = ChannelCreateRequest {
            channel: channel.clone(),
            orderer: self.orderer_name.clone(),
            config: signed.config.clone(),
            signatures: signed.signatures.clone(),
            tx_id: TransactionId::generate(&serialized_identity(submitter)),
            submitter: submitter.clone(),
        };
        info!(
            channel = %channel,
            tx_id = %request.tx_id,
            signatures = found,
            "submitting channel creation"
        );
        let response = self
            .orderer
            .create_channel(&request)
            .await
            .map_err(|source| ChannelError::Submission {
                channel: channel.to_string(),
                source,
            })?;
        if !response.is_success() {
            return Err(ChannelError::Refused {
                channel: channel.to_string(),
                status: response.status,
                info: response.info,
            });
        }

        info!(channel = %channel, delay = ?self.settle_delay, "channel created; waiting for it to settle");
        tokio::time::sleep(self.settle_delay).await;
        Ok(ChannelStatus::Created)
    }
}
