use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use chanprov_core::{ChannelName, GenesisBlock, Identity, PeerNode};

use crate::endpoint::{Endpoint, TransportConfig};
use crate::error::NetError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Marker the peer reports when its ledger for the channel already exists.
const LEDGER_EXISTS: &str = "already exists";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The peer was already a member; counts as success.
    AlreadyMember,
}

/// A live subscription to a peer's block events.
#[async_trait]
pub trait EventHub: Send + Sync {
    /// Stable for the lifetime of the handle and unique per open.
    fn id(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Closes the subscription. Calling it again is a no-op.
    fn disconnect(&self);

    /// Resolves once the peer has committed a block on `channel`.
    async fn wait_for_block(&self, channel: &ChannelName, timeout: Duration)
        -> Result<(), NetError>;
}

#[async_trait]
pub trait PeerClient: Send + Sync {
    fn name(&self) -> &str;

    async fn open_event_hub(&self, signer: &Identity) -> Result<Arc<dyn EventHub>, NetError>;

    async fn join_channel(
        &self,
        block: &GenesisBlock,
        signer: &Identity,
    ) -> Result<JoinOutcome, NetError>;
}

/// [`PeerClient`] reached through the peer's REST gateway.
#[derive(Clone, Debug)]
pub struct HttpPeer {
    endpoint: Endpoint,
    poll_interval: Duration,
}

impl HttpPeer {
    pub fn new(node: &PeerNode, transport: &TransportConfig) -> Result<Self, NetError> {
        let endpoint = Endpoint::new(
            node.name.clone(),
            &node.url,
            &node.tls_trust_root,
            node.server_hostname.as_deref(),
            transport,
        )?;
        Ok(Self::with_endpoint(endpoint))
    }

    #[must_use]
    pub fn with_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl PeerClient for HttpPeer {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    async fn open_event_hub(&self, signer: &Identity) -> Result<Arc<dyn EventHub>, NetError> {
        let mut suffix = [0u8; 4];
        OsRng.fill_bytes(&mut suffix);
        let hub = HttpEventHub {
            id: format!("{}#{}", self.endpoint.name(), hex::encode(suffix)),
            endpoint: self.endpoint.clone(),
            signer: signer.clone(),
            connected: AtomicBool::new(true),
            poll_interval: self.poll_interval,
        };
        debug!(peer = %self.endpoint.name(), hub = %hub.id, "opened event hub");
        Ok(Arc::new(hub))
    }

    async fn join_channel(
        &self,
        block: &GenesisBlock,
        signer: &Identity,
    ) -> Result<JoinOutcome, NetError> {
        let url = self.endpoint.url(&["v1", "channels", "join"])?;
        let request = self
            .endpoint
            .client()
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream");
        let request = self
            .endpoint
            .sign_request(request, signer, block.as_bytes())?
            .body(block.as_bytes().to_vec());
        let response = self.endpoint.send(request).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(JoinOutcome::Joined);
        }
        if status == StatusCode::CONFLICT {
            return Ok(JoinOutcome::AlreadyMember);
        }
        match self.endpoint.failure(response).await {
            NetError::Unavailable { ref detail, .. } if detail.contains(LEDGER_EXISTS) => {
                Ok(JoinOutcome::AlreadyMember)
            }
            err => Err(err),
        }
    }
}

#[derive(Deserialize)]
struct ChannelHeight {
    height: u64,
}

/// [`EventHub`] that confirms a join by polling the peer's ledger height.
#[derive(Debug)]
pub struct HttpEventHub {
    id: String,
    endpoint: Endpoint,
    signer: Identity,
    connected: AtomicBool,
    poll_interval: Duration,
}

impl HttpEventHub {
    async fn poll_until_committed(&self, channel: &ChannelName) -> Result<(), NetError> {
        let url = self
            .endpoint
            .url(&["v1", "channels", channel.as_str(), "height"])?;
        loop {
            if !self.is_connected() {
                return Err(NetError::Disconnected(self.id.clone()));
            }

            let request = self.endpoint.client().get(url.clone());
            let request =
                self.endpoint
                    .sign_request(request, &self.signer, channel.as_str().as_bytes())?;
            let response = self.endpoint.send(request).await?;
            let status = response.status();
            if status.is_success() {
                let height = response
                    .json::<ChannelHeight>()
                    .await
                    .map_err(|err| self.endpoint.protocol(format!("decoding height: {err}")))?;
                if height.height > 0 {
                    debug!(hub = %self.id, channel = %channel, height = height.height, "block committed");
                    return Ok(());
                }
            } else if status != StatusCode::NOT_FOUND && !status.is_server_error() {
                return Err(self.endpoint.failure(response).await);
            }

            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl EventHub for HttpEventHub {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            debug!(hub = %self.id, "event hub disconnected");
        }
    }

    async fn wait_for_block(
        &self,
        channel: &ChannelName,
        timeout: Duration,
    ) -> Result<(), NetError> {
        tokio::time::timeout(timeout, self.poll_until_committed(channel))
            .await
            .map_err(|_| NetError::Timeout {
                endpoint: self.endpoint.name().to_string(),
                channel: channel.to_string(),
                waited: timeout,
            })?
    }
}
