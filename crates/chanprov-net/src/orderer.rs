use async_trait::async_trait;
use prost::Message;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chanprov_core::envelope::proto;
use chanprov_core::{
    serialized_identity, ChannelConfigUpdate, ChannelName, GenesisBlock, Identity, OrdererNode,
    SignatureSet, SigningError, TransactionId, HEADER_TYPE_CONFIG_UPDATE,
};

use crate::endpoint::{Endpoint, TransportConfig};
use crate::error::NetError;

/// Broadcast status reported by the ordering service on acceptance.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Everything needed to submit a channel creation transaction.
#[derive(Debug, Clone)]
pub struct ChannelCreateRequest {
    pub channel: ChannelName,
    /// Name of the ordering node the request is addressed to.
    pub orderer: String,
    pub config: ChannelConfigUpdate,
    pub signatures: SignatureSet,
    pub tx_id: TransactionId,
    pub submitter: Identity,
}

impl ChannelCreateRequest {
    /// Encodes the request as a `CONFIG_UPDATE` envelope signed by the
    /// submitter and carrying every collected config signature.
    pub fn to_envelope(&self) -> Result<Vec<u8>, SigningError> {
        let channel_header = proto::ChannelHeader {
            r#type: HEADER_TYPE_CONFIG_UPDATE,
            version: 0,
            channel_id: self.channel.to_string(),
            tx_id: self.tx_id.to_string(),
            epoch: 0,
        };
        let signature_header = proto::SignatureHeader {
            creator: serialized_identity(&self.submitter),
            nonce: self.tx_id.nonce().to_vec(),
        };
        let update_envelope = proto::ConfigUpdateEnvelope {
            config_update: self.config.as_bytes().to_vec(),
            signatures: self
                .signatures
                .iter()
                .map(|signature| signature.to_proto())
                .collect(),
        };
        let payload = proto::Payload {
            header: Some(proto::Header {
                channel_header: channel_header.encode_to_vec(),
                signature_header: signature_header.encode_to_vec(),
            }),
            data: update_envelope.encode_to_vec(),
        }
        .encode_to_vec();
        let signature = self.submitter.sign(&payload)?;

        Ok(proto::Envelope { payload, signature }.encode_to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub status: String,
    #[serde(default)]
    pub info: String,
}

impl BroadcastResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

#[async_trait]
pub trait OrderingService: Send + Sync {
    /// Fetches block 0 of `channel`; `None` when the channel does not exist.
    async fn genesis_block(
        &self,
        channel: &ChannelName,
        signer: &Identity,
    ) -> Result<Option<GenesisBlock>, NetError>;

    async fn create_channel(
        &self,
        request: &ChannelCreateRequest,
    ) -> Result<BroadcastResponse, NetError>;
}

/// [`OrderingService`] reached through the orderer's REST gateway.
#[derive(Clone, Debug)]
pub struct HttpOrderer {
    endpoint: Endpoint,
}

impl HttpOrderer {
    pub fn new(node: &OrdererNode, transport: &TransportConfig) -> Result<Self, NetError> {
        let endpoint = Endpoint::new(
            node.name.clone(),
            &node.url,
            &node.tls_trust_root,
            node.server_hostname.as_deref(),
            transport,
        )?;
        Ok(Self { endpoint })
    }

    #[must_use]
    pub fn with_endpoint(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.endpoint.name()
    }
}

#[async_trait]
impl OrderingService for HttpOrderer {
    async fn genesis_block(
        &self,
        channel: &ChannelName,
        signer: &Identity,
    ) -> Result<Option<GenesisBlock>, NetError> {
        let url = self
            .endpoint
            .url(&["v1", "channels", channel.as_str(), "genesis"])?;
        let request = self.endpoint.client().get(url);
        let request = self
            .endpoint
            .sign_request(request, signer, channel.as_str().as_bytes())?;
        let response = self.endpoint.send(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|source| NetError::Unreachable {
                        endpoint: self.endpoint.name().to_string(),
                        source,
                    })?;
                if bytes.is_empty() {
                    return Err(self.endpoint.protocol("genesis block is empty"));
                }
                debug!(channel = %channel, size = bytes.len(), "fetched genesis block");
                Ok(Some(GenesisBlock::new(bytes.to_vec())))
            }
            _ => Err(self.endpoint.failure(response).await),
        }
    }

    async fn create_channel(
        &self,
        request: &ChannelCreateRequest,
    ) -> Result<BroadcastResponse, NetError> {
        let url = self.endpoint.url(&["v1", "broadcast"])?;
        let envelope = request
            .to_envelope()
            .map_err(|source| NetError::Signing {
                endpoint: self.endpoint.name().to_string(),
                source,
            })?;
        let http_request = self
            .endpoint
            .client()
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream");
        let http_request = self
            .endpoint
            .sign_request(http_request, &request.submitter, &envelope)?
            .body(envelope);

        debug!(
            channel = %request.channel,
            tx_id = %request.tx_id,
            signatures = request.signatures.len(),
            "broadcasting channel creation"
        );
        let response = self.endpoint.send(http_request).await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(self.endpoint.failure(response).await);
        }
        let body = response
            .bytes()
            .await
            .map_err(|source| NetError::Unreachable {
                endpoint: self.endpoint.name().to_string(),
                source,
            })?;
        match serde_json::from_slice::<BroadcastResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(self
                .endpoint
                .status_error(status, String::from_utf8_lossy(&body).into_owned())),
            Err(err) => Err(self
                .endpoint
                .protocol(format!("decoding broadcast response: {err}"))),
        }
    }
}
