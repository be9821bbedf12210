use std::sync::Arc;

use chanprov_core::{OrdererNode, Organization, PeerNode};
use chanprov_net::{
    CaClient, HttpCaClient, HttpOrderer, HttpPeer, NetError, OrderingService, PeerClient,
    TransportConfig,
};

/// Builds the remote collaborators the workflow talks to.
pub trait Network: Send + Sync {
    fn ca(&self, org: &Organization) -> Result<Arc<dyn CaClient>, NetError>;

    fn orderer(&self, node: &OrdererNode) -> Result<Arc<dyn OrderingService>, NetError>;

    fn peer(&self, node: &PeerNode) -> Result<Arc<dyn PeerClient>, NetError>;
}

/// [`Network`] backed by the HTTP gateway clients.
#[derive(Debug, Clone, Default)]
pub struct HttpNetwork {
    transport: TransportConfig,
}

impl HttpNetwork {
    pub fn new(transport: TransportConfig) -> Self {
        Self { transport }
    }
}

impl Network for HttpNetwork {
    fn ca(&self, org: &Organization) -> Result<Arc<dyn CaClient>, NetError> {
        Ok(Arc::new(HttpCaClient::new(&org.ca, &self.transport)?))
    }

    fn orderer(&self, node: &OrdererNode) -> Result<Arc<dyn OrderingService>, NetError> {
        Ok(Arc::new(HttpOrderer::new(node, &self.transport)?))
    }

    fn peer(&self, node: &PeerNode) -> Result<Arc<dyn PeerClient>, NetError> {
        Ok(Arc::new(HttpPeer::new(node, &self.transport)?))
    }
}
