//! Network collaborators of the provisioning workflow.
//!
//! Each collaborator is a trait so the workflow can be driven against fakes
//! in tests; the `Http*` types implement them against the REST gateways
//! fronting the certificate authorities, the ordering service and the peers.

pub mod ca;
mod endpoint;
pub mod error;
pub mod orderer;
pub mod peer;

pub use crate::ca::{CaClient, Enrollment, HttpCaClient, RegistrationRequest};
pub use crate::endpoint::{Endpoint, TransportConfig};
pub use crate::error::NetError;
pub use crate::orderer::{
    BroadcastResponse, ChannelCreateRequest, HttpOrderer, OrderingService, STATUS_SUCCESS,
};
pub use crate::peer::{EventHub, HttpEventHub, HttpPeer, JoinOutcome, PeerClient};
