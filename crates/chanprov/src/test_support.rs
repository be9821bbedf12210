//! In-process collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use chanprov_core::{
    CaEndpoint, ChannelName, EnrollmentSecret, GenesisBlock, Identity, OrdererNode, Organization,
    PeerNode, Registrar, Topology,
};
use chanprov_net::{
    BroadcastResponse, CaClient, ChannelCreateRequest, Enrollment, EventHub, JoinOutcome,
    NetError, OrderingService, PeerClient, RegistrationRequest, STATUS_SUCCESS,
};

use crate::network::Network;

pub use chanprov_core::test_support::{ed25519_identity, ed25519_key_pem};

/// Shared, ordered record of collaborator calls across fakes.
pub type Journal = Arc<Mutex<Vec<String>>>;

fn record(journal: &Journal, entry: String) {
    journal.lock().unwrap().push(entry);
}

pub fn organization(name: &str, msp_id: &str, peers: usize) -> Organization {
    Organization {
        name: name.to_string(),
        msp_id: msp_id.to_string(),
        domain: name.to_string(),
        affiliation: "org1.department1".to_string(),
        ca: CaEndpoint {
            url: format!("https://ca.{name}:7054"),
            name: format!("ca-{name}"),
            tls_trust_root: Vec::new(),
        },
        registrar: Registrar {
            enroll_id: "admin".to_string(),
            enroll_secret: SecretString::new("adminpw".to_string()),
        },
        peers: (0..peers)
            .map(|idx| PeerNode {
                name: format!("peer{idx}.{name}"),
                url: format!("https://peer{idx}.{name}:7051"),
                tls_trust_root: Vec::new(),
                server_hostname: None,
            })
            .collect(),
    }
}

pub fn topology(orgs: &[(&str, &str, usize)]) -> Topology {
    Topology::new(
        orgs.iter()
            .map(|(name, msp, peers)| organization(name, msp, *peers))
            .collect(),
        OrdererNode {
            name: "orderer.trade.example".to_string(),
            msp_id: "TradeOrdererMSP".to_string(),
            url: "https://orderer.trade.example:7050".to_string(),
            tls_trust_root: Vec::new(),
            server_hostname: None,
        },
    )
    .unwrap()
}

pub fn channel(name: &str) -> ChannelName {
    ChannelName::new(name).unwrap()
}

fn unavailable(endpoint: &str) -> NetError {
    NetError::Unavailable {
        endpoint: endpoint.to_string(),
        status: 503,
        detail: "connection refused".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaBehaviour {
    Succeed,
    Reject,
    Unreachable,
}

pub struct FakeCa {
    org: String,
    calls: Mutex<Vec<String>>,
    enroll_behaviour: Mutex<CaBehaviour>,
    pub enrollments: AtomicUsize,
    journal: Option<Journal>,
}

impl FakeCa {
    pub fn new(org: &str) -> Self {
        Self {
            org: org.to_string(),
            calls: Mutex::new(Vec::new()),
            enroll_behaviour: Mutex::new(CaBehaviour::Succeed),
            enrollments: AtomicUsize::new(0),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn set_enroll_behaviour(&self, behaviour: CaBehaviour) {
        *self.enroll_behaviour.lock().unwrap() = behaviour;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn note(&self, call: String) {
        if let Some(journal) = &self.journal {
            record(journal, format!("ca:{}:{call}", self.org));
        }
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CaClient for FakeCa {
    async fn register(
        &self,
        _registrar: &Identity,
        request: &RegistrationRequest,
    ) -> Result<EnrollmentSecret, NetError> {
        self.note(format!("register:{}:{}", request.enrollment_id, request.role));
        Ok(EnrollmentSecret::new(format!("secret-{}", request.enrollment_id)))
    }

    async fn enroll(
        &self,
        enrollment_id: &str,
        _secret: &EnrollmentSecret,
    ) -> Result<Enrollment, NetError> {
        self.note(format!("enroll:{enrollment_id}"));
        self.enrollments.fetch_add(1, Ordering::SeqCst);
        let behaviour = *self.enroll_behaviour.lock().unwrap();
        match behaviour {
            CaBehaviour::Succeed => Ok(Enrollment {
                certificate: format!(
                    "-----BEGIN CERTIFICATE-----\n{enrollment_id}\n-----END CERTIFICATE-----\n"
                ),
                private_key: SecretString::new(ed25519_key_pem()),
            }),
            CaBehaviour::Reject => Err(NetError::Rejected {
                endpoint: format!("ca-{}", self.org),
                status: 401,
                detail: "20: Authentication failure".to_string(),
            }),
            CaBehaviour::Unreachable => Err(unavailable(&format!("ca-{}", self.org))),
        }
    }
}

pub struct FakeOrderer {
    genesis: Mutex<Option<GenesisBlock>>,
    pub genesis_unreachable: AtomicBool,
    pub create_unreachable: AtomicBool,
    pub panic_on_create: AtomicBool,
    create_status: Mutex<String>,
    pub genesis_queries: AtomicUsize,
    creates: Mutex<Vec<ChannelCreateRequest>>,
    journal: Option<Journal>,
}

impl Default for FakeOrderer {
    fn default() -> Self {
        Self {
            genesis: Mutex::new(None),
            genesis_unreachable: AtomicBool::new(false),
            create_unreachable: AtomicBool::new(false),
            panic_on_create: AtomicBool::new(false),
            create_status: Mutex::new(STATUS_SUCCESS.to_string()),
            genesis_queries: AtomicUsize::new(0),
            creates: Mutex::new(Vec::new()),
            journal: None,
        }
    }
}

impl FakeOrderer {
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_existing_channel(self) -> Self {
        *self.genesis.lock().unwrap() = Some(GenesisBlock::new(b"genesis".to_vec()));
        self
    }

    pub fn set_create_status(&self, status: &str) {
        *self.create_status.lock().unwrap() = status.to_string();
    }

    pub fn creates(&self) -> Vec<ChannelCreateRequest> {
        self.creates.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderingService for FakeOrderer {
    async fn genesis_block(
        &self,
        channel: &ChannelName,
        _signer: &Identity,
    ) -> Result<Option<GenesisBlock>, NetError> {
        self.genesis_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            record(journal, format!("orderer:genesis:{channel}"));
        }
        if self.genesis_unreachable.load(Ordering::SeqCst) {
            return Err(unavailable("orderer"));
        }
        Ok(self.genesis.lock().unwrap().clone())
    }

    async fn create_channel(
        &self,
        request: &ChannelCreateRequest,
    ) -> Result<BroadcastResponse, NetError> {
        if let Some(journal) = &self.journal {
            record(journal, format!("orderer:create:{}", request.channel));
        }
        self.creates.lock().unwrap().push(request.clone());
        if self.panic_on_create.load(Ordering::SeqCst) {
            panic!("orderer fake asked to panic");
        }
        if self.create_unreachable.load(Ordering::SeqCst) {
            return Err(unavailable("orderer"));
        }
        let status = self.create_status.lock().unwrap().clone();
        if status == STATUS_SUCCESS {
            *self.genesis.lock().unwrap() = Some(GenesisBlock::new(b"genesis".to_vec()));
        }
        Ok(BroadcastResponse {
            status,
            info: String::new(),
        })
    }
}

#[derive(Debug)]
pub struct FakeHub {
    id: String,
    connected: AtomicBool,
    pub disconnects: AtomicUsize,
    confirm: bool,
}

impl FakeHub {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connected: AtomicBool::new(true),
            disconnects: AtomicUsize::new(0),
            confirm: true,
        }
    }
}

#[async_trait]
impl EventHub for FakeHub {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn wait_for_block(
        &self,
        channel: &ChannelName,
        timeout: Duration,
    ) -> Result<(), NetError> {
        if self.confirm {
            Ok(())
        } else {
            Err(NetError::Timeout {
                endpoint: self.id.clone(),
                channel: channel.to_string(),
                waited: timeout,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehaviour {
    Join,
    AlreadyMember,
    Refuse,
    Unconfirmed,
}

pub struct FakePeer {
    name: String,
    behaviour: Mutex<PeerBehaviour>,
    pub joins: AtomicUsize,
    hubs: Mutex<Vec<Arc<FakeHub>>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    journal: Option<Journal>,
}

impl FakePeer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            behaviour: Mutex::new(PeerBehaviour::Join),
            joins: AtomicUsize::new(0),
            hubs: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            journal: None,
        }
    }

    pub fn set_behaviour(&self, behaviour: PeerBehaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn hubs(&self) -> Vec<Arc<FakeHub>> {
        self.hubs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerClient for FakePeer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_event_hub(&self, _signer: &Identity) -> Result<Arc<dyn EventHub>, NetError> {
        let mut hubs = self.hubs.lock().unwrap();
        let mut hub = FakeHub::new(format!("{}#{}", self.name, hubs.len()));
        hub.confirm = *self.behaviour.lock().unwrap() != PeerBehaviour::Unconfirmed;
        let hub = Arc::new(hub);
        hubs.push(hub.clone());
        Ok(hub)
    }

    async fn join_channel(
        &self,
        _block: &GenesisBlock,
        _signer: &Identity,
    ) -> Result<JoinOutcome, NetError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.joins.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            record(journal, format!("peer:join:{}", self.name));
        }
        let behaviour = *self.behaviour.lock().unwrap();
        match behaviour {
            PeerBehaviour::Join | PeerBehaviour::Unconfirmed => Ok(JoinOutcome::Joined),
            PeerBehaviour::AlreadyMember => Ok(JoinOutcome::AlreadyMember),
            PeerBehaviour::Refuse => Err(NetError::Rejected {
                endpoint: self.name.clone(),
                status: 403,
                detail: "access denied".to_string(),
            }),
        }
    }
}

/// Fakes for every collaborator of a topology.
pub struct FakeNetwork {
    pub journal: Journal,
    pub orderer: Arc<FakeOrderer>,
    cas: HashMap<String, Arc<FakeCa>>,
    peers: HashMap<String, Arc<FakePeer>>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl FakeNetwork {
    pub fn for_topology(topology: &Topology) -> Self {
        Self::build(topology, FakeOrderer::default(), Duration::ZERO)
    }

    pub fn with_join_delay(topology: &Topology, delay: Duration) -> Self {
        Self::build(topology, FakeOrderer::default(), delay)
    }

    pub fn with_existing_channel(topology: &Topology) -> Self {
        Self::build(
            topology,
            FakeOrderer::default().with_existing_channel(),
            Duration::ZERO,
        )
    }

    fn build(topology: &Topology, orderer: FakeOrderer, delay: Duration) -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let mut cas = HashMap::new();
        let mut peers = HashMap::new();
        for org in topology.organizations() {
            cas.insert(
                org.name.clone(),
                Arc::new(FakeCa::new(&org.name).with_journal(journal.clone())),
            );
            for node in &org.peers {
                let mut peer = FakePeer::new(&node.name);
                peer.delay = delay;
                peer.in_flight = in_flight.clone();
                peer.max_in_flight = max_in_flight.clone();
                peer.journal = Some(journal.clone());
                peers.insert(node.name.clone(), Arc::new(peer));
            }
        }
        Self {
            orderer: Arc::new(orderer.with_journal(journal.clone())),
            journal,
            cas,
            peers,
            max_in_flight,
        }
    }

    pub fn ca_for(&self, org: &str) -> Arc<FakeCa> {
        self.cas[org].clone()
    }

    pub fn peer_named(&self, name: &str) -> Arc<FakePeer> {
        self.peers[name].clone()
    }

    pub fn all_hubs(&self) -> Vec<Arc<FakeHub>> {
        self.peers.values().flat_map(|peer| peer.hubs()).collect()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl Network for FakeNetwork {
    fn ca(&self, org: &Organization) -> Result<Arc<dyn CaClient>, NetError> {
        Ok(self.ca_for(&org.name))
    }

    fn orderer(&self, _node: &OrdererNode) -> Result<Arc<dyn OrderingService>, NetError> {
        Ok(self.orderer.clone())
    }

    fn peer(&self, node: &PeerNode) -> Result<Arc<dyn PeerClient>, NetError> {
        Ok(self.peer_named(&node.name))
    }
}
