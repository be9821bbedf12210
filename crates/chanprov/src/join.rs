//! Concurrent join of every participating peer to a freshly created channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use chanprov_core::{ChannelName, GenesisBlock, Identity};
use chanprov_net::{JoinOutcome, OrderingService, PeerClient};

use crate::cleanup::EventHubRegistry;
use crate::error::{JoinError, PartialJoinFailure, PeerFailure};

/// Peers of one organization, joined with that organization's admin.
pub struct JoinTarget {
    pub org: String,
    pub admin: Identity,
    pub peers: Vec<Arc<dyn PeerClient>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerJoin {
    pub org: String,
    pub peer: String,
    pub outcome: JoinOutcome,
}

/// Per-peer results of [`JoinController::join_all`].
#[derive(Debug)]
pub struct JoinReport {
    pub channel: ChannelName,
    pub joined: Vec<PeerJoin>,
    pub failed: Vec<PeerFailure>,
}

impl JoinReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<PeerJoin>, PartialJoinFailure> {
        if self.failed.is_empty() {
            return Ok(self.joined);
        }
        Err(PartialJoinFailure {
            channel: self.channel.to_string(),
            joined: self
                .joined
                .iter()
                .map(|join| format!("{}/{}", join.org, join.peer))
                .collect(),
            failed: self.failed,
        })
    }
}

pub struct JoinController {
    orderer: Arc<dyn OrderingService>,
    registry: Arc<EventHubRegistry>,
    concurrency: usize,
    event_timeout: Duration,
}

impl JoinController {
    pub fn new(orderer: Arc<dyn OrderingService>, registry: Arc<EventHubRegistry>) -> Self {
        Self {
            orderer,
            registry,
            concurrency: 4,
            event_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_event_timeout(mut self, event_timeout: Duration) -> Self {
        self.event_timeout = event_timeout;
        self
    }

    /// Joins every peer of every target to `channel`.
    ///
    /// The genesis block is fetched once per organization. Each peer runs in
    /// its own task with at most `concurrency` in flight; one peer's failure
    /// never stops the others, and peers that joined are not rolled back.
    pub async fn join_all(&self, channel: &ChannelName, targets: Vec<JoinTarget>) -> JoinReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = PeerTasks(Vec::new());
        let mut failed = Vec::new();

        for target in targets {
            let block = match self.orderer.genesis_block(channel, &target.admin).await {
                Ok(Some(block)) => block,
                Ok(None) => {
                    failed.extend(org_failures(&target, || {
                        JoinError::Genesis(format!("channel {channel} has no genesis block"))
                    }));
                    continue;
                }
                Err(err) => {
                    warn!(org = %target.org, channel = %channel, error = %err, "fetching genesis block failed");
                    failed.extend(org_failures(&target, || JoinError::Genesis(err.to_string())));
                    continue;
                }
            };

            let admin = Arc::new(target.admin);
            for peer in target.peers {
                let org = target.org.clone();
                let peer_name = peer.name().to_string();
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(err) => {
                        failed.push(PeerFailure {
                            org,
                            peer: peer_name,
                            error: JoinError::Aborted(err.to_string()),
                        });
                        continue;
                    }
                };
                let job = PeerJob {
                    channel: channel.clone(),
                    block: block.clone(),
                    admin: Arc::clone(&admin),
                    peer,
                    registry: Arc::clone(&self.registry),
                    event_timeout: self.event_timeout,
                };
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    job.run().await
                });
                tasks.0.push((org, peer_name, handle));
            }
        }

        let mut joined = Vec::new();
        for (org, peer, handle) in tasks.0.iter_mut() {
            let (org, peer) = (org.clone(), peer.clone());
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(JoinError::Aborted(err.to_string())),
            };
            match result {
                Ok(outcome) => {
                    info!(org = %org, peer = %peer, channel = %channel, ?outcome, "peer joined channel");
                    joined.push(PeerJoin { org, peer, outcome });
                }
                Err(error) => {
                    warn!(org = %org, peer = %peer, channel = %channel, error = %error, "peer failed to join channel");
                    failed.push(PeerFailure { org, peer, error });
                }
            }
        }

        JoinReport {
            channel: channel.clone(),
            joined,
            failed,
        }
    }
}

fn org_failures(target: &JoinTarget, error: impl Fn() -> JoinError) -> Vec<PeerFailure> {
    target
        .peers
        .iter()
        .map(|peer| PeerFailure {
            org: target.org.clone(),
            peer: peer.name().to_string(),
            error: error(),
        })
        .collect()
}

/// Spawned joins in submission order. Tasks still running when the
/// controller's future is dropped are aborted.
struct PeerTasks(Vec<(String, String, JoinHandle<Result<JoinOutcome, JoinError>>)>);

impl Drop for PeerTasks {
    fn drop(&mut self) {
        for (_, _, handle) in &self.0 {
            handle.abort();
        }
    }
}

struct PeerJob {
    channel: ChannelName,
    block: GenesisBlock,
    admin: Arc<Identity>,
    peer: Arc<dyn PeerClient>,
    registry: Arc<EventHubRegistry>,
    event_timeout: Duration,
}

impl PeerJob {
    async fn run(self) -> Result<JoinOutcome, JoinError> {
        let hub = self
            .peer
            .open_event_hub(&self.admin)
            .await
            .map_err(JoinError::EventHub)?;
        self.registry.register_handle(Arc::clone(&hub));

        let outcome = self
            .peer
            .join_channel(&self.block, &self.admin)
            .await
            .map_err(JoinError::Join)?;
        if outcome == JoinOutcome::Joined {
            hub.wait_for_block(&self.channel, self.event_timeout)
                .await
                .map_err(JoinError::Confirmation)?;
        }
        Ok(outcome)
    }
}
