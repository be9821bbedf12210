//! Mock gateways and on-disk fixtures for driving the workflow over HTTP.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use chanprov::{FileSystemWallets, HttpNetwork, ProvisionConfig, WorkflowContext};
use chanprov_core::{config_update_envelope, Topology};
use chanprov_net::TransportConfig;

pub const CHANNEL: &str = "tradechannel";
pub const ISSUED_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

/// One CA, one orderer and one peer gateway, plus a working directory with
/// the topology, TLS root, channel transaction and wallets.
pub struct Gateways {
    pub ca: MockServer,
    pub orderer: MockServer,
    pub peer: MockServer,
    pub dir: TempDir,
}

impl Gateways {
    pub async fn start() -> Result<Self> {
        let gateways = Self {
            ca: MockServer::start_async().await,
            orderer: MockServer::start_async().await,
            peer: MockServer::start_async().await,
            dir: tempfile::tempdir()?,
        };
        tokio::fs::write(gateways.dir.path().join("tls-root.pem"), trust_root()?).await?;
        let artifacts = gateways.dir.path().join("channel-artifacts");
        tokio::fs::create_dir_all(&artifacts).await?;
        tokio::fs::write(artifacts.join(format!("{CHANNEL}.tx")), channel_transaction(CHANNEL))
            .await?;
        Ok(gateways)
    }

    pub fn wallet_dir(&self, org: &str) -> PathBuf {
        self.dir.path().join("wallets").join(format!("{org}_wallet"))
    }

    /// A single organization whose two peers share the peer gateway.
    pub fn topology_json(&self) -> String {
        json!({
            "orderer": {
                "name": "orderer.trade.example",
                "msp_id": "TradeOrdererMSP",
                "url": self.orderer.base_url(),
                "tls_ca_cert": "tls-root.pem"
            },
            "organizations": [{
                "name": "exporterorg",
                "msp_id": "ExporterOrgMSP",
                "domain": "exporterorg.trade.example",
                "ca": {
                    "url": self.ca.base_url(),
                    "name": "ca-exporterorg",
                    "tls_ca_cert": "tls-root.pem"
                },
                "registrar": { "enroll_id": "admin", "enroll_secret": "adminpw" },
                "peers": [
                    { "name": "peer0.exporterorg", "url": self.peer.base_url(), "tls_ca_cert": "tls-root.pem" },
                    { "name": "peer1.exporterorg", "url": self.peer.base_url(), "tls_ca_cert": "tls-root.pem" }
                ]
            }]
        })
        .to_string()
    }

    pub fn context(&self, settle_delay: Duration) -> Result<WorkflowContext> {
        let topology = Topology::from_json(&self.topology_json(), self.dir.path())?;
        let mut config = ProvisionConfig::with_defaults(self.dir.path().join("network.json"));
        config.wallet.root = self.dir.path().join("wallets");
        config.channel.envelope_dir = self.dir.path().join("channel-artifacts");
        config.channel.settle_delay = settle_delay;
        config.join.event_timeout = Duration::from_secs(5);
        config.transport = TransportConfig {
            request_timeout: Duration::from_secs(5),
        };
        let wallets = Arc::new(FileSystemWallets::new(config.wallet.root.clone()));
        let network = Arc::new(HttpNetwork::new(config.transport));
        Ok(WorkflowContext::new(topology, config, wallets, network))
    }

    pub async fn accept_enrollments(&self) -> httpmock::Mock<'_> {
        self.ca
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/enroll");
                then.status(201).json_body(json!({
                    "success": true,
                    "result": { "Cert": STANDARD.encode(ISSUED_PEM) },
                    "errors": [],
                    "messages": []
                }));
            })
            .await
    }

    pub async fn accept_registrations(&self) -> httpmock::Mock<'_> {
        self.ca
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/register")
                    .header_exists("Authorization");
                then.status(201).json_body(json!({
                    "success": true,
                    "result": { "secret": "s3cret" },
                    "errors": []
                }));
            })
            .await
    }

    pub async fn genesis(&self, exists: bool) -> httpmock::Mock<'_> {
        self.orderer
            .mock_async(move |when, then| {
                when.method(GET)
                    .path(format!("/v1/channels/{CHANNEL}/genesis"))
                    .header("X-Msp-Id", "ExporterOrgMSP");
                if exists {
                    then.status(200).body("genesis-block");
                } else {
                    then.status(404);
                }
            })
            .await
    }

    pub async fn accept_broadcast(&self) -> httpmock::Mock<'_> {
        self.orderer
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/broadcast")
                    .header("Content-Type", "application/octet-stream")
                    .header_exists("X-Signature");
                then.status(200)
                    .json_body(json!({ "status": "SUCCESS", "info": "" }));
            })
            .await
    }

    pub async fn accept_joins(&self) -> (httpmock::Mock<'_>, httpmock::Mock<'_>) {
        let join = self
            .peer
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/channels/join")
                    .body("genesis-block");
                then.status(200);
            })
            .await;
        let height = self
            .peer
            .mock_async(|when, then| {
                when.method(GET).path(format!("/v1/channels/{CHANNEL}/height"));
                then.status(200).json_body(json!({ "height": 1 }));
            })
            .await;
        (join, height)
    }
}

/// Wallet labels stored for an organization, sorted.
pub async fn stored_labels(dir: &Path) -> Result<Vec<String>> {
    let mut labels = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Ok(labels);
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(label) = name.strip_suffix(".id") {
            if !label.starts_with('.') {
                labels.push(label.to_string());
            }
        }
    }
    labels.sort();
    Ok(labels)
}

fn trust_root() -> Result<String> {
    let key = rcgen::KeyPair::generate()?;
    let params = rcgen::CertificateParams::new(vec!["localhost".to_string()])?;
    Ok(params.self_signed(&key)?.pem())
}

/// `CONFIG_UPDATE` envelope whose update names `channel` in field 1.
fn channel_transaction(channel: &str) -> Vec<u8> {
    let mut update = vec![0x0a, channel.len() as u8];
    update.extend_from_slice(channel.as_bytes());
    config_update_envelope(channel, update)
}
