use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading the network topology descriptor.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read topology descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse topology descriptor: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read TLS trust root {path} for {owner}: {source}")]
    TrustRoot {
        owner: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS trust root {path} for {owner} does not contain a PEM certificate")]
    TrustRootNotPem { owner: String, path: PathBuf },
    #[error("topology descriptor lists no organizations")]
    NoOrganizations,
    #[error("organization name {0:?} appears more than once")]
    DuplicateName(String),
    #[error("MSP id {0:?} is used by more than one organization")]
    DuplicateMspId(String),
    #[error("{owner}: field `{field}` must not be empty")]
    EmptyField { owner: String, field: &'static str },
}

/// Certificate authority serving one organization.
#[derive(Debug, Clone)]
pub struct CaEndpoint {
    pub url: String,
    pub name: String,
    /// PEM bytes of the root the CA's TLS certificate must chain to.
    pub tls_trust_root: Vec<u8>,
}

/// Bootstrap identity pre-provisioned in the CA, allowed to register others.
#[derive(Debug, Clone)]
pub struct Registrar {
    pub enroll_id: String,
    pub enroll_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct PeerNode {
    pub name: String,
    pub url: String,
    pub tls_trust_root: Vec<u8>,
    pub server_hostname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrdererNode {
    pub name: String,
    pub msp_id: String,
    pub url: String,
    pub tls_trust_root: Vec<u8>,
    pub server_hostname: Option<String>,
}

/// A membership domain. Loaded once from the topology descriptor and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Organization {
    pub name: String,
    pub msp_id: String,
    /// DNS domain used to locate pre-generated crypto material.
    pub domain: String,
    pub affiliation: String,
    pub ca: CaEndpoint,
    pub registrar: Registrar,
    pub peers: Vec<PeerNode>,
}

/// The full network as seen by the provisioning workflow.
///
/// Organization order is the order of the descriptor and is the canonical
/// iteration order for multi-organization operations.
#[derive(Debug, Clone)]
pub struct Topology {
    organizations: Vec<Organization>,
    orderer: OrdererNode,
}

impl Topology {
    pub fn new(
        organizations: Vec<Organization>,
        orderer: OrdererNode,
    ) -> Result<Self, TopologyError> {
        if organizations.is_empty() {
            return Err(TopologyError::NoOrganizations);
        }
        let mut names = HashSet::new();
        let mut msp_ids = HashSet::new();
        for org in &organizations {
            non_empty(&org.name, "organization", "name")?;
            non_empty(&org.msp_id, &org.name, "msp_id")?;
            non_empty(&org.ca.url, &org.name, "ca.url")?;
            non_empty(&org.registrar.enroll_id, &org.name, "registrar.enroll_id")?;
            if !names.insert(org.name.clone()) {
                return Err(TopologyError::DuplicateName(org.name.clone()));
            }
            if !msp_ids.insert(org.msp_id.clone()) {
                return Err(TopologyError::DuplicateMspId(org.msp_id.clone()));
            }
        }
        non_empty(&orderer.url, "orderer", "url")?;
        Ok(Self {
            organizations,
            orderer,
        })
    }

    /// Reads a JSON descriptor from disk. Trust-root paths inside the
    /// descriptor are resolved relative to the descriptor's directory.
    pub fn from_path(path: &Path) -> Result<Self, TopologyError> {
        let contents = fs::read_to_string(path).map_err(|source| TopologyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&contents, base_dir)
    }

    pub fn from_json(contents: &str, base_dir: &Path) -> Result<Self, TopologyError> {
        let raw: RawTopology = serde_json::from_str(contents)?;
        let orderer = OrdererNode {
            tls_trust_root: read_trust_root(&raw.orderer.name, base_dir, &raw.orderer.tls_ca_cert)?,
            name: raw.orderer.name,
            msp_id: raw.orderer.msp_id,
            url: raw.orderer.url,
            server_hostname: raw.orderer.server_hostname,
        };

        let mut organizations = Vec::with_capacity(raw.organizations.len());
        for org in raw.organizations {
            let ca = CaEndpoint {
                tls_trust_root: read_trust_root(&org.name, base_dir, &org.ca.tls_ca_cert)?,
                url: org.ca.url,
                name: org.ca.name,
            };
            let mut peers = Vec::with_capacity(org.peers.len());
            for peer in org.peers {
                peers.push(PeerNode {
                    tls_trust_root: read_trust_root(&peer.name, base_dir, &peer.tls_ca_cert)?,
                    name: peer.name,
                    url: peer.url,
                    server_hostname: peer.server_hostname,
                });
            }
            organizations.push(Organization {
                domain: org.domain.unwrap_or_else(|| org.name.clone()),
                name: org.name,
                msp_id: org.msp_id,
                affiliation: org.affiliation,
                ca,
                registrar: Registrar {
                    enroll_id: org.registrar.enroll_id,
                    enroll_secret: org.registrar.enroll_secret,
                },
                peers,
            });
        }

        Self::new(organizations, orderer)
    }

    #[must_use]
    pub fn organizations(&self) -> &[Organization] {
        &self.organizations
    }

    #[must_use]
    pub fn organization(&self, name: &str) -> Option<&Organization> {
        self.organizations.iter().find(|org| org.name == name)
    }

    #[must_use]
    pub fn orderer(&self) -> &OrdererNode {
        &self.orderer
    }

    /// Organizations not named in `excluded`, in descriptor order.
    #[must_use]
    pub fn without(&self, excluded: &[String]) -> Vec<&Organization> {
        self.organizations
            .iter()
            .filter(|org| !excluded.contains(&org.name))
            .collect()
    }
}

fn non_empty(value: &str, owner: &str, field: &'static str) -> Result<(), TopologyError> {
    if value.trim().is_empty() {
        return Err(TopologyError::EmptyField {
            owner: owner.to_string(),
            field,
        });
    }
    Ok(())
}

fn read_trust_root(owner: &str, base_dir: &Path, path: &Path) -> Result<Vec<u8>, TopologyError> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    let bytes = fs::read(&resolved).map_err(|source| TopologyError::TrustRoot {
        owner: owner.to_string(),
        path: resolved.clone(),
        source,
    })?;
    let looks_like_pem = std::str::from_utf8(&bytes)
        .map(|text| text.contains("-----BEGIN CERTIFICATE-----"))
        .unwrap_or(false);
    if !looks_like_pem {
        return Err(TopologyError::TrustRootNotPem {
            owner: owner.to_string(),
            path: resolved,
        });
    }
    Ok(bytes)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTopology {
    orderer: RawOrderer,
    organizations: Vec<RawOrganization>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOrderer {
    name: String,
    msp_id: String,
    url: String,
    tls_ca_cert: PathBuf,
    #[serde(default)]
    server_hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOrganization {
    name: String,
    msp_id: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default = "default_affiliation")]
    affiliation: String,
    ca: RawCa,
    registrar: RawRegistrar,
    #[serde(default)]
    peers: Vec<RawPeer>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCa {
    url: String,
    name: String,
    tls_ca_cert: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRegistrar {
    enroll_id: String,
    enroll_secret: SecretString,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPeer {
    name: String,
    url: String,
    tls_ca_cert: PathBuf,
    #[serde(default)]
    server_hostname: Option<String>,
}

fn default_affiliation() -> String {
    "org1.department1".to_string()
}
