use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tokio::fs;

use chanprov_core::ChannelName;
use chanprov_net::TransportConfig;

/// Runtime configuration of one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub topology_path: PathBuf,
    pub wallet: WalletSettings,
    pub channel: ChannelSettings,
    pub join: JoinSettings,
    pub transport: TransportConfig,
    pub crypto: CryptoSettings,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WalletSettings {
    /// Parent of the per-organization `<org>_wallet` directories.
    pub root: PathBuf,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("wallets"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub settle_delay: Duration,
    pub quorum: usize,
    /// Directory holding `<channel>.tx` transactions.
    pub envelope_dir: PathBuf,
    /// Organizations that neither sign nor join, e.g. a carrier that is
    /// added to the channel later.
    pub exclude_orgs: Vec<String>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(5_000),
            quorum: 1,
            envelope_dir: PathBuf::from("channel-artifacts"),
            exclude_orgs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinSettings {
    pub concurrency: usize,
    pub event_timeout: Duration,
}

impl Default for JoinSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            event_timeout: Duration::from_millis(30_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CryptoSettings {
    /// Root of the offline-generated `peerOrganizations/...` tree.
    pub material_dir: PathBuf,
}

impl Default for CryptoSettings {
    fn default() -> Self {
        Self {
            material_dir: PathBuf::from("crypto-config"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub wallet_root: Option<PathBuf>,
    pub settle_delay_ms: Option<u64>,
    pub quorum: Option<usize>,
    pub envelope_dir: Option<PathBuf>,
    pub exclude_orgs: Option<Vec<String>>,
    pub join_concurrency: Option<usize>,
    pub event_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub material_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    wallet: WalletSection,
    #[serde(default)]
    channel: ChannelSection,
    #[serde(default)]
    join: JoinSection,
    #[serde(default)]
    transport: TransportSection,
    #[serde(default)]
    crypto: CryptoSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WalletSection {
    root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ChannelSection {
    settle_delay_ms: Option<u64>,
    quorum: Option<usize>,
    envelope_dir: Option<PathBuf>,
    exclude_orgs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct JoinSection {
    concurrency: Option<usize>,
    event_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TransportSection {
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CryptoSection {
    material_dir: Option<PathBuf>,
}

impl ProvisionConfig {
    /// Defaults only; no configuration file is consulted.
    pub fn with_defaults(topology_path: impl Into<PathBuf>) -> Self {
        Self {
            topology_path: topology_path.into(),
            wallet: WalletSettings::default(),
            channel: ChannelSettings::default(),
            join: JoinSettings::default(),
            transport: TransportConfig::default(),
            crypto: CryptoSettings::default(),
            config_path: None,
        }
    }

    pub async fn from_sources(
        topology_path: PathBuf,
        config_path: Option<PathBuf>,
        overrides: ConfigOverrides,
    ) -> Result<Self> {
        let file_cfg = if let Some(path) = config_path.as_ref() {
            let contents = fs::read_to_string(path).await.with_context(|| {
                format!("reading provisioning configuration from {}", path.display())
            })?;
            parse_config(&contents, path)?
        } else {
            FileConfig::default()
        };

        let wallet = WalletSettings {
            root: overrides
                .wallet_root
                .or(file_cfg.wallet.root)
                .unwrap_or_else(|| WalletSettings::default().root),
        };
        let channel = ChannelSettings {
            settle_delay: overrides
                .settle_delay_ms
                .or(file_cfg.channel.settle_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or_else(|| ChannelSettings::default().settle_delay),
            quorum: overrides
                .quorum
                .or(file_cfg.channel.quorum)
                .unwrap_or_else(|| ChannelSettings::default().quorum),
            envelope_dir: overrides
                .envelope_dir
                .or(file_cfg.channel.envelope_dir)
                .unwrap_or_else(|| ChannelSettings::default().envelope_dir),
            exclude_orgs: overrides
                .exclude_orgs
                .or(file_cfg.channel.exclude_orgs)
                .unwrap_or_default(),
        };
        let join = JoinSettings {
            concurrency: overrides
                .join_concurrency
                .or(file_cfg.join.concurrency)
                .unwrap_or_else(|| JoinSettings::default().concurrency),
            event_timeout: overrides
                .event_timeout_ms
                .or(file_cfg.join.event_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or_else(|| JoinSettings::default().event_timeout),
        };
        let transport = TransportConfig {
            request_timeout: overrides
                .request_timeout_ms
                .or(file_cfg.transport.request_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or_else(|| TransportConfig::default().request_timeout),
        };
        let crypto = CryptoSettings {
            material_dir: overrides
                .material_dir
                .or(file_cfg.crypto.material_dir)
                .unwrap_or_else(|| CryptoSettings::default().material_dir),
        };

        let config = Self {
            topology_path,
            wallet,
            channel,
            join,
            transport,
            crypto,
            config_path,
        };
        config.validate().context("validating provisioning configuration")?;
        Ok(config)
    }

    /// Location of the channel transaction for `channel`.
    pub fn envelope_path(&self, channel: &ChannelName) -> PathBuf {
        self.channel
            .envelope_dir
            .join(format!("{}.tx", channel.as_str()))
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.channel.quorum > 0,
            "channel quorum must be greater than 0 (got {})",
            self.channel.quorum
        );
        ensure!(
            self.join.concurrency > 0,
            "join concurrency must be greater than 0 (got {})",
            self.join.concurrency
        );
        ensure!(
            !self.join.event_timeout.is_zero(),
            "join event_timeout_ms must be greater than 0"
        );
        ensure!(
            !self.transport.request_timeout.is_zero(),
            "transport request_timeout_ms must be greater than 0"
        );
        Ok(())
    }
}

fn parse_config(contents: &str, path: &Path) -> Result<FileConfig> {
    let deserializer = toml::Deserializer::new(contents);
    let parsed = serde_path_to_error::deserialize(deserializer)
        .with_context(|| format!("parsing provisioning configuration at {}", path.display()))?;
    Ok(parsed)
}
