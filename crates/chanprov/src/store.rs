//! Per-organization credential stores ("wallets").

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

use chanprov_core::{Identity, Organization, WalletRecord};

const ENTRY_EXTENSION: &str = "id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("label {0:?} cannot name a wallet entry")]
    InvalidLabel(String),
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("wallet entry {label:?} is corrupt: {detail}")]
    Corrupt { label: String, detail: String },
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Labels become file names, so only a conservative character set is
/// accepted and dot-prefixed names are refused.
pub fn validate_label(label: &str) -> Result<(), StoreError> {
    let valid = !label.is_empty()
        && label.len() <= 128
        && !label.starts_with('.')
        && label
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '@'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidLabel(label.to_string()))
    }
}

/// Keyed storage of identities for one organization.
///
/// `put` either stores a complete identity or leaves the store unchanged.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn exists(&self, label: &str) -> Result<bool, StoreError>;

    async fn get(&self, label: &str) -> Result<Option<Identity>, StoreError>;

    async fn put(&self, label: &str, identity: &Identity) -> Result<(), StoreError>;
}

/// Hands out the credential store of each organization.
pub trait WalletProvider: Send + Sync {
    fn wallet(&self, org: &Organization) -> Arc<dyn CredentialStore>;
}

/// Wallet kept as one JSON file per label under a directory.
#[derive(Debug, Clone)]
pub struct FileSystemWallet {
    dir: PathBuf,
}

impl FileSystemWallet {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The wallet of `org_name` under `root`: `<root>/<org>_wallet`.
    pub fn for_org(root: &Path, org_name: &str) -> Self {
        Self::new(root.join(format!("{org_name}_wallet")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{label}.{ENTRY_EXTENSION}"))
    }

    async fn write_entry(&self, tmp: &Path, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        fs::write(tmp, contents).await.map_err(|source| StoreError::Io {
            action: "writing",
            path: tmp.to_path_buf(),
            source,
        })?;
        restrict_private_permissions(tmp).await?;
        fs::rename(tmp, path).await.map_err(|source| StoreError::Io {
            action: "renaming into",
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl CredentialStore for FileSystemWallet {
    async fn exists(&self, label: &str) -> Result<bool, StoreError> {
        validate_label(label)?;
        let path = self.entry_path(label);
        fs::try_exists(&path).await.map_err(|source| StoreError::Io {
            action: "checking",
            path,
            source,
        })
    }

    async fn get(&self, label: &str) -> Result<Option<Identity>, StoreError> {
        validate_label(label)?;
        let path = self.entry_path(label);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "reading",
                    path,
                    source,
                })
            }
        };
        let record: WalletRecord =
            serde_json::from_str(&contents).map_err(|err| StoreError::Corrupt {
                label: label.to_string(),
                detail: err.to_string(),
            })?;
        Identity::from_record(label, record)
            .map(Some)
            .map_err(|detail| StoreError::Corrupt {
                label: label.to_string(),
                detail,
            })
    }

    async fn put(&self, label: &str, identity: &Identity) -> Result<(), StoreError> {
        validate_label(label)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                action: "creating wallet directory",
                path: self.dir.clone(),
                source,
            })?;

        let encoded =
            serde_json::to_vec_pretty(&identity.to_record()).map_err(|err| StoreError::Corrupt {
                label: label.to_string(),
                detail: err.to_string(),
            })?;
        let mut suffix = [0u8; 6];
        OsRng.fill_bytes(&mut suffix);
        let tmp = self
            .dir
            .join(format!(".{label}.{}.tmp", hex::encode(suffix)));
        let path = self.entry_path(label);

        let result = self.write_entry(&tmp, &path, &encoded).await;
        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        result
    }
}

async fn restrict_private_permissions(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let permissions = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, permissions)
            .await
            .map_err(|source| StoreError::Io {
                action: "setting permissions on",
                path: path.to_path_buf(),
                source,
            })?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

/// In-process wallet. Writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    entries: RwLock<HashMap<String, Identity>>,
    fail_writes: AtomicBool,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryWallet {
    async fn exists(&self, label: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().await.contains_key(label))
    }

    async fn get(&self, label: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.entries.read().await.get(label).cloned())
    }

    async fn put(&self, label: &str, identity: &Identity) -> Result<(), StoreError> {
        validate_label(label)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("write of {label} refused")));
        }
        self.entries
            .write()
            .await
            .insert(label.to_string(), identity.clone());
        Ok(())
    }
}

/// One [`FileSystemWallet`] per organization under a shared root.
#[derive(Debug, Clone)]
pub struct FileSystemWallets {
    root: PathBuf,
}

impl FileSystemWallets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl WalletProvider for FileSystemWallets {
    fn wallet(&self, org: &Organization) -> Arc<dyn CredentialStore> {
        Arc::new(FileSystemWallet::for_org(&self.root, &org.name))
    }
}

/// One [`MemoryWallet`] per organization, created on first use.
#[derive(Debug, Default)]
pub struct MemoryWallets {
    wallets: Mutex<HashMap<String, Arc<MemoryWallet>>>,
}

impl MemoryWallets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wallet_for(&self, org_name: &str) -> Arc<MemoryWallet> {
        let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
        wallets
            .entry(org_name.to_string())
            .or_insert_with(|| Arc::new(MemoryWallet::new()))
            .clone()
    }
}

impl WalletProvider for MemoryWallets {
    fn wallet(&self, org: &Organization) -> Arc<dyn CredentialStore> {
        self.wallet_for(&org.name)
    }
}
