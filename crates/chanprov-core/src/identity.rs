use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

const WALLET_IDENTITY_TYPE: &str = "X.509";
const WALLET_RECORD_VERSION: u32 = 1;

/// Returns the label used for an organization's CA-enrolled administrator.
#[must_use]
pub fn org_admin_label(org_name: &str) -> String {
    format!("{org_name}-admin")
}

/// Returns the label of the admin imported from offline-generated crypto
/// material. It never coincides with the registrar's label or with
/// [`org_admin_label`].
#[must_use]
pub fn loaded_admin_label(org_name: &str) -> String {
    format!("peer{org_name}Admin")
}

/// Role an identity is registered with at its certificate authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    /// Infers the role from a label: anything ending in `-admin` is an
    /// administrator, everything else a client.
    #[must_use]
    pub fn for_label(label: &str) -> Self {
        if label.ends_with("-admin") {
            Self::Admin
        } else {
            Self::Client
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "client" => Ok(Self::Client),
            other => Err(format!("unknown role {other:?}; expected admin or client")),
        }
    }
}

/// One-time secret returned by `register` and consumed by the following
/// `enroll`. Deliberately not serializable.
pub struct EnrollmentSecret(SecretString);

impl EnrollmentSecret {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::new(secret.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<SecretString> for EnrollmentSecret {
    fn from(value: SecretString) -> Self {
        Self(value)
    }
}

impl fmt::Debug for EnrollmentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnrollmentSecret([REDACTED])")
    }
}

/// A signing credential bound to one organization.
#[derive(Clone)]
pub struct Identity {
    pub label: String,
    pub role: Role,
    pub msp_id: String,
    /// PEM encoded enrollment certificate.
    pub certificate: String,
    /// PKCS#8 PEM encoded private key.
    pub private_key: SecretString,
}

impl Identity {
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        role: Role,
        msp_id: impl Into<String>,
        certificate: impl Into<String>,
        private_key: SecretString,
    ) -> Self {
        Self {
            label: label.into(),
            role,
            msp_id: msp_id.into(),
            certificate: certificate.into(),
            private_key,
        }
    }

    /// Converts into the on-disk wallet representation.
    #[must_use]
    pub fn to_record(&self) -> WalletRecord {
        WalletRecord {
            msp_id: self.msp_id.clone(),
            kind: WALLET_IDENTITY_TYPE.to_string(),
            version: WALLET_RECORD_VERSION,
            role: Some(self.role),
            credentials: WalletCredentials {
                certificate: self.certificate.clone(),
                private_key: self.private_key.expose_secret().clone(),
            },
        }
    }

    /// Rebuilds an identity from a wallet record stored under `label`.
    pub fn from_record(label: &str, record: WalletRecord) -> Result<Self, String> {
        if record.kind != WALLET_IDENTITY_TYPE {
            return Err(format!("unsupported identity type {:?}", record.kind));
        }
        if record.version != WALLET_RECORD_VERSION {
            return Err(format!("unsupported wallet record version {}", record.version));
        }
        if record.credentials.certificate.trim().is_empty()
            || record.credentials.private_key.trim().is_empty()
        {
            return Err("wallet record is missing its certificate or private key".to_string());
        }
        Ok(Self {
            label: label.to_string(),
            role: record.role.unwrap_or_else(|| Role::for_label(label)),
            msp_id: record.msp_id,
            certificate: record.credentials.certificate,
            private_key: SecretString::new(record.credentials.private_key),
        })
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("label", &self.label)
            .field("role", &self.role)
            .field("msp_id", &self.msp_id)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
            && self.role == other.role
            && self.msp_id == other.msp_id
            && self.certificate == other.certificate
            && self.private_key.expose_secret() == other.private_key.expose_secret()
    }
}

impl Eq for Identity {}

/// Wallet identity file format, shared with the ledger SDK's file wallets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub msp_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub credentials: WalletCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCredentials {
    pub certificate: String,
    pub private_key: String,
}
