//! Throwaway Ed25519 identities for tests in this workspace.

use ed25519_dalek::pkcs8::{spki::der::pem::LineEnding, EncodePrivateKey};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use secrecy::SecretString;

use crate::identity::{Identity, Role};

/// A fresh PKCS#8 PEM Ed25519 private key.
pub fn ed25519_key_pem() -> String {
    SigningKey::generate(&mut OsRng)
        .to_pkcs8_pem(LineEnding::LF)
        .expect("encode key")
        .to_string()
}

/// An identity with a fresh key and a placeholder certificate naming `label`.
pub fn ed25519_identity(label: &str, msp_id: &str) -> Identity {
    Identity::new(
        label,
        Role::for_label(label),
        msp_id,
        format!("-----BEGIN CERTIFICATE-----\n{label}\n-----END CERTIFICATE-----\n"),
        SecretString::new(ed25519_key_pem()),
    )
}
