use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use prost::Message;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::channel::{ChannelConfigUpdate, ConfigSignature};
use crate::envelope::proto;
use crate::identity::Identity;

const SIGNATURE_NONCE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("private key of {label} is not a PKCS#8 Ed25519 key: {detail}")]
    UnsupportedKey { label: String, detail: String },
    #[error("signature header could not be decoded: {0}")]
    Header(#[from] prost::DecodeError),
    #[error("signature is malformed")]
    MalformedSignature,
    #[error("signature does not verify")]
    Invalid,
}

impl Identity {
    /// Parses this identity's private key for signing.
    pub fn signing_key(&self) -> Result<SigningKey, SigningError> {
        SigningKey::from_pkcs8_pem(self.private_key.expose_secret()).map_err(|err| {
            SigningError::UnsupportedKey {
                label: self.label.clone(),
                detail: err.to_string(),
            }
        })
    }

    /// Signs arbitrary bytes with this identity's key.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
        let key = self.signing_key()?;
        Ok(key.sign(message).to_bytes().to_vec())
    }
}

/// Protobuf `SerializedIdentity` of `identity`, used as the creator field in
/// signature headers and transaction ids.
#[must_use]
pub fn serialized_identity(identity: &Identity) -> Vec<u8> {
    proto::SerializedIdentity {
        mspid: identity.msp_id.clone(),
        id_bytes: identity.certificate.as_bytes().to_vec(),
    }
    .encode_to_vec()
}

/// Produces `identity`'s signature over `config`.
///
/// The signed bytes are `signature_header || config_update`, with a fresh
/// nonce in every header.
pub fn sign_config(
    identity: &Identity,
    config: &ChannelConfigUpdate,
) -> Result<ConfigSignature, SigningError> {
    let key = identity.signing_key()?;
    let mut nonce = vec![0u8; SIGNATURE_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let signature_header = proto::SignatureHeader {
        creator: serialized_identity(identity),
        nonce,
    }
    .encode_to_vec();

    let mut signed = Vec::with_capacity(signature_header.len() + config.as_bytes().len());
    signed.extend_from_slice(&signature_header);
    signed.extend_from_slice(config.as_bytes());
    let signature = key.sign(&signed);

    Ok(ConfigSignature {
        msp_id: identity.msp_id.clone(),
        signature_header,
        signature: signature.to_bytes().to_vec(),
    })
}

/// Checks `signature` against `config` using the verifying half of `identity`.
pub fn verify_config_signature(
    identity: &Identity,
    config: &ChannelConfigUpdate,
    signature: &ConfigSignature,
) -> Result<(), SigningError> {
    let header = proto::SignatureHeader::decode(signature.signature_header.as_slice())?;
    if header.creator != serialized_identity(identity) {
        return Err(SigningError::Invalid);
    }
    let parsed =
        Signature::from_slice(&signature.signature).map_err(|_| SigningError::MalformedSignature)?;
    let mut signed = signature.signature_header.clone();
    signed.extend_from_slice(config.as_bytes());
    identity
        .signing_key()?
        .verifying_key()
        .verify(&signed, &parsed)
        .map_err(|_| SigningError::Invalid)
}
