//! Decoding of channel configuration transactions.
//!
//! A channel transaction file (as produced by the network's config
//! generator) is a protobuf `Envelope` whose payload carries a
//! `ConfigUpdateEnvelope`. Only the handful of messages needed to reach the
//! `config_update` bytes are declared here; unknown fields are skipped by the
//! decoder.

use prost::Message;
use thiserror::Error;

use crate::channel::ChannelConfigUpdate;

/// `HeaderType::CONFIG_UPDATE` in the ledger's common protos.
pub const HEADER_TYPE_CONFIG_UPDATE: i32 = 2;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to decode {message}: {source}")]
    Decode {
        message: &'static str,
        #[source]
        source: prost::DecodeError,
    },
    #[error("envelope payload has no header")]
    MissingHeader,
    #[error("envelope header type {0} is not CONFIG_UPDATE")]
    NotConfigUpdate(i32),
    #[error("config update envelope carries no config update")]
    EmptyConfigUpdate,
}

pub mod proto {
    //! Hand-declared subset of the ledger's `common` and `msp` protos.

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Envelope {
        #[prost(bytes = "vec", tag = "1")]
        pub payload: Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub signature: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Payload {
        #[prost(message, optional, tag = "1")]
        pub header: Option<Header>,
        #[prost(bytes = "vec", tag = "2")]
        pub data: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Header {
        #[prost(bytes = "vec", tag = "1")]
        pub channel_header: Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub signature_header: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ChannelHeader {
        #[prost(int32, tag = "1")]
        pub r#type: i32,
        #[prost(int32, tag = "2")]
        pub version: i32,
        #[prost(string, tag = "4")]
        pub channel_id: String,
        #[prost(string, tag = "5")]
        pub tx_id: String,
        #[prost(uint64, tag = "6")]
        pub epoch: u64,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConfigUpdateEnvelope {
        #[prost(bytes = "vec", tag = "1")]
        pub config_update: Vec<u8>,
        #[prost(message, repeated, tag = "2")]
        pub signatures: Vec<ConfigSignature>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConfigUpdate {
        #[prost(string, tag = "1")]
        pub channel_id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ConfigSignature {
        #[prost(bytes = "vec", tag = "1")]
        pub signature_header: Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub signature: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SignatureHeader {
        #[prost(bytes = "vec", tag = "1")]
        pub creator: Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub nonce: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SerializedIdentity {
        #[prost(string, tag = "1")]
        pub mspid: String,
        #[prost(bytes = "vec", tag = "2")]
        pub id_bytes: Vec<u8>,
    }
}

/// Extracts the channel configuration update from a `CONFIG_UPDATE`
/// envelope.
pub fn extract_config(envelope_bytes: &[u8]) -> Result<ChannelConfigUpdate, EnvelopeError> {
    let envelope = decode::<proto::Envelope>(envelope_bytes, "envelope")?;
    let payload = decode::<proto::Payload>(&envelope.payload, "payload")?;
    let header = payload.header.ok_or(EnvelopeError::MissingHeader)?;
    let channel_header = decode::<proto::ChannelHeader>(&header.channel_header, "channel header")?;
    if channel_header.r#type != HEADER_TYPE_CONFIG_UPDATE {
        return Err(EnvelopeError::NotConfigUpdate(channel_header.r#type));
    }

    let update_envelope =
        decode::<proto::ConfigUpdateEnvelope>(&payload.data, "config update envelope")?;
    if update_envelope.config_update.is_empty() {
        return Err(EnvelopeError::EmptyConfigUpdate);
    }
    let update = decode::<proto::ConfigUpdate>(&update_envelope.config_update, "config update")?;

    Ok(ChannelConfigUpdate::new(
        update.channel_id,
        update_envelope.config_update,
    ))
}

/// Wraps raw `config_update` bytes into an unsigned `CONFIG_UPDATE`
/// envelope for `channel_id`.
#[must_use]
pub fn config_update_envelope(channel_id: &str, config_update: Vec<u8>) -> Vec<u8> {
    let channel_header = proto::ChannelHeader {
        r#type: HEADER_TYPE_CONFIG_UPDATE,
        version: 0,
        channel_id: channel_id.to_string(),
        tx_id: String::new(),
        epoch: 0,
    };
    let payload = proto::Payload {
        header: Some(proto::Header {
            channel_header: channel_header.encode_to_vec(),
            signature_header: Vec::new(),
        }),
        data: proto::ConfigUpdateEnvelope {
            config_update,
            signatures: Vec::new(),
        }
        .encode_to_vec(),
    };
    proto::Envelope {
        payload: payload.encode_to_vec(),
        signature: Vec::new(),
    }
    .encode_to_vec()
}

fn decode<M: Message + Default>(bytes: &[u8], message: &'static str) -> Result<M, EnvelopeError> {
    M::decode(bytes).map_err(|source| EnvelopeError::Decode { message, source })
}
