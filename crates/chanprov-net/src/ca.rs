//! Certificate authority client: `register` issues a one-time secret for a
//! new identity, `enroll` trades a secret for a signed certificate.

use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ED25519};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Response;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chanprov_core::{CaEndpoint, EnrollmentSecret, Identity, Role};

use crate::endpoint::{Endpoint, TransportConfig};
use crate::error::NetError;

/// Attributes of an identity to register with the CA.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub enrollment_id: String,
    pub role: Role,
    pub affiliation: String,
    /// `None` leaves the CA's default in place.
    pub max_enrollments: Option<u32>,
}

/// Certificate and freshly generated private key returned by `enroll`.
pub struct Enrollment {
    /// PEM encoded certificate.
    pub certificate: String,
    /// PKCS#8 PEM encoded private key.
    pub private_key: SecretString,
}

impl fmt::Debug for Enrollment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enrollment")
            .field("certificate", &self.certificate)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
pub trait CaClient: Send + Sync {
    /// Registers a new identity on behalf of `registrar`.
    async fn register(
        &self,
        registrar: &Identity,
        request: &RegistrationRequest,
    ) -> Result<EnrollmentSecret, NetError>;

    async fn enroll(
        &self,
        enrollment_id: &str,
        secret: &EnrollmentSecret,
    ) -> Result<Enrollment, NetError>;
}

/// [`CaClient`] speaking the CA's REST API.
#[derive(Clone, Debug)]
pub struct HttpCaClient {
    endpoint: Endpoint,
    ca_name: String,
}

#[derive(Serialize)]
struct EnrollBody<'a> {
    certificate_request: &'a str,
    caname: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    affiliation: &'a str,
    caname: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_enrollments: Option<u32>,
}

#[derive(Deserialize)]
struct CaResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    errors: Vec<CaMessage>,
}

#[derive(Deserialize)]
struct CaMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct EnrollResult {
    #[serde(rename = "Cert")]
    cert: String,
}

#[derive(Deserialize)]
struct RegisterResult {
    secret: String,
}

impl HttpCaClient {
    pub fn new(ca: &CaEndpoint, transport: &TransportConfig) -> Result<Self, NetError> {
        let endpoint = Endpoint::new(
            format!("ca {}", ca.name),
            &ca.url,
            &ca.tls_trust_root,
            None,
            transport,
        )?;
        Ok(Self::with_endpoint(endpoint, ca.name.clone()))
    }

    #[must_use]
    pub fn with_endpoint(endpoint: Endpoint, ca_name: impl Into<String>) -> Self {
        Self {
            endpoint,
            ca_name: ca_name.into(),
        }
    }

    async fn read_result<T: DeserializeOwned>(&self, response: Response) -> Result<T, NetError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| NetError::Unreachable {
                endpoint: self.endpoint.name().to_string(),
                source,
            })?;
        if status.is_server_error() {
            return Err(self.endpoint.status_error(status, body));
        }

        let parsed: CaResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(self.endpoint.status_error(status, body)),
            Err(err) => return Err(self.endpoint.protocol(format!("decoding CA response: {err}"))),
        };
        if !status.is_success() || !parsed.success {
            let detail = if parsed.errors.is_empty() {
                body
            } else {
                parsed
                    .errors
                    .iter()
                    .map(|error| format!("{}: {}", error.code, error.message))
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return Err(NetError::Rejected {
                endpoint: self.endpoint.name().to_string(),
                status: status.as_u16(),
                detail,
            });
        }

        serde_json::from_value(parsed.result)
            .map_err(|err| self.endpoint.protocol(format!("decoding CA result: {err}")))
    }
}

#[async_trait]
impl CaClient for HttpCaClient {
    async fn register(
        &self,
        registrar: &Identity,
        request: &RegistrationRequest,
    ) -> Result<EnrollmentSecret, NetError> {
        let url = self.endpoint.url(&["api", "v1", "register"])?;
        let body = serde_json::to_vec(&RegisterBody {
            id: &request.enrollment_id,
            kind: request.role.as_str(),
            affiliation: &request.affiliation,
            caname: &self.ca_name,
            max_enrollments: request.max_enrollments,
        })
        .map_err(|err| self.endpoint.protocol(format!("encoding register body: {err}")))?;

        // token = b64(cert) "." b64(sig(b64(body) "." b64(cert)))
        let encoded_cert = STANDARD.encode(registrar.certificate.as_bytes());
        let signed = format!("{}.{}", STANDARD.encode(&body), encoded_cert);
        let signature = registrar
            .sign(signed.as_bytes())
            .map_err(|source| NetError::Signing {
                endpoint: self.endpoint.name().to_string(),
                source,
            })?;
        let token = format!("{encoded_cert}.{}", STANDARD.encode(signature));

        debug!(
            ca = %self.ca_name,
            enrollment_id = %request.enrollment_id,
            role = %request.role,
            "registering identity"
        );
        let http_request = self
            .endpoint
            .client()
            .post(url)
            .header(AUTHORIZATION, token)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let response = self.endpoint.send(http_request).await?;
        let result: RegisterResult = self.read_result(response).await?;
        Ok(EnrollmentSecret::new(result.secret))
    }

    async fn enroll(
        &self,
        enrollment_id: &str,
        secret: &EnrollmentSecret,
    ) -> Result<Enrollment, NetError> {
        let url = self.endpoint.url(&["api", "v1", "enroll"])?;
        let key_pair = KeyPair::generate_for(&PKCS_ED25519)
            .map_err(|err| NetError::KeyGeneration(err.to_string()))?;
        let csr = certificate_request(enrollment_id, &key_pair)?;

        debug!(ca = %self.ca_name, enrollment_id, "enrolling identity");
        let request = self
            .endpoint
            .client()
            .post(url)
            .basic_auth(enrollment_id, Some(secret.expose()))
            .json(&EnrollBody {
                certificate_request: &csr,
                caname: &self.ca_name,
            });
        let response = self.endpoint.send(request).await?;
        let result: EnrollResult = self.read_result(response).await?;

        let certificate = STANDARD
            .decode(result.cert.as_bytes())
            .ok()
            .and_then(|pem| String::from_utf8(pem).ok())
            .ok_or_else(|| self.endpoint.protocol("enrollment certificate is not base64 PEM"))?;

        Ok(Enrollment {
            certificate,
            private_key: SecretString::new(key_pair.serialize_pem()),
        })
    }
}

fn certificate_request(common_name: &str, key_pair: &KeyPair) -> Result<String, NetError> {
    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|err| NetError::KeyGeneration(err.to_string()))?;
    let mut subject = DistinguishedName::new();
    subject.push(DnType::CommonName, common_name.to_string());
    params.distinguished_name = subject;
    params
        .serialize_request(key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|err| NetError::KeyGeneration(err.to_string()))
}
