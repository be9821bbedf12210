use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Certificate, Client, RequestBuilder, Response, StatusCode, Url};

use chanprov_core::{serialized_identity, Identity};

use crate::error::NetError;

pub(crate) const MSP_ID_HEADER: &str = "X-Msp-Id";
pub(crate) const CREATOR_HEADER: &str = "X-Creator";
pub(crate) const SIGNATURE_HEADER: &str = "X-Signature";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every HTTP client the workflow builds.
#[derive(Clone, Copy, Debug)]
pub struct TransportConfig {
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// A remote gateway reached over TLS anchored at a single trust root.
#[derive(Clone, Debug)]
pub struct Endpoint {
    name: String,
    base_url: Url,
    client: Client,
}

impl Endpoint {
    /// Builds a client trusting only `tls_trust_root`.
    ///
    /// When `server_hostname` is set and the URL names a literal address (or
    /// `localhost`), requests are addressed to `server_hostname` and resolved
    /// to that address so certificate verification uses the override name.
    pub fn new(
        name: impl Into<String>,
        url: &str,
        tls_trust_root: &[u8],
        server_hostname: Option<&str>,
        transport: &TransportConfig,
    ) -> Result<Self, NetError> {
        let name = name.into();
        let invalid_url = |detail: String| NetError::InvalidUrl {
            endpoint: name.clone(),
            url: url.to_string(),
            detail,
        };
        let mut base_url = Url::parse(url).map_err(|err| invalid_url(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid_url("URL cannot be used as a base".into()));
        }

        if !contains_pem_certificate(tls_trust_root) {
            return Err(NetError::Tls {
                endpoint: name.clone(),
                detail: "trust root holds no PEM certificate".into(),
            });
        }
        let certificate = Certificate::from_pem(tls_trust_root).map_err(|err| NetError::Tls {
            endpoint: name.clone(),
            detail: err.to_string(),
        })?;
        let mut builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(certificate)
            .timeout(transport.request_timeout);

        if let Some(hostname) = server_hostname {
            if let Some(addr) = literal_socket_addr(&base_url) {
                builder = builder.resolve(hostname, addr);
                base_url
                    .set_host(Some(hostname))
                    .map_err(|err| invalid_url(err.to_string()))?;
            }
        }

        let client = builder.build().map_err(|err| NetError::Tls {
            endpoint: name.clone(),
            detail: err.to_string(),
        })?;

        Ok(Self {
            name,
            base_url,
            client,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, NetError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NetError::InvalidUrl {
                endpoint: self.name.clone(),
                url: self.base_url.to_string(),
                detail: "URL is not a base".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attaches the signer's MSP id, serialized identity and signature over
    /// `signed` to `request`.
    pub(crate) fn sign_request(
        &self,
        request: RequestBuilder,
        signer: &Identity,
        signed: &[u8],
    ) -> Result<RequestBuilder, NetError> {
        let signature = signer.sign(signed).map_err(|source| NetError::Signing {
            endpoint: self.name.clone(),
            source,
        })?;
        Ok(request
            .header(MSP_ID_HEADER, signer.msp_id.as_str())
            .header(CREATOR_HEADER, STANDARD.encode(serialized_identity(signer)))
            .header(SIGNATURE_HEADER, STANDARD.encode(signature)))
    }

    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, NetError> {
        request
            .send()
            .await
            .map_err(|source| NetError::Unreachable {
                endpoint: self.name.clone(),
                source,
            })
    }

    /// Converts an unsuccessful response into an error carrying its body.
    pub(crate) async fn failure(&self, response: Response) -> NetError {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        self.status_error(status, detail)
    }

    pub(crate) fn status_error(&self, status: StatusCode, detail: String) -> NetError {
        if status.is_server_error() {
            NetError::Unavailable {
                endpoint: self.name.clone(),
                status: status.as_u16(),
                detail,
            }
        } else {
            NetError::Rejected {
                endpoint: self.name.clone(),
                status: status.as_u16(),
                detail,
            }
        }
    }

    pub(crate) fn protocol(&self, detail: impl Into<String>) -> NetError {
        NetError::Protocol {
            endpoint: self.name.clone(),
            detail: detail.into(),
        }
    }
}

fn contains_pem_certificate(pem: &[u8]) -> bool {
    const MARKER: &[u8] = b"-----BEGIN CERTIFICATE-----";
    pem.windows(MARKER.len()).any(|window| window == MARKER)
}

fn literal_socket_addr(url: &Url) -> Option<SocketAddr> {
    let port = url.port_or_known_default()?;
    let ip = match url.host_str()? {
        "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        host => host.trim_matches(|c| c == '[' || c == ']').parse().ok()?,
    };
    Some(SocketAddr::new(ip, port))
}
