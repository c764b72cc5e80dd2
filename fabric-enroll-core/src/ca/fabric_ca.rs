//! HTTP client for a Fabric CA server

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};
use x509_parser::pem::Pem;

use super::csr::generate_csr;
use super::token::generate_auth_token;
use super::wire::{
    EnrollBody, EnrollResult, Envelope, RegisterBody, RegisterResult, ServerInfo, API_PREFIX,
};
use super::{
    CaError, CaInfo, CertificateAuthority, Enrollment, EnrollmentRequest, EnrollmentSecret,
    RegistrationRequest, SigningIdentity,
};

/// Connection settings for [`FabricCaClient`]
#[derive(Debug, Clone)]
pub struct FabricCaOptions {
    /// Base URL, e.g. `https://ca.org2.example.com:7054`
    pub url: String,
    /// CA instance name on a multi-CA server
    pub ca_name: Option<String>,
    /// Trusted roots for the CA's TLS certificate (PEM)
    pub tls_ca_certs: Vec<String>,
    /// Verify the CA's TLS certificate
    pub verify_tls: bool,
    pub timeout: Duration,
}

impl FabricCaOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ca_name: None,
            tls_ca_certs: Vec::new(),
            verify_tls: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Fabric CA REST client
pub struct FabricCaClient {
    name: String,
    base_url: Url,
    ca_name: Option<String>,
    http: Client,
}

impl std::fmt::Debug for FabricCaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricCaClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("ca_name", &self.ca_name)
            .finish()
    }
}

impl FabricCaClient {
    pub fn new(name: impl Into<String>, options: FabricCaOptions) -> Result<Self, CaError> {
        let base_url = Url::parse(&options.url)
            .map_err(|e| CaError::InvalidConfiguration(format!("url '{}': {}", options.url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(CaError::InvalidConfiguration(format!(
                "unsupported scheme '{}'",
                base_url.scheme()
            )));
        }

        let mut builder = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!options.verify_tls);

        for bundle in &options.tls_ca_certs {
            for pem in Pem::iter_from_buffer(bundle.as_bytes()) {
                let pem = pem.map_err(|e| CaError::Tls(format!("{:?}", e)))?;
                let cert = reqwest::Certificate::from_der(&pem.contents)
                    .map_err(|e| CaError::Tls(e.to_string()))?;
                builder = builder.add_root_certificate(cert);
            }
        }

        let http = builder.build().map_err(|e| CaError::Tls(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url,
            ca_name: options.ca_name,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, name: &str) -> Result<Url, CaError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}/{}", base, API_PREFIX, name))
            .map_err(|e| CaError::InvalidConfiguration(e.to_string()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CaError> {
        let response = request
            .send()
            .await
            .map_err(|e| CaError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CaError::Transport(e.to_string()))?;

        let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(CaError::Rejected {
                    status: status.as_u16(),
                    messages: vec![String::from_utf8_lossy(&bytes).trim().to_string()],
                });
            }
            Err(e) => return Err(CaError::InvalidResponse(e.to_string())),
        };

        if !status.is_success() || !envelope.success {
            return Err(CaError::Rejected {
                status: status.as_u16(),
                messages: envelope
                    .errors
                    .into_iter()
                    .map(|m| format!("[{}] {}", m.code, m.message))
                    .collect(),
            });
        }

        envelope
            .result
            .ok_or_else(|| CaError::InvalidResponse("response has no result".to_string()))
    }
}

fn decode_pem_field(field: &str, value: &str) -> Result<String, CaError> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| CaError::InvalidResponse(format!("{}: {}", field, e)))?;
    String::from_utf8(bytes).map_err(|e| CaError::InvalidResponse(format!("{}: {}", field, e)))
}

fn ca_chain(info: &ServerInfo) -> Result<Option<String>, CaError> {
    if info.ca_chain.is_empty() {
        return Ok(None);
    }
    decode_pem_field("CAChain", &info.ca_chain).map(Some)
}

#[async_trait]
impl CertificateAuthority for FabricCaClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn info(&self) -> Result<CaInfo, CaError> {
        let mut url = self.endpoint("cainfo")?;
        if let Some(ca_name) = &self.ca_name {
            url.query_pairs_mut().append_pair("ca", ca_name);
        }

        let info: ServerInfo = self.send(self.http.get(url)).await?;
        Ok(CaInfo {
            ca_chain: ca_chain(&info)?,
            ca_name: info.ca_name,
            version: info.version,
        })
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &SigningIdentity,
    ) -> Result<EnrollmentSecret, CaError> {
        let url = self.endpoint("register")?;
        let body = serde_json::to_vec(&RegisterBody {
            id: request.enrollment_id.clone(),
            kind: request.role.to_string(),
            affiliation: request.affiliation.clone(),
            max_enrollments: request.max_enrollments,
            attrs: request.attributes.clone(),
            caname: self.ca_name.clone(),
        })
        .map_err(|e| CaError::InvalidResponse(e.to_string()))?;

        let token = generate_auth_token(registrar, "POST", url.path(), &body)?;
        debug!(
            ca = %self.name,
            enrollment_id = %request.enrollment_id,
            registrar = %registrar.label,
            "sending register request"
        );

        let result: RegisterResult = self
            .send(
                self.http
                    .post(url)
                    .header(AUTHORIZATION, token)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body),
            )
            .await?;

        Ok(EnrollmentSecret::new(result.secret))
    }

    async fn enroll(&self, request: EnrollmentRequest) -> Result<Enrollment, CaError> {
        let url = self.endpoint("enroll")?;
        let csr = generate_csr(&request.enrollment_id)?;

        let result: EnrollResult = self
            .send(
                self.http
                    .post(url)
                    .basic_auth(&request.enrollment_id, Some(request.secret.expose()))
                    .json(&EnrollBody {
                        certificate_request: csr.csr_pem.clone(),
                        caname: self.ca_name.clone(),
                    }),
            )
            .await?;

        let certificate = decode_pem_field("Cert", &result.cert)?;
        let ca_chain = match &result.server_info {
            Some(info) => ca_chain(info)?,
            None => None,
        };

        info!(
            ca = %self.name,
            enrollment_id = %request.enrollment_id,
            "enrollment certificate issued"
        );

        Ok(Enrollment {
            certificate,
            private_key: csr.private_key.clone(),
            ca_chain,
        })
    }
}
