//! Certificate Authority client API
//!
//! The bootstrapper talks to a CA through [`CertificateAuthority`]: register a
//! new enrollment id (authenticated by a registrar identity), then exchange the
//! one-time secret for a certificate. [`FabricCaClient`] implements it over the
//! Fabric CA REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::wallet::{PrivateKeyPem, X509Identity};

pub mod csr;
pub mod fabric_ca;
pub mod token;
pub(crate) mod wire;

pub use csr::{generate_csr, CsrBundle};
pub use fabric_ca::{FabricCaClient, FabricCaOptions};
pub use token::{generate_auth_token, verify_auth_token};

#[derive(Debug, Error)]
pub enum CaError {
    #[error("CA unreachable: {0}")]
    Transport(String),

    #[error("CA rejected request (HTTP {}): {}", .status, .messages.join("; "))]
    Rejected { status: u16, messages: Vec<String> },

    #[error("Invalid CA response: {0}")]
    InvalidResponse(String),

    #[error("Failed to sign request: {0}")]
    Signing(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Invalid CA configuration: {0}")]
    InvalidConfiguration(String),
}

/// Identity type requested at registration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityRole {
    #[default]
    Client,
    Peer,
    Orderer,
    Admin,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown identity role '{0}'")]
pub struct UnknownRole(pub String);

impl IdentityRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityRole::Client => "client",
            IdentityRole::Peer => "peer",
            IdentityRole::Orderer => "orderer",
            IdentityRole::Admin => "admin",
            IdentityRole::User => "user",
        }
    }
}

impl FromStr for IdentityRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client" => Ok(IdentityRole::Client),
            "peer" => Ok(IdentityRole::Peer),
            "orderer" => Ok(IdentityRole::Orderer),
            "admin" => Ok(IdentityRole::Admin),
            "user" => Ok(IdentityRole::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for IdentityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute attached to a registered identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    /// Include the attribute in enrollment certificates by default
    #[serde(default)]
    pub ecert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub enrollment_id: String,
    pub affiliation: String,
    pub role: IdentityRole,
    pub max_enrollments: Option<i32>,
    pub attributes: Vec<Attribute>,
}

impl RegistrationRequest {
    pub fn new(
        enrollment_id: impl Into<String>,
        affiliation: impl Into<String>,
        role: IdentityRole,
    ) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            affiliation: affiliation.into(),
            role,
            max_enrollments: None,
            attributes: Vec::new(),
        }
    }
}

/// One-time secret issued by registration
///
/// Not `Clone`: it is moved into exactly one [`EnrollmentRequest`] and wiped
/// when that request is dropped.
#[derive(PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EnrollmentSecret(String);

impl EnrollmentSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EnrollmentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnrollmentSecret(<redacted>)")
    }
}

#[derive(Debug)]
pub struct EnrollmentRequest {
    pub enrollment_id: String,
    pub secret: EnrollmentSecret,
}

/// Certificate and key produced by a successful enrollment
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub certificate: String,
    pub private_key: PrivateKeyPem,
    /// PEM chain of the issuing CA, when the server returns one
    pub ca_chain: Option<String>,
}

/// Basic facts a CA reports about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaInfo {
    pub ca_name: String,
    pub ca_chain: Option<String>,
    pub version: Option<String>,
}

/// Identity used to authenticate CA requests
#[derive(Debug, Clone)]
pub struct SigningIdentity {
    pub label: String,
    pub identity: X509Identity,
}

impl SigningIdentity {
    pub fn new(label: impl Into<String>, identity: X509Identity) -> Self {
        Self {
            label: label.into(),
            identity,
        }
    }

    pub fn msp_id(&self) -> &str {
        &self.identity.msp_id
    }
}

/// Abstract certificate authority client
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Name the CA is known by in the connection profile
    fn name(&self) -> &str;

    async fn info(&self) -> Result<CaInfo, CaError>;

    /// Register `request.enrollment_id`, authenticated as `registrar`
    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &SigningIdentity,
    ) -> Result<EnrollmentSecret, CaError>;

    /// Exchange a one-time secret for a certificate and a fresh private key
    async fn enroll(&self, request: EnrollmentRequest) -> Result<Enrollment, CaError>;
}

/// Shared handle to a CA client
pub type CaHandle = Arc<dyn CertificateAuthority>;
