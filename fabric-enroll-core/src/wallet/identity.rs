//! X.509 identity record as stored in a wallet
//!
//! The serialized form is the JSON document Fabric SDKs write for an
//! identity: `{"credentials":{"certificate","privateKey"},"mspId","type","version"}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use x509_parser::pem::parse_x509_pem;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identity type tag for X.509 credentials
pub const X509_IDENTITY_TYPE: &str = "X.509";

/// Current identity document version
pub const IDENTITY_VERSION: u32 = 1;

/// Maximum accepted certificate PEM size
pub const MAX_CERT_PEM_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid MSP id: {0}")]
    InvalidMspId(String),
}

/// PEM-encoded private key, wiped from memory on drop
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct PrivateKeyPem(String);

impl PrivateKeyPem {
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    /// Raw PEM text. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn check(&self) -> Result<(), IdentityError> {
        let pem = self.0.trim();
        if !pem.starts_with("-----BEGIN") || !pem.contains("PRIVATE KEY-----") {
            return Err(IdentityError::InvalidPrivateKey(
                "expected a PEM encoded private key".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for PrivateKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyPem(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub certificate: String,
    #[serde(rename = "privateKey")]
    pub private_key: PrivateKeyPem,
}

/// A certificate + key pair belonging to an MSP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509Identity {
    pub credentials: Credentials,
    #[serde(rename = "mspId")]
    pub msp_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
}

impl X509Identity {
    /// Build an identity, checking that the certificate is parseable X.509
    pub fn new(
        msp_id: impl Into<String>,
        certificate: impl Into<String>,
        private_key: PrivateKeyPem,
    ) -> Result<Self, IdentityError> {
        let identity = Self {
            credentials: Credentials {
                certificate: certificate.into(),
                private_key,
            },
            msp_id: msp_id.into(),
            kind: X509_IDENTITY_TYPE.to_string(),
            version: IDENTITY_VERSION,
        };
        identity.check()?;
        Ok(identity)
    }

    pub fn certificate(&self) -> &str {
        &self.credentials.certificate
    }

    pub fn private_key(&self) -> &PrivateKeyPem {
        &self.credentials.private_key
    }

    /// Subject common name of the certificate
    pub fn common_name(&self) -> Result<String, IdentityError> {
        certificate_common_name(&self.credentials.certificate)
    }

    /// Structural validation of every field
    pub fn check(&self) -> Result<(), IdentityError> {
        if self.msp_id.trim().is_empty() {
            return Err(IdentityError::InvalidMspId("must not be empty".to_string()));
        }
        self.credentials.private_key.check()?;
        self.common_name().map(|_| ())
    }
}

/// Extract the subject CN from a PEM certificate
pub fn certificate_common_name(pem: &str) -> Result<String, IdentityError> {
    if pem.len() > MAX_CERT_PEM_SIZE {
        return Err(IdentityError::InvalidCertificate(format!(
            "certificate too large: {} bytes (max {})",
            pem.len(),
            MAX_CERT_PEM_SIZE
        )));
    }

    let (_, block) = parse_x509_pem(pem.as_bytes())
        .map_err(|e| IdentityError::InvalidCertificate(format!("{:?}", e)))?;
    let cert = block
        .parse_x509()
        .map_err(|e| IdentityError::InvalidCertificate(format!("{:?}", e)))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .ok_or_else(|| IdentityError::InvalidCertificate("subject has no common name".to_string()))?;

    Ok(common_name.to_string())
}
