//! Key pair and certificate signing request generation
//!
//! Enrollment keys are fresh ECDSA P-256 keys generated by rcgen; the CSR
//! subject is `CN=<enrollment id>`, which Fabric CA copies into the issued
//! certificate.

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

use super::CaError;
use crate::wallet::PrivateKeyPem;

/// A CSR together with the private key that signed it
pub struct CsrBundle {
    pub csr_pem: String,
    pub private_key: PrivateKeyPem,
}

impl std::fmt::Debug for CsrBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrBundle")
            .field("csr_pem_len", &self.csr_pem.len())
            .finish_non_exhaustive()
    }
}

/// Generate a new P-256 key and a CSR for `common_name`
pub fn generate_csr(common_name: &str) -> Result<CsrBundle, CaError> {
    let key_pair = KeyPair::generate().map_err(|e| CaError::KeyGeneration(e.to_string()))?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| CaError::KeyGeneration(e.to_string()))?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    let csr_pem = params
        .serialize_request(&key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|e| CaError::KeyGeneration(format!("CSR: {}", e)))?;

    Ok(CsrBundle {
        csr_pem,
        private_key: PrivateKeyPem::new(key_pair.serialize_pem()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::CertificateSigningRequestParams;

    #[test]
    fn test_csr_carries_common_name() {
        let bundle = generate_csr("user1").unwrap();
        assert!(bundle.csr_pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
        assert!(bundle.private_key.expose().contains("BEGIN PRIVATE KEY"));

        let parsed = CertificateSigningRequestParams::from_pem(&bundle.csr_pem).unwrap();
        let cn = parsed
            .params
            .distinguished_name
            .get(&DnType::CommonName)
            .cloned();
        assert_eq!(cn, Some(rcgen::DnValue::Utf8String("user1".to_string())));
    }

    #[test]
    fn test_every_csr_gets_a_fresh_key() {
        let a = generate_csr("user1").unwrap();
        let b = generate_csr("user1").unwrap();
        assert_ne!(a.private_key.expose(), b.private_key.expose());
    }
}
