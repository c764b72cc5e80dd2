//! Throwaway certificate authority backed by rcgen

use anyhow::{Context, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose,
};

use crate::ca::generate_csr;
use crate::wallet::X509Identity;

/// Self-signed root that issues enrollment certificates
pub struct TestCa {
    name: String,
    key_pair: KeyPair,
    certificate: Certificate,
}

impl TestCa {
    pub fn new(name: &str) -> Result<Self> {
        let key_pair = KeyPair::generate().context("generating CA key")?;

        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let certificate = params
            .self_signed(&key_pair)
            .context("self-signing CA certificate")?;

        Ok(Self {
            name: name.to_string(),
            key_pair,
            certificate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn certificate_pem(&self) -> String {
        self.certificate.pem()
    }

    /// Issue a certificate for a PEM CSR, keeping the CSR's subject
    pub fn sign_csr(&self, csr_pem: &str) -> Result<String> {
        let csr = CertificateSigningRequestParams::from_pem(csr_pem).context("parsing CSR")?;
        let certificate = csr
            .signed_by(&self.certificate, &self.key_pair)
            .context("signing CSR")?;
        Ok(certificate.pem())
    }

    /// Fresh key plus certificate with subject `CN=<common_name>`
    pub fn issue_identity(&self, common_name: &str, msp_id: &str) -> Result<X509Identity> {
        let csr = generate_csr(common_name)?;
        let certificate = self.sign_csr(&csr.csr_pem)?;
        Ok(X509Identity::new(msp_id, certificate, csr.private_key.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::certificate_common_name;
    use x509_parser::pem::parse_x509_pem;

    #[test]
    fn test_issued_certificate_chains_to_ca() {
        let ca = TestCa::new("ca.org2").unwrap();
        let identity = ca.issue_identity("user1", "org2msp").unwrap();

        let (_, pem) = parse_x509_pem(identity.certificate().as_bytes()).unwrap();
        let cert = pem.parse_x509().unwrap();
        let issuer = cert.issuer().iter_common_name().next().unwrap();
        assert_eq!(issuer.as_str().unwrap(), "ca.org2");

        assert_eq!(certificate_common_name(&ca.certificate_pem()).unwrap(), "ca.org2");
    }
}
