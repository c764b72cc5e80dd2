//! Common connection profile (JSON)

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::GatewayError;

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub organizations: HashMap<String, Organization>,
    #[serde(default)]
    pub peers: HashMap<String, NodeConfig>,
    #[serde(rename = "certificateAuthorities", default)]
    pub certificate_authorities: HashMap<String, CaConfig>,

    /// Directory relative TLS certificate paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientSection {
    #[serde(default)]
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub mspid: String,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(rename = "certificateAuthorities", default)]
    pub certificate_authorities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub url: String,
    #[serde(rename = "tlsCACerts", default)]
    pub tls_ca_certs: Option<TlsCaCerts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaConfig {
    pub url: String,
    #[serde(rename = "caName", default)]
    pub ca_name: Option<String>,
    #[serde(rename = "tlsCACerts", default)]
    pub tls_ca_certs: Option<TlsCaCerts>,
    #[serde(rename = "httpOptions", default)]
    pub http_options: HttpOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsCaCerts {
    #[serde(default)]
    pub pem: Option<PemList>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Profiles carry either one PEM string or a list of them
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PemList {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpOptions {
    #[serde(default = "default_verify")]
    pub verify: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            verify: default_verify(),
        }
    }
}

fn default_verify() -> bool {
    true
}

impl ConnectionProfile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| GatewayError::ProfileRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut profile = Self::from_json_str(&contents)?;
        profile.base_dir = path.parent().map(Path::to_path_buf);
        Ok(profile)
    }

    pub fn from_json_str(json: &str) -> Result<Self, GatewayError> {
        let profile: Self =
            serde_json::from_str(json).map_err(|e| GatewayError::ProfileParse(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Every reference in the profile must resolve
    pub fn validate(&self) -> Result<(), GatewayError> {
        let org_name = self.client_organization_name()?;
        let org = self.organization(org_name)?;

        if org.certificate_authorities.is_empty() {
            return Err(GatewayError::InvalidProfile(format!(
                "organization '{}' lists no certificate authorities",
                org_name
            )));
        }

        for (name, org) in &self.organizations {
            for ca in &org.certificate_authorities {
                if !self.certificate_authorities.contains_key(ca) {
                    return Err(GatewayError::InvalidProfile(format!(
                        "organization '{}' references unknown CA '{}'",
                        name, ca
                    )));
                }
            }
            for peer in &org.peers {
                if !self.peers.contains_key(peer) {
                    return Err(GatewayError::InvalidProfile(format!(
                        "organization '{}' references unknown peer '{}'",
                        name, peer
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn client_organization_name(&self) -> Result<&str, GatewayError> {
        self.client
            .organization
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidProfile("client.organization is not set".into()))
    }

    pub fn organization(&self, name: &str) -> Result<&Organization, GatewayError> {
        self.organizations.get(name).ok_or_else(|| {
            GatewayError::InvalidProfile(format!("unknown organization '{}'", name))
        })
    }

    /// First CA listed for the client organization
    pub fn client_ca(&self) -> Result<(&str, &CaConfig), GatewayError> {
        let org_name = self.client_organization_name()?;
        let org = self.organization(org_name)?;
        let ca_name = org.certificate_authorities.first().ok_or_else(|| {
            GatewayError::InvalidProfile(format!(
                "organization '{}' lists no certificate authorities",
                org_name
            ))
        })?;
        let ca = self.certificate_authorities.get(ca_name).ok_or_else(|| {
            GatewayError::InvalidProfile(format!("unknown CA '{}'", ca_name))
        })?;
        Ok((ca_name.as_str(), ca))
    }

    /// Load the PEM roots referenced by `certs`
    pub fn tls_roots(&self, certs: Option<&TlsCaCerts>) -> Result<Vec<String>, GatewayError> {
        let Some(certs) = certs else {
            return Ok(Vec::new());
        };

        let mut roots = match &certs.pem {
            Some(PemList::One(pem)) => vec![pem.clone()],
            Some(PemList::Many(pems)) => pems.clone(),
            None => Vec::new(),
        };

        if let Some(path) = &certs.path {
            let path = match &self.base_dir {
                Some(base) if path.is_relative() => base.join(path),
                _ => path.clone(),
            };
            let pem = std::fs::read_to_string(&path).map_err(|e| GatewayError::ProfileRead {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            roots.push(pem);
        }

        Ok(roots)
    }
}
