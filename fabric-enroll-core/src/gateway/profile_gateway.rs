//! Gateway backed by a static connection profile

use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::profile::ConnectionProfile;
use super::{
    ConnectOptions, DiscoveryOptions, Gateway, GatewayError, GatewaySession, PeerEndpoint,
};
use crate::ca::{CaHandle, CertificateAuthority, FabricCaClient, FabricCaOptions, SigningIdentity};

enum ProfileSource {
    Loaded(Arc<ConnectionProfile>),
    /// Read on each connect, so runs that never connect never touch the file
    File(PathBuf),
}

pub struct ProfileGateway {
    source: ProfileSource,
    request_timeout: Duration,
}

impl ProfileGateway {
    pub fn new(profile: ConnectionProfile, request_timeout: Duration) -> Self {
        Self {
            source: ProfileSource::Loaded(Arc::new(profile)),
            request_timeout,
        }
    }

    /// Gateway over the profile at `path`, read when a session is opened
    pub fn from_file(path: impl AsRef<Path>, request_timeout: Duration) -> Self {
        Self {
            source: ProfileSource::File(path.as_ref().to_path_buf()),
            request_timeout,
        }
    }

    /// Profile file this gateway reads, if it was not given a loaded profile
    pub fn profile_path(&self) -> Option<&Path> {
        match &self.source {
            ProfileSource::Loaded(_) => None,
            ProfileSource::File(path) => Some(path),
        }
    }

    fn load_profile(&self) -> Result<Arc<ConnectionProfile>, GatewayError> {
        match &self.source {
            ProfileSource::Loaded(profile) => Ok(Arc::clone(profile)),
            ProfileSource::File(path) => {
                let profile = ConnectionProfile::from_file(path)?;
                debug!(path = %path.display(), "connection profile loaded");
                Ok(Arc::new(profile))
            }
        }
    }

    fn build_ca_client(&self, profile: &ConnectionProfile) -> Result<FabricCaClient, GatewayError> {
        let (name, ca) = profile.client_ca()?;
        let options = FabricCaOptions {
            url: ca.url.clone(),
            ca_name: ca.ca_name.clone(),
            tls_ca_certs: profile.tls_roots(ca.tls_ca_certs.as_ref())?,
            verify_tls: ca.http_options.verify,
            timeout: self.request_timeout,
        };
        if !options.verify_tls {
            warn!(ca = %name, "TLS verification disabled for certificate authority");
        }
        FabricCaClient::new(name, options).map_err(GatewayError::CaUnavailable)
    }
}

fn peer_endpoints(
    profile: &ConnectionProfile,
    discovery: DiscoveryOptions,
) -> Result<Vec<PeerEndpoint>, GatewayError> {
    let org = profile.organization(profile.client_organization_name()?)?;

    org.peers
        .iter()
        .filter_map(|name| profile.peers.get(name).map(|peer| (name, peer)))
        .map(|(name, peer)| {
            let url = if discovery.as_localhost {
                rewrite_to_localhost(&peer.url)?
            } else {
                peer.url.clone()
            };
            Ok(PeerEndpoint {
                name: name.clone(),
                url,
            })
        })
        .collect()
}

fn rewrite_to_localhost(url: &str) -> Result<String, GatewayError> {
    let mut parsed = Url::parse(url)
        .map_err(|e| GatewayError::InvalidProfile(format!("peer url '{}': {}", url, e)))?;
    parsed
        .set_host(Some("localhost"))
        .map_err(|e| GatewayError::InvalidProfile(format!("peer url '{}': {}", url, e)))?;
    Ok(parsed.to_string())
}

#[async_trait]
impl Gateway for ProfileGateway {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Box<dyn GatewaySession>, GatewayError> {
        let identity = options
            .wallet
            .get(&options.identity)
            .await?
            .ok_or_else(|| GatewayError::IdentityNotFound(options.identity.clone()))?;

        let profile = self.load_profile()?;
        let org_name = profile.client_organization_name()?;
        let org = profile.organization(org_name)?;
        if org.mspid != identity.msp_id {
            warn!(
                identity = %options.identity,
                identity_msp = %identity.msp_id,
                organization_msp = %org.mspid,
                "identity MSP differs from the profile's client organization"
            );
        }

        debug!(
            enabled = options.discovery.enabled,
            as_localhost = options.discovery.as_localhost,
            "discovery options"
        );

        let ca = self.build_ca_client(&profile)?;
        let ca_info = ca.info().await.map_err(GatewayError::CaUnavailable)?;
        debug!(
            ca = %ca.name(),
            ca_name = %ca_info.ca_name,
            version = ?ca_info.version,
            "CA reachable"
        );

        let endpoints = peer_endpoints(&profile, options.discovery)?;

        info!(
            identity = %options.identity,
            organization = %org_name,
            peers = endpoints.len(),
            "Gateway session opened"
        );

        Ok(Box::new(ProfileSession {
            identity: SigningIdentity::new(options.identity, identity),
            ca: Arc::new(ca),
            endpoints,
            closed: false,
        }))
    }
}

/// Session opened by [`ProfileGateway`]
pub struct ProfileSession {
    identity: SigningIdentity,
    ca: CaHandle,
    endpoints: Vec<PeerEndpoint>,
    closed: bool,
}

#[async_trait]
impl GatewaySession for ProfileSession {
    fn certificate_authority(&self) -> Result<CaHandle, GatewayError> {
        if self.closed {
            return Err(GatewayError::SessionClosed);
        }
        Ok(Arc::clone(&self.ca))
    }

    fn current_identity(&self) -> &SigningIdentity {
        &self.identity
    }

    fn endpoints(&self) -> &[PeerEndpoint] {
        &self.endpoints
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!(identity = %self.identity.label, "Gateway session closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
