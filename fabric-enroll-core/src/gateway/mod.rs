//! Network gateway
//!
//! A gateway turns a wallet label plus the static connection profile into a
//! session. The session hands out the CA client for the connected
//! organization and remembers which identity it was opened with. Sessions
//! must be closed explicitly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::ca::{CaError, CaHandle, SigningIdentity};
use crate::wallet::{WalletError, WalletHandle};

pub mod profile;
pub mod profile_gateway;

pub use profile::ConnectionProfile;
pub use profile_gateway::{ProfileGateway, ProfileSession};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to read connection profile {path}: {reason}")]
    ProfileRead { path: PathBuf, reason: String },

    #[error("Failed to parse connection profile: {0}")]
    ProfileParse(String),

    #[error("Invalid connection profile: {0}")]
    InvalidProfile(String),

    #[error("Identity '{0}' not found in wallet")]
    IdentityNotFound(String),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Certificate authority unavailable: {0}")]
    CaUnavailable(#[source] CaError),

    #[error("Session is closed")]
    SessionClosed,
}

/// Service discovery settings passed through to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub enabled: bool,
    /// Rewrite discovered hosts to `localhost` (containers on a dev machine)
    pub as_localhost: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            as_localhost: false,
        }
    }
}

/// Parameters of [`Gateway::connect`]
#[derive(Clone)]
pub struct ConnectOptions {
    pub wallet: WalletHandle,
    /// Wallet label of the identity to connect as
    pub identity: String,
    pub discovery: DiscoveryOptions,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("wallet", &self.wallet.location())
            .field("identity", &self.identity)
            .field("discovery", &self.discovery)
            .finish()
    }
}

/// A peer the session may talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub name: String,
    pub url: String,
}

/// An open connection to the network
#[async_trait]
pub trait GatewaySession: Send + Sync {
    /// CA client of the connected organization
    fn certificate_authority(&self) -> Result<CaHandle, GatewayError>;

    /// Identity the session was opened with
    fn current_identity(&self) -> &SigningIdentity;

    fn endpoints(&self) -> &[PeerEndpoint];

    /// Release the session. Idempotent.
    async fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Factory for sessions
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Box<dyn GatewaySession>, GatewayError>;
}
