//! Enrollment bootstrapper
//!
//! Onboards a user identity: checks the wallet, connects to the network as
//! the admin, registers and enrolls the user with the organization's CA and
//! imports the result into the wallet.
//!
//! ```text
//! Start -> CheckUser -> CheckAdmin -> Connected -> Registered -> Enrolled -> Imported
//!              |             |            |             |            |           |
//!              v             +------------+-------------+------------+-----------+--> Failed
//!         AlreadyDone
//! ```
//!
//! Register, enroll and import form one unit: the wallet is written only
//! after all three succeed. Once connected, the session is closed on every
//! exit path.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::ca::{CaError, EnrollmentRequest, IdentityRole, RegistrationRequest};
use crate::config::EnrollmentConfig;
use crate::gateway::{ConnectOptions, DiscoveryOptions, Gateway, GatewayError, GatewaySession};
use crate::wallet::{IdentityError, WalletError, WalletHandle, X509Identity};

/// Progress of a bootstrap run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Start,
    CheckUser,
    CheckAdmin,
    Connected,
    Registered,
    Enrolled,
    Imported,
    AlreadyDone,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::CheckUser => "check-user",
            Stage::CheckAdmin => "check-admin",
            Stage::Connected => "connected",
            Stage::Registered => "registered",
            Stage::Enrolled => "enrolled",
            Stage::Imported => "imported",
            Stage::AlreadyDone => "already-done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A new identity was registered, enrolled and stored
    Enrolled,
    /// The user label was already present; nothing was done
    AlreadyEnrolled,
}

/// Why an enrollment did not yield a usable identity
#[derive(Debug, Error)]
pub enum EnrollmentFailure {
    #[error(transparent)]
    Ca(#[from] CaError),

    #[error("certificate subject '{actual}' does not match enrollment id '{expected}'")]
    SubjectMismatch { expected: String, actual: String },

    #[error("unusable credentials: {0}")]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(
        "An identity for the admin user \"{admin}\" does not exist in the wallet. \
         Enroll the admin user before retrying"
    )]
    PrecursorMissing { admin: String },

    #[error("Wallet check failed ({stage}): {source}")]
    Store {
        stage: Stage,
        #[source]
        source: WalletError,
    },

    #[error("Failed to connect to the network: {0}")]
    Connection(#[source] GatewayError),

    #[error("Registration failed: {0}")]
    Registration(#[source] CaError),

    #[error("Enrollment failed: {0}")]
    Enrollment(#[source] EnrollmentFailure),

    #[error("Failed to store identity: {0}")]
    StoreImport(#[source] WalletError),
}

impl BootstrapError {
    /// Stage whose transition failed
    pub fn stage(&self) -> Stage {
        match self {
            BootstrapError::PrecursorMissing { .. } => Stage::CheckAdmin,
            BootstrapError::Store { stage, .. } => *stage,
            BootstrapError::Connection(_) => Stage::Connected,
            BootstrapError::Registration(_) => Stage::Registered,
            BootstrapError::Enrollment(_) => Stage::Enrolled,
            BootstrapError::StoreImport(_) => Stage::Imported,
        }
    }
}

/// Parameters of one bootstrap run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub user_label: String,
    pub admin_label: String,
    pub msp_id: String,
    pub affiliation: String,
    pub role: IdentityRole,
    pub max_enrollments: Option<i32>,
}

impl BootstrapRequest {
    /// Request with the default affiliation and the `client` role
    pub fn new(
        user_label: impl Into<String>,
        admin_label: impl Into<String>,
        msp_id: impl Into<String>,
    ) -> Self {
        Self {
            user_label: user_label.into(),
            admin_label: admin_label.into(),
            msp_id: msp_id.into(),
            affiliation: EnrollmentConfig::default().affiliation,
            role: IdentityRole::Client,
            max_enrollments: None,
        }
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = affiliation.into();
        self
    }

    pub fn with_role(mut self, role: IdentityRole) -> Self {
        self.role = role;
        self
    }
}

impl From<&EnrollmentConfig> for BootstrapRequest {
    fn from(config: &EnrollmentConfig) -> Self {
        Self {
            user_label: config.user_label.clone(),
            admin_label: config.admin_label.clone(),
            msp_id: config.msp_id.clone(),
            affiliation: config.affiliation.clone(),
            role: config.role,
            max_enrollments: config.max_enrollments,
        }
    }
}

fn enter(stage: Stage) {
    debug!(stage = %stage, "bootstrap stage");
}

pub struct Bootstrapper {
    wallet: WalletHandle,
    gateway: Arc<dyn Gateway>,
    discovery: DiscoveryOptions,
}

impl Bootstrapper {
    pub fn new(wallet: WalletHandle, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            wallet,
            gateway,
            discovery: DiscoveryOptions::default(),
        }
    }

    pub fn with_discovery(mut self, discovery: DiscoveryOptions) -> Self {
        self.discovery = discovery;
        self
    }

    /// Register, enroll and store `request.user_label`, authenticated as
    /// `request.admin_label`
    pub async fn bootstrap_user(
        &self,
        request: &BootstrapRequest,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        enter(Stage::Start);
        info!("Wallet path: {}", self.wallet.location());

        enter(Stage::CheckUser);
        let user_exists = self
            .wallet
            .exists(&request.user_label)
            .await
            .map_err(|source| BootstrapError::Store {
                stage: Stage::CheckUser,
                source,
            })?;
        if user_exists {
            info!(
                "An identity for the user \"{}\" already exists in the wallet",
                request.user_label
            );
            enter(Stage::AlreadyDone);
            return Ok(BootstrapOutcome::AlreadyEnrolled);
        }

        enter(Stage::CheckAdmin);
        let admin_exists = self
            .wallet
            .exists(&request.admin_label)
            .await
            .map_err(|source| BootstrapError::Store {
                stage: Stage::CheckAdmin,
                source,
            })?;
        if !admin_exists {
            enter(Stage::Failed);
            return Err(BootstrapError::PrecursorMissing {
                admin: request.admin_label.clone(),
            });
        }

        let mut session = self
            .gateway
            .connect(ConnectOptions {
                wallet: Arc::clone(&self.wallet),
                identity: request.admin_label.clone(),
                discovery: self.discovery,
            })
            .await
            .map_err(|e| {
                enter(Stage::Failed);
                BootstrapError::Connection(e)
            })?;
        enter(Stage::Connected);

        let result = self.enroll_and_import(session.as_ref(), request).await;
        session.close().await;

        if let Err(e) = &result {
            debug!(failed_at = %e.stage(), "bootstrap aborted");
            enter(Stage::Failed);
        }
        result
    }

    async fn enroll_and_import(
        &self,
        session: &dyn GatewaySession,
        request: &BootstrapRequest,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        let ca = session
            .certificate_authority()
            .map_err(BootstrapError::Connection)?;
        let registrar = session.current_identity();

        let registration = RegistrationRequest {
            enrollment_id: request.user_label.clone(),
            affiliation: request.affiliation.clone(),
            role: request.role,
            max_enrollments: request.max_enrollments,
            attributes: Vec::new(),
        };
        let secret = ca
            .register(&registration, registrar)
            .await
            .map_err(BootstrapError::Registration)?;
        enter(Stage::Registered);

        let enrollment = ca
            .enroll(EnrollmentRequest {
                enrollment_id: request.user_label.clone(),
                secret,
            })
            .await
            .map_err(|e| BootstrapError::Enrollment(e.into()))?;

        let identity =
            X509Identity::new(&request.msp_id, enrollment.certificate, enrollment.private_key)
                .map_err(|e| BootstrapError::Enrollment(e.into()))?;
        let subject = identity
            .common_name()
            .map_err(|e| BootstrapError::Enrollment(e.into()))?;
        if subject != request.user_label {
            return Err(BootstrapError::Enrollment(
                EnrollmentFailure::SubjectMismatch {
                    expected: request.user_label.clone(),
                    actual: subject,
                },
            ));
        }
        enter(Stage::Enrolled);

        self.wallet
            .import(&request.user_label, identity)
            .await
            .map_err(BootstrapError::StoreImport)?;
        enter(Stage::Imported);

        info!(
            "Successfully registered and enrolled user \"{}\" and imported it into the wallet",
            request.user_label
        );
        Ok(BootstrapOutcome::Enrolled)
    }
}
