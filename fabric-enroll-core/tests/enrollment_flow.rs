//! End-to-end enrollment against the fake CA server
//!
//! Wires the real collaborators together: a directory wallet, the
//! connection-profile gateway and the HTTP CA client.

use fabric_enroll_core::bootstrap::EnrollmentFailure;
use fabric_enroll_core::gateway::ProfileGateway;
use fabric_enroll_core::test_harness::{write_profile, write_v14_identity, FakeCaServer};
use fabric_enroll_core::wallet::{FileSystemWallet, Wallet, WalletHandle};
use fabric_enroll_core::{BootstrapError, BootstrapOutcome, BootstrapRequest, Bootstrapper, Stage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Network {
    server: FakeCaServer,
    wallet: FileSystemWallet,
    bootstrapper: Bootstrapper,
    _dir: TempDir,
}

impl Network {
    async fn start(with_admin: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let server = FakeCaServer::start().await.unwrap();
        let profile = write_profile(dir.path(), &server.url()).unwrap();
        let wallet = FileSystemWallet::open(dir.path().join("wallet")).await.unwrap();

        if with_admin {
            let admin = server.ca().issue_identity("admin", "org2msp").unwrap();
            wallet.import("admin", admin).await.unwrap();
        }

        let gateway = ProfileGateway::from_file(&profile, Duration::from_secs(5));
        let handle: WalletHandle = Arc::new(wallet.clone());
        let bootstrapper = Bootstrapper::new(handle, Arc::new(gateway));

        Self {
            server,
            wallet,
            bootstrapper,
            _dir: dir,
        }
    }

    async fn run(&self) -> Result<BootstrapOutcome, BootstrapError> {
        self.bootstrapper
            .bootstrap_user(&BootstrapRequest::new("user1", "admin", "org2msp"))
            .await
    }
}

#[tokio::test]
async fn test_enrolls_user_into_empty_wallet() {
    let network = Network::start(true).await;

    let outcome = network.run().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::Enrolled);
    assert_eq!(network.server.registered_ids().await, vec!["user1".to_string()]);
    assert_eq!(
        network.server.affiliation_of("user1").await.as_deref(),
        Some("org2")
    );

    let identity_file = network.wallet.path().join("user1.id");
    let document: serde_json::Value =
        serde_json::from_slice(&std::fs::read(identity_file).unwrap()).unwrap();
    assert_eq!(document["mspId"], "org2msp");
    assert_eq!(document["type"], "X.509");
    assert_eq!(document["version"], 1);
    assert!(document["credentials"]["certificate"]
        .as_str()
        .unwrap()
        .contains("BEGIN CERTIFICATE"));
    assert!(document["credentials"]["privateKey"]
        .as_str()
        .unwrap()
        .contains("PRIVATE KEY"));

    let stored = network.wallet.get("user1").await.unwrap().unwrap();
    assert_eq!(stored.common_name().unwrap(), "user1");
}

#[tokio::test]
async fn test_second_run_makes_no_ca_calls() {
    let network = Network::start(true).await;
    network.run().await.unwrap();
    let before = std::fs::read(network.wallet.path().join("user1.id")).unwrap();
    let calls = (network.server.register_calls(), network.server.enroll_calls());

    let outcome = network.run().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::AlreadyEnrolled);
    assert_eq!(
        (network.server.register_calls(), network.server.enroll_calls()),
        calls
    );
    let after = std::fs::read(network.wallet.path().join("user1.id")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_missing_admin_touches_nothing() {
    let network = Network::start(false).await;

    let err = network.run().await.unwrap_err();

    assert!(matches!(err, BootstrapError::PrecursorMissing { .. }));
    assert_eq!(network.server.register_calls(), 0);
    assert!(network.wallet.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enroll_failure_after_register_stores_nothing() {
    let network = Network::start(true).await;
    network.server.reject_enrollments(true);

    let err = network.run().await.unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Enrollment(EnrollmentFailure::Ca(_))
    ));
    assert_eq!(err.stage(), Stage::Enrolled);
    assert_eq!(network.server.registered_ids().await, vec!["user1".to_string()]);
    assert_eq!(network.wallet.list().await.unwrap(), vec!["admin".to_string()]);
}

#[tokio::test]
async fn test_rerun_after_partial_failure_reports_registration_error() {
    let network = Network::start(true).await;
    network.server.reject_enrollments(true);
    network.run().await.unwrap_err();
    network.server.reject_enrollments(false);

    // user1 is registered at the CA but not in the wallet; the CA refuses a
    // second registration and nothing is retried
    let err = network.run().await.unwrap_err();

    assert!(matches!(err, BootstrapError::Registration(_)));
    assert!(err.to_string().contains("already registered"));
    assert!(!network.wallet.exists("user1").await.unwrap());
}

#[tokio::test]
async fn test_unknown_affiliation_is_a_registration_error() {
    let network = Network::start(true).await;

    let request = BootstrapRequest::new("user1", "admin", "org2msp").with_affiliation("org7");
    let err = network.bootstrapper.bootstrap_user(&request).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Registration(_)));
    assert!(!network.wallet.exists("user1").await.unwrap());
}

#[tokio::test]
async fn test_admin_from_v14_wallet_registers_user() {
    let network = Network::start(false).await;
    let admin = network.server.ca().issue_identity("admin", "org2msp").unwrap();
    write_v14_identity(network.wallet.path(), "admin", &admin).unwrap();

    let outcome = network.run().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::Enrolled);
    assert_eq!(network.server.registered_ids().await, vec!["user1".to_string()]);
    assert!(network.wallet.path().join("user1.id").is_file());
    assert_eq!(
        network.wallet.list().await.unwrap(),
        vec!["admin".to_string(), "user1".to_string()]
    );
}
