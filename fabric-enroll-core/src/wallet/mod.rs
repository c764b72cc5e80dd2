//! Wallet module
//!
//! Keyed storage for named identities. The bootstrapper only needs an
//! existence check and an import; retrieval is used by the gateway to load
//! the identity it connects as.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod file_wallet;
pub mod identity;
mod legacy;
pub mod memory_wallet;

pub use file_wallet::FileSystemWallet;
pub use identity::{certificate_common_name, Credentials, IdentityError, PrivateKeyPem, X509Identity};
pub use memory_wallet::MemoryWallet;

/// Longest label accepted by any wallet
pub const MAX_LABEL_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Identity not found: {0}")]
    NotFound(String),

    #[error("Identity already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid label '{label}': {reason}")]
    InvalidLabel { label: String, reason: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported identity type '{0}'")]
    UnsupportedIdentity(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    #[error("Other error: {0}")]
    Other(String),
}

/// Abstract identity store
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Whether an identity is stored under `label`
    async fn exists(&self, label: &str) -> Result<bool, WalletError>;

    /// Load the identity stored under `label`
    async fn get(&self, label: &str) -> Result<Option<X509Identity>, WalletError>;

    /// Store a new identity. Fails with `AlreadyExists` instead of overwriting.
    async fn import(&self, label: &str, identity: X509Identity) -> Result<(), WalletError>;

    /// Delete an identity, returning whether one was present
    async fn remove(&self, label: &str) -> Result<bool, WalletError>;

    /// All stored labels, sorted
    async fn list(&self) -> Result<Vec<String>, WalletError>;

    /// Human readable location, used in log output
    fn location(&self) -> String;
}

/// Shared handle to a wallet implementation
pub type WalletHandle = Arc<dyn Wallet>;

/// Check that `label` can safely be used as a wallet key
///
/// Labels double as file names in [`FileSystemWallet`], so anything that
/// could escape the wallet directory is rejected.
pub fn validate_label(label: &str) -> Result<(), WalletError> {
    let reject = |reason| {
        Err(WalletError::InvalidLabel {
            label: label.to_string(),
            reason,
        })
    };

    if label.is_empty() {
        return reject("must not be empty");
    }
    if label.len() > MAX_LABEL_LEN {
        return reject("too long");
    }
    if label == "." || label == ".." {
        return reject("reserved name");
    }
    if label.starts_with('.') {
        return reject("must not start with '.'");
    }
    if label.contains(['/', '\\']) {
        return reject("must not contain path separators");
    }
    if label.chars().any(char::is_control) {
        return reject("must not contain control characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_fabric_style_labels() {
        for label in ["admin", "user1", "appUser", "org2.admin", "peer0-org1"] {
            assert!(validate_label(label).is_ok(), "{} should be valid", label);
        }
    }

    #[test]
    fn test_rejects_unsafe_labels() {
        for label in ["", ".", "..", ".hidden", "a/b", "..\\x", "nul\0", "tab\t"] {
            assert!(
                matches!(validate_label(label), Err(WalletError::InvalidLabel { .. })),
                "{:?} should be rejected",
                label
            );
        }
        assert!(validate_label(&"x".repeat(MAX_LABEL_LEN + 1)).is_err());
    }

    proptest! {
        #[test]
        fn prop_labels_with_separators_never_pass(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
            let slash = format!("{}/{}", prefix, suffix);
            let backslash = format!("{}\\{}", prefix, suffix);
            prop_assert!(validate_label(&slash).is_err());
            prop_assert!(validate_label(&backslash).is_err());
        }

        #[test]
        fn prop_alphanumeric_labels_pass(label in "[A-Za-z0-9][A-Za-z0-9_.-]{0,40}") {
            prop_assert!(validate_label(&label).is_ok());
        }
    }
}
