//! In-memory wallet for testing

use super::{validate_label, Wallet, WalletError, X509Identity};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

fn handle_poison<T>(_err: PoisonError<T>) -> WalletError {
    WalletError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// Non-persistent wallet; clones share the same contents
#[derive(Clone, Default)]
pub struct MemoryWallet {
    identities: Arc<RwLock<BTreeMap<String, X509Identity>>>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities
    pub fn len(&self) -> usize {
        self.identities.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    async fn exists(&self, label: &str) -> Result<bool, WalletError> {
        validate_label(label)?;
        Ok(self
            .identities
            .read()
            .map_err(handle_poison)?
            .contains_key(label))
    }

    async fn get(&self, label: &str) -> Result<Option<X509Identity>, WalletError> {
        validate_label(label)?;
        Ok(self.identities.read().map_err(handle_poison)?.get(label).cloned())
    }

    async fn import(&self, label: &str, identity: X509Identity) -> Result<(), WalletError> {
        validate_label(label)?;
        identity.check()?;

        let mut identities = self.identities.write().map_err(handle_poison)?;
        if identities.contains_key(label) {
            return Err(WalletError::AlreadyExists(label.to_string()));
        }
        identities.insert(label.to_string(), identity);
        Ok(())
    }

    async fn remove(&self, label: &str) -> Result<bool, WalletError> {
        validate_label(label)?;
        Ok(self
            .identities
            .write()
            .map_err(handle_poison)?
            .remove(label)
            .is_some())
    }

    async fn list(&self) -> Result<Vec<String>, WalletError> {
        Ok(self
            .identities
            .read()
            .map_err(handle_poison)?
            .keys()
            .cloned()
            .collect())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::TestCa;

    #[tokio::test]
    async fn test_memory_wallet_roundtrip() {
        let ca = TestCa::new("ca.org1").unwrap();
        let wallet = MemoryWallet::new();
        let identity = ca.issue_identity("admin", "org1msp").unwrap();

        assert!(!wallet.exists("admin").await.unwrap());
        wallet.import("admin", identity.clone()).await.unwrap();
        assert!(wallet.exists("admin").await.unwrap());
        assert_eq!(wallet.get("admin").await.unwrap(), Some(identity));
        assert_eq!(wallet.list().await.unwrap(), vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_wallet_refuses_overwrite() {
        let ca = TestCa::new("ca.org1").unwrap();
        let wallet = MemoryWallet::new();

        wallet
            .import("user1", ca.issue_identity("user1", "org1msp").unwrap())
            .await
            .unwrap();
        let second = wallet
            .import("user1", ca.issue_identity("user1", "org1msp").unwrap())
            .await;

        assert!(matches!(second, Err(WalletError::AlreadyExists(_))));
        assert_eq!(wallet.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let ca = TestCa::new("ca.org1").unwrap();
        let wallet = MemoryWallet::new();
        let view = wallet.clone();

        wallet
            .import("user1", ca.issue_identity("user1", "org1msp").unwrap())
            .await
            .unwrap();
        assert!(view.exists("user1").await.unwrap());
        assert!(view.remove("user1").await.unwrap());
        assert!(wallet.is_empty());
    }
}
