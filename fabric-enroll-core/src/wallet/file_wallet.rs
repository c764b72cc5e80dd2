//! Directory-backed wallet
//!
//! Layout: one JSON document per identity, `<wallet>/<label>.id`.
//! New identities are written to a hidden temp file and then hard-linked
//! into place, so a reader never sees a partial document and an existing
//! label is never overwritten.
//!
//! Identities left by fabric-network 1.4 (`<wallet>/<label>/<label>`) are
//! readable and count as existing labels, but are never written.

use super::identity::{IDENTITY_VERSION, X509_IDENTITY_TYPE};
use super::{legacy, validate_label, Wallet, WalletError, X509Identity};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// File extension of identity documents
pub const IDENTITY_FILE_EXTENSION: &str = "id";

/// Wallet storing each identity as a file in one directory
#[derive(Debug, Clone)]
pub struct FileSystemWallet {
    base_path: PathBuf,
}

impl FileSystemWallet {
    /// Open the wallet at `base_path`, creating the directory if needed
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self, WalletError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn identity_path(&self, label: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", label, IDENTITY_FILE_EXTENSION))
    }

    fn temp_path(&self, label: &str) -> PathBuf {
        self.base_path.join(format!(
            ".{}.{}.{}.tmp",
            label,
            IDENTITY_FILE_EXTENSION,
            std::process::id()
        ))
    }

    /// Write `data` to `path` only if nothing exists there yet
    async fn write_new(&self, label: &str, path: &Path, data: &[u8]) -> Result<(), WalletError> {
        let temp_path = self.temp_path(label);

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let written = async {
            let mut file = options.open(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::hard_link(&temp_path, path).await
        }
        .await;

        // The temp name is only a staging link; drop it whatever happened.
        let _ = fs::remove_file(&temp_path).await;

        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(WalletError::AlreadyExists(label.to_string()))
            }
            Err(e) => Err(WalletError::Io(e)),
        }
    }
}

#[async_trait]
impl Wallet for FileSystemWallet {
    async fn exists(&self, label: &str) -> Result<bool, WalletError> {
        validate_label(label)?;
        match fs::metadata(self.identity_path(label)).await {
            Ok(meta) if meta.is_file() => Ok(true),
            Ok(_) => legacy::exists(&self.base_path, label).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                legacy::exists(&self.base_path, label).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, label: &str) -> Result<Option<X509Identity>, WalletError> {
        validate_label(label)?;
        let data = match fs::read(self.identity_path(label)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return legacy::load(&self.base_path, label).await
            }
            Err(e) => return Err(e.into()),
        };

        let identity: X509Identity = serde_json::from_slice(&data)
            .map_err(|e| WalletError::Serialization(format!("{}: {}", label, e)))?;

        if identity.kind != X509_IDENTITY_TYPE {
            return Err(WalletError::UnsupportedIdentity(identity.kind.clone()));
        }
        if identity.version > IDENTITY_VERSION {
            return Err(WalletError::UnsupportedIdentity(format!(
                "{} version {}",
                identity.kind, identity.version
            )));
        }

        Ok(Some(identity))
    }

    async fn import(&self, label: &str, identity: X509Identity) -> Result<(), WalletError> {
        validate_label(label)?;
        identity.check()?;
        if legacy::exists(&self.base_path, label).await? {
            return Err(WalletError::AlreadyExists(label.to_string()));
        }

        let data = serde_json::to_vec(&identity)
            .map_err(|e| WalletError::Serialization(e.to_string()))?;
        let path = self.identity_path(label);
        self.write_new(label, &path, &data).await?;

        debug!(label, path = %path.display(), "identity written to wallet");
        Ok(())
    }

    async fn remove(&self, label: &str) -> Result<bool, WalletError> {
        validate_label(label)?;
        match fs::remove_file(self.identity_path(label)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, WalletError> {
        let mut labels = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();

            if entry.file_type().await?.is_dir() {
                if validate_label(&file_name).is_ok()
                    && legacy::exists(&self.base_path, &file_name).await?
                {
                    labels.push(file_name.into_owned());
                }
                continue;
            }

            let Some(label) = file_name
                .strip_suffix(IDENTITY_FILE_EXTENSION)
                .and_then(|s| s.strip_suffix('.'))
            else {
                continue;
            };

            if validate_label(label).is_ok() {
                labels.push(label.to_string());
            }
        }

        labels.sort();
        labels.dedup();
        Ok(labels)
    }

    fn location(&self) -> String {
        self.base_path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::{write_v14_identity, TestCa};
    use tempfile::TempDir;

    async fn open_wallet() -> (FileSystemWallet, TempDir) {
        let dir = TempDir::new().unwrap();
        let wallet = FileSystemWallet::open(dir.path().join("wallet")).await.unwrap();
        (wallet, dir)
    }

    #[tokio::test]
    async fn test_import_and_get() {
        let (wallet, _dir) = open_wallet().await;
        let identity = TestCa::new("ca.org2")
            .unwrap()
            .issue_identity("user1", "org2msp")
            .unwrap();

        wallet.import("user1", identity.clone()).await.unwrap();

        assert!(wallet.exists("user1").await.unwrap());
        assert_eq!(wallet.get("user1").await.unwrap(), Some(identity));
        assert!(wallet.path().join("user1.id").is_file());
    }

    #[tokio::test]
    async fn test_missing_identity() {
        let (wallet, _dir) = open_wallet().await;
        assert!(!wallet.exists("ghost").await.unwrap());
        assert!(wallet.get("ghost").await.unwrap().is_none());
        assert!(!wallet.remove("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_import_never_overwrites() {
        let (wallet, _dir) = open_wallet().await;
        let ca = TestCa::new("ca.org2").unwrap();
        let first = ca.issue_identity("user1", "org2msp").unwrap();

        wallet.import("user1", first.clone()).await.unwrap();
        let result = wallet
            .import("user1", ca.issue_identity("user1", "org2msp").unwrap())
            .await;

        assert!(matches!(result, Err(WalletError::AlreadyExists(_))));
        assert_eq!(wallet.get("user1").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (wallet, _dir) = open_wallet().await;
        let ca = TestCa::new("ca.org2").unwrap();

        wallet
            .import("user1", ca.issue_identity("user1", "org2msp").unwrap())
            .await
            .unwrap();
        let _ = wallet
            .import("user1", ca.issue_identity("user1", "org2msp").unwrap())
            .await;

        let names: Vec<String> = std::fs::read_dir(wallet.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["user1.id".to_string()]);
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_files() {
        let (wallet, _dir) = open_wallet().await;
        let ca = TestCa::new("ca.org2").unwrap();

        wallet
            .import("user1", ca.issue_identity("user1", "org2msp").unwrap())
            .await
            .unwrap();
        wallet
            .import("admin", ca.issue_identity("admin", "org2msp").unwrap())
            .await
            .unwrap();
        std::fs::write(wallet.path().join("notes.txt"), b"hello").unwrap();
        std::fs::write(wallet.path().join(".partial.id.1.tmp"), b"{}").unwrap();

        assert_eq!(
            wallet.list().await.unwrap(),
            vec!["admin".to_string(), "user1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reads_identity_written_by_other_tools() {
        let (wallet, _dir) = open_wallet().await;
        let identity = TestCa::new("ca.org1")
            .unwrap()
            .issue_identity("admin", "Org1MSP")
            .unwrap();

        let document = serde_json::json!({
            "credentials": {
                "certificate": identity.certificate(),
                "privateKey": identity.private_key().expose(),
            },
            "mspId": "Org1MSP",
            "type": "X.509",
            "version": 1,
        });
        std::fs::write(
            wallet.path().join("admin.id"),
            serde_json::to_vec_pretty(&document).unwrap(),
        )
        .unwrap();

        let loaded = wallet.get("admin").await.unwrap().unwrap();
        assert_eq!(loaded.msp_id, "Org1MSP");
        assert_eq!(loaded.common_name().unwrap(), "admin");
    }

    #[tokio::test]
    async fn test_rejects_unknown_identity_type() {
        let (wallet, _dir) = open_wallet().await;
        let document = serde_json::json!({
            "credentials": { "certificate": "", "privateKey": "" },
            "mspId": "Org1MSP",
            "type": "HSM-X.509",
            "version": 1,
        });
        std::fs::write(
            wallet.path().join("hsm.id"),
            serde_json::to_vec(&document).unwrap(),
        )
        .unwrap();

        let result = wallet.get("hsm").await;
        assert!(matches!(result, Err(WalletError::UnsupportedIdentity(_))));
    }

    #[tokio::test]
    async fn test_corrupted_document() {
        let (wallet, _dir) = open_wallet().await;
        std::fs::write(wallet.path().join("broken.id"), b"{not json").unwrap();

        let result = wallet.get("broken").await;
        assert!(matches!(result, Err(WalletError::Serialization(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_identity_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (wallet, _dir) = open_wallet().await;
        let identity = TestCa::new("ca.org2")
            .unwrap()
            .issue_identity("user1", "org2msp")
            .unwrap();
        wallet.import("user1", identity).await.unwrap();

        let mode = std::fs::metadata(wallet.path().join("user1.id"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (wallet, _dir) = open_wallet().await;
        let result = wallet.exists("../etc/passwd").await;
        assert!(matches!(result, Err(WalletError::InvalidLabel { .. })));
    }

    #[tokio::test]
    async fn test_reads_v14_directory_layout() {
        let (wallet, _dir) = open_wallet().await;
        let admin = TestCa::new("ca.org2")
            .unwrap()
            .issue_identity("admin", "Org2MSP")
            .unwrap();

        let ski = "0a1b2c3d4e5f";
        let user = serde_json::json!({
            "name": "admin",
            "mspid": "Org2MSP",
            "roles": null,
            "affiliation": "",
            "enrollmentSecret": "",
            "enrollment": {
                "signingIdentity": ski,
                "identity": { "certificate": admin.certificate() }
            }
        });
        let entry = wallet.path().join("admin");
        std::fs::create_dir(&entry).unwrap();
        std::fs::write(entry.join("admin"), serde_json::to_vec(&user).unwrap()).unwrap();
        std::fs::write(
            entry.join(format!("{}-priv", ski)),
            admin.private_key().expose(),
        )
        .unwrap();
        std::fs::write(entry.join(format!("{}-pub", ski)), b"").unwrap();

        assert!(wallet.exists("admin").await.unwrap());
        let loaded = wallet.get("admin").await.unwrap().unwrap();
        assert_eq!(loaded.msp_id, "Org2MSP");
        assert_eq!(loaded.certificate(), admin.certificate());
        assert_eq!(loaded.private_key(), admin.private_key());
        assert_eq!(wallet.list().await.unwrap(), vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn test_v14_entry_is_never_overwritten() {
        let (wallet, _dir) = open_wallet().await;
        let ca = TestCa::new("ca.org2").unwrap();
        write_v14_identity(
            wallet.path(),
            "admin",
            &ca.issue_identity("admin", "org2msp").unwrap(),
        )
        .unwrap();

        let result = wallet
            .import("admin", ca.issue_identity("admin", "org2msp").unwrap())
            .await;

        assert!(matches!(result, Err(WalletError::AlreadyExists(_))));
        assert!(!wallet.path().join("admin.id").exists());
        // CRLF key files are normalised on read
        assert_eq!(
            wallet.get("admin").await.unwrap().unwrap().common_name().unwrap(),
            "admin"
        );
    }

    #[tokio::test]
    async fn test_v14_entry_without_key_file() {
        let (wallet, _dir) = open_wallet().await;
        let admin = TestCa::new("ca.org2")
            .unwrap()
            .issue_identity("admin", "org2msp")
            .unwrap();
        write_v14_identity(wallet.path(), "admin", &admin).unwrap();
        for entry in std::fs::read_dir(wallet.path().join("admin")).unwrap() {
            let path = entry.unwrap().path();
            if path.to_string_lossy().ends_with("-priv") {
                std::fs::remove_file(path).unwrap();
            }
        }

        assert!(wallet.exists("admin").await.unwrap());
        assert!(matches!(
            wallet.get("admin").await,
            Err(WalletError::Other(_))
        ));
    }

    #[tokio::test]
    async fn test_v14_rejects_non_hex_key_id() {
        let (wallet, _dir) = open_wallet().await;
        let entry = wallet.path().join("admin");
        std::fs::create_dir(&entry).unwrap();
        let user = serde_json::json!({
            "mspid": "org2msp",
            "enrollment": {
                "signingIdentity": "../../secret",
                "identity": { "certificate": "" }
            }
        });
        std::fs::write(entry.join("admin"), serde_json::to_vec(&user).unwrap()).unwrap();

        assert!(matches!(
            wallet.get("admin").await,
            Err(WalletError::Serialization(_))
        ));
    }
}
