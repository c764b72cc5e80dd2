//! Read-only access to wallets written by fabric-network 1.4
//!
//! Layout: `<wallet>/<label>/<label>` holds the user document and the
//! private key sits beside it as `<ski>-priv`, where `ski` is the document's
//! `enrollment.signingIdentity`. Entries in this layout are never modified.

use super::{PrivateKeyPem, WalletError, X509Identity};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct UserDocument {
    mspid: String,
    enrollment: EnrollmentDocument,
}

#[derive(Debug, Deserialize)]
struct EnrollmentDocument {
    #[serde(rename = "signingIdentity")]
    signing_identity: String,
    identity: CertificateDocument,
}

#[derive(Debug, Deserialize)]
struct CertificateDocument {
    certificate: String,
}

pub(crate) fn user_path(base: &Path, label: &str) -> PathBuf {
    base.join(label).join(label)
}

pub(crate) async fn exists(base: &Path, label: &str) -> Result<bool, WalletError> {
    match fs::metadata(user_path(base, label)).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn load(base: &Path, label: &str) -> Result<Option<X509Identity>, WalletError> {
    let data = match fs::read(user_path(base, label)).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let user: UserDocument = serde_json::from_slice(&data)
        .map_err(|e| WalletError::Serialization(format!("{}: {}", label, e)))?;

    let ski = &user.enrollment.signing_identity;
    if ski.is_empty() || !ski.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WalletError::Serialization(format!(
            "{}: signingIdentity is not a hex key id",
            label
        )));
    }

    let key_path = base.join(label).join(format!("{}-priv", ski));
    let key = fs::read_to_string(&key_path).await.map_err(|e| {
        WalletError::Other(format!("private key {}: {}", key_path.display(), e))
    })?;

    let identity = X509Identity::new(
        user.mspid,
        user.enrollment.identity.certificate.replace("\r\n", "\n"),
        PrivateKeyPem::new(key.replace("\r\n", "\n")),
    )?;

    debug!(label, "identity read from 1.4 wallet layout");
    Ok(Some(identity))
}
