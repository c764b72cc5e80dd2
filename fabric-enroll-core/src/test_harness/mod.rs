//! Test harness
//!
//! Fixtures shared by unit tests, the integration tests and the CLI tests:
//! a throwaway CA, recording doubles for the collaborator traits, and a fake
//! Fabric CA server speaking the real REST API on localhost.

use anyhow::Result;
use std::path::{Path, PathBuf};

mod mocks;
mod server;
mod test_ca;

pub use mocks::{MockCertificateAuthority, MockGateway, MockSession};
pub use server::{FakeCaServer, FAKE_CA_NAME};
pub use test_ca::TestCa;

/// Write a single-organization (`Org2`, `org2msp`) connection profile whose
/// CA lives at `ca_url`. Returns the profile path.
pub fn write_profile(dir: &Path, ca_url: &str) -> Result<PathBuf> {
    let profile = serde_json::json!({
        "name": "test-network-org2",
        "version": "1.0.0",
        "client": { "organization": "Org2" },
        "organizations": {
            "Org2": {
                "mspid": "org2msp",
                "peers": ["peer0.org2.example.com"],
                "certificateAuthorities": ["ca.org2.example.com"]
            }
        },
        "peers": {
            "peer0.org2.example.com": {
                "url": "grpcs://peer0.org2.example.com:9051"
            }
        },
        "certificateAuthorities": {
            "ca.org2.example.com": {
                "url": ca_url,
                "caName": FAKE_CA_NAME,
                "httpOptions": { "verify": false }
            }
        }
    });

    let path = dir.join(crate::config::DEFAULT_PROFILE_FILE);
    std::fs::write(&path, serde_json::to_vec_pretty(&profile)?)?;
    Ok(path)
}

/// Write `identity` into `wallet_dir` the way a fabric-network 1.4
/// `FileSystemWallet` does: `<label>/<label>` plus `<ski>-priv` and `<ski>-pub`.
pub fn write_v14_identity(
    wallet_dir: &Path,
    label: &str,
    identity: &crate::wallet::X509Identity,
) -> Result<()> {
    const SKI: &str = "6a1e3bd2f0c94e5f8d7c2b1a09e8f7d6c5b4a3928170f6e5d4c3b2a190817263";

    let user = serde_json::json!({
        "name": label,
        "mspid": identity.msp_id,
        "roles": null,
        "affiliation": "",
        "enrollmentSecret": "",
        "enrollment": {
            "signingIdentity": SKI,
            "identity": { "certificate": identity.certificate() }
        }
    });

    let dir = wallet_dir.join(label);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(label), serde_json::to_vec(&user)?)?;
    std::fs::write(
        dir.join(format!("{}-priv", SKI)),
        identity.private_key().expose().replace('\n', "\r\n"),
    )?;
    std::fs::write(dir.join(format!("{}-pub", SKI)), b"")?;
    Ok(())
}
