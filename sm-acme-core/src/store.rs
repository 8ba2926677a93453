//! Persistence layer.
//!
//! Every artifact in the working directory is written with the same atomic
//! protocol: write to `<name>.tmp`, fsync, rename over `<name>`. Rename is
//! atomic on the filesystems this manager targets, so a crash can only ever
//! observe the old or the new content of `<name>`, never a half-written one.

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::fs;

use crate::error::{AcmeError, Result};
use crate::model::{AcmeAccountRecord, Installation, JwkRecord, parse_cert_pair, CertPairInfo};

pub const INSTALLATION_JSON: &str = "installation.json";
pub const ACCOUNT_JSON: &str = "account.json";
pub const JWK_JSON: &str = "jwk.json";
pub const KEY_PEM: &str = "key.pem";
pub const CERT_PEM: &str = "cert.pem";
pub const KEYNEW_PEM: &str = "keynew.pem";
pub const CERTNEW_PEM: &str = "certnew.pem";

#[derive(Debug, Clone)]
pub struct WorkingDir {
    root: PathBuf,
}

impl WorkingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Atomically writes `contents` to `name`: stage to `<name>.tmp`, fsync,
    /// rename over the final path.
    pub async fn atomic_write(&self, name: &str, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        let tmp_path = self.path(&format!("{name}.tmp"));
        let final_path = self.path(name);

        let mut file = fs::File::create(&tmp_path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    pub async fn atomic_write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.atomic_write(name, &json).await
    }

    /// Renames `from` over `to`, atomically swapping the staged pair into
    /// place. Used both for "install new cert" and "startup prefers newer
    /// staging pair over current pair".
    pub async fn atomic_rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.path(from), self.path(to)).await?;
        Ok(())
    }

    async fn read_optional(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AcmeError::Io(e)),
        }
    }

    /// Absence is normal (`Ok(None)`); a parse error is treated as absence
    /// too, with a warning.
    async fn load_json_optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let Some(bytes) = self.read_optional(name).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(file = name, error = %e, "⚠️ discarding corrupt file, treating as absent");
                Ok(None)
            }
        }
    }

    pub async fn load_installation(&self) -> Result<Option<Installation>> {
        self.load_json_optional(INSTALLATION_JSON).await
    }

    pub async fn load_account(&self) -> Result<Option<AcmeAccountRecord>> {
        self.load_json_optional(ACCOUNT_JSON).await
    }

    pub async fn save_account(&self, account: &AcmeAccountRecord) -> Result<()> {
        self.atomic_write_json(ACCOUNT_JSON, account).await
    }

    pub async fn load_jwk(&self) -> Result<Option<JwkRecord>> {
        self.load_json_optional(JWK_JSON).await
    }

    pub async fn save_jwk(&self, jwk: &JwkRecord) -> Result<()> {
        self.atomic_write_json(JWK_JSON, jwk).await
    }

    /// Loads and validates a `(key, cert)` pair. A missing file, a parse
    /// failure, or a pubkey/CN mismatch are all "no usable pair" (invariant
    /// 1): the caller cannot tell these apart and does not need to.
    pub async fn load_cert_pair(
        &self,
        key_name: &str,
        cert_name: &str,
    ) -> Result<Option<(String, String, CertPairInfo)>> {
        let (Some(key_bytes), Some(cert_bytes)) = (
            self.read_optional(key_name).await?,
            self.read_optional(cert_name).await?,
        ) else {
            return Ok(None);
        };
        let key_pem = String::from_utf8_lossy(&key_bytes).into_owned();
        let cert_pem = String::from_utf8_lossy(&cert_bytes).into_owned();

        match parse_cert_pair(&key_pem, &cert_pem) {
            Ok(info) => Ok(Some((key_pem, cert_pem, info))),
            Err(e) => {
                tracing::warn!(key = key_name, cert = cert_name, error = %e, "⚠️ discarding invalid cert pair");
                Ok(None)
            }
        }
    }

    /// A half-written staging pair (one of `keynew.pem`/`certnew.pem` exists
    /// without the other) is garbage left over from a crash mid-install;
    /// delete it so startup reconciliation doesn't need to special-case it.
    pub async fn cleanup_orphan_staging(&self) -> Result<()> {
        let key_exists = self.read_optional(KEYNEW_PEM).await?.is_some();
        let cert_exists = self.read_optional(CERTNEW_PEM).await?.is_some();
        if key_exists != cert_exists {
            tracing::warn!("🗑️ deleting orphaned half-written staging cert pair");
            if key_exists {
                let _ = fs::remove_file(self.path(KEYNEW_PEM)).await;
            }
            if cert_exists {
                let _ = fs::remove_file(self.path(CERTNEW_PEM)).await;
            }
        }
        Ok(())
    }

    /// Writes the newly-issued certificate to `certnew.pem`, then atomically
    /// swaps both staged files over the canonical names. `keynew.pem` is
    /// assumed already present (written by the `keygen` collaborator call
    /// that preceded this installation).
    pub async fn install_new_cert(&self, cert_pem: &str) -> Result<()> {
        self.atomic_write(CERTNEW_PEM, cert_pem.as_bytes()).await?;
        self.atomic_rename(KEYNEW_PEM, KEY_PEM).await?;
        self.atomic_rename(CERTNEW_PEM, CERT_PEM).await?;
        Ok(())
    }

    /// Startup reconciliation: staging is newer and valid, so prefer it over
    /// the current pair.
    pub async fn promote_staging(&self) -> Result<()> {
        self.atomic_rename(KEYNEW_PEM, KEY_PEM).await?;
        self.atomic_rename(CERTNEW_PEM, CERT_PEM).await?;
        Ok(())
    }
}
