//! Owner key material
//!
//! Generated once on first start, persisted as JSON under
//! `<store_path>/keys`, and reloaded on every later start. The file holds the
//! ABE public and master keys plus the index secret, so it is written with
//! owner-only permissions.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::abe::{self, MasterSecretKey, PublicKey};
use crate::config::KEYS_FILE;
use crate::error::{OwnerError, Result};
use crate::index::IndexSecret;

#[derive(Serialize, Deserialize)]
struct KeysFile {
    public_key: PublicKey,
    /// Covercrypt master secret key, hex of its byte encoding
    master_secret_key: String,
    index_secret: IndexSecret,
}

/// The owner's long-lived keys, immutable once loaded
pub struct KeyStore {
    path: PathBuf,
    public_key: PublicKey,
    master_secret_key: MasterSecretKey,
    index_secret: IndexSecret,
}

impl KeyStore {
    /// Load the keys under `dir`, generating them on first use
    ///
    /// Partitions of `partitions` missing from a loaded public key are
    /// published and the file is rewritten.
    pub fn load_or_init<'a>(
        dir: impl AsRef<Path>,
        partitions: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(KEYS_FILE);

        if path.exists() {
            let mut store = Self::load(&path)?;
            let added = store
                .public_key
                .extend(&store.master_secret_key, partitions)?;
            if added > 0 {
                tracing::info!(added, "Publishing new partitions");
                store.persist()?;
            }
            return Ok(store);
        }

        std::fs::create_dir_all(dir)?;
        let (public_key, master_secret_key) = abe::setup(partitions)?;
        let store = Self {
            path,
            public_key,
            master_secret_key,
            index_secret: IndexSecret::generate(),
        };
        store.persist()?;
        tracing::info!(path = %store.path.display(), "Generated owner keys");
        Ok(store)
    }

    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OwnerError::Config(format!("cannot read keys {}: {}", path.display(), e))
        })?;
        let malformed = |reason: String| {
            OwnerError::Config(format!("malformed keys {}: {}", path.display(), reason))
        };
        let file: KeysFile =
            serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))?;
        let master_secret_key = hex::decode(&file.master_secret_key)
            .map_err(|e| malformed(e.to_string()))
            .and_then(|bytes| MasterSecretKey::from_bytes(&bytes))?;
        tracing::debug!(
            path = %path.display(),
            attributes = file.public_key.attributes().count(),
            "Loaded owner keys"
        );
        Ok(Self {
            path: path.to_path_buf(),
            public_key: file.public_key,
            master_secret_key,
            index_secret: file.index_secret,
        })
    }

    fn persist(&self) -> Result<()> {
        let file = KeysFile {
            public_key: self.public_key.clone(),
            master_secret_key: hex::encode(self.master_secret_key.to_bytes()?),
            index_secret: self.index_secret.clone(),
        };
        let content = serde_json::to_vec_pretty(&file)?;
        replace_private(&self.path, &content)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn master_secret_key(&self) -> &MasterSecretKey {
        &self.master_secret_key
    }

    pub fn index_secret(&self) -> &IndexSecret {
        &self.index_secret
    }
}

/// Atomically replace `path` with an owner-only file holding `content`
pub(crate) fn replace_private(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    if tmp.exists() {
        std::fs::remove_file(&tmp)?;
    }
    write_private(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content)?;
    file.sync_all()?;
    Ok(())
}
