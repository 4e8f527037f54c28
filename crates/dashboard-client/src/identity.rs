//! Per-session client identity.
//!
//! The identity is generated once, persisted in a session-scoped store, and
//! reused for as long as that store lives. It tags lock requests and scenario
//! invocations and decides whether a streamed lock is "mine".

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use rand::Rng;

/// Storage key for the persisted identity.
pub const STORAGE_KEY_CLIENT_ID: &str = "client_id";

const IDENTITY_PREFIX: &str = "web-";
const IDENTITY_SUFFIX_LEN: usize = 8;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque identity of this dashboard session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Generate a fresh `web-xxxxxxxx` identity.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..IDENTITY_SUFFIX_LEN)
            .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
            .collect();
        Self(format!("{IDENTITY_PREFIX}{suffix}"))
    }

    /// Wrap an existing identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Load the identity from `storage`, generating and storing one if absent.
    pub fn load_or_create(storage: &mut dyn SessionStorage) -> crate::Result<Self> {
        if let Some(existing) = storage.get(STORAGE_KEY_CLIENT_ID)? {
            if !existing.trim().is_empty() {
                tracing::debug!("Reusing client identity {}", existing);
                return Ok(Self(existing));
            }
        }
        let identity = Self::generate();
        storage.set(STORAGE_KEY_CLIENT_ID, identity.as_str())?;
        tracing::info!("Generated client identity {}", identity);
        Ok(identity)
    }

    /// The identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key/value store whose lifetime defines the session.
pub trait SessionStorage {
    /// Read a value.
    fn get(&self, key: &str) -> crate::Result<Option<String>>;
    /// Write a value.
    fn set(&mut self, key: &str, value: &str) -> crate::Result<()>;
}

/// Store that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage(HashMap<String, String>);

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> crate::Result<Option<String>> {
        Ok(self.0.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> crate::Result<()> {
        self.0.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a JSON object on disk; the session lasts as long as the file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Use `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> crate::Result<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> crate::Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> crate::Result<()> {
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}
