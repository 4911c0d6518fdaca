//! Durable storage for the three session slots.
//!
//! The store is a dumb blob store: it never validates tokens. The only
//! interpretation it does is decoding the profile slot, and a profile that
//! fails to decode is reported as absent.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use keyring::Entry;
use tracing::warn;

use super::UserProfile;

/// Keychain service name for the keyring backend
const SERVICE_NAME: &str = "pgo-console";

/// Session file name for the file backend
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    AccessToken,
    RefreshToken,
    Profile,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::AccessToken, Slot::RefreshToken, Slot::Profile];

    pub fn key(&self) -> &'static str {
        match self {
            Slot::AccessToken => "auth_token",
            Slot::RefreshToken => "refresh_token",
            Slot::Profile => "user_data",
        }
    }
}

/// Raw key-value persistence behind the credential store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Write several entries. Backends that can do it in one step override this.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        (**self).set_many(entries)
    }
}

/// Process-local store, lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|_| anyhow!("Memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// Owner-only access to the session directory and file (Unix)
const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Create (or truncate) a file readable only by its owner.
fn open_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    let file = options.open(path)?;
    // `mode` only applies on creation; a leftover temp file keeps its own
    restrict_permissions(path, FILE_MODE)?;
    Ok(file)
}

/// JSON map on disk. Every write replaces the whole file through a rename,
/// so a multi-slot write is never observed half done.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
            restrict_permissions(parent, DIR_MODE).context("Failed to restrict session directory")?;
        }
        let contents = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = open_private(&tmp).context("Failed to write session file")?;
            file.write_all(contents.as_bytes()).context("Failed to write session file")?;
            file.sync_all().context("Failed to write session file")?;
        }
        std::fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _guard = self.write_lock.lock().map_err(|_| anyhow!("Session file lock poisoned"))?;
        // A corrupt file is replaced rather than blocking every future write
        let mut map = self.read_map().unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable session file");
            HashMap::new()
        });
        f(&mut map);
        if map.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        self.write_map(&map)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert(key.to_string(), value.to_string());
            }
        })
    }
}

/// OS keychain, one entry per slot.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store credential in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}

/// The three session slots on top of a `KeyValueStore`.
pub struct CredentialStore {
    backend: Box<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Read a slot. A backend failure reads as absent.
    pub fn get(&self, slot: Slot) -> Option<String> {
        match self.backend.get(slot.key()) {
            Ok(value) => value,
            Err(e) => {
                warn!(slot = slot.key(), error = %e, "Failed to read credential slot");
                None
            }
        }
    }

    pub fn set(&self, slot: Slot, value: &str) -> Result<()> {
        self.backend.set(slot.key(), value)
    }

    pub fn set_all(&self, entries: &[(Slot, &str)]) -> Result<()> {
        let entries: Vec<(&str, &str)> = entries.iter().map(|(slot, value)| (slot.key(), *value)).collect();
        self.backend.set_many(&entries)
    }

    pub fn clear(&self, slot: Slot) -> Result<()> {
        self.backend.remove(slot.key())
    }

    /// Clear every slot, attempting all of them even if one fails.
    pub fn clear_all(&self) -> Result<()> {
        let mut first_error = None;
        for slot in Slot::ALL {
            if let Err(e) = self.clear(slot) {
                warn!(slot = slot.key(), error = %e, "Failed to clear credential slot");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Decoded profile slot. Malformed records are treated as absent.
    pub fn profile(&self) -> Option<UserProfile> {
        let raw = self.get(Slot::Profile)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed stored profile");
                None
            }
        }
    }

    pub fn encode_profile(profile: &UserProfile) -> Result<String> {
        serde_json::to_string(profile).context("Failed to encode profile")
    }
}
