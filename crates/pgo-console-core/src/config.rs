//! Application configuration management.
//!
//! This module handles loading and saving the console configuration, which
//! includes the API base URL, the credential storage backend and the
//! optional development login.
//!
//! Configuration is stored at `~/.config/pgo-console/config.json`; a few
//! fields can be overridden from the environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiClient, HttpTransport, Interceptor, Transport};
use crate::auth::{
    AuthBackend, CredentialStore, DevAuthBackend, FileStore, HttpAuthBackend, KeyValueStore, KeyringStore,
    MemoryStore, SessionManager,
};
use crate::routing::Navigator;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "pgo-console";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "https://pgo-api.otapp.live/api";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_DEV_USERNAME: &str = "developer";
const DEFAULT_DEV_PASSWORD: &str = "dev123";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl StorageKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(StorageKind::File),
            "keyring" => Some(StorageKind::Keyring),
            "memory" => Some(StorageKind::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub storage: StorageKind,
    /// When set, logins are served by the offline development backend
    pub dev_auth: Option<DevCredentials>,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage: StorageKind::default(),
            dev_auth: None,
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overrides: `PGO_API_URL`, `PGO_STORAGE`, `PGO_DEV_AUTH` with
    /// `PGO_DEV_USERNAME`/`PGO_DEV_PASSWORD`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("PGO_API_URL").filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(storage) = var("PGO_STORAGE").as_deref().and_then(StorageKind::parse) {
            self.storage = storage;
        }
        match var("PGO_DEV_AUTH").as_deref() {
            Some("1") | Some("true") => {
                self.dev_auth = Some(DevCredentials {
                    username: var("PGO_DEV_USERNAME").unwrap_or_else(|| DEFAULT_DEV_USERNAME.to_string()),
                    password: var("PGO_DEV_PASSWORD").unwrap_or_else(|| DEFAULT_DEV_PASSWORD.to_string()),
                });
            }
            Some("0") | Some("false") => self.dev_auth = None,
            _ => {}
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn credential_store(&self) -> Result<CredentialStore> {
        let backend: Box<dyn KeyValueStore> = match self.storage {
            StorageKind::File => Box::new(FileStore::new(self.cache_dir()?)),
            StorageKind::Keyring => Box::new(KeyringStore::new()),
            StorageKind::Memory => Box::new(MemoryStore::new()),
        };
        Ok(CredentialStore::new(backend))
    }

    pub fn auth_backend(&self, transport: Arc<dyn Transport>) -> Arc<dyn AuthBackend> {
        match self.dev_auth {
            Some(ref dev) => {
                info!(username = %dev.username, "Using development authentication backend");
                Arc::new(DevAuthBackend::new(dev.username.clone(), dev.password.clone()))
            }
            None => Arc::new(HttpAuthBackend::new(transport)),
        }
    }

    /// Wire up the session, interceptor and client described by this config.
    pub fn connect(&self, navigator: Arc<dyn Navigator>) -> Result<ApiClient> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&self.api_base_url, self.request_timeout())?);
        let session = Arc::new(SessionManager::new(
            self.credential_store()?,
            self.auth_backend(transport.clone()),
        ));
        let interceptor = Interceptor::new(session, transport, navigator);
        Ok(ApiClient::new(Arc::new(interceptor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.storage, StorageKind::File);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.dev_auth.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage":"keyring"}"#).expect("config");
        assert_eq!(config.storage, StorageKind::Keyring);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("PGO_API_URL", "http://localhost:8080/api"),
            ("PGO_STORAGE", "Memory"),
            ("PGO_DEV_AUTH", "1"),
        ]));
        assert_eq!(config.api_base_url, "http://localhost:8080/api");
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(
            config.dev_auth,
            Some(DevCredentials {
                username: "developer".into(),
                password: "dev123".into()
            })
        );

        config.apply_env(env(&[("PGO_DEV_AUTH", "0"), ("PGO_STORAGE", "floppy")]));
        assert!(config.dev_auth.is_none());
        assert_eq!(config.storage, StorageKind::Memory);
    }

    #[tokio::test]
    async fn test_dev_config_logs_in_offline() {
        let mut config = Config::default();
        config.storage = StorageKind::Memory;
        config.apply_env(env(&[("PGO_DEV_AUTH", "true"), ("PGO_DEV_USERNAME", "dev"), ("PGO_DEV_PASSWORD", "pw")]));

        let client = config
            .connect(Arc::new(crate::testing::RecordingNavigator::default()))
            .expect("connect");
        let profile = client.session().login("dev", "pw").await.expect("dev login");
        assert_eq!(profile.username, "dev");
        assert!(client.session().is_authenticated());
    }
}
