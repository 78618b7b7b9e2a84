// Settings file loading

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::connection::config::ConnectionOptions;
use crate::connection::types::{DuplicatePolicy, IndexSpec};
use crate::error::FatalError;
use crate::helpers::REDACTED_PASSWORD;
use crate::helpers::credentials::{Credentials, DEFAULT_TOKEN_BYTES};

const APP_NAME: &str = "mongocore";
const SETTINGS_FILE: &str = "settings.json";

/// Everything the process reads from its settings file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub mongodb: MongoSettings,
    #[serde(default)]
    pub security: SecuritySettings,
}

/// The `mongodb` section
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub database_name: String,
    #[serde(flatten)]
    pub connection: ConnectionOptions,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Named secondary databases, looked up with [`Settings::database_target`].
    #[serde(default)]
    pub databases: HashMap<String, DatabaseTarget>,
    /// Indexes provisioned at startup
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

/// Where one logical database lives
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseTarget {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub database_name: String,
}

/// The `security` section
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySettings {
    #[serde(default)]
    pub password_pepper: String,
    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,
}

fn default_token_bytes() -> usize {
    DEFAULT_TOKEN_BYTES
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self { password_pepper: String::new(), token_bytes: DEFAULT_TOKEN_BYTES }
    }
}

impl fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecuritySettings")
            .field("password_pepper", &REDACTED_PASSWORD)
            .field("token_bytes", &self.token_bytes)
            .finish()
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&data)
            .with_context(|| format!("Failed to deserialize {}", path.display()))?;
        Ok(settings)
    }

    /// Write settings as pretty JSON (atomic via temp + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        atomic_write(path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// `settings.json` in the platform-specific config directory
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME).join(SETTINGS_FILE))
            .context("Could not determine config directory")
    }

    /// Resolve the host and name of the default database, or of a named one.
    ///
    /// A missing entry or an empty value is a fatal configuration error.
    pub fn database_target(&self, key: Option<&str>) -> Result<DatabaseTarget, FatalError> {
        let (prefix, target) = match key {
            None => (
                "mongodb".to_string(),
                DatabaseTarget {
                    host: self.mongodb.host.clone(),
                    database_name: self.mongodb.database_name.clone(),
                },
            ),
            Some(key) => {
                let target = self.mongodb.databases.get(key).cloned().ok_or_else(|| {
                    FatalError::config(format!("mongodb.databases.{key} is not configured"))
                })?;
                (format!("mongodb.databases.{key}"), target)
            }
        };

        if target.host.trim().is_empty() {
            return Err(FatalError::config(format!("{prefix}.host is not set")));
        }
        if target.database_name.trim().is_empty() {
            return Err(FatalError::config(format!("{prefix}.database_name is not set")));
        }
        Ok(target)
    }

    /// Credential primitives bound to the configured pepper
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.security.password_pepper.clone())
            .with_token_bytes(self.security.token_bytes)
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
