//! Connection configuration derived once from raw host/database settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::types::ConsistencyMode;
use crate::connection::uri::ConnectionUri;
use crate::error::FatalError;
use crate::helpers::validate::{redact_uri_password, validate_mongodb_uri};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// TLS behavior when the host URI carries the TLS marker.
///
/// Certificate verification stays on unless `allow_invalid_certificates` is set.
/// Turning it off accepts any server certificate, which exposes the connection to
/// interception; it exists for self-signed development clusters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub allow_invalid_certificates: bool,
    #[serde(default)]
    pub ca_file_path: Option<PathBuf>,
}

/// Pool-wide knobs applied at dial time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    #[serde(default)]
    pub consistency: ConsistencyMode,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub tls: TlsSettings,
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            consistency: ConsistencyMode::default(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            tls: TlsSettings::default(),
        }
    }
}

impl ConnectionOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Immutable description of how to reach the database
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    host_uri: String,
    database_name: String,
    use_tls: bool,
    options: ConnectionOptions,
}

impl ConnectionConfig {
    /// Derive the dial configuration from a raw host URI and database name.
    ///
    /// A truthy `ssl`/`tls` query parameter switches to a TLS transport and is removed
    /// from the URI. Without it, the database name becomes the URI path unless the URI
    /// already names one.
    pub fn derive(
        host_uri: &str,
        database_name: &str,
        options: &ConnectionOptions,
    ) -> Result<Self, FatalError> {
        let database_name = database_name.trim();
        if database_name.is_empty() {
            return Err(FatalError::config("database name is required"));
        }
        validate_mongodb_uri(host_uri)
            .map_err(|e| FatalError::config(format!("invalid database host URI: {e}")))?;

        let mut uri = ConnectionUri::parse(host_uri)
            .map_err(|e| FatalError::config(format!("invalid database host URI: {e}")))?;

        let use_tls = uri.take_tls_marker();
        if !use_tls && uri.database().is_none() {
            uri.set_database(database_name);
        }

        Ok(Self {
            host_uri: uri.to_uri(),
            database_name: database_name.to_string(),
            use_tls,
            options: options.clone(),
        })
    }

    /// The URI handed to the driver, TLS marker removed.
    pub fn host_uri(&self) -> &str {
        &self.host_uri
    }

    pub fn redacted_uri(&self) -> String {
        redact_uri_password(&self.host_uri)
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}
