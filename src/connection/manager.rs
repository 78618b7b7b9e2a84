//! Core ConnectionManager struct: the lazily dialed, process-wide connection pool.

use std::sync::OnceLock;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use tokio::runtime::Runtime;
use tokio::sync::OnceCell;

use crate::config::Settings;
use crate::connection::SessionHandle;
use crate::connection::config::{ConnectionConfig, ConnectionOptions};
use crate::error::{FatalError, FatalKind};
use crate::helpers::validate::redact_uri_password;

/// Establishes the pooled client for a derived configuration.
///
/// The manager calls this at most once per successful initialization; tests inject
/// their own implementation to observe dial attempts.
pub trait Dialer: Send + Sync {
    fn dial<'a>(
        &'a self,
        config: &'a ConnectionConfig,
    ) -> BoxFuture<'a, mongodb::error::Result<Client>>;
}

/// Dials a real deployment and verifies it with a `ping`
#[derive(Clone, Copy, Debug, Default)]
pub struct MongoDialer;

impl Dialer for MongoDialer {
    fn dial<'a>(
        &'a self,
        config: &'a ConnectionConfig,
    ) -> BoxFuture<'a, mongodb::error::Result<Client>> {
        Box::pin(async move {
            let options = client_options(config).await?;
            let client = Client::with_options(options)?;

            // Ping to verify connection
            client.database("admin").run_command(doc! { "ping": 1 }).await?;

            Ok(client)
        })
    }
}

/// Build driver options for a derived configuration.
pub async fn client_options(config: &ConnectionConfig) -> mongodb::error::Result<ClientOptions> {
    let connection = config.options();
    let mut options = ClientOptions::parse(config.host_uri()).await?;
    options.connect_timeout = Some(connection.connect_timeout());
    options.server_selection_timeout = Some(connection.connect_timeout());
    options.selection_criteria = Some(connection.consistency.selection_criteria());

    if config.use_tls() {
        if connection.tls.allow_invalid_certificates {
            warn!(
                "TLS certificate verification is disabled for {}",
                config.redacted_uri()
            );
        }
        let mut tls = TlsOptions::default();
        tls.allow_invalid_certificates = Some(connection.tls.allow_invalid_certificates);
        tls.ca_file_path = connection.tls.ca_file_path.clone();
        options.tls = Some(Tls::Enabled(tls));
    }

    Ok(options)
}

struct Pool {
    client: Client,
    config: ConnectionConfig,
    source_uri: String,
}

/// Owns the pooled client and the Tokio runtime that drives it.
///
/// The first [`init`](Self::init) dials; concurrent first callers wait on the same
/// dial instead of racing. Every call returns a fresh [`SessionHandle`].
/// All methods block, so they must not be called from inside an async context.
pub struct ConnectionManager {
    pool: OnceCell<Pool>,
    dialer: Box<dyn Dialer>,
    options: ConnectionOptions,
    /// Tokio runtime for MongoDB async operations
    runtime: Runtime,
}

impl ConnectionManager {
    /// Create a manager that dials real deployments
    pub fn new(options: ConnectionOptions) -> Result<Self, FatalError> {
        Self::with_dialer(options, MongoDialer)
    }

    /// Create a manager with a custom dialer
    pub fn with_dialer(
        options: ConnectionOptions,
        dialer: impl Dialer + 'static,
    ) -> Result<Self, FatalError> {
        let runtime = Runtime::new().map_err(|e| {
            FatalError::new(FatalKind::Runtime, format!("failed to create Tokio runtime: {e}"))
        })?;
        Ok(Self { pool: OnceCell::new(), dialer: Box::new(dialer), options, runtime })
    }

    /// Create a manager using the connection options from settings
    pub fn from_settings(settings: &Settings) -> Result<Self, FatalError> {
        Self::new(settings.mongodb.connection.clone())
    }

    /// Get a handle to the Tokio runtime for spawning parallel tasks
    pub fn runtime_handle(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// The configuration the pool was dialed with, once initialized
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.pool.get().map(|pool| &pool.config)
    }

    /// Return a new session bound to `database_name`, dialing the pool first if needed.
    ///
    /// A dial failure is fatal: the process has no database to serve from.
    pub fn init(&self, host_uri: &str, database_name: &str) -> Result<SessionHandle, FatalError> {
        let database_name = database_name.trim();
        if database_name.is_empty() {
            return Err(FatalError::config("database name is required"));
        }

        let pool = self
            .runtime
            .block_on(self.pool.get_or_try_init(|| self.dial(host_uri, database_name)))?;

        if pool.source_uri != host_uri.trim() {
            warn!(
                "pool already dialed to {}; ignoring host {}",
                pool.config.redacted_uri(),
                redact_uri_password(host_uri)
            );
        }

        debug!("new session on database {database_name}");
        Ok(SessionHandle::new(
            self.runtime.handle().clone(),
            pool.client.clone(),
            database_name,
            pool.config.options().consistency,
        ))
    }

    /// Initialize from the default database in settings
    pub fn init_from_settings(&self, settings: &Settings) -> Result<SessionHandle, FatalError> {
        let target = settings.database_target(None)?;
        self.init(&target.host, &target.database_name)
    }

    /// Initialize from a named database in settings (`mongodb.databases.<key>`)
    pub fn init_by_key(&self, settings: &Settings, key: &str) -> Result<SessionHandle, FatalError> {
        let target = settings.database_target(Some(key))?;
        self.init(&target.host, &target.database_name)
    }

    async fn dial(&self, host_uri: &str, database_name: &str) -> Result<Pool, FatalError> {
        let config = ConnectionConfig::derive(host_uri, database_name, &self.options)?;
        info!(
            "dialing {} (tls: {}, consistency: {})",
            config.redacted_uri(),
            config.use_tls(),
            config.options().consistency.label()
        );

        let client = self.dialer.dial(&config).await.map_err(|e| {
            FatalError::with_source(
                FatalKind::Dial,
                format!("cannot connect to {}", config.redacted_uri()),
                e,
            )
        })?;

        info!("connected to {}", config.redacted_uri());
        Ok(Pool { client, config, source_uri: host_uri.trim().to_string() })
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // The driver expects a runtime context when the last client reference goes away.
        let _guard = self.runtime.enter();
        drop(self.pool.take());
    }
}

static CONNECTION_MANAGER: OnceLock<ConnectionManager> = OnceLock::new();

/// Install the process-wide connection manager. Fails if one is already installed.
pub fn install_global(manager: ConnectionManager) -> Result<(), FatalError> {
    CONNECTION_MANAGER
        .set(manager)
        .map_err(|_| FatalError::config("a global connection manager is already installed"))
}

/// Get the process-wide connection manager, creating one with default options if needed
pub fn global() -> Result<&'static ConnectionManager, FatalError> {
    if let Some(manager) = CONNECTION_MANAGER.get() {
        return Ok(manager);
    }
    let manager = ConnectionManager::new(ConnectionOptions::default())?;
    // A concurrent caller may install first. Its manager is kept and ours is dropped
    // before it ever dials.
    if let Err(unused) = CONNECTION_MANAGER.set(manager) {
        drop(unused);
    }
    CONNECTION_MANAGER
        .get()
        .ok_or_else(|| FatalError::new(FatalKind::Runtime, "global connection manager missing"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::types::ConsistencyMode;
    use mongodb::options::{ReadPreference, SelectionCriteria};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts dials and hands back a client that never contacts a server.
    struct CountingDialer {
        dials: Arc<AtomicUsize>,
    }

    impl Dialer for CountingDialer {
        fn dial<'a>(
            &'a self,
            config: &'a ConnectionConfig,
        ) -> BoxFuture<'a, mongodb::error::Result<Client>> {
            Box::pin(async move {
                self.dials.fetch_add(1, Ordering::SeqCst);
                // Widen the window in which concurrent callers could race.
                tokio::time::sleep(Duration::from_millis(50)).await;
                let options = client_options(config).await?;
                Client::with_options(options)
            })
        }
    }

    /// Always fails with a real driver error.
    struct FailingDialer;

    impl Dialer for FailingDialer {
        fn dial<'a>(
            &'a self,
            _config: &'a ConnectionConfig,
        ) -> BoxFuture<'a, mongodb::error::Result<Client>> {
            Box::pin(async move { Client::with_uri_str("unreachable://nowhere").await })
        }
    }

    fn counting_manager() -> (ConnectionManager, Arc<AtomicUsize>) {
        let dials = Arc::new(AtomicUsize::new(0));
        let manager = ConnectionManager::with_dialer(
            ConnectionOptions::default(),
            CountingDialer { dials: Arc::clone(&dials) },
        )
        .unwrap();
        (manager, dials)
    }

    #[test]
    fn concurrent_first_init_dials_once() {
        let (manager, dials) = counting_manager();

        let handles: Vec<SessionHandle> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| manager.init("mongodb://127.0.0.1:27017", "videos")))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap().unwrap()).collect()
        });

        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert!(manager.is_initialized());
        assert_eq!(handles.len(), 16);
        for handle in handles {
            assert_eq!(handle.database_name(), "videos");
            assert_eq!(handle.collection::<mongodb::bson::Document>("users").name(), "users");
            handle.close();
        }
    }

    #[test]
    fn later_init_reuses_pool_and_binds_requested_database() {
        let (manager, dials) = counting_manager();

        let first = manager.init("mongodb://127.0.0.1:27017", "videos").unwrap();
        let second = manager.init("mongodb://127.0.0.1:27017", "audit").unwrap();
        let third = manager.init("mongodb://10.0.0.1:27017", "videos").unwrap();

        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert_eq!(first.database_name(), "videos");
        assert_eq!(second.database_name(), "audit");
        assert_eq!(third.database_name(), "videos");
        assert_eq!(manager.config().unwrap().host_uri(), "mongodb://127.0.0.1:27017/videos");
    }

    #[test]
    fn tls_marker_reaches_the_dialer_stripped() {
        let (manager, _dials) = counting_manager();
        let handle =
            manager.init("mongodb://u:p@127.0.0.1:27017/?ssl=true&authSource=admin", "videos");
        assert!(handle.is_ok());

        let config = manager.config().unwrap();
        assert!(config.use_tls());
        assert_eq!(config.host_uri(), "mongodb://u:p@127.0.0.1:27017/?authSource=admin");
    }

    #[test]
    fn dial_failure_is_fatal_and_leaves_pool_empty() {
        let manager =
            ConnectionManager::with_dialer(ConnectionOptions::default(), FailingDialer).unwrap();
        let err = manager.init("mongodb://127.0.0.1:27017", "videos").err().unwrap();
        assert_eq!(err.kind(), FatalKind::Dial);
        assert!(!manager.is_initialized());
    }

    fn derived_options(host: &str, options: &ConnectionOptions) -> ClientOptions {
        let config = ConnectionConfig::derive(host, "videos", options).unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(client_options(&config)).unwrap()
    }

    fn tls_options(options: &ClientOptions) -> &TlsOptions {
        match &options.tls {
            Some(Tls::Enabled(tls)) => tls,
            other => panic!("expected TLS to be enabled, got {other:?}"),
        }
    }

    #[test]
    fn tls_marker_enables_verified_tls_transport() {
        let options = derived_options(
            "mongodb://u:p@db0.example.net:27017/?ssl=true&authSource=admin",
            &ConnectionOptions::default(),
        );
        let tls = tls_options(&options);
        assert_eq!(tls.allow_invalid_certificates, Some(false));
        assert_eq!(tls.ca_file_path, None);
    }

    #[test]
    fn invalid_certificates_are_an_explicit_opt_in() {
        let mut connection = ConnectionOptions::default();
        connection.tls.allow_invalid_certificates = true;
        connection.tls.ca_file_path = Some("/etc/ssl/videos-ca.pem".into());

        let options = derived_options("mongodb://db0.example.net/?tls=true", &connection);
        let tls = tls_options(&options);
        assert_eq!(tls.allow_invalid_certificates, Some(true));
        assert_eq!(tls.ca_file_path, Some("/etc/ssl/videos-ca.pem".into()));
    }

    #[test]
    fn plain_uri_leaves_tls_unset() {
        let options =
            derived_options("mongodb://db0.example.net:27017", &ConnectionOptions::default());
        assert!(options.tls.is_none());
    }

    #[test]
    fn client_options_apply_timeouts_and_read_preference() {
        let connection = ConnectionOptions {
            consistency: ConsistencyMode::Strong,
            connect_timeout_secs: 3,
            ..ConnectionOptions::default()
        };
        let options = derived_options("mongodb://db0.example.net:27017", &connection);
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.server_selection_timeout, Some(Duration::from_secs(3)));
        assert!(matches!(
            options.selection_criteria,
            Some(SelectionCriteria::ReadPreference(ReadPreference::Primary))
        ));

        let options = derived_options("mongodb://db0.example.net", &ConnectionOptions::default());
        assert!(matches!(
            options.selection_criteria,
            Some(SelectionCriteria::ReadPreference(ReadPreference::SecondaryPreferred { .. }))
        ));
    }

    #[test]
    fn global_manager_is_created_once_and_not_replaced() {
        let first = global().unwrap();
        let second = global().unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(!first.is_initialized());

        let replacement = ConnectionManager::new(ConnectionOptions::default()).unwrap();
        let err = install_global(replacement).unwrap_err();
        assert_eq!(err.kind(), FatalKind::Config);
        assert!(std::ptr::eq(global().unwrap(), first));
    }

    #[test]
    fn bad_configuration_fails_before_dialing() {
        let (manager, dials) = counting_manager();

        let err = manager.init("localhost:27017", "videos").err().unwrap();
        assert_eq!(err.kind(), FatalKind::Config);

        let err = manager.init("mongodb://127.0.0.1:27017", "").err().unwrap();
        assert_eq!(err.kind(), FatalKind::Config);

        assert_eq!(dials.load(Ordering::SeqCst), 0);
        assert!(!manager.is_initialized());
    }
}
