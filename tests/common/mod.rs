//! Common test utilities and fixtures for integration tests using Testcontainers.
//!
//! A single MongoDB 7.0 container is shared per test binary (Rust compiles each
//! `tests/*.rs` file as a separate binary). Per-test isolation is achieved by
//! namespacing every database name with a short UUID suffix.
//!
//! The container runs on a dedicated background thread with its own tokio runtime.
//! Tests themselves are plain `#[test]` functions: the session API blocks on the
//! connection manager's runtime and must not be driven from inside another one.
//!
//! An `atexit` hook ensures the container is removed when the process exits.

#![allow(dead_code)]

pub mod fixtures;

use mongocore::{ConnectionManager, ConnectionOptions, SessionHandle};
use mongodb::{Client, options::ClientOptions};
use std::sync::OnceLock;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

/// Connection info for the shared container.
struct SharedContainer {
    connection_string: String,
}

static SHARED: OnceLock<SharedContainer> = OnceLock::new();

/// Docker container ID, stored globally so the `atexit` handler can remove it.
static CONTAINER_ID: OnceLock<String> = OnceLock::new();

unsafe extern "C" {
    fn atexit(f: extern "C" fn()) -> i32;
}

/// Called by the C runtime on process exit. Forcibly removes the shared container.
extern "C" fn remove_container() {
    if let Some(id) = CONTAINER_ID.get() {
        let _ = std::process::Command::new("docker")
            .args(["rm", "-f", id])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
    }
}

/// Initialize the shared container (called once per test binary).
fn get_or_init_shared() -> &'static SharedContainer {
    SHARED.get_or_init(|| {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to create container runtime");

            rt.block_on(async {
                let container = Mongo::default()
                    .with_tag("7.0")
                    .start()
                    .await
                    .expect("Failed to start MongoDB container");

                let _ = CONTAINER_ID.set(container.id().to_string());
                unsafe {
                    atexit(remove_container);
                }

                let host = container.get_host().await.expect("Failed to get host");
                let port = container.get_host_port_ipv4(27017).await.expect("Failed to get port");
                let connection_string = format!("mongodb://{}:{}", host, port);

                // Readiness probe
                let opts = ClientOptions::parse(&connection_string).await.expect("Failed to parse");
                let probe = Client::with_options(opts).expect("Failed to create probe client");
                for _ in 0..30 {
                    if probe.list_database_names().await.is_ok() {
                        break;
                    }
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
                drop(probe);

                tx.send(connection_string).expect("Failed to send connection string");

                // Park forever; keeps the container alive until the process exits.
                std::future::pending::<()>().await;
            });
        });

        SharedContainer {
            connection_string: rx.recv().expect("Failed to receive connection string"),
        }
    })
}

/// A connection manager pointed at the shared container, with a private database.
///
/// Each handle gets a unique `test_id` so that `db_name("foo")` returns
/// `foo_{test_id}`, preventing cross-test interference.
pub struct TestDatabase {
    pub manager: ConnectionManager,
    pub connection_string: String,
    database_name: String,
}

impl TestDatabase {
    /// Create a fresh manager (not yet dialed) for a namespaced database.
    pub fn start(name: &str) -> Self {
        Self::with_options(name, ConnectionOptions::default())
    }

    pub fn with_options(name: &str, options: ConnectionOptions) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let shared = get_or_init_shared();
        let manager = ConnectionManager::new(options).expect("Failed to create manager");

        // Use first 8 chars of UUID v4 as a short, unique namespace suffix.
        let test_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

        Self {
            manager,
            connection_string: shared.connection_string.clone(),
            database_name: format!("{name}_{test_id}"),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// A new session on this test's database.
    pub fn session(&self) -> SessionHandle {
        self.manager
            .init(&self.connection_string, &self.database_name)
            .expect("Failed to initialize session")
    }
}
