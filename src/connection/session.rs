//! Per-caller session cloned from the pool.

use log::{debug, info};
use mongodb::gridfs::GridFsBucket;
use mongodb::options::{DatabaseOptions, GridFsBucketOptions, ReadPreference, SelectionCriteria};
use mongodb::{Client, ClientSession, Collection, Database};
use tokio::runtime::Handle;

use crate::connection::types::ConsistencyMode;
use crate::error::{FatalError, FatalKind, Result};

/// A session on one logical database, owned by exactly one caller.
///
/// The handle shares the pool's topology and credentials but carries its own
/// server session, started lazily on the first data operation. It is not meant to
/// be shared: every concurrent operation should take its own handle from
/// [`ConnectionManager::init`](crate::ConnectionManager::init). Resources are
/// released on [`close`](Self::close) or when the handle is dropped, whichever
/// happens first, so early returns and `?` paths release it too.
pub struct SessionHandle {
    runtime: Handle,
    client: Client,
    database: Database,
    causal: bool,
    session: Option<ClientSession>,
}

impl SessionHandle {
    pub(crate) fn new(
        runtime: Handle,
        client: Client,
        database_name: &str,
        consistency: ConsistencyMode,
    ) -> Self {
        let database = client.database(database_name);
        Self { runtime, client, database, causal: consistency.causal(), session: None }
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// A fresh reference to a collection in the bound database
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }

    /// A fresh reference to a GridFS bucket (`<name>.files` / `<name>.chunks`).
    ///
    /// Bucket reads run outside the handle's session, so they always go to the primary
    /// and see every completed upload.
    pub fn blob_store(&self, name: &str) -> GridFsBucket {
        self.database.gridfs_bucket(blob_store_options(name))
    }

    /// A collection whose reads go to the primary, for work that runs without the
    /// handle's session (index builds, listings, duplicate scans).
    pub(crate) fn primary_collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.primary_database().collection(name)
    }

    pub(crate) fn primary_database(&self) -> Database {
        let options = DatabaseOptions::builder().selection_criteria(primary()).build();
        self.client.database_with_options(self.database.name(), options)
    }

    /// Irreversibly delete every collection in the bound database.
    pub fn drop_database(&self) -> std::result::Result<(), FatalError> {
        let name = self.database_name().to_string();
        self.runtime.block_on(async { self.database.drop().await }).map_err(|e| {
            FatalError::with_source(
                FatalKind::DropDatabase,
                format!("failed to drop database {name}"),
                e,
            )
        })?;
        info!("dropped database {name}");
        Ok(())
    }

    /// Release the handle's server session and connection.
    pub fn close(self) {
        debug!("closing session on database {}", self.database_name());
    }

    pub(crate) fn runtime(&self) -> Handle {
        self.runtime.clone()
    }

    /// The handle's server session, started on first use.
    pub(crate) async fn session(&mut self) -> Result<&mut ClientSession> {
        let started = match self.session.take() {
            Some(session) => session,
            None => self.client.start_session().causal_consistency(self.causal).await?,
        };
        Ok(self.session.insert(started))
    }
}

fn primary() -> SelectionCriteria {
    SelectionCriteria::ReadPreference(ReadPreference::Primary)
}

fn blob_store_options(name: &str) -> GridFsBucketOptions {
    GridFsBucketOptions::builder()
        .bucket_name(name.to_string())
        .selection_criteria(primary())
        .build()
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // Returning the server session to the pool spawns onto the runtime.
        let _guard = self.runtime.enter();
        drop(self.session.take());
    }
}
