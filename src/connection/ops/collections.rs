//! Document operations run through a session handle.

use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};

use crate::connection::SessionHandle;
use crate::connection::types::Page;
use crate::error::{Error, Result};

/// Server codes reported for unique-index violations.
const DUPLICATE_KEY_CODES: [i32; 3] = [11000, 11001, 12582];

/// Whether a driver error is a violated uniqueness constraint.
pub fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            DUPLICATE_KEY_CODES.contains(&write_error.code)
        }
        ErrorKind::Command(command_error) => DUPLICATE_KEY_CODES.contains(&command_error.code),
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|e| DUPLICATE_KEY_CODES.contains(&e.code))),
        // Anything else only carries the server code in its message.
        _ => err.to_string().contains("E11000"),
    }
}

impl Error {
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            Error::Mongo(err) => is_duplicate_key_error(err),
            _ => false,
        }
    }
}

impl SessionHandle {
    /// Delete every document in a collection, returning how many were removed.
    ///
    /// The collection itself and its indexes stay in place.
    pub fn remove_all(&mut self, collection: &str) -> Result<u64> {
        let coll = self.collection::<Document>(collection);
        let runtime = self.runtime();

        runtime.block_on(async {
            let session = self.session().await?;
            let result = coll.delete_many(doc! {}).session(session).await?;
            log::info!("removed {} documents from {collection}", result.deleted_count);
            Ok(result.deleted_count)
        })
    }

    /// Names of the collections in the bound database
    pub fn list_collection_names(&self) -> Result<Vec<String>> {
        let database = self.primary_database();
        self.runtime().block_on(async {
            let names = database.list_collection_names().await?;
            Ok(names)
        })
    }

    /// Count documents matching a filter
    pub fn count(&mut self, collection: &str, filter: Document) -> Result<u64> {
        let coll = self.collection::<Document>(collection);
        let runtime = self.runtime();

        runtime.block_on(async {
            let session = self.session().await?;
            let total = coll.count_documents(filter).session(session).await?;
            Ok(total)
        })
    }

    /// Insert a document, returning its `_id`
    pub fn insert(&mut self, collection: &str, document: Document) -> Result<Bson> {
        let coll = self.collection::<Document>(collection);
        let runtime = self.runtime();

        runtime.block_on(async {
            let session = self.session().await?;
            let result = coll.insert_one(document).session(session).await?;
            Ok(result.inserted_id)
        })
    }

    /// Insert several documents in order, returning how many were inserted
    pub fn insert_many(&mut self, collection: &str, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let coll = self.collection::<Document>(collection);
        let runtime = self.runtime();

        runtime.block_on(async {
            let session = self.session().await?;
            let result = coll.insert_many(documents).session(session).await?;
            Ok(result.inserted_ids.len())
        })
    }

    /// Find one page of documents along with the total number matching the filter
    pub fn find_page(
        &mut self,
        collection: &str,
        filter: Document,
        page: Page,
    ) -> Result<(Vec<Document>, u64)> {
        if page.limit < 0 {
            return Err(Error::InvalidArgument(format!("negative page limit {}", page.limit)));
        }
        let coll = self.collection::<Document>(collection);
        let runtime = self.runtime();

        runtime.block_on(async {
            let session = self.session().await?;

            // Get total count (with filter)
            let total = coll.count_documents(filter.clone()).session(&mut *session).await?;

            let mut options = mongodb::options::FindOptions::default();
            options.skip = Some(page.offset);
            options.limit = (page.limit > 0).then_some(page.limit);
            options.sort = Some(doc! { "_id": 1 });

            let mut cursor =
                coll.find(filter).with_options(options).session(&mut *session).await?;
            let documents: Vec<Document> = cursor.stream(session).try_collect().await?;

            Ok((documents, total))
        })
    }
}
