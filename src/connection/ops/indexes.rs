//! Index operations for MongoDB collections.

use futures::TryStreamExt;
use log::{info, warn};
use mongodb::IndexModel;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::IndexOptions;

use crate::connection::SessionHandle;
use crate::connection::ops::collections::is_duplicate_key_error;
use crate::connection::types::{DuplicatePolicy, IndexSpec};
use crate::error::{FatalError, FatalKind, Result};

impl SessionHandle {
    /// Provision a unique, sparse, background-built index over `keys`.
    ///
    /// Existing duplicates are deleted so the build can succeed, keeping the document
    /// with the lowest `_id` per key tuple. Use [`ensure_index_with`](Self::ensure_index_with)
    /// and [`DuplicatePolicy::Fail`] to keep them instead.
    pub fn ensure_index(&self, collection: &str, keys: &[&str]) -> Result<(), FatalError> {
        let spec = IndexSpec::new(collection, keys.iter().copied());
        self.ensure_index_with(&spec, DuplicatePolicy::DropDuplicates)
    }

    /// Provision an index; any failure other than tolerated duplicates is fatal.
    pub fn ensure_index_with(
        &self,
        spec: &IndexSpec,
        policy: DuplicatePolicy,
    ) -> Result<(), FatalError> {
        if spec.keys.iter().all(|key| key.trim().is_empty()) {
            return Err(FatalError::new(
                FatalKind::IndexProvisioning,
                format!("index on {} has no keys", spec.collection),
            ));
        }

        let runtime = self.runtime();
        runtime.block_on(async {
            match self.create_index(spec).await {
                Ok(()) => {}
                Err(err) if tolerates_duplicates(spec, policy) && is_duplicate_key_error(&err) => {
                    warn!(
                        "duplicate keys {:?} in {}; dropping duplicate documents",
                        spec.keys, spec.collection
                    );
                    let removed =
                        self.drop_duplicates(spec).await.map_err(|e| provisioning(spec, e))?;
                    warn!("dropped {removed} duplicate documents from {}", spec.collection);
                    self.create_index(spec).await.map_err(|e| provisioning(spec, e))?;
                }
                Err(err) => return Err(provisioning(spec, err)),
            }
            info!("index {:?} ready on {}", spec.keys, spec.collection);
            Ok::<(), FatalError>(())
        })
    }

    /// List indexes for a collection
    pub fn list_indexes(&self, collection: &str) -> Result<Vec<IndexModel>> {
        let coll = self.primary_collection::<Document>(collection);

        self.runtime().block_on(async {
            let cursor = coll.list_indexes().await?;
            let indexes: Vec<IndexModel> = cursor.try_collect().await?;
            Ok(indexes)
        })
    }

    async fn create_index(&self, spec: &IndexSpec) -> mongodb::error::Result<()> {
        let options = IndexOptions::builder()
            .unique(spec.unique)
            .sparse(spec.sparse)
            .background(spec.background)
            .build();
        let index = IndexModel::builder().keys(spec.key_document()).options(options).build();
        self.primary_collection::<Document>(&spec.collection).create_index(index).await?;
        Ok(())
    }

    /// Delete documents until no two share an index key tuple, keeping the lowest `_id`.
    ///
    /// Missing fields compare equal to null, as they do in the index. Array fields are
    /// unwound so documents sharing any element conflict, like entries of a multikey
    /// index. With a sparse index, documents missing every indexed field are not part
    /// of any tuple.
    async fn drop_duplicates(&self, spec: &IndexSpec) -> mongodb::error::Result<u64> {
        let coll = self.primary_collection::<Document>(&spec.collection);
        let fields = spec.field_names();

        let mut pipeline = Vec::new();
        if spec.sparse {
            let present: Vec<Bson> = fields
                .iter()
                .map(|field| {
                    let mut exists = Document::new();
                    exists.insert(field.as_str(), doc! { "$exists": true });
                    Bson::Document(exists)
                })
                .collect();
            pipeline.push(doc! { "$match": { "$or": present } });
        }

        let mut key = Document::new();
        for (idx, field) in fields.iter().enumerate() {
            let name = format!("k{idx}");
            let source = format!("${field}");
            let path = format!("${name}");

            let mut added = Document::new();
            added.insert(name.as_str(), doc! { "$ifNull": [source, Bson::Null] });
            pipeline.push(doc! { "$addFields": added });
            pipeline.push(doc! {
                "$unwind": { "path": path.as_str(), "preserveNullAndEmptyArrays": true }
            });
            key.insert(name, doc! { "$ifNull": [path, Bson::Null] });
        }

        // One entry per (tuple, document) so repeated elements in one array do not count.
        pipeline.push(doc! { "$group": { "_id": { "k": key, "id": "$_id" } } });
        pipeline.push(doc! { "$sort": { "_id.id": 1 } });
        pipeline.push(doc! {
            "$group": {
                "_id": "$_id.k",
                "ids": { "$push": "$_id.id" },
                "first": { "$first": "$_id.id" },
            }
        });
        pipeline.push(doc! { "$match": { "ids.1": { "$exists": true } } });
        pipeline.push(doc! { "$sort": { "first": 1 } });

        let groups: Vec<Document> =
            coll.aggregate(pipeline).allow_disk_use(true).await?.try_collect().await?;

        let doomed = select_extras(&groups);
        if doomed.is_empty() {
            return Ok(0);
        }
        let result = coll.delete_many(doc! { "_id": { "$in": doomed } }).await?;
        Ok(result.deleted_count)
    }
}

/// Pick the documents to delete from groups of conflicting ids, each sorted by `_id`.
///
/// Groups are visited lowest id first; within a group the lowest id not already
/// deleted survives. A document deleted for one tuple no longer conflicts elsewhere.
fn select_extras(groups: &[Document]) -> Vec<Bson> {
    let mut doomed: Vec<Bson> = Vec::new();
    for group in groups {
        let Ok(ids) = group.get_array("ids") else {
            continue;
        };
        let mut survivors = ids.iter().filter(|id| !doomed.contains(*id));
        if survivors.next().is_none() {
            continue;
        }
        let extra: Vec<Bson> = survivors.cloned().collect();
        doomed.extend(extra);
    }
    doomed
}

fn tolerates_duplicates(spec: &IndexSpec, policy: DuplicatePolicy) -> bool {
    spec.unique && policy == DuplicatePolicy::DropDuplicates
}

fn provisioning(spec: &IndexSpec, err: mongodb::error::Error) -> FatalError {
    FatalError::with_source(
        FatalKind::IndexProvisioning,
        format!("failed to ensure index {:?} on {}", spec.keys, spec.collection),
        err,
    )
}
