use mongodb::bson::{Bson, Document};
use mongodb::options::{ReadPreference, SelectionCriteria};
use serde::{Deserialize, Serialize};

/// Read consistency for every session derived from the pool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Reads and writes always go to the primary.
    Strong,
    /// Reads may go to secondaries, but a session never observes time moving backward.
    #[default]
    Monotonic,
    /// Reads go to the nearest member with no ordering guarantee.
    Eventual,
}

impl ConsistencyMode {
    pub fn label(self) -> &'static str {
        match self {
            ConsistencyMode::Strong => "strong",
            ConsistencyMode::Monotonic => "monotonic",
            ConsistencyMode::Eventual => "eventual",
        }
    }

    pub fn selection_criteria(self) -> SelectionCriteria {
        let read_preference = match self {
            ConsistencyMode::Strong => ReadPreference::Primary,
            ConsistencyMode::Monotonic => {
                ReadPreference::SecondaryPreferred { options: Default::default() }
            }
            ConsistencyMode::Eventual => ReadPreference::Nearest { options: Default::default() },
        };
        SelectionCriteria::ReadPreference(read_preference)
    }

    /// Whether sessions should be causally consistent.
    pub fn causal(self) -> bool {
        !matches!(self, ConsistencyMode::Eventual)
    }
}

/// What index provisioning does when existing documents violate uniqueness
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Delete all but one document per duplicated key tuple, then build the index.
    /// This is destructive.
    #[default]
    DropDuplicates,
    /// Treat duplicates as a provisioning failure.
    Fail,
}

/// Index definition consumed by index provisioning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub collection: String,
    /// Ordered field names; `-field` is descending, `field` or `+field` ascending.
    pub keys: Vec<String>,
    #[serde(default = "default_true")]
    pub unique: bool,
    #[serde(default = "default_true")]
    pub sparse: bool,
    #[serde(default = "default_true")]
    pub background: bool,
}

fn default_true() -> bool {
    true
}

impl IndexSpec {
    /// Unique, sparse, background-built index over `keys`.
    pub fn new<I, S>(collection: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collection: collection.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            unique: true,
            sparse: true,
            background: true,
        }
    }

    /// Field names without direction prefixes, in index order.
    pub fn field_names(&self) -> Vec<String> {
        self.keys.iter().map(|key| split_key(key).0.to_string()).collect()
    }

    /// The index key document, e.g. `["name", "-age"]` -> `{ name: 1, age: -1 }`.
    pub fn key_document(&self) -> Document {
        let mut keys = Document::new();
        for key in &self.keys {
            let (field, direction) = split_key(key);
            keys.insert(field, direction);
        }
        keys
    }
}

fn split_key(key: &str) -> (&str, i32) {
    let key = key.trim();
    if let Some(field) = key.strip_prefix('-') {
        (field, -1)
    } else if let Some(field) = key.strip_prefix('+') {
        (field, 1)
    } else {
        (key, 1)
    }
}

/// Offset/limit pagination for collection queries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: i64,
}

impl Page {
    pub fn new(offset: u64, limit: i64) -> Self {
        Self { offset, limit }
    }
}

/// Result of a successful blob upload
#[derive(Clone, Debug, PartialEq)]
pub struct UploadedFile {
    /// Server-assigned identifier, usable for later retrieval.
    pub id: Bson,
    pub file_name: String,
    pub bytes_written: usize,
}

/// A stored file entry as listed from a blob store
#[derive(Clone, Debug, PartialEq)]
pub struct StoredFile {
    pub id: Bson,
    pub file_name: Option<String>,
    pub length: u64,
}
