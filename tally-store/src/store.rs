//! The generic persisted keyed store.
//!
//! A [`Store`] is built from a raw JSON document by a [`Schema`]-supplied
//! validation step. Construction either succeeds with a complete mapping or
//! fails with a [`Failure::Parse`]; there are no partially valid stores.
//!
//! The store never writes by itself. Callers mutate the mapping through
//! [`Store::insert`] / [`Store::remove`] and then call [`Store::persist`], which
//! rewrites the whole backing document. A failed persist does not roll back the
//! in-memory mapping; until a persist succeeds the two may differ.

use std::{
    collections::BTreeMap,
    fmt::Debug,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tally_core::{assert_never_reached, Failure, Id, Outcome};

use crate::document;

/// Describes the records of one kind of store and how a raw document is
/// validated into them.
pub trait Schema {
    /// Marker type for the ids of this store's records.
    type Kind;
    type Record: Clone + Debug + Serialize + DeserializeOwned;

    /// Human readable name of a record, used in failures and logs.
    const NAME: &'static str;

    fn id(record: &Self::Record) -> &Id<Self::Kind>;

    /// Feature-specific checks on a single record, after it has been
    /// deserialized.
    fn check(_record: &Self::Record) -> Result<(), String> {
        Ok(())
    }

    /// Convert a raw document into the store's mapping.
    ///
    /// The default accepts a JSON object whose keys are ids and whose values
    /// deserialize into records carrying that same id.
    fn validate(raw: Value) -> Result<BTreeMap<Id<Self::Kind>, Self::Record>, String> {
        let entries = match raw {
            Value::Object(entries) => entries,
            other => {
                return Err(format!(
                    "expected an object of {} records, got {}",
                    Self::NAME,
                    json_type_name(&other)
                ))
            }
        };
        let mut records = BTreeMap::new();
        for (key, value) in entries {
            let id: Id<Self::Kind> = Id::parse(&key).map_err(|f| f.detail())?;
            let record: Self::Record = serde_json::from_value(value)
                .map_err(|e| format!("{} '{}': {}", Self::NAME, key, e))?;
            let record_id = Self::id(&record);
            if *record_id != id {
                return Err(format!(
                    "{} stored under '{}' has id '{}'",
                    Self::NAME,
                    key,
                    record_id
                ));
            }
            Self::check(&record).map_err(|e| format!("{} '{}': {}", Self::NAME, key, e))?;
            records.insert(id, record);
        }
        Ok(records)
    }
}

pub struct Store<S: Schema> {
    location: PathBuf,
    records: BTreeMap<Id<S::Kind>, S::Record>,
}

impl<S: Schema> Store<S> {
    /// Validate `raw` into a store backed by `location`.
    pub fn construct(raw: Value, location: impl Into<PathBuf>) -> Outcome<Self> {
        let location = location.into();
        let records = S::validate(raw).map_err(|detail| Failure::parse(&location, detail))?;
        tracing::debug!(
            store = S::NAME,
            location = %location.display(),
            records = records.len(),
            "constructed store"
        );
        Ok(Store { location, records })
    }

    /// Read the document at `location` and construct a store from it.
    pub async fn open(location: impl Into<PathBuf>) -> Outcome<Self> {
        let location = location.into();
        let raw = document::read_document(&location).await?;
        Self::construct(raw, location)
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn get(&self, id: &Id<S::Kind>) -> Option<&S::Record> {
        self.records.get(id)
    }

    /// All records, ordered by id.
    pub fn get_all(&self) -> impl Iterator<Item = &S::Record> {
        self.records.values()
    }

    pub fn contains(&self, id: &Id<S::Kind>) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace a record under its own id. Returns the replaced record.
    ///
    /// This only changes the in-memory mapping; see [`Store::persist`].
    pub fn insert(&mut self, record: S::Record) -> Option<S::Record> {
        let id = S::id(&record).clone();
        self.records.insert(id, record)
    }

    /// Remove a record from the in-memory mapping.
    pub fn remove(&mut self, id: &Id<S::Kind>) -> Option<S::Record> {
        self.records.remove(id)
    }

    /// The document form of the current mapping; the inverse of
    /// [`Schema::validate`].
    pub fn to_serializable(&self) -> Value {
        // Every record was deserialized from JSON or built from typed fields,
        // and ids serialize as strings, so this cannot fail.
        serde_json::to_value(&self.records).unwrap_or_else(|e| assert_never_reached(e))
    }

    /// Overwrite the backing document with the current mapping.
    pub async fn persist(&self) -> Outcome<()> {
        let document = self.to_serializable();
        document::write_document(&self.location, &document)
            .await
            .inspect_err(|f| {
                tracing::warn!(
                    store = S::NAME,
                    reason = f.reason(),
                    "persist failed; in-memory state is ahead of {}",
                    self.location.display()
                )
            })
    }

    /// Tear the store down. The backing document is left as last persisted.
    pub fn destroy(self) {
        tracing::debug!(
            store = S::NAME,
            location = %self.location.display(),
            "destroyed store"
        );
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
