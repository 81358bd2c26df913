//! This module provides the shared, durable document store used by the request processors.
//! The [`DocumentStore`] trait is the seam the router works against, and [`JsonStore`] is the
//! implementation that mirrors the document into a single JSON file.
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::Result;

/// An immutable, point-in-time snapshot of the whole shared document.
///
/// Snapshots are cheap to hand out (they share the underlying value) and can never be changed,
/// so a reader can not observe a concurrent write half way through. Use [`Document::to_value`]
/// to get a private copy that can be mutated and written back.
#[derive(Clone, PartialEq)]
pub struct Document(Arc<Value>);

impl Document {
    /// wraps `value` into a snapshot
    pub fn new(value: Value) -> Self {
        Document(Arc::new(value))
    }

    /// the document a store starts out with when there is nothing (usable) on disk:
    /// `{"users": []}`
    pub fn empty() -> Self {
        Document::new(json!({ "users": [] }))
    }

    /// returns a deep, independent copy of the snapshot's value
    pub fn to_value(&self) -> Value {
        self.0.as_ref().clone()
    }

    /// returns the `users` array of the document, if it has one
    pub fn users(&self) -> Option<&Vec<Value>> {
        self.0.get("users").and_then(Value::as_array)
    }
}

impl Deref for Document {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_ref(), f)
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Document::new(value)
    }
}

/// How a store came up when it was opened.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// an existing document was loaded from disk
    Loaded,
    /// there was no document on disk, an empty one was created and persisted
    Created,
    /// the document on disk could not be parsed, the store started from an empty document
    Recovered,
}

/// A trait for a shared document store that can be handed to many worker threads.
///
/// Every method is all-or-nothing with respect to the whole document: a failed write leaves
/// both the in-memory snapshot and the persisted copy as they were.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// returns a snapshot of the current document
    fn read(&self) -> Document;

    /// replaces the whole document with `doc` and persists it.
    ///
    /// `read` followed by `write` is last-writer-wins: a write from another thread in between
    /// is overwritten. Use [`update`](DocumentStore::update) to modify the document safely.
    ///
    /// # Errors
    /// Returns an error if the document could not be persisted. Nothing has changed in that case
    fn write(&self, doc: Value) -> Result<()>;

    /// runs a read-modify-write on the document while holding the store's lock, so concurrent
    /// updates are applied one after the other and none is lost.
    ///
    /// `f` gets a private copy of the current document. If `f` returns an error, or the new
    /// document can not be persisted, the store is left untouched and the error is returned.
    /// On success the new snapshot is returned.
    fn update<F>(&self, f: F) -> Result<Document>
    where
        F: FnOnce(&mut Value) -> Result<()>;
}

mod json;

pub use self::json::JsonStore;
