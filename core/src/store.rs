//! Pluggable storage traits for the engagement relation.
//!
//! [`EdgeStore`] owns the (actor, subject) edge relation and is the only
//! shared mutable resource in the system; every mutation flows through the
//! engine's toggle or the bulk-cleanup primitives, never through ad hoc
//! read-then-write sequences elsewhere.
//!
//! [`SubjectDirectory`] is the consumed interface of the external content
//! store: the engine only needs to know whether a subject currently exists.
//! [`SubjectRegistry`] extends it with the registration hooks the content
//! store calls when it creates or deletes content.
//!
//! The [`StoreRegistry`] holds trait objects for both, providing a unified
//! entry point for the engine. The default implementation lives in
//! `kudo_lmdb`; tests supply in-memory mocks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{ActorId, SubjectId};

/// Outcome of an atomic edge insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The edge did not exist and was created.
    Created,
    /// The edge already existed. Under concurrency this is how a lost insert
    /// race surfaces: the backend must detect it atomically, not via a
    /// pre-check.
    Conflict,
}

/// Outcome of an atomic edge remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The edge existed and was deleted.
    Removed,
    /// No such edge — possibly already removed by a concurrent caller.
    NotFound,
}

/// Backend for the persistent (actor, subject) edge relation.
///
/// Implementations must guarantee that `insert` and `remove` are atomic
/// per-pair: two concurrent inserts of the same pair yield exactly one
/// `Created` and one `Conflict`, and the pair uniqueness invariant holds at
/// every point in time. Operations on different pairs must not serialize
/// against each other beyond what the storage engine requires.
pub trait EdgeStore: Send + Sync {
    /// Whether the (actor, subject) edge currently exists.
    fn exists(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<bool>;

    /// Atomically create the edge unless it already exists.
    fn insert(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<InsertOutcome>;

    /// Atomically delete the edge if it exists.
    fn remove(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<RemoveOutcome>;

    /// Number of distinct actors with an edge to the subject.
    fn count_for(&self, subject: &SubjectId) -> anyhow::Result<u64>;

    /// Counts for a batch of subjects, read under a single snapshot.
    ///
    /// Every requested id appears in the result, with 0 for subjects that
    /// have no edges — absence is never surfaced as a missing key.
    fn count_for_many(&self, subjects: &[SubjectId]) -> anyhow::Result<HashMap<SubjectId, u64>>;

    /// Delete every edge created by the actor. Returns the number removed.
    ///
    /// Bulk-cleanup primitive for the identity provider (account deletion).
    fn remove_all_for_actor(&self, actor: &ActorId) -> anyhow::Result<u64>;

    /// Delete every edge referencing the subject. Returns the number removed.
    ///
    /// Bulk-cleanup primitive for the content store (content deletion).
    fn remove_all_for_subject(&self, subject: &SubjectId) -> anyhow::Result<u64>;

    /// Total number of edges across all subjects. Observability only; never
    /// part of toggle or aggregation semantics.
    fn total_edges(&self) -> anyhow::Result<u64>;
}

/// Read-side interface of the external content store.
pub trait SubjectDirectory: Send + Sync {
    /// Whether the subject currently exists.
    fn subject_exists(&self, subject: &SubjectId) -> anyhow::Result<bool>;
}

/// Registration hooks the content store calls as it creates and deletes
/// content. Registration is idempotent.
pub trait SubjectRegistry: SubjectDirectory {
    /// Mark the subject as existing.
    fn register(&self, subject: &SubjectId) -> anyhow::Result<()>;

    /// Mark the subject as gone. Returns whether it was registered.
    fn unregister(&self, subject: &SubjectId) -> anyhow::Result<bool>;
}

/// Unified entry point over the edge store and the subject directory.
///
/// Wrapped in `Arc` and shared across request handlers.
pub struct StoreRegistry {
    edges: Arc<dyn EdgeStore>,
    subjects: Arc<dyn SubjectRegistry>,
}

impl StoreRegistry {
    pub fn new(edges: Arc<dyn EdgeStore>, subjects: Arc<dyn SubjectRegistry>) -> Self {
        Self { edges, subjects }
    }

    pub fn edges(&self) -> &dyn EdgeStore {
        self.edges.as_ref()
    }

    pub fn subjects(&self) -> &dyn SubjectRegistry {
        self.subjects.as_ref()
    }
}
