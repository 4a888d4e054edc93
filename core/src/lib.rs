//! # Kudo Core
//!
//! Core traits, types, and the engagement relation engine for the Kudo service.
//!
//! This crate defines the shared abstractions that storage backends must conform
//! to ([`EdgeStore`] for the (actor, subject) edge relation, [`SubjectDirectory`]
//! for the content-store collaborator), the validated identifier types, and the
//! engine operations (`toggle`, `status`, `count_for`, `count_for_many`) that
//! enforce the engagement invariants:
//!
//! - **Uniqueness**: at most one edge per (actor, subject) pair, enforced by the
//!   storage layer's atomic insert, never by a check-then-act in the engine.
//! - **Derived counts**: per-subject counts are always computed from the edge
//!   relation; there is no server-side mutable counter to drift.
//!
//! The engine is storage-agnostic. The default backend lives in `kudo_lmdb`;
//! tests use in-memory mocks.

pub mod engine;
pub mod store;
pub mod types;

pub use engine::{count_for, count_for_many, status, toggle, EngageError};
pub use store::{
    EdgeStore, InsertOutcome, RemoveOutcome, StoreRegistry, SubjectDirectory, SubjectRegistry,
};
pub use types::{ActorId, EdgeRecord, InvalidId, StatusView, SubjectId, ToggleOutcome, MAX_ID_LEN};
