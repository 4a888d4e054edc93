//! The engagement engine: toggle, status, and count aggregation.
//!
//! Each (actor, subject) pair is either `ABSENT` (no edge) or `PRESENT`
//! (edge exists); [`toggle`] is the single transition between them. The flip
//! is remove-first: removing an existing edge wins, otherwise an atomic
//! insert creates one. When the insert loses a race against a concurrent
//! toggler, a single bounded retry of the remove step converges both callers
//! — the operation that observes `PRESENT` removes it. The post-condition
//! (exactly one edge or none) is guaranteed by the storage layer's atomic
//! per-pair primitives; which physical request wins is not.
//!
//! The read paths ([`status`], [`count_for`], [`count_for_many`]) never touch
//! the write path. Counts are always derived from the edge relation.

use std::collections::HashMap;

use crate::store::{InsertOutcome, RemoveOutcome, StoreRegistry};
use crate::types::{ActorId, StatusView, SubjectId, ToggleOutcome};

/// Failure taxonomy of the engagement engine.
///
/// Every failure surfaces synchronously with a stable kind; a failed
/// mutation is never reported as a success.
#[derive(Debug, thiserror::Error)]
pub enum EngageError {
    /// The operation requires a known actor and none was authenticated.
    /// Produced by the transport layer's auth middleware, carried here so
    /// the taxonomy is complete in one place.
    #[error("no authenticated actor")]
    Unauthenticated,

    /// The subject was deleted or never existed.
    #[error("subject {0} does not exist")]
    SubjectNotFound(SubjectId),

    /// A malformed identifier, in single or batch form. A batch with any
    /// malformed id fails whole — callers size their UI around complete
    /// answers, so partial results are disallowed.
    #[error("{0}")]
    InvalidIdentifier(String),

    /// A batched count request with zero subject ids.
    #[error("subject id batch must not be empty")]
    EmptyBatch,

    /// Storage or subject-directory failure after the bounded race retry.
    #[error("engagement store unavailable")]
    Unavailable(#[source] anyhow::Error),
}

/// Atomically flip the (actor, subject) edge and return the new state with
/// a fresh count.
///
/// Validates the subject id, checks existence against the content store,
/// then executes the remove-first flip described in the module docs. A
/// `Conflict` from the insert is handled by one retried remove; any other
/// storage failure is surfaced as [`EngageError::Unavailable`] — the engine
/// does not guess and does not silently no-op.
pub fn toggle(
    registry: &StoreRegistry,
    actor: &ActorId,
    subject_raw: &str,
) -> Result<ToggleOutcome, EngageError> {
    let subject = SubjectId::parse(subject_raw)
        .map_err(|e| EngageError::InvalidIdentifier(e.to_string()))?;

    let exists = registry
        .subjects()
        .subject_exists(&subject)
        .map_err(EngageError::Unavailable)?;
    if !exists {
        return Err(EngageError::SubjectNotFound(subject));
    }

    let liked = match registry
        .edges()
        .remove(actor, &subject)
        .map_err(EngageError::Unavailable)?
    {
        RemoveOutcome::Removed => false,
        RemoveOutcome::NotFound => match registry
            .edges()
            .insert(actor, &subject)
            .map_err(EngageError::Unavailable)?
        {
            InsertOutcome::Created => true,
            InsertOutcome::Conflict => {
                // A concurrent insert won first; the pair is PRESENT. One
                // retried remove converges both togglers instead of
                // surfacing an error to this caller.
                tracing::debug!(
                    actor = %actor,
                    subject = %subject,
                    "insert lost a toggle race, retrying remove"
                );
                match registry
                    .edges()
                    .remove(actor, &subject)
                    .map_err(EngageError::Unavailable)?
                {
                    RemoveOutcome::Removed => false,
                    // A third racer got there first; the pair is ABSENT,
                    // which is exactly where this flip was converging.
                    RemoveOutcome::NotFound => false,
                }
            }
        },
    };

    let count = registry
        .edges()
        .count_for(&subject)
        .map_err(EngageError::Unavailable)?;

    Ok(ToggleOutcome { liked, count })
}

/// Combined "does this actor like the subject" + total count, in one read.
///
/// With no authenticated actor, `liked` is always `false` and only the
/// count is authoritative — an anonymous status request is never an error.
pub fn status(
    registry: &StoreRegistry,
    actor: Option<&ActorId>,
    subject_raw: &str,
) -> Result<StatusView, EngageError> {
    let subject = SubjectId::parse(subject_raw)
        .map_err(|e| EngageError::InvalidIdentifier(e.to_string()))?;

    let liked = match actor {
        Some(actor) => registry
            .edges()
            .exists(actor, &subject)
            .map_err(EngageError::Unavailable)?,
        None => false,
    };
    let count = registry
        .edges()
        .count_for(&subject)
        .map_err(EngageError::Unavailable)?;
    warn_if_orphaned(registry, &subject, count);

    Ok(StatusView { liked, count })
}

/// Current count for a single subject.
pub fn count_for(registry: &StoreRegistry, subject_raw: &str) -> Result<u64, EngageError> {
    let subject = SubjectId::parse(subject_raw)
        .map_err(|e| EngageError::InvalidIdentifier(e.to_string()))?;
    let count = registry
        .edges()
        .count_for(&subject)
        .map_err(EngageError::Unavailable)?;
    warn_if_orphaned(registry, &subject, count);
    Ok(count)
}

/// Counts for a batch of subjects.
///
/// The whole batch is validated before any storage access: an empty batch
/// and any malformed id reject the entire request. Every requested id is
/// present in the result, defaulting to 0.
pub fn count_for_many(
    registry: &StoreRegistry,
    raw_ids: &[String],
) -> Result<HashMap<SubjectId, u64>, EngageError> {
    if raw_ids.is_empty() {
        return Err(EngageError::EmptyBatch);
    }

    let mut subjects = Vec::with_capacity(raw_ids.len());
    for raw in raw_ids {
        let subject = SubjectId::parse(raw.as_str())
            .map_err(|e| EngageError::InvalidIdentifier(e.to_string()))?;
        subjects.push(subject);
    }

    let counts = registry
        .edges()
        .count_for_many(&subjects)
        .map_err(EngageError::Unavailable)?;
    for (subject, count) in &counts {
        warn_if_orphaned(registry, subject, *count);
    }

    Ok(counts)
}

/// Lazy orphan detection during aggregation: a subject with edges but no
/// directory entry means content was deleted without purging its edges.
/// Logged for external cleanup, never surfaced to end users.
fn warn_if_orphaned(registry: &StoreRegistry, subject: &SubjectId, count: u64) {
    if count == 0 {
        return;
    }
    match registry.subjects().subject_exists(subject) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(
                subject = %subject,
                count,
                "orphaned edges: counted subject is no longer registered"
            );
        }
        Err(err) => {
            tracing::warn!(
                subject = %subject,
                error = %err,
                "subject directory lookup failed during aggregation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::store::{EdgeStore, SubjectDirectory, SubjectRegistry};

    /// In-memory edge store + subject directory for engine tests.
    #[derive(Default)]
    struct MemStore {
        edges: Mutex<BTreeSet<(String, String)>>,
        subjects: Mutex<BTreeSet<String>>,
    }

    fn edge_key(actor: &ActorId, subject: &SubjectId) -> (String, String) {
        (actor.as_str().to_string(), subject.as_str().to_string())
    }

    impl EdgeStore for MemStore {
        fn exists(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<bool> {
            let edges = self.edges.lock().unwrap();
            Ok(edges.contains(&edge_key(actor, subject)))
        }

        fn insert(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<InsertOutcome> {
            let mut edges = self.edges.lock().unwrap();
            if edges.insert(edge_key(actor, subject)) {
                Ok(InsertOutcome::Created)
            } else {
                Ok(InsertOutcome::Conflict)
            }
        }

        fn remove(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<RemoveOutcome> {
            let mut edges = self.edges.lock().unwrap();
            if edges.remove(&edge_key(actor, subject)) {
                Ok(RemoveOutcome::Removed)
            } else {
                Ok(RemoveOutcome::NotFound)
            }
        }

        fn count_for(&self, subject: &SubjectId) -> anyhow::Result<u64> {
            let edges = self.edges.lock().unwrap();
            Ok(edges.iter().filter(|(_, s)| s == subject.as_str()).count() as u64)
        }

        fn count_for_many(
            &self,
            subjects: &[SubjectId],
        ) -> anyhow::Result<HashMap<SubjectId, u64>> {
            subjects
                .iter()
                .map(|s| Ok((s.clone(), self.count_for(s)?)))
                .collect()
        }

        fn remove_all_for_actor(&self, actor: &ActorId) -> anyhow::Result<u64> {
            let mut edges = self.edges.lock().unwrap();
            let before = edges.len();
            edges.retain(|(a, _)| a != actor.as_str());
            Ok((before - edges.len()) as u64)
        }

        fn remove_all_for_subject(&self, subject: &SubjectId) -> anyhow::Result<u64> {
            let mut edges = self.edges.lock().unwrap();
            let before = edges.len();
            edges.retain(|(_, s)| s != subject.as_str());
            Ok((before - edges.len()) as u64)
        }

        fn total_edges(&self) -> anyhow::Result<u64> {
            Ok(self.edges.lock().unwrap().len() as u64)
        }
    }

    impl SubjectDirectory for MemStore {
        fn subject_exists(&self, subject: &SubjectId) -> anyhow::Result<bool> {
            Ok(self.subjects.lock().unwrap().contains(subject.as_str()))
        }
    }

    impl SubjectRegistry for MemStore {
        fn register(&self, subject: &SubjectId) -> anyhow::Result<()> {
            self.subjects.lock().unwrap().insert(subject.as_str().into());
            Ok(())
        }

        fn unregister(&self, subject: &SubjectId) -> anyhow::Result<bool> {
            Ok(self.subjects.lock().unwrap().remove(subject.as_str()))
        }
    }

    /// Wrapper that simulates a lost insert race: the first `insert` reports
    /// `Conflict` after materializing the concurrent winner's edge. When
    /// `racer_removes` is set, the winner's edge is gone again by the time
    /// the retried remove runs (a third racer).
    struct RacingStore {
        inner: Arc<MemStore>,
        conflicts_left: AtomicU32,
        racer_removes: bool,
    }

    impl EdgeStore for RacingStore {
        fn exists(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<bool> {
            self.inner.exists(actor, subject)
        }

        fn insert(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<InsertOutcome> {
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                if !self.racer_removes {
                    self.inner.insert(actor, subject)?;
                }
                return Ok(InsertOutcome::Conflict);
            }
            self.inner.insert(actor, subject)
        }

        fn remove(&self, actor: &ActorId, subject: &SubjectId) -> anyhow::Result<RemoveOutcome> {
            self.inner.remove(actor, subject)
        }

        fn count_for(&self, subject: &SubjectId) -> anyhow::Result<u64> {
            self.inner.count_for(subject)
        }

        fn count_for_many(
            &self,
            subjects: &[SubjectId],
        ) -> anyhow::Result<HashMap<SubjectId, u64>> {
            self.inner.count_for_many(subjects)
        }

        fn remove_all_for_actor(&self, actor: &ActorId) -> anyhow::Result<u64> {
            self.inner.remove_all_for_actor(actor)
        }

        fn remove_all_for_subject(&self, subject: &SubjectId) -> anyhow::Result<u64> {
            self.inner.remove_all_for_subject(subject)
        }

        fn total_edges(&self) -> anyhow::Result<u64> {
            self.inner.total_edges()
        }
    }

    fn registry_with_subjects(subjects: &[&str]) -> (StoreRegistry, Arc<MemStore>) {
        let store = Arc::new(MemStore::default());
        for s in subjects {
            store.register(&SubjectId::parse(*s).unwrap()).unwrap();
        }
        let registry = StoreRegistry::new(store.clone(), store.clone());
        (registry, store)
    }

    fn actor(id: &str) -> ActorId {
        ActorId::parse(id).unwrap()
    }

    #[test]
    fn test_toggle_parity() {
        let (registry, _) = registry_with_subjects(&["goal-1"]);
        let alice = actor("alice");

        for n in 1..=6u32 {
            let outcome = toggle(&registry, &alice, "goal-1").unwrap();
            let expect_liked = n % 2 == 1;
            assert_eq!(outcome.liked, expect_liked, "after {} toggles", n);
            assert_eq!(outcome.count, u64::from(expect_liked));
        }
    }

    #[test]
    fn test_toggle_two_actors_scenario() {
        let (registry, _) = registry_with_subjects(&["goal-g"]);
        let alice = actor("alice");
        let bob = actor("bob");

        let first = toggle(&registry, &alice, "goal-g").unwrap();
        assert_eq!(first, ToggleOutcome { liked: true, count: 1 });

        let second = toggle(&registry, &bob, "goal-g").unwrap();
        assert_eq!(second, ToggleOutcome { liked: true, count: 2 });

        let third = toggle(&registry, &alice, "goal-g").unwrap();
        assert_eq!(third, ToggleOutcome { liked: false, count: 1 });
    }

    #[test]
    fn test_toggle_unknown_subject() {
        let (registry, _) = registry_with_subjects(&[]);
        let err = toggle(&registry, &actor("alice"), "goal-1").unwrap_err();
        assert!(matches!(err, EngageError::SubjectNotFound(_)));
    }

    #[test]
    fn test_toggle_malformed_subject() {
        let (registry, _) = registry_with_subjects(&[]);
        let err = toggle(&registry, &actor("alice"), "not a valid id").unwrap_err();
        assert!(matches!(err, EngageError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_toggle_insert_conflict_converges_by_removing() {
        // The insert loses the race; the winner's edge is observed PRESENT
        // and the retried remove takes it out.
        let (_, mem) = registry_with_subjects(&["goal-1"]);
        let racing = Arc::new(RacingStore {
            inner: mem.clone(),
            conflicts_left: AtomicU32::new(1),
            racer_removes: false,
        });
        let registry = StoreRegistry::new(racing, mem.clone());

        let outcome = toggle(&registry, &actor("alice"), "goal-1").unwrap();
        assert_eq!(outcome, ToggleOutcome { liked: false, count: 0 });
        assert!(mem.edges.lock().unwrap().is_empty());
    }

    #[test]
    fn test_toggle_conflict_then_concurrent_remove_converges_absent() {
        // Both the insert and the retried remove lose their races; the pair
        // ends ABSENT, which matches this caller's flip direction.
        let (_, mem) = registry_with_subjects(&["goal-1"]);
        let racing = Arc::new(RacingStore {
            inner: mem.clone(),
            conflicts_left: AtomicU32::new(1),
            racer_removes: true,
        });
        let registry = StoreRegistry::new(racing, mem.clone());

        let outcome = toggle(&registry, &actor("alice"), "goal-1").unwrap();
        assert_eq!(outcome, ToggleOutcome { liked: false, count: 0 });
    }

    #[test]
    fn test_count_matches_edge_cardinality() {
        let (registry, mem) = registry_with_subjects(&["goal-1", "goal-2"]);
        for name in ["a1", "a2", "a3"] {
            toggle(&registry, &actor(name), "goal-1").unwrap();
        }
        toggle(&registry, &actor("a1"), "goal-2").unwrap();

        assert_eq!(count_for(&registry, "goal-1").unwrap(), 3);
        assert_eq!(count_for(&registry, "goal-2").unwrap(), 1);
        assert_eq!(mem.edges.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_count_for_many_batch_completeness() {
        let (registry, _) = registry_with_subjects(&["s1", "s2", "s3"]);
        toggle(&registry, &actor("alice"), "s1").unwrap();
        toggle(&registry, &actor("bob"), "s1").unwrap();

        let ids: Vec<String> = ["s1", "s2", "s3"].iter().map(|s| s.to_string()).collect();
        let counts = count_for_many(&registry, &ids).unwrap();

        assert_eq!(counts.len(), 3);
        assert_eq!(counts[&SubjectId::parse("s1").unwrap()], 2);
        assert_eq!(counts[&SubjectId::parse("s2").unwrap()], 0);
        assert_eq!(counts[&SubjectId::parse("s3").unwrap()], 0);
    }

    #[test]
    fn test_count_for_many_rejects_empty_batch() {
        let (registry, _) = registry_with_subjects(&[]);
        let err = count_for_many(&registry, &[]).unwrap_err();
        assert!(matches!(err, EngageError::EmptyBatch));
    }

    #[test]
    fn test_count_for_many_rejects_whole_batch_on_malformed_id() {
        let (registry, _) = registry_with_subjects(&["s1"]);
        toggle(&registry, &actor("alice"), "s1").unwrap();

        let ids = vec!["s1".to_string(), "not valid!".to_string()];
        let err = count_for_many(&registry, &ids).unwrap_err();
        assert!(matches!(err, EngageError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_status_authenticated() {
        let (registry, _) = registry_with_subjects(&["goal-1"]);
        let alice = actor("alice");
        toggle(&registry, &alice, "goal-1").unwrap();

        let view = status(&registry, Some(&alice), "goal-1").unwrap();
        assert_eq!(view, StatusView { liked: true, count: 1 });

        let other = status(&registry, Some(&actor("bob")), "goal-1").unwrap();
        assert_eq!(other, StatusView { liked: false, count: 1 });
    }

    #[test]
    fn test_status_anonymous_sees_count_only() {
        let (registry, _) = registry_with_subjects(&["goal-1"]);
        toggle(&registry, &actor("alice"), "goal-1").unwrap();

        let view = status(&registry, None, "goal-1").unwrap();
        assert_eq!(view, StatusView { liked: false, count: 1 });
    }

    #[test]
    fn test_orphaned_edges_still_counted() {
        // Content deleted without purging its edges: counts stay truthful to
        // the relation, the orphan is only logged.
        let (registry, mem) = registry_with_subjects(&["goal-1"]);
        toggle(&registry, &actor("alice"), "goal-1").unwrap();
        mem.unregister(&SubjectId::parse("goal-1").unwrap()).unwrap();

        assert_eq!(count_for(&registry, "goal-1").unwrap(), 1);
    }
}
