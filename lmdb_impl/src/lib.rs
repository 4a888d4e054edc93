//! # Kudo LMDB
//!
//! LMDB storage backend for the Kudo engagement service, using the `heed`
//! Rust bindings. Implements the `EdgeStore` and `SubjectRegistry` traits
//! from `kudo_core`.
//!
//! LMDB's single-writer transactions are what make the toggle correct: the
//! existence check and the put/delete of an edge happen inside one write
//! transaction, so two concurrent inserts of the same (actor, subject) pair
//! resolve to exactly one `Created` and one `Conflict` — the uniqueness
//! invariant is enforced by the storage layer, not by application pre-checks.
//! Readers run on concurrent read transactions and never block the writer.
//!
//! ## Database Layout
//!
//! | Database     | Key                | Value         | Description                  |
//! |--------------|--------------------|---------------|------------------------------|
//! | `edges`      | `(String, String)` | `EdgeRecord`  | Primary (actor, subject) map |
//! | `by_subject` | `String`           | `Vec<String>` | subject → liking actors      |
//! | `by_actor`   | `String`           | `Vec<String>` | actor → liked subjects       |
//! | `subjects`   | `String`           | `u64`         | Registered subject ids       |
//!
//! The secondary indices are maintained in the same write transaction as the
//! primary `edges` table, so a count read from `by_subject` can never diverge
//! from the edge relation.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use heed::types::SerdeBincode;
use heed::{Database, Env, EnvOpenOptions};

use kudo_core::{ActorId, EdgeRecord, EdgeStore, InsertOutcome, RemoveOutcome, SubjectDirectory, SubjectId, SubjectRegistry};

/// Composite key for the edges database: (actor, subject).
type EdgeKey = (String, String);

/// Default LMDB memory map size: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Engagement store backed by LMDB via heed.
///
/// One instance owns the environment and all named databases. Cheap to share
/// behind an `Arc`; all methods take `&self`.
pub struct LmdbStore {
    env: Env,
    /// Primary edge storage: (actor, subject) → EdgeRecord.
    edges_db: Database<SerdeBincode<EdgeKey>, SerdeBincode<EdgeRecord>>,
    /// Per-subject secondary index: subject → liking actor ids.
    by_subject: Database<SerdeBincode<String>, SerdeBincode<Vec<String>>>,
    /// Per-actor secondary index: actor → liked subject ids.
    by_actor: Database<SerdeBincode<String>, SerdeBincode<Vec<String>>>,
    /// Subject registry: subject id → registered_at (unix seconds).
    subjects_db: Database<SerdeBincode<String>, SerdeBincode<u64>>,
}

impl LmdbStore {
    /// Open (or create) the store at the given data directory.
    pub fn open(data_dir: &str, map_size: usize) -> Result<Self> {
        let path = Path::new(data_dir);
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", data_dir))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(4)
                .open(path)
                .with_context(|| format!("Failed to open LMDB environment at {}", data_dir))?
        };

        let mut wtxn = env.write_txn()?;
        let edges_db = env.create_database(&mut wtxn, Some("edges"))?;
        let by_subject = env.create_database(&mut wtxn, Some("by_subject"))?;
        let by_actor = env.create_database(&mut wtxn, Some("by_actor"))?;
        let subjects_db = env.create_database(&mut wtxn, Some("subjects"))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            edges_db,
            by_subject,
            by_actor,
            subjects_db,
        })
    }

    /// Total number of registered subjects. Used by the metrics scrape.
    pub fn total_subjects(&self) -> Result<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.subjects_db.len(&rtxn)?)
    }
}

impl EdgeStore for LmdbStore {
    fn exists(&self, actor: &ActorId, subject: &SubjectId) -> Result<bool> {
        let key: EdgeKey = (actor.as_str().to_string(), subject.as_str().to_string());
        let rtxn = self.env.read_txn()?;
        Ok(self.edges_db.get(&rtxn, &key)?.is_some())
    }

    fn insert(&self, actor: &ActorId, subject: &SubjectId) -> Result<InsertOutcome> {
        let key: EdgeKey = (actor.as_str().to_string(), subject.as_str().to_string());
        let mut wtxn = self.env.write_txn()?;

        // The check and the put share one write transaction; a concurrent
        // insert that committed first is observed here as a conflict.
        if self.edges_db.get(&wtxn, &key)?.is_some() {
            return Ok(InsertOutcome::Conflict);
        }

        let record = EdgeRecord {
            created_at: unix_now(),
        };
        self.edges_db.put(&mut wtxn, &key, &record)?;

        let skey = subject.as_str().to_string();
        let mut actors = self.by_subject.get(&wtxn, &skey)?.unwrap_or_default();
        actors.push(actor.as_str().to_string());
        self.by_subject.put(&mut wtxn, &skey, &actors)?;

        let akey = actor.as_str().to_string();
        let mut subjects = self.by_actor.get(&wtxn, &akey)?.unwrap_or_default();
        subjects.push(subject.as_str().to_string());
        self.by_actor.put(&mut wtxn, &akey, &subjects)?;

        wtxn.commit()?;
        Ok(InsertOutcome::Created)
    }

    fn remove(&self, actor: &ActorId, subject: &SubjectId) -> Result<RemoveOutcome> {
        let key: EdgeKey = (actor.as_str().to_string(), subject.as_str().to_string());
        let mut wtxn = self.env.write_txn()?;

        if self.edges_db.get(&wtxn, &key)?.is_none() {
            return Ok(RemoveOutcome::NotFound);
        }
        self.edges_db.delete(&mut wtxn, &key)?;

        let skey = subject.as_str().to_string();
        if let Some(mut actors) = self.by_subject.get(&wtxn, &skey)? {
            actors.retain(|a| a != actor.as_str());
            if actors.is_empty() {
                self.by_subject.delete(&mut wtxn, &skey)?;
            } else {
                self.by_subject.put(&mut wtxn, &skey, &actors)?;
            }
        }

        let akey = actor.as_str().to_string();
        if let Some(mut subjects) = self.by_actor.get(&wtxn, &akey)? {
            subjects.retain(|s| s != subject.as_str());
            if subjects.is_empty() {
                self.by_actor.delete(&mut wtxn, &akey)?;
            } else {
                self.by_actor.put(&mut wtxn, &akey, &subjects)?;
            }
        }

        wtxn.commit()?;
        Ok(RemoveOutcome::Removed)
    }

    fn count_for(&self, subject: &SubjectId) -> Result<u64> {
        let rtxn = self.env.read_txn()?;
        let actors = self
            .by_subject
            .get(&rtxn, &subject.as_str().to_string())?
            .unwrap_or_default();
        Ok(actors.len() as u64)
    }

    fn count_for_many(&self, subjects: &[SubjectId]) -> Result<HashMap<SubjectId, u64>> {
        // Single read transaction: the whole batch is answered from one
        // consistent snapshot of the relation.
        let rtxn = self.env.read_txn()?;
        let mut counts = HashMap::with_capacity(subjects.len());
        for subject in subjects {
            let n = self
                .by_subject
                .get(&rtxn, &subject.as_str().to_string())?
                .map(|actors| actors.len() as u64)
                .unwrap_or(0);
            counts.insert(subject.clone(), n);
        }
        Ok(counts)
    }

    fn remove_all_for_actor(&self, actor: &ActorId) -> Result<u64> {
        let akey = actor.as_str().to_string();
        let mut wtxn = self.env.write_txn()?;

        let subjects = self.by_actor.get(&wtxn, &akey)?.unwrap_or_default();
        for subject in &subjects {
            let key: EdgeKey = (akey.clone(), subject.clone());
            self.edges_db.delete(&mut wtxn, &key)?;
            if let Some(mut actors) = self.by_subject.get(&wtxn, subject)? {
                actors.retain(|a| a != &akey);
                if actors.is_empty() {
                    self.by_subject.delete(&mut wtxn, subject)?;
                } else {
                    self.by_subject.put(&mut wtxn, subject, &actors)?;
                }
            }
        }
        self.by_actor.delete(&mut wtxn, &akey)?;

        wtxn.commit()?;
        Ok(subjects.len() as u64)
    }

    fn remove_all_for_subject(&self, subject: &SubjectId) -> Result<u64> {
        let skey = subject.as_str().to_string();
        let mut wtxn = self.env.write_txn()?;

        let actors = self.by_subject.get(&wtxn, &skey)?.unwrap_or_default();
        for actor in &actors {
            let key: EdgeKey = (actor.clone(), skey.clone());
            self.edges_db.delete(&mut wtxn, &key)?;
            if let Some(mut subjects) = self.by_actor.get(&wtxn, actor)? {
                subjects.retain(|s| s != &skey);
                if subjects.is_empty() {
                    self.by_actor.delete(&mut wtxn, actor)?;
                } else {
                    self.by_actor.put(&mut wtxn, actor, &subjects)?;
                }
            }
        }
        self.by_subject.delete(&mut wtxn, &skey)?;

        wtxn.commit()?;
        Ok(actors.len() as u64)
    }

    fn total_edges(&self) -> Result<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.edges_db.len(&rtxn)?)
    }
}

impl SubjectDirectory for LmdbStore {
    fn subject_exists(&self, subject: &SubjectId) -> Result<bool> {
        let rtxn = self.env.read_txn()?;
        Ok(self
            .subjects_db
            .get(&rtxn, &subject.as_str().to_string())?
            .is_some())
    }
}

impl SubjectRegistry for LmdbStore {
    fn register(&self, subject: &SubjectId) -> Result<()> {
        let skey = subject.as_str().to_string();
        let mut wtxn = self.env.write_txn()?;
        // Idempotent: re-registering keeps the original timestamp.
        if self.subjects_db.get(&wtxn, &skey)?.is_none() {
            self.subjects_db.put(&mut wtxn, &skey, &unix_now())?;
            wtxn.commit()?;
        }
        Ok(())
    }

    fn unregister(&self, subject: &SubjectId) -> Result<bool> {
        let skey = subject.as_str().to_string();
        let mut wtxn = self.env.write_txn()?;
        let existed = self.subjects_db.delete(&mut wtxn, &skey)?;
        wtxn.commit()?;
        Ok(existed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use kudo_core::{engine, StoreRegistry};

    use super::*;

    fn open_store(dir: &tempfile::TempDir) -> LmdbStore {
        let path = dir.path().to_string_lossy().to_string();
        LmdbStore::open(&path, 64 * 1024 * 1024).expect("open store")
    }

    fn actor(id: &str) -> ActorId {
        ActorId::parse(id).unwrap()
    }

    fn subject(id: &str) -> SubjectId {
        SubjectId::parse(id).unwrap()
    }

    #[test]
    fn test_insert_then_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let (a, s) = (actor("alice"), subject("goal-1"));

        assert_eq!(store.insert(&a, &s).unwrap(), InsertOutcome::Created);
        assert_eq!(store.insert(&a, &s).unwrap(), InsertOutcome::Conflict);
        assert!(store.exists(&a, &s).unwrap());
        assert_eq!(store.count_for(&s).unwrap(), 1);
    }

    #[test]
    fn test_remove_then_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let (a, s) = (actor("alice"), subject("goal-1"));

        store.insert(&a, &s).unwrap();
        assert_eq!(store.remove(&a, &s).unwrap(), RemoveOutcome::Removed);
        assert_eq!(store.remove(&a, &s).unwrap(), RemoveOutcome::NotFound);
        assert!(!store.exists(&a, &s).unwrap());
        assert_eq!(store.count_for(&s).unwrap(), 0);
    }

    #[test]
    fn test_count_for_many_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(&actor("alice"), &subject("s1")).unwrap();
        store.insert(&actor("bob"), &subject("s1")).unwrap();

        let subjects = vec![subject("s1"), subject("s2"), subject("s3")];
        let counts = store.count_for_many(&subjects).unwrap();
        assert_eq!(counts[&subject("s1")], 2);
        assert_eq!(counts[&subject("s2")], 0);
        assert_eq!(counts[&subject("s3")], 0);
    }

    #[test]
    fn test_secondary_indices_follow_removals() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(&actor("alice"), &subject("s1")).unwrap();
        store.insert(&actor("alice"), &subject("s2")).unwrap();
        store.insert(&actor("bob"), &subject("s1")).unwrap();

        store.remove(&actor("alice"), &subject("s1")).unwrap();
        assert_eq!(store.count_for(&subject("s1")).unwrap(), 1);
        assert_eq!(store.count_for(&subject("s2")).unwrap(), 1);
        assert_eq!(store.total_edges().unwrap(), 2);
    }

    #[test]
    fn test_remove_all_for_actor() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(&actor("alice"), &subject("s1")).unwrap();
        store.insert(&actor("alice"), &subject("s2")).unwrap();
        store.insert(&actor("bob"), &subject("s1")).unwrap();

        let purged = store.remove_all_for_actor(&actor("alice")).unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.count_for(&subject("s1")).unwrap(), 1);
        assert_eq!(store.count_for(&subject("s2")).unwrap(), 0);
        assert!(!store.exists(&actor("alice"), &subject("s1")).unwrap());
        assert!(store.exists(&actor("bob"), &subject("s1")).unwrap());
    }

    #[test]
    fn test_remove_all_for_subject() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.insert(&actor("alice"), &subject("s1")).unwrap();
        store.insert(&actor("bob"), &subject("s1")).unwrap();
        store.insert(&actor("bob"), &subject("s2")).unwrap();

        let purged = store.remove_all_for_subject(&subject("s1")).unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.count_for(&subject("s1")).unwrap(), 0);
        assert_eq!(store.count_for(&subject("s2")).unwrap(), 1);
        assert_eq!(store.total_edges().unwrap(), 1);
    }

    #[test]
    fn test_subject_registry_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let s = subject("goal-1");

        assert!(!store.subject_exists(&s).unwrap());
        store.register(&s).unwrap();
        store.register(&s).unwrap();
        assert!(store.subject_exists(&s).unwrap());
        assert_eq!(store.total_subjects().unwrap(), 1);

        assert!(store.unregister(&s).unwrap());
        assert!(!store.unregister(&s).unwrap());
        assert!(!store.subject_exists(&s).unwrap());
    }

    #[test]
    fn test_edges_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir);
            store.register(&subject("s1")).unwrap();
            store.insert(&actor("alice"), &subject("s1")).unwrap();
        }
        let store = open_store(&dir);
        assert!(store.exists(&actor("alice"), &subject("s1")).unwrap());
        assert!(store.subject_exists(&subject("s1")).unwrap());
        assert_eq!(store.count_for(&subject("s1")).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_insert_race_yields_one_edge() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.insert(&actor("alice"), &subject("s1")).unwrap()
                })
            })
            .collect();

        let mut outcomes: Vec<InsertOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        outcomes.sort_by_key(|o| matches!(o, InsertOutcome::Conflict));

        // Exactly one edge: one Created, one Conflict, never zero or two rows.
        assert_eq!(outcomes, vec![InsertOutcome::Created, InsertOutcome::Conflict]);
        assert_eq!(store.total_edges().unwrap(), 1);
        assert_eq!(store.count_for(&subject("s1")).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_toggles_converge() {
        // Two full toggles on a fresh pair: whatever the interleaving, one
        // caller observes the like and the other the unlike, and the final
        // state is consistent with the count.
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir));
        store.register(&subject("s1")).unwrap();
        let registry = Arc::new(StoreRegistry::new(store.clone(), store.clone()));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine::toggle(&registry, &actor("alice"), "s1").unwrap()
                })
            })
            .collect();

        let mut liked: Vec<bool> = handles
            .into_iter()
            .map(|h| h.join().unwrap().liked)
            .collect();
        liked.sort();

        assert_eq!(liked, vec![false, true]);
        assert!(!store.exists(&actor("alice"), &subject("s1")).unwrap());
        assert_eq!(store.count_for(&subject("s1")).unwrap(), 0);
        assert_eq!(store.total_edges().unwrap(), 0);
    }
}
