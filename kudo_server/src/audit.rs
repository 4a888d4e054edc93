//! Append-only audit trail of engagement mutations.
//!
//! Records every successful toggle and every collaborator cleanup (subject
//! registration/purge, actor purge) with who did it and when. Entries are
//! stored in an in-memory `Vec` behind an `RwLock`, bounded by capacity and
//! retention limits from config.
//!
//! - **Append-only**: entries can never be modified or deleted through the API.
//! - **Timestamped**: each entry records the time of the operation.
//! - **Queryable**: supports filtering by time range, action, and actor.

use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    /// Unix timestamp (seconds) when the operation occurred.
    pub timestamp: u64,
    /// Action category: "like", "unlike", "subject.register",
    /// "subject.purge", "actor.purge".
    pub action: String,
    /// Acting actor id, when the operation was actor-initiated.
    pub actor: Option<String>,
    /// Subject the operation targeted, when applicable.
    pub subject: Option<String>,
    /// Name of the token used (None when auth is disabled).
    pub token_name: Option<String>,
}

impl AuditEntry {
    pub fn now(
        action: impl Into<String>,
        actor: Option<String>,
        subject: Option<String>,
        token_name: Option<String>,
    ) -> Self {
        Self {
            timestamp: unix_now(),
            action: action.into(),
            actor,
            subject,
            token_name,
        }
    }
}

/// Filters for querying the audit log. All filters are AND-ed together.
#[derive(Debug, Default)]
pub struct AuditFilter {
    pub from: Option<u64>,
    pub to: Option<u64>,
    /// Substring match on the action.
    pub action: Option<String>,
    /// Exact match on the actor id.
    pub actor: Option<String>,
}

/// Thread-safe, append-only audit log.
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
    max_entries: usize,
    retention_secs: u64,
}

impl AuditLog {
    /// Create a new audit log with the given capacity and retention limits.
    pub fn new(max_entries: usize, retention_secs: u64) -> Self {
        Self {
            entries: RwLock::new(Vec::with_capacity(1024)),
            max_entries,
            retention_secs,
        }
    }

    /// Append an entry, evicting over-capacity and expired entries.
    pub fn append(&self, entry: AuditEntry) {
        let mut entries = self.entries.write().unwrap();
        entries.push(entry);

        if self.max_entries > 0 && entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }
        if self.retention_secs > 0 {
            let cutoff = unix_now().saturating_sub(self.retention_secs);
            entries.retain(|e| e.timestamp >= cutoff);
        }
    }

    /// Query audit entries with optional filters, oldest first.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter(|e| {
                if let Some(from) = filter.from {
                    if e.timestamp < from {
                        return false;
                    }
                }
                if let Some(to) = filter.to {
                    if e.timestamp > to {
                        return false;
                    }
                }
                if let Some(ref action) = filter.action {
                    if !e.action.contains(action.as_str()) {
                        return false;
                    }
                }
                if let Some(ref actor) = filter.actor {
                    match &e.actor {
                        Some(a) => {
                            if a != actor {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                true
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
