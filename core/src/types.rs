//! Data model shared across the engine, storage backends, and the server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum accepted identifier length in bytes.
pub const MAX_ID_LEN: usize = 64;

/// Error returned when an opaque identifier fails format validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier {id:?}: {reason}")]
pub struct InvalidId {
    /// The rejected input, truncated to [`MAX_ID_LEN`] bytes for display.
    pub id: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// Validate the opaque identifier format shared by actor and subject ids.
///
/// Ids are opaque to the engine but must be non-empty, at most [`MAX_ID_LEN`]
/// bytes, and drawn from `[A-Za-z0-9._:-]` so they are safe in URL paths,
/// log lines, and storage keys without escaping.
fn validate_id(raw: &str) -> Result<(), &'static str> {
    if raw.is_empty() {
        return Err("must not be empty");
    }
    if raw.len() > MAX_ID_LEN {
        return Err("exceeds maximum length");
    }
    if !raw
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
    {
        return Err("contains characters outside [A-Za-z0-9._:-]");
    }
    Ok(())
}

fn truncate_for_display(raw: &str) -> String {
    if raw.len() <= MAX_ID_LEN {
        raw.to_string()
    } else {
        let mut end = MAX_ID_LEN;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &raw[..end])
    }
}

/// Opaque identifier of an authenticated entity capable of liking content.
///
/// Issued by the external identity provider; the engine trusts it and never
/// interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Validate and wrap a raw actor id.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidId> {
        let raw = raw.into();
        match validate_id(&raw) {
            Ok(()) => Ok(Self(raw)),
            Err(reason) => Err(InvalidId {
                id: truncate_for_display(&raw),
                reason,
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ActorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque identifier of a content item that can be liked.
///
/// Owned by the external content store; the engine only ever checks existence
/// through a [`crate::store::SubjectDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Validate and wrap a raw subject id.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidId> {
        let raw = raw.into();
        match validate_id(&raw) {
            Ok(()) => Ok(Self(raw)),
            Err(reason) => Err(InvalidId {
                id: truncate_for_display(&raw),
                reason,
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stored value of an engagement edge.
///
/// The key (actor, subject) lives in the storage layer; the record carries
/// only the creation timestamp, which is audit data and never participates in
/// ordering decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Unix timestamp (seconds) of edge creation.
    pub created_at: u64,
}

/// Result of a toggle: the pair's new state plus the subject's fresh count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    /// Whether the (actor, subject) edge exists after the flip.
    pub liked: bool,
    /// Subject count recomputed after the transition.
    pub count: u64,
}

/// Combined per-actor status and subject count, read in one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    /// Whether the requesting actor currently likes the subject.
    /// Always `false` for anonymous callers.
    pub liked: bool,
    /// Total number of distinct actors liking the subject.
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_typical_ids() {
        assert!(ActorId::parse("65f2a7e9c1d04b2a9f3e8d71").is_ok());
        assert!(SubjectId::parse("goal-42").is_ok());
        assert!(SubjectId::parse("ns:posts.2024_01").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        let err = SubjectId::parse("").unwrap_err();
        assert_eq!(err.reason, "must not be empty");
    }

    #[test]
    fn test_rejects_overlong() {
        let raw = "a".repeat(MAX_ID_LEN + 1);
        assert!(ActorId::parse(raw).is_err());
        assert!(ActorId::parse("a".repeat(MAX_ID_LEN)).is_ok());
    }

    #[test]
    fn test_rejects_bad_characters() {
        for raw in ["a b", "goal/42", "goal#1", "héllo", "{\"$gt\":\"\"}"] {
            assert!(SubjectId::parse(raw).is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_display_matches_input() {
        let id = SubjectId::parse("goal-42").unwrap();
        assert_eq!(id.to_string(), "goal-42");
        assert_eq!(id.as_str(), "goal-42");
    }
}
