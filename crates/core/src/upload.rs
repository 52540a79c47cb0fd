//! Upload session types and lifecycle.

use crate::chunk::ChunkIndex;
use crate::hash::ArtifactDigest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Prefix under which every chunk blob of this session lives.
    pub fn chunk_prefix(&self) -> String {
        format!("chunks/{}/", self.0)
    }

    /// Object key of a single chunk blob.
    ///
    /// The index is zero-padded so lexical listing order matches index order.
    pub fn chunk_key(&self, index: ChunkIndex) -> String {
        format!("chunks/{}/{:010}", self.0, index)
    }

    /// Prefix for temporary merge output of this session.
    pub fn staging_prefix(&self) -> String {
        format!("staging/{}/", self.0)
    }

    /// A fresh, unique staging key for one merge attempt.
    pub fn staging_key(&self) -> String {
        format!("staging/{}/{}.part", self.0, Uuid::new_v4())
    }

    /// Object key of the published artifact.
    pub fn artifact_key(&self) -> String {
        format!("artifacts/{}", self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the party that owns an upload session.
///
/// Resolved by an upstream identity provider; opaque to this crate.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Validate and wrap an owner identifier.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidOwnerId("owner id is empty".to_string()));
        }
        if id.len() > crate::MAX_OWNER_ID_LEN {
            return Err(crate::Error::InvalidOwnerId(format!(
                "owner id is {} bytes (max {})",
                id.len(),
                crate::MAX_OWNER_ID_LEN
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(crate::Error::InvalidOwnerId(
                "owner id contains control characters".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload session state.
///
/// States only move forward: `Uploading -> Merging -> Complete`, or into
/// `Failed` from any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Session is accepting chunks.
    Uploading,
    /// All chunks arrived and one caller is assembling the artifact.
    Merging,
    /// Artifact is published and readable.
    Complete,
    /// Assembly hit an unrecoverable fault.
    Failed,
}

impl UploadState {
    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Merging => "merging",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Whether `self -> to` is an edge of the forward-only state machine.
    pub fn can_transition_to(&self, to: UploadState) -> bool {
        matches!(
            (self, to),
            (Self::Uploading, Self::Merging)
                | (Self::Merging, Self::Complete)
                | (Self::Uploading, Self::Failed)
                | (Self::Merging, Self::Failed)
        )
    }

    /// Like [`can_transition_to`](Self::can_transition_to), as a `Result`.
    pub fn ensure_transition(&self, to: UploadState) -> crate::Result<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(crate::Error::IllegalTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadState {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "uploading" => Ok(Self::Uploading),
            "merging" => Ok(Self::Merging),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidState(other.to_string())),
        }
    }
}

/// Location and fingerprint of a published artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    /// Object key under which the artifact is readable.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the assembled bytes.
    pub sha256: ArtifactDigest,
}

/// An upload session tracking chunk arrival and assembly state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Owner bound at creation, immutable afterwards.
    pub owner_id: OwnerId,
    /// Total chunk count, unknown until the first chunk is registered.
    pub expected_chunks: Option<u32>,
    /// Indices registered so far.
    pub received: BTreeSet<ChunkIndex>,
    /// Current lifecycle state.
    pub state: UploadState,
    /// Published artifact, present once `state` is `Complete`.
    pub artifact: Option<PublishedArtifact>,
    /// Machine-readable failure code, present once `state` is `Failed`.
    pub error_code: Option<String>,
    /// Human-readable failure detail.
    pub error_detail: Option<String>,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadSession {
    /// Number of distinct chunk indices received.
    pub fn received_count(&self) -> u32 {
        self.received.len() as u32
    }

    /// Whether every expected chunk has been registered.
    pub fn is_complete(&self) -> bool {
        self.expected_chunks
            .is_some_and(|expected| self.received_count() == expected)
    }

    /// Indices still outstanding, if the total is known.
    pub fn missing_chunks(&self) -> Option<Vec<ChunkIndex>> {
        let expected = self.expected_chunks?;
        Some(
            (0..expected)
                .filter(|index| !self.received.contains(index))
                .collect(),
        )
    }
}
