#![forbid(unsafe_code)]

//! Identifier newtypes and the crate-wide error type.

use std::fmt;

/// Logical commit timestamp. Doubles as a transaction's read snapshot.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct SnapshotId(pub u64);

/// Identifier of a replica inside a cluster.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ReplicaId(pub u32);

/// Identifier of a local cluster as seen by the global cluster.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ClusterId(pub u32);

/// Identifier of the client that issued a transaction.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ClientId(pub u32);

impl SnapshotId {
    /// Snapshot preceding every commit.
    pub const ZERO: SnapshotId = SnapshotId(0);

    /// Returns the id that follows this one.
    pub fn next(self) -> SnapshotId {
        SnapshotId(self.0.saturating_add(1))
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SnapshotId {
    fn from(value: u64) -> Self {
        SnapshotId(value)
    }
}

impl From<SnapshotId> for u64 {
    fn from(value: SnapshotId) -> Self {
        value.0
    }
}

impl From<u32> for ReplicaId {
    fn from(value: u32) -> Self {
        ReplicaId(value)
    }
}

impl From<u32> for ClusterId {
    fn from(value: u32) -> Self {
        ClusterId(value)
    }
}

/// Errors surfaced by the consistency and control layer.
///
/// Transaction conflicts are not errors; they are reported through
/// [`crate::db::ConflictVerdict`].
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// IO failure while loading configuration.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid configuration or construction parameter.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// An operation could not be encoded or decoded.
    #[error("serialization: {0}")]
    Serialization(String),
    /// A batch was appended with a sequence id that does not advance the log.
    #[error("sequence id {got} does not follow last committed id {last}")]
    SequenceOutOfOrder {
        /// Highest id already present.
        last: SnapshotId,
        /// Rejected id.
        got: SnapshotId,
    },
    /// A certificate id at or below the cache's eviction watermark.
    #[error("certificate {id} was evicted (watermark {watermark})")]
    CertificateEvicted {
        /// Requested id.
        id: SnapshotId,
        /// Highest evicted id.
        watermark: SnapshotId,
    },
    /// An operation wraps an entity kind this build cannot apply.
    #[error("unrecognized entity kind: {0}")]
    UnrecognizedEntity(String),
    /// A background worker is no longer accepting messages.
    #[error("{0} worker has stopped")]
    WorkerStopped(&'static str),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GraphError>;
