//! Operation model and the storage capability it is applied through.
//!
//! The physical graph store lives behind [`DatabaseAccess`]; this module
//! defines the mutations replicas agree on, how they are applied, how they
//! travel between replicas, and an in-memory backend used for validation
//! and tests.

/// JSON wire form for operations and batches.
pub mod codec;

mod memory;
mod metrics;
mod operation;
mod rowhash;

/// In-memory reference backend.
pub use memory::MemoryGraph;

/// Commit outcome instrumentation.
pub use metrics::{CommitCounters, CommitMetrics, CounterMetrics, NoopMetrics};

/// Mutations, their application, and the storage capability interface.
pub use operation::{
    apply_batch, BatchOutcome, DatabaseAccess, Operation, OperationKind, UnknownEntityPolicy,
};

/// Content hashing of entities.
pub use rowhash::{content_hash, row_hash64};
