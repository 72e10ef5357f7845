//! Concurrent, idempotent builder for compressed sparse row (CSR) adjacency
//! structures fed by a vectorized query engine.
//!
//! A build runs in three one-shot phases per structure id (vertex offsets,
//! edge storage with prefix sum, optional weights) and fills the edge
//! arrays from many worker threads through per-vertex atomic cursors.

#![warn(missing_docs)]

pub mod cli;
pub mod query;
pub mod storage;
pub mod types;

pub use storage::{Csr, CsrRegistry, RegistryOptions};
pub use types::{CsrError, CsrId, ErrorKind, LogicalType, Phase, Result, WeightKind};
