//! In-memory CSR storage and the registry that owns it.
//!
//! Implements the offset array, the edge and weight columns, the per-id CSR
//! instance with its one-shot build phases, and the session-scoped registry.

mod alloc;
mod csr;
mod edges;
mod metrics;
mod offsets;
mod options;
mod registry;

/// CSR instance and read-side views for graph algorithms.
pub use csr::{BuildState, Csr, CsrSnapshot, Neighbor, NeighborCursor};

/// Edge and weight columns.
pub use edges::{EdgeStore, Weight, WeightStore};

/// Metrics and profiling.
pub use metrics::{default_metrics, BuildMetrics, CounterMetrics, NoopMetrics};

/// Offset array and its padding.
pub use offsets::{OffsetArray, OFFSET_PADDING};

/// Registry configuration options.
pub use options::RegistryOptions;

/// Session-scoped registry and its query-end sweep.
pub use registry::{CsrRegistry, SweepReport};
