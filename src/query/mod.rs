#![forbid(unsafe_code)]

//! Row-batch entry points through which the query engine builds CSRs.
//!
//! The surrounding engine plans the degree and edge sub-queries; this module
//! only consumes their output batches.

/// Batched CSR construction functions.
///
/// Degree batches, edge batches, explicit deletion and weight-type lookup.
pub mod functions;

pub use functions::{
    build_edges, build_vertex_degrees, csr_weight_type, delete_csr, EdgeBatch, EdgeShape,
    WeightColumn, EDGE_ROW_MARKER,
};
