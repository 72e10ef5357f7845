//! Batched entry points invoked by the vectorized execution layer.
//!
//! One call processes one input batch. The execution layer guarantees the
//! phase barrier: every degree batch of an id is drained before its first
//! edge batch runs.

use tracing::trace;

use crate::storage::{CsrRegistry, Weight};
use crate::types::{CsrError, CsrId, LogicalType, Result, WeightKind};

/// Marker returned for every processed edge row.
pub const EDGE_ROW_MARKER: i32 = 1;

/// Optional weight column of an edge batch.
#[derive(Copy, Clone, Debug)]
pub enum WeightColumn<'a> {
    /// `BIGINT` weights.
    Int(&'a [i64]),
    /// `DOUBLE` weights.
    Double(&'a [f64]),
}

impl WeightColumn<'_> {
    /// Declared type of the column.
    pub fn logical_type(&self) -> LogicalType {
        match self {
            WeightColumn::Int(_) => LogicalType::BigInt,
            WeightColumn::Double(_) => LogicalType::Double,
        }
    }

    fn len(&self) -> usize {
        match self {
            WeightColumn::Int(values) => values.len(),
            WeightColumn::Double(values) => values.len(),
        }
    }

    fn get(&self, row: usize) -> Weight {
        match self {
            WeightColumn::Int(values) => Weight::Int(values[row]),
            WeightColumn::Double(values) => Weight::Double(values[row]),
        }
    }
}

/// Graph-wide sizes repeated on every edge batch of one build.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgeShape {
    /// Number of vertices.
    pub vertex_count: i64,
    /// Sum of all vertex degrees.
    pub expected_edges: i64,
    /// Number of edge rows the join between edge and vertex tables produced.
    pub observed_edges: i64,
}

/// Columns of one edge batch.
#[derive(Copy, Clone, Debug)]
pub struct EdgeBatch<'a> {
    /// Source vertex per row.
    pub sources: &'a [i64],
    /// Destination vertex per row.
    pub destinations: &'a [i64],
    /// Original edge id per row.
    pub edge_ids: &'a [i64],
    /// Optional weight per row.
    pub weights: Option<WeightColumn<'a>>,
}

impl<'a> EdgeBatch<'a> {
    /// Creates an unweighted batch.
    pub fn new(sources: &'a [i64], destinations: &'a [i64], edge_ids: &'a [i64]) -> Self {
        Self {
            sources,
            destinations,
            edge_ids,
            weights: None,
        }
    }

    /// Attaches a weight column.
    pub fn with_weights(mut self, weights: WeightColumn<'a>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn validate(&self) -> Result<()> {
        let rows = self.sources.len();
        let weight_rows = self.weights.map_or(rows, |w| w.len());
        if self.destinations.len() != rows || self.edge_ids.len() != rows || weight_rows != rows {
            return Err(CsrError::invalid(format!(
                "edge batch columns differ in length: sources={rows} destinations={} \
                 edge_ids={} weights={weight_rows}",
                self.destinations.len(),
                self.edge_ids.len()
            )));
        }
        Ok(())
    }
}

/// Writes one batch of pre-aggregated `(source, degree)` rows into the offset
/// array of `id`, allocating it on first use. A row that cannot be written
/// abandons the build for `id`.
///
/// Returns the input degrees unchanged, one per row.
pub fn build_vertex_degrees(
    registry: &CsrRegistry,
    id: CsrId,
    vertex_count: i64,
    sources: &[i64],
    degrees: &[i64],
) -> Result<Vec<i64>> {
    if sources.len() != degrees.len() {
        return Err(CsrError::invalid(format!(
            "degree batch columns differ in length: sources={} degrees={}",
            sources.len(),
            degrees.len()
        )));
    }
    trace!(csr = id.0, rows = sources.len(), "csr.degree_batch");
    let csr = registry.ensure_vertex_offsets(id, vertex_count)?;
    for (&source, &degree) in sources.iter().zip(degrees) {
        if let Err(err) = csr.write_degree(source, degree) {
            registry.mark_for_deletion(id);
            return Err(err);
        }
    }
    registry.metrics().degrees_written(sources.len() as u64);
    Ok(degrees.to_vec())
}

/// Validates the edge count of `id` once, erects its edge (and weight)
/// skeleton once, then inserts every row of `batch`.
///
/// A row that cannot be inserted abandons the build for `id`.
///
/// Returns [`EDGE_ROW_MARKER`] per row.
pub fn build_edges(
    registry: &CsrRegistry,
    id: CsrId,
    shape: EdgeShape,
    batch: EdgeBatch<'_>,
) -> Result<Vec<i32>> {
    batch.validate()?;
    trace!(csr = id.0, rows = batch.len(), "csr.edge_batch");
    let csr = registry.resolve(id)?;
    if !csr.is_edge_initialized() {
        registry.check_edge_cardinality(id, shape.expected_edges, shape.observed_edges)?;
        registry.init_edges(&csr, shape.vertex_count, shape.expected_edges)?;
    }
    if let Some(weights) = batch.weights {
        let kind = WeightKind::from_logical(weights.logical_type())?;
        registry.init_weights(&csr, shape.expected_edges, kind)?;
    }

    for row in 0..batch.len() {
        let weight = batch.weights.map(|column| column.get(row));
        let inserted = csr.insert_edge(
            batch.sources[row],
            batch.destinations[row],
            batch.edge_ids[row],
            weight,
        );
        if let Err(err) = inserted {
            csr.note_inserted(row);
            registry.metrics().edges_inserted(row as u64);
            registry.mark_for_deletion(id);
            return Err(err);
        }
    }
    csr.note_inserted(batch.len());
    registry.metrics().edges_inserted(batch.len() as u64);
    Ok(vec![EDGE_ROW_MARKER; batch.len()])
}

/// Discards the CSR for `id`. Returns whether one existed.
pub fn delete_csr(registry: &CsrRegistry, id: CsrId) -> bool {
    registry.delete(id)
}

/// Weight representation of the CSR for `id`, if it has one.
pub fn csr_weight_type(registry: &CsrRegistry, id: CsrId) -> Option<WeightKind> {
    registry.lookup(id).and_then(|csr| csr.weight_kind())
}
