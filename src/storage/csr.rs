use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

use super::edges::{EdgeStore, Weight, WeightStore};
use super::offsets::OffsetArray;
use crate::types::{CsrError, CsrId, Phase, Result, WeightKind};

/// How far the skeleton of a [`Csr`] has been erected.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    /// Registered, nothing allocated.
    Empty,
    /// Offset array allocated; degrees may be written.
    Vertices,
    /// Edge store allocated and prefix sum computed; edges may be inserted.
    Edges,
    /// Weight column allocated as well.
    Weighted,
}

/// Compressed sparse row adjacency for one structure id.
///
/// Each skeleton phase is a one-shot cell: it is published at most once by
/// the registry (under its lock) and read lock-free afterwards. The arrays
/// themselves are shared by all writers; the offset cursors hand out disjoint
/// slots, so no row ever waits on another.
///
/// After a complete build, the out-edges of vertex `v` occupy edge slots
/// `[offsets[v], offsets[v + 1])`.
#[derive(Debug)]
pub struct Csr {
    id: CsrId,
    offsets: OnceLock<OffsetArray>,
    edges: OnceLock<EdgeStore>,
    weights: OnceLock<WeightStore>,
    inserted: AtomicU64,
    discarded: AtomicBool,
}

impl Csr {
    pub(crate) fn new(id: CsrId) -> Self {
        Self {
            id,
            offsets: OnceLock::new(),
            edges: OnceLock::new(),
            weights: OnceLock::new(),
            inserted: AtomicU64::new(0),
            discarded: AtomicBool::new(false),
        }
    }

    /// Structure id this instance was built for.
    pub fn id(&self) -> CsrId {
        self.id
    }

    /// Current construction state.
    pub fn state(&self) -> BuildState {
        if self.weights.get().is_some() {
            BuildState::Weighted
        } else if self.edges.get().is_some() {
            BuildState::Edges
        } else if self.offsets.get().is_some() {
            BuildState::Vertices
        } else {
            BuildState::Empty
        }
    }

    /// Whether the offset array exists.
    pub fn is_vertex_initialized(&self) -> bool {
        self.offsets.get().is_some()
    }

    /// Whether the edge store exists and the prefix sum ran.
    pub fn is_edge_initialized(&self) -> bool {
        self.edges.get().is_some()
    }

    /// Whether a weight column exists.
    pub fn is_weight_initialized(&self) -> bool {
        self.weights.get().is_some()
    }

    /// Whether the registry abandoned this build.
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// The offset array, if allocated.
    pub fn offsets(&self) -> Option<&OffsetArray> {
        self.offsets.get()
    }

    /// The edge store, if allocated.
    pub fn edges(&self) -> Option<&EdgeStore> {
        self.edges.get()
    }

    /// The weight column, if allocated.
    pub fn weights(&self) -> Option<&WeightStore> {
        self.weights.get()
    }

    /// Active weight representation.
    pub fn weight_kind(&self) -> Option<WeightKind> {
        self.weights.get().map(WeightStore::kind)
    }

    /// Number of vertices, zero before the vertex phase.
    pub fn vertex_count(&self) -> usize {
        self.offsets.get().map_or(0, OffsetArray::vertex_count)
    }

    /// Number of edge slots, zero before the edge phase.
    pub fn edge_count(&self) -> usize {
        self.edges.get().map_or(0, EdgeStore::len)
    }

    /// Number of edge rows inserted so far.
    pub fn inserted_edges(&self) -> u64 {
        self.inserted.load(Ordering::Acquire)
    }

    pub(crate) fn install_offsets(&self, offsets: OffsetArray) -> bool {
        self.offsets.set(offsets).is_ok()
    }

    pub(crate) fn install_edges(&self, edges: EdgeStore) -> bool {
        self.edges.set(edges).is_ok()
    }

    pub(crate) fn install_weights(&self, weights: WeightStore) -> bool {
        self.weights.set(weights).is_ok()
    }

    pub(crate) fn mark_discarded(&self) {
        self.discarded.store(true, Ordering::Release);
    }

    pub(crate) fn require_offsets(&self) -> Result<&OffsetArray> {
        self.offsets.get().ok_or(CsrError::PhaseNotReady {
            id: self.id,
            phase: Phase::Vertex,
        })
    }

    pub(crate) fn require_edges(&self) -> Result<&EdgeStore> {
        self.edges.get().ok_or(CsrError::PhaseNotReady {
            id: self.id,
            phase: Phase::Edge,
        })
    }

    /// Stores the out-degree of `vertex` ahead of the prefix sum.
    pub(crate) fn write_degree(&self, vertex: i64, degree: i64) -> Result<()> {
        let offsets = self.require_offsets()?;
        let vertex = vertex_index(vertex, offsets.vertex_count())?;
        if degree < 0 {
            return Err(CsrError::invalid(format!(
                "vertex {vertex} has negative degree {degree}"
            )));
        }
        offsets.set_degree(vertex, degree);
        Ok(())
    }

    /// Claims a slot in the range of `source` and writes the edge into it.
    ///
    /// Returns the claimed slot. Nothing is written when validation fails; a
    /// row beyond the degree of `source` is rejected without touching the
    /// range of the next vertex.
    pub(crate) fn insert_edge(
        &self,
        source: i64,
        destination: i64,
        edge_id: i64,
        weight: Option<Weight>,
    ) -> Result<usize> {
        let offsets = self.require_offsets()?;
        let edges = self.require_edges()?;
        let src = vertex_index(source, offsets.vertex_count())?;
        vertex_index(destination, offsets.vertex_count())?;
        let end = offsets.range_end(src).ok_or(CsrError::PhaseNotReady {
            id: self.id,
            phase: Phase::Edge,
        })?;
        let weights = match (weight, self.weights.get()) {
            (Some(value), Some(store)) => {
                if store.kind() != value.kind() {
                    return Err(CsrError::invalid(format!(
                        "{} weight written into {} weight column",
                        value.kind(),
                        store.kind()
                    )));
                }
                Some((store, value))
            }
            (Some(_), None) => {
                return Err(CsrError::PhaseNotReady {
                    id: self.id,
                    phase: Phase::Weight,
                })
            }
            (None, Some(store)) => {
                return Err(CsrError::invalid(format!(
                    "edge {edge_id} carries no weight, csr {} holds {} weights",
                    self.id,
                    store.kind()
                )))
            }
            (None, None) => None,
        };

        let claimed = offsets.claim_slot(src);
        let slot = usize::try_from(claimed)
            .ok()
            .filter(|slot| claimed < end && *slot < edges.len())
            .ok_or_else(|| {
                CsrError::invalid(format!(
                    "vertex {source} received more edges than its degree (slot {claimed})"
                ))
            })?;
        edges.write(slot, destination, edge_id);
        if let Some((store, value)) = weights {
            store.write(slot, value)?;
        }
        Ok(slot)
    }

    pub(crate) fn note_inserted(&self, rows: usize) {
        self.inserted.fetch_add(rows as u64, Ordering::AcqRel);
    }

    /// Slot range holding the out-edges of `vertex` in a finished build.
    pub fn edge_range(&self, vertex: i64) -> Result<Range<usize>> {
        let offsets = self.require_offsets()?;
        self.require_edges()?;
        let v = vertex_index(vertex, offsets.vertex_count())?;
        let start = slot_bound(offsets.get(v))?;
        let end = slot_bound(offsets.get(v + 1))?;
        Ok(start..end.max(start))
    }

    /// Out-degree of `vertex` in a finished build.
    pub fn degree(&self, vertex: i64) -> Result<usize> {
        Ok(self.edge_range(vertex)?.len())
    }

    /// Iterates the out-edges of `vertex` in a finished build.
    ///
    /// Edges sharing a source come back in insertion order, which is
    /// arbitrary under concurrent builds.
    pub fn neighbors(&self, vertex: i64) -> Result<NeighborCursor<'_>> {
        let range = self.edge_range(vertex)?;
        Ok(NeighborCursor {
            edges: self.require_edges()?,
            weights: self.weights.get(),
            range,
        })
    }

    /// Weight stored at `slot`, if a weight column exists.
    pub fn weight(&self, slot: usize) -> Option<Weight> {
        self.weights.get().map(|store| store.get(slot))
    }

    /// Checks that the build finished: every insertion cursor converged on
    /// the boundary its vertex range was given by the prefix sum, and the
    /// number of inserted rows equals the edge count. Since rows never claim
    /// past their own range end, this means every slot was filled exactly once.
    pub fn verify_complete(&self) -> Result<()> {
        let offsets = self.require_offsets()?;
        let edges = self.require_edges()?;
        let boundaries = offsets.boundaries().ok_or(CsrError::PhaseNotReady {
            id: self.id,
            phase: Phase::Edge,
        })?;
        let values = offsets.snapshot();
        if values[0] != 0 {
            return Err(CsrError::Corruption(format!(
                "csr {}: first offset is {}, expected 0",
                self.id, values[0]
            )));
        }
        let total = edges.len() as i64;
        let vertices = offsets.vertex_count();
        if boundaries[vertices + 1] != total {
            return Err(CsrError::Corruption(format!(
                "csr {}: boundaries end at {}, edge store holds {total}",
                self.id,
                boundaries[vertices + 1]
            )));
        }
        for vertex in 0..vertices {
            let cursor = values[vertex + 1];
            let end = boundaries[vertex + 2];
            if cursor != end {
                return Err(CsrError::Corruption(format!(
                    "csr {}: cursor of vertex {vertex} stopped at {cursor}, its range ends at {end}",
                    self.id
                )));
            }
        }
        let inserted = self.inserted_edges();
        if inserted != edges.len() as u64 {
            return Err(CsrError::Corruption(format!(
                "csr {}: {inserted} edges inserted into {total} slots",
                self.id
            )));
        }
        if let Some(weights) = self.weights.get() {
            if weights.len() != edges.len() {
                return Err(CsrError::Corruption(format!(
                    "csr {}: weight column has {} slots, edge store {}",
                    self.id,
                    weights.len(),
                    edges.len()
                )));
            }
        }
        Ok(())
    }

    /// Copies every array out.
    pub fn snapshot(&self) -> CsrSnapshot {
        CsrSnapshot {
            id: self.id,
            state: self.state(),
            vertex_count: self.vertex_count(),
            edge_count: self.edge_count(),
            offsets: self.offsets.get().map(OffsetArray::snapshot).unwrap_or_default(),
            destinations: self.edges.get().map(EdgeStore::destinations).unwrap_or_default(),
            edge_ids: self.edges.get().map(EdgeStore::edge_ids).unwrap_or_default(),
            weight_kind: self.weight_kind(),
            weights: self.weights.get().map(WeightStore::to_vec),
        }
    }
}

impl fmt::Display for Csr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        writeln!(
            f,
            "csr {} ({:?}): {} vertices, {} edges, weights={}",
            snapshot.id,
            snapshot.state,
            snapshot.vertex_count,
            snapshot.edge_count,
            snapshot
                .weight_kind
                .map_or_else(|| "none".to_string(), |kind| kind.to_string())
        )?;
        writeln!(f, "offsets:      {:?}", snapshot.offsets)?;
        writeln!(f, "destinations: {:?}", snapshot.destinations)?;
        write!(f, "edge_ids:     {:?}", snapshot.edge_ids)?;
        if let Some(weights) = &snapshot.weights {
            write!(f, "\nweights:      [")?;
            for (idx, weight) in weights.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                match weight {
                    Weight::Int(value) => write!(f, "{value}")?,
                    Weight::Double(value) => write!(f, "{value}")?,
                }
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// Owned copy of every CSR array.
#[derive(Clone, Debug, Serialize)]
pub struct CsrSnapshot {
    /// Structure id.
    pub id: CsrId,
    /// Construction state at copy time.
    pub state: BuildState,
    /// Number of vertices.
    pub vertex_count: usize,
    /// Number of edge slots.
    pub edge_count: usize,
    /// Offset array, padding included.
    pub offsets: Vec<i64>,
    /// Destination column.
    pub destinations: Vec<i64>,
    /// Edge-id column.
    pub edge_ids: Vec<i64>,
    /// Active weight representation.
    pub weight_kind: Option<WeightKind>,
    /// Weight column.
    pub weights: Option<Vec<Weight>>,
}

/// One out-edge of a vertex.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Neighbor {
    /// Edge slot the entry lives in.
    pub slot: usize,
    /// Destination vertex.
    pub destination: i64,
    /// Original edge id.
    pub edge_id: i64,
    /// Weight, when the CSR carries a weight column.
    pub weight: Option<Weight>,
}

/// Iterator over the out-edges of one vertex.
pub struct NeighborCursor<'a> {
    edges: &'a EdgeStore,
    weights: Option<&'a WeightStore>,
    range: Range<usize>,
}

impl NeighborCursor<'_> {
    /// Remaining entries.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether the cursor is exhausted.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

impl Iterator for NeighborCursor<'_> {
    type Item = Neighbor;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.range.next()?;
        Some(Neighbor {
            slot,
            destination: self.edges.destination(slot),
            edge_id: self.edges.edge_id(slot),
            weight: self.weights.map(|store| store.get(slot)),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

fn vertex_index(vertex: i64, vertex_count: usize) -> Result<usize> {
    usize::try_from(vertex)
        .ok()
        .filter(|v| *v < vertex_count)
        .ok_or_else(|| {
            CsrError::invalid(format!(
                "vertex {vertex} outside [0, {vertex_count})"
            ))
        })
}

fn slot_bound(offset: i64) -> Result<usize> {
    usize::try_from(offset)
        .map_err(|_| CsrError::Corruption(format!("negative edge offset {offset}")))
}
