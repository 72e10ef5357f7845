use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::alloc::checked_len;
use super::csr::Csr;
use super::edges::{EdgeStore, WeightStore};
use super::metrics::BuildMetrics;
use super::offsets::OffsetArray;
use super::options::RegistryOptions;
use crate::types::{CsrError, CsrId, LogicalType, Phase, Result, WeightKind};

#[derive(Default)]
struct RegistryState {
    entries: FxHashMap<CsrId, Arc<Csr>>,
    doomed: FxHashSet<CsrId>,
}

impl RegistryState {
    /// Fails when `id` was abandoned, or when `csr` is no longer the
    /// registered instance for `id`.
    fn check_live(&self, id: CsrId, csr: &Arc<Csr>) -> Result<()> {
        if self.doomed.contains(&id) {
            return Err(CsrError::AlreadyDeleted(id));
        }
        match self.entries.get(&id) {
            Some(current) if Arc::ptr_eq(current, csr) => Ok(()),
            _ => Err(CsrError::invalid(format!(
                "csr {id} was deleted while it was being built"
            ))),
        }
    }

    fn doom(&mut self, id: CsrId, metrics: &dyn BuildMetrics) {
        self.doomed.insert(id);
        if let Some(csr) = self.entries.remove(&id) {
            csr.mark_discarded();
            metrics.csr_deleted();
        }
        metrics.build_failed();
    }
}

/// Outcome of [`CsrRegistry::query_end`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
    /// Instances dropped by the sweep.
    pub removed: Vec<CsrId>,
    /// Instances kept because a caller still holds them.
    pub retained: Vec<CsrId>,
    /// Deletion marks cleared.
    pub cleared_marks: usize,
}

/// Session-scoped owner of every CSR under construction or in use.
///
/// A single mutex guards the id map and the deletion set. It is taken once
/// per batch to resolve an id and once per id and phase to erect the
/// skeleton; row processing never takes it.
pub struct CsrRegistry {
    state: Mutex<RegistryState>,
    options: RegistryOptions,
}

impl CsrRegistry {
    /// Creates an empty registry.
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            options,
        }
    }

    /// Options the registry was created with.
    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub(crate) fn metrics(&self) -> &dyn BuildMetrics {
        self.options.metrics.as_ref()
    }

    /// Returns the instance registered for `id`.
    pub fn lookup(&self, id: CsrId) -> Option<Arc<Csr>> {
        self.state.lock().entries.get(&id).cloned()
    }

    /// Whether `id` was abandoned by a failed build in the current query.
    pub fn is_marked_for_deletion(&self, id: CsrId) -> bool {
        self.state.lock().doomed.contains(&id)
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no instance is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<CsrId> {
        let mut ids: Vec<CsrId> = self.state.lock().entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Resolves `id` for a later phase, refusing abandoned ids.
    pub(crate) fn resolve(&self, id: CsrId) -> Result<Arc<Csr>> {
        let state = self.state.lock();
        if state.doomed.contains(&id) {
            return Err(CsrError::AlreadyDeleted(id));
        }
        state
            .entries
            .get(&id)
            .cloned()
            .ok_or(CsrError::PhaseNotReady {
                id,
                phase: Phase::Vertex,
            })
    }

    /// Registers `id` on first sight and allocates its zeroed offset array
    /// exactly once.
    pub fn ensure_vertex_offsets(&self, id: CsrId, vertex_count: i64) -> Result<Arc<Csr>> {
        let csr = {
            let mut state = self.state.lock();
            if state.doomed.contains(&id) {
                return Err(CsrError::AlreadyDeleted(id));
            }
            state
                .entries
                .entry(id)
                .or_insert_with(|| {
                    self.metrics().csr_created();
                    Arc::new(Csr::new(id))
                })
                .clone()
        };
        self.init_vertices(&csr, vertex_count)?;
        Ok(csr)
    }

    pub(crate) fn init_vertices(&self, csr: &Arc<Csr>, vertex_count: i64) -> Result<()> {
        if csr.is_vertex_initialized() {
            return Ok(());
        }
        let len = checked_len(vertex_count, "vertex count")?;
        let state = self.state.lock();
        state.check_live(csr.id(), csr)?;
        if csr.is_vertex_initialized() {
            return Ok(());
        }
        let offsets = OffsetArray::zeroed(len, self.options.max_elements)?;
        csr.install_offsets(offsets);
        self.metrics().phase_built(Phase::Vertex);
        debug!(csr = csr.id().0, vertex_count = len, "csr.vertex_offsets_allocated");
        Ok(())
    }

    /// Compares the degree-derived edge count with the number of edge rows
    /// the join produced. A mismatch abandons the build for `id`.
    pub fn check_edge_cardinality(&self, id: CsrId, expected: i64, observed: i64) -> Result<()> {
        if expected == observed {
            return Ok(());
        }
        self.state.lock().doom(id, self.metrics());
        warn!(
            csr = id.0,
            expected, observed, "csr.build_abandoned: edge count mismatch"
        );
        Err(CsrError::CardinalityMismatch {
            id,
            expected,
            observed,
        })
    }

    /// Allocates the edge store for `id` and turns its degrees into range
    /// boundaries, exactly once.
    pub fn ensure_edge_storage(
        &self,
        id: CsrId,
        vertex_count: i64,
        edge_count: i64,
    ) -> Result<Arc<Csr>> {
        let csr = self.resolve(id)?;
        self.init_edges(&csr, vertex_count, edge_count)?;
        Ok(csr)
    }

    pub(crate) fn init_edges(&self, csr: &Arc<Csr>, vertex_count: i64, edge_count: i64) -> Result<()> {
        if csr.is_edge_initialized() {
            return Ok(());
        }
        let vertices = checked_len(vertex_count, "vertex count")?;
        let len = checked_len(edge_count, "edge count")?;
        let id = csr.id();
        let mut state = self.state.lock();
        state.check_live(id, csr)?;
        if csr.is_edge_initialized() {
            return Ok(());
        }
        let offsets = csr.require_offsets()?;
        if offsets.vertex_count() != vertices {
            return Err(CsrError::invalid(format!(
                "csr {id} was sized for {} vertices, edge phase expects {vertices}",
                offsets.vertex_count()
            )));
        }
        let Some(degree_total) = offsets.degree_total() else {
            state.doom(id, self.metrics());
            warn!(csr = id.0, "csr.build_abandoned: degree total overflows");
            return Err(CsrError::invalid(format!(
                "csr {id}: sum of vertex degrees overflows i64"
            )));
        };
        if degree_total != edge_count {
            state.doom(id, self.metrics());
            warn!(
                csr = id.0,
                expected = edge_count,
                degree_total,
                "csr.build_abandoned: degrees disagree with edge count"
            );
            return Err(CsrError::CardinalityMismatch {
                id,
                expected: edge_count,
                observed: degree_total,
            });
        }
        let edges = EdgeStore::zeroed(len, self.options.max_elements)?;
        offsets.prefix_sum(self.options.max_elements)?;
        csr.install_edges(edges);
        self.metrics().phase_built(Phase::Edge);
        debug!(
            csr = id.0,
            vertex_count = vertices,
            edge_count = len,
            "csr.edge_storage_allocated"
        );
        Ok(())
    }

    /// Allocates the weight column matching `weight_type` for `id`, exactly
    /// once. Only `BIGINT` and `DOUBLE` weights are supported.
    pub fn ensure_weight_storage(
        &self,
        id: CsrId,
        edge_count: i64,
        weight_type: LogicalType,
    ) -> Result<Arc<Csr>> {
        let kind = WeightKind::from_logical(weight_type)?;
        let csr = self.resolve(id)?;
        self.init_weights(&csr, edge_count, kind)?;
        Ok(csr)
    }

    pub(crate) fn init_weights(&self, csr: &Arc<Csr>, edge_count: i64, kind: WeightKind) -> Result<()> {
        if let Some(existing) = csr.weight_kind() {
            return check_weight_kind(csr.id(), existing, kind);
        }
        let len = checked_len(edge_count, "edge count")?;
        let id = csr.id();
        let state = self.state.lock();
        state.check_live(id, csr)?;
        if let Some(existing) = csr.weight_kind() {
            return check_weight_kind(id, existing, kind);
        }
        let edges = csr.require_edges()?;
        if edges.len() != len {
            return Err(CsrError::invalid(format!(
                "csr {id} holds {} edges, weight phase expects {len}",
                edges.len()
            )));
        }
        let weights = WeightStore::zeroed(kind, len, self.options.max_elements)?;
        csr.install_weights(weights);
        self.metrics().phase_built(Phase::Weight);
        debug!(csr = id.0, edge_count = len, weight = %kind, "csr.weight_storage_allocated");
        Ok(())
    }

    /// Abandons the build for `id`: the instance becomes unreachable and every
    /// later phase call for `id` fails until the query ends.
    pub fn mark_for_deletion(&self, id: CsrId) {
        self.state.lock().doom(id, self.metrics());
        warn!(csr = id.0, "csr.build_abandoned");
    }

    /// Removes the instance for `id`. Returns whether one was registered.
    pub fn delete(&self, id: CsrId) -> bool {
        let removed = self.state.lock().entries.remove(&id);
        match removed {
            Some(csr) => {
                csr.mark_discarded();
                self.metrics().csr_deleted();
                debug!(csr = id.0, "csr.deleted");
                true
            }
            None => false,
        }
    }

    /// Query-end hook: drops every instance nobody outside the registry still
    /// holds and clears the deletion marks so ids can be reused.
    pub fn query_end(&self) -> SweepReport {
        let mut report = SweepReport::default();
        {
            let mut state = self.state.lock();
            let metrics = self.metrics();
            state.entries.retain(|id, csr| {
                if Arc::strong_count(csr) > 1 {
                    report.retained.push(*id);
                    true
                } else {
                    csr.mark_discarded();
                    metrics.csr_deleted();
                    report.removed.push(*id);
                    false
                }
            });
            report.cleared_marks = state.doomed.len();
            state.doomed.clear();
        }
        report.removed.sort_unstable();
        report.retained.sort_unstable();
        if !report.removed.is_empty() || report.cleared_marks > 0 {
            info!(
                removed = report.removed.len(),
                retained = report.retained.len(),
                cleared_marks = report.cleared_marks,
                "csr.query_end_sweep"
            );
        }
        report
    }

    /// Session teardown: drops every instance and mark. Returns how many
    /// instances were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        for csr in state.entries.values() {
            csr.mark_discarded();
        }
        state.entries.clear();
        state.doomed.clear();
        dropped
    }
}

impl Default for CsrRegistry {
    fn default() -> Self {
        Self::new(RegistryOptions::default())
    }
}

impl Drop for CsrRegistry {
    fn drop(&mut self) {
        let dropped = self.clear();
        if dropped > 0 {
            debug!(dropped, "csr.registry_closed");
        }
    }
}

fn check_weight_kind(id: CsrId, existing: WeightKind, requested: WeightKind) -> Result<()> {
    if existing == requested {
        Ok(())
    } else {
        Err(CsrError::invalid(format!(
            "csr {id} already holds {existing} weights, got {requested}"
        )))
    }
}
