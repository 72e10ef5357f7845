use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::Phase;

/// Trait for tracking CSR build activity.
///
/// Implementations receive one call per skeleton event and one call per
/// processed batch, never one per row, so they stay off the insertion path.
pub trait BuildMetrics: Send + Sync {
    /// Records registration of a new structure id.
    fn csr_created(&self);

    /// Records a one-shot skeleton allocation.
    fn phase_built(&self, phase: Phase);

    /// Records a batch of degree rows.
    fn degrees_written(&self, rows: u64);

    /// Records a batch of inserted edges.
    fn edges_inserted(&self, rows: u64);

    /// Records a build abandoned by validation.
    fn build_failed(&self);

    /// Records removal of an instance from the registry.
    fn csr_deleted(&self);
}

/// A no-op implementation of [`BuildMetrics`] that discards all recorded metrics.
#[derive(Default)]
pub struct NoopMetrics;

impl BuildMetrics for NoopMetrics {
    fn csr_created(&self) {}
    fn phase_built(&self, _phase: Phase) {}
    fn degrees_written(&self, _rows: u64) {}
    fn edges_inserted(&self, _rows: u64) {}
    fn build_failed(&self) {}
    fn csr_deleted(&self) {}
}

/// A thread-safe counter-based implementation of [`BuildMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Structure ids registered.
    pub csrs_created: AtomicU64,

    /// Offset arrays allocated.
    pub vertex_phases: AtomicU64,

    /// Edge stores allocated.
    pub edge_phases: AtomicU64,

    /// Weight columns allocated.
    pub weight_phases: AtomicU64,

    /// Degree rows written.
    pub degrees_written: AtomicU64,

    /// Edge rows inserted.
    pub edges_inserted: AtomicU64,

    /// Builds abandoned by validation.
    pub builds_failed: AtomicU64,

    /// Instances removed from the registry.
    pub csrs_deleted: AtomicU64,
}

impl BuildMetrics for CounterMetrics {
    fn csr_created(&self) {
        self.csrs_created.fetch_add(1, Ordering::Relaxed);
    }

    fn phase_built(&self, phase: Phase) {
        let counter = match phase {
            Phase::Vertex => &self.vertex_phases,
            Phase::Edge => &self.edge_phases,
            Phase::Weight => &self.weight_phases,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn degrees_written(&self, rows: u64) {
        self.degrees_written.fetch_add(rows, Ordering::Relaxed);
    }

    fn edges_inserted(&self, rows: u64) {
        self.edges_inserted.fetch_add(rows, Ordering::Relaxed);
    }

    fn build_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn csr_deleted(&self) {
        self.csrs_deleted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn BuildMetrics> {
    Arc::new(NoopMetrics)
}
