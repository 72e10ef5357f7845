use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

use super::alloc::zeroed_slots;
use crate::types::{CsrError, Result};

/// Extra slots beyond the vertex count.
///
/// Slot `v + 2` receives the degree of vertex `v`, slot `v + 1` serves as its
/// insertion cursor, so neither step needs a bounds special case at the first
/// or last vertex.
pub const OFFSET_PADDING: usize = 2;

/// Fixed-size array of atomically incrementable offsets.
///
/// The same cells hold three things over the life of a build: vertex degrees,
/// then range boundaries (after the prefix sum), then insertion cursors. Once
/// every edge is inserted, vertex `v` owns edge slots `[get(v), get(v + 1))`.
pub struct OffsetArray {
    slots: Box<[AtomicI64]>,
    boundaries: OnceLock<Box<[i64]>>,
}

impl OffsetArray {
    /// Allocates `vertex_count + 2` zeroed slots.
    pub(crate) fn zeroed(vertex_count: usize, limit: Option<usize>) -> Result<Self> {
        let len = vertex_count.saturating_add(OFFSET_PADDING);
        let slots = zeroed_slots(len, "vertex offsets", limit, || AtomicI64::new(0))?;
        Ok(Self {
            slots,
            boundaries: OnceLock::new(),
        })
    }

    /// Total number of slots, padding included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false: the padding slots are present even for an empty graph.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of vertices the array was sized for.
    pub fn vertex_count(&self) -> usize {
        self.slots.len() - OFFSET_PADDING
    }

    /// Reads slot `idx`.
    pub fn get(&self, idx: usize) -> i64 {
        self.slots[idx].load(Ordering::Acquire)
    }

    /// Value of the last slot: the total edge count once the prefix sum ran.
    pub fn total(&self) -> i64 {
        self.get(self.slots.len() - 1)
    }

    /// Copies the current contents out.
    pub fn snapshot(&self) -> Vec<i64> {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .collect()
    }

    /// Records the out-degree of `vertex`. Each vertex is written once, so
    /// concurrent writers touch disjoint slots.
    pub(crate) fn set_degree(&self, vertex: usize, degree: i64) {
        self.slots[vertex + 2].store(degree, Ordering::Relaxed);
    }

    /// Sum of every slot, `None` if it does not fit an `i64`.
    ///
    /// Before the prefix sum this is the sum of all written degrees.
    pub fn degree_total(&self) -> Option<i64> {
        self.slots
            .iter()
            .try_fold(0i64, |acc, slot| acc.checked_add(slot.load(Ordering::Relaxed)))
    }

    /// Turns degrees into range boundaries with an in-place inclusive running
    /// sum and records them. Sequential by nature; callers hold the registry
    /// lock. Runs at most once; the array is untouched on overflow.
    pub(crate) fn prefix_sum(&self, limit: Option<usize>) -> Result<()> {
        if self.boundaries.get().is_some() {
            return Ok(());
        }
        let mut sums = zeroed_slots(self.slots.len(), "range boundaries", limit, || 0i64)?;
        let mut running = 0i64;
        for (sum, slot) in sums.iter_mut().zip(self.slots.iter()) {
            running = running
                .checked_add(slot.load(Ordering::Relaxed))
                .ok_or_else(|| CsrError::invalid("sum of vertex degrees overflows i64"))?;
            *sum = running;
        }
        for (slot, sum) in self.slots.iter().zip(sums.iter()) {
            slot.store(*sum, Ordering::Relaxed);
        }
        let _ = self.boundaries.set(sums);
        Ok(())
    }

    /// Range boundaries as they stood right after the prefix sum.
    pub fn boundaries(&self) -> Option<&[i64]> {
        self.boundaries.get().map(|sums| &sums[..])
    }

    /// Exclusive end of the edge range of `vertex`, once the prefix sum ran.
    pub fn range_end(&self, vertex: usize) -> Option<i64> {
        self.boundaries.get().map(|sums| sums[vertex + 2])
    }

    /// Claims the next free edge slot of `vertex` and returns its index.
    pub(crate) fn claim_slot(&self, vertex: usize) -> i64 {
        self.slots[vertex + 1].fetch_add(1, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for OffsetArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}
