use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use super::alloc::zeroed_slots;
use crate::types::{CsrError, Result, WeightKind};

/// Index-aligned destination and edge-id columns, one slot per edge.
///
/// Slots are claimed through [`super::OffsetArray`] cursors, so writers never
/// share a slot and plain atomic stores suffice.
#[derive(Debug)]
pub struct EdgeStore {
    destinations: Box<[AtomicI64]>,
    edge_ids: Box<[AtomicI64]>,
}

impl EdgeStore {
    pub(crate) fn zeroed(edge_count: usize, limit: Option<usize>) -> Result<Self> {
        let destinations = zeroed_slots(edge_count, "edge destinations", limit, || {
            AtomicI64::new(0)
        })?;
        let edge_ids = zeroed_slots(edge_count, "edge ids", limit, || AtomicI64::new(0))?;
        Ok(Self {
            destinations,
            edge_ids,
        })
    }

    /// Number of edge slots.
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    /// Whether the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Destination vertex stored at `slot`.
    pub fn destination(&self, slot: usize) -> i64 {
        self.destinations[slot].load(Ordering::Acquire)
    }

    /// Original edge id stored at `slot`.
    pub fn edge_id(&self, slot: usize) -> i64 {
        self.edge_ids[slot].load(Ordering::Acquire)
    }

    /// Copies the destination column out.
    pub fn destinations(&self) -> Vec<i64> {
        load_all(&self.destinations)
    }

    /// Copies the edge-id column out.
    pub fn edge_ids(&self) -> Vec<i64> {
        load_all(&self.edge_ids)
    }

    pub(crate) fn write(&self, slot: usize, destination: i64, edge_id: i64) {
        self.destinations[slot].store(destination, Ordering::Release);
        self.edge_ids[slot].store(edge_id, Ordering::Release);
    }
}

/// A single edge weight.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Weight {
    /// Integer weight.
    Int(i64),
    /// Floating point weight.
    Double(f64),
}

impl Weight {
    /// Representation of this value.
    pub fn kind(self) -> WeightKind {
        match self {
            Weight::Int(_) => WeightKind::Int,
            Weight::Double(_) => WeightKind::Double,
        }
    }
}

/// The active weight column of a CSR. Doubles are kept as raw bits.
#[derive(Debug)]
pub enum WeightStore {
    /// 64-bit integer weights.
    Int(Box<[AtomicI64]>),
    /// Double-precision weights.
    Double(Box<[AtomicU64]>),
}

impl WeightStore {
    pub(crate) fn zeroed(kind: WeightKind, edge_count: usize, limit: Option<usize>) -> Result<Self> {
        Ok(match kind {
            WeightKind::Int => WeightStore::Int(zeroed_slots(
                edge_count,
                "integer weights",
                limit,
                || AtomicI64::new(0),
            )?),
            WeightKind::Double => WeightStore::Double(zeroed_slots(
                edge_count,
                "double weights",
                limit,
                || AtomicU64::new(0f64.to_bits()),
            )?),
        })
    }

    /// Representation held by this store.
    pub fn kind(&self) -> WeightKind {
        match self {
            WeightStore::Int(_) => WeightKind::Int,
            WeightStore::Double(_) => WeightKind::Double,
        }
    }

    /// Number of weight slots.
    pub fn len(&self) -> usize {
        match self {
            WeightStore::Int(slots) => slots.len(),
            WeightStore::Double(slots) => slots.len(),
        }
    }

    /// Whether the store has no slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weight stored at `slot`.
    pub fn get(&self, slot: usize) -> Weight {
        match self {
            WeightStore::Int(slots) => Weight::Int(slots[slot].load(Ordering::Acquire)),
            WeightStore::Double(slots) => {
                Weight::Double(f64::from_bits(slots[slot].load(Ordering::Acquire)))
            }
        }
    }

    /// Copies every weight out.
    pub fn to_vec(&self) -> Vec<Weight> {
        (0..self.len()).map(|slot| self.get(slot)).collect()
    }

    pub(crate) fn write(&self, slot: usize, weight: Weight) -> Result<()> {
        match (self, weight) {
            (WeightStore::Int(slots), Weight::Int(value)) => {
                slots[slot].store(value, Ordering::Release);
            }
            (WeightStore::Double(slots), Weight::Double(value)) => {
                slots[slot].store(value.to_bits(), Ordering::Release);
            }
            (store, weight) => {
                return Err(CsrError::invalid(format!(
                    "{} weight written into {} weight column",
                    weight.kind(),
                    store.kind()
                )));
            }
        }
        Ok(())
    }
}

fn load_all(slots: &[AtomicI64]) -> Vec<i64> {
    slots.iter().map(|slot| slot.load(Ordering::Acquire)).collect()
}
