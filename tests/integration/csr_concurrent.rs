#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;

use pgq_csr::query::{build_edges, build_vertex_degrees, EdgeBatch, EdgeShape, WeightColumn};
use pgq_csr::storage::{CounterMetrics, CsrRegistry, RegistryOptions, Weight};
use pgq_csr::{CsrError, CsrId, LogicalType, Result};

const NUM_THREADS: usize = 8;
const VERTICES: i64 = 257;
const BATCH: usize = 64;

/// Deterministic edge list where vertex `v` has `v % 7` out-edges.
fn edge_list() -> Vec<(i64, i64)> {
    let mut edges = Vec::new();
    for src in 0..VERTICES {
        for k in 0..(src % 7) {
            edges.push((src, (src * 31 + k * 17) % VERTICES));
        }
    }
    edges
}

fn degrees(edges: &[(i64, i64)]) -> Vec<i64> {
    let mut degrees = vec![0; VERTICES as usize];
    for (src, _) in edges {
        degrees[*src as usize] += 1;
    }
    degrees
}

#[test]
fn concurrent_phase_builders_allocate_once() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let registry = Arc::new(CsrRegistry::new(
        RegistryOptions::new().metrics(metrics.clone()),
    ));
    let id = CsrId(1);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let mut handles = vec![];
    for _ in 0..NUM_THREADS {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            for _ in 0..50 {
                registry.ensure_vertex_offsets(id, 4)?;
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().unwrap()?;
    }

    let mut handles = vec![];
    for _ in 0..NUM_THREADS {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            for _ in 0..50 {
                registry.ensure_edge_storage(id, 4, 0)?;
                registry.ensure_weight_storage(id, 0, LogicalType::BigInt)?;
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().unwrap()?;
    }

    assert_eq!(metrics.csrs_created.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.vertex_phases.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.edge_phases.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.weight_phases.load(Ordering::Relaxed), 1);
    // A second prefix sum would have doubled the boundaries.
    assert_eq!(
        registry.lookup(id).unwrap().offsets().unwrap().snapshot(),
        vec![0; 6]
    );
    Ok(())
}

#[test]
fn concurrent_edge_batches_fill_every_range() -> Result<()> {
    let registry = Arc::new(CsrRegistry::default());
    let id = CsrId(2);
    let edges = Arc::new(edge_list());
    let degrees = Arc::new(degrees(&edges));
    let shape = EdgeShape {
        vertex_count: VERTICES,
        expected_edges: edges.len() as i64,
        observed_edges: edges.len() as i64,
    };

    // Degree phase: threads take interleaved vertex batches.
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = vec![];
    for thread_id in 0..NUM_THREADS {
        let registry = Arc::clone(&registry);
        let degrees = Arc::clone(&degrees);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            let vertices: Vec<i64> = (0..VERTICES).collect();
            for (batch, chunk) in vertices.chunks(BATCH).enumerate() {
                if batch % NUM_THREADS != thread_id {
                    continue;
                }
                let start = chunk[0] as usize;
                let slice = &degrees[start..start + chunk.len()];
                build_vertex_degrees(&registry, id, VERTICES, chunk, slice)?;
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().unwrap()?;
    }

    // Edge phase: every thread races on the same sources.
    let mut handles = vec![];
    for thread_id in 0..NUM_THREADS {
        let registry = Arc::clone(&registry);
        let edges = Arc::clone(&edges);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            let rows: Vec<usize> = (thread_id..edges.len()).step_by(NUM_THREADS).collect();
            for chunk in rows.chunks(BATCH) {
                let sources: Vec<i64> = chunk.iter().map(|&r| edges[r].0).collect();
                let destinations: Vec<i64> = chunk.iter().map(|&r| edges[r].1).collect();
                let edge_ids: Vec<i64> = chunk.iter().map(|&r| r as i64).collect();
                let weights: Vec<i64> = chunk.iter().map(|&r| r as i64 * 10).collect();
                build_edges(
                    &registry,
                    id,
                    shape,
                    EdgeBatch::new(&sources, &destinations, &edge_ids)
                        .with_weights(WeightColumn::Int(&weights)),
                )?;
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().unwrap()?;
    }

    let csr = registry.lookup(id).unwrap();
    csr.verify_complete()?;
    let mut expected: BTreeMap<i64, Vec<(i64, i64)>> = BTreeMap::new();
    for (row, (src, dst)) in edges.iter().enumerate() {
        expected.entry(*src).or_default().push((*dst, row as i64));
    }
    for vertex in 0..VERTICES {
        let mut found: Vec<(i64, i64)> = csr
            .neighbors(vertex)?
            .map(|n| {
                assert_eq!(n.weight, Some(Weight::Int(n.edge_id * 10)));
                (n.destination, n.edge_id)
            })
            .collect();
        found.sort_unstable();
        let mut want = expected.remove(&vertex).unwrap_or_default();
        want.sort_unstable();
        assert_eq!(found, want, "adjacency of vertex {vertex}");
        assert_eq!(csr.degree(vertex)?, degrees[vertex as usize] as usize);
    }
    Ok(())
}

#[test]
fn concurrent_mismatch_fails_every_worker() -> Result<()> {
    let registry = Arc::new(CsrRegistry::default());
    let id = CsrId(3);
    build_vertex_degrees(&registry, id, 2, &[0, 1], &[1, 1])?;
    let shape = EdgeShape {
        vertex_count: 2,
        expected_edges: 2,
        observed_edges: 3,
    };
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = vec![];
    for _ in 0..NUM_THREADS {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            build_edges(&registry, id, shape, EdgeBatch::new(&[0], &[1], &[0]))
        }));
    }
    for handle in handles {
        let err = handle.join().unwrap().unwrap_err();
        assert!(
            matches!(
                err,
                CsrError::CardinalityMismatch { .. } | CsrError::AlreadyDeleted(_)
            ),
            "unexpected error {err}"
        );
        assert!(err.is_constraint_violation());
    }
    assert!(registry.is_marked_for_deletion(id));
    assert!(registry.lookup(id).is_none());
    Ok(())
}
