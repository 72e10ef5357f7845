#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;

use pgq_csr::query::{
    build_edges, build_vertex_degrees, csr_weight_type, delete_csr, EdgeBatch, EdgeShape,
    WeightColumn,
};
use pgq_csr::storage::{BuildState, CounterMetrics, CsrRegistry, RegistryOptions, Weight};
use pgq_csr::{CsrError, CsrId, ErrorKind, LogicalType, Result, WeightKind};

fn shape(vertex_count: i64, edges: i64) -> EdgeShape {
    EdgeShape {
        vertex_count,
        expected_edges: edges,
        observed_edges: edges,
    }
}

#[test]
fn three_vertex_scenario() -> Result<()> {
    let registry = CsrRegistry::default();
    let id = CsrId(1);

    build_vertex_degrees(&registry, id, 3, &[0, 1, 2], &[2, 1, 0])?;
    let csr = registry.lookup(id).expect("csr registered");
    assert_eq!(csr.state(), BuildState::Vertices);
    assert_eq!(csr.offsets().unwrap().snapshot(), vec![0, 0, 2, 1, 0]);

    // First edge batch runs validation and the prefix sum.
    build_edges(&registry, id, shape(3, 3), EdgeBatch::new(&[0], &[1], &[100]))?;
    assert_eq!(csr.state(), BuildState::Edges);
    assert_eq!(csr.offsets().unwrap().snapshot(), vec![0, 1, 2, 3, 3]);

    build_edges(
        &registry,
        id,
        shape(3, 3),
        EdgeBatch::new(&[0, 1], &[2, 2], &[101, 102]),
    )?;
    assert_eq!(csr.offsets().unwrap().snapshot(), vec![0, 2, 3, 3, 3]);
    assert_eq!(csr.edges().unwrap().destinations(), vec![1, 2, 2]);
    assert_eq!(csr.edges().unwrap().edge_ids(), vec![100, 101, 102]);
    csr.verify_complete()?;

    let v0: Vec<(i64, i64)> = csr
        .neighbors(0)?
        .map(|n| (n.destination, n.edge_id))
        .collect();
    assert_eq!(v0, vec![(1, 100), (2, 101)]);
    assert_eq!(csr.degree(1)?, 1);
    assert_eq!(csr.degree(2)?, 0);
    assert!(csr.neighbors(3).is_err());
    Ok(())
}

#[test]
fn weighted_build_uses_the_claimed_slot() -> Result<()> {
    let registry = CsrRegistry::default();
    let id = CsrId(2);
    build_vertex_degrees(&registry, id, 2, &[0, 1], &[2, 1])?;
    let weights = [0.25, 4.0, -1.5];
    build_edges(
        &registry,
        id,
        shape(2, 3),
        EdgeBatch::new(&[1, 0, 0], &[0, 1, 0], &[7, 8, 9])
            .with_weights(WeightColumn::Double(&weights)),
    )?;
    let csr = registry.lookup(id).unwrap();
    assert_eq!(csr.state(), BuildState::Weighted);
    assert_eq!(csr_weight_type(&registry, id), Some(WeightKind::Double));
    for neighbor in csr.neighbors(0)? {
        let expected = match neighbor.edge_id {
            8 => 4.0,
            9 => -1.5,
            other => panic!("unexpected edge {other}"),
        };
        assert_eq!(neighbor.weight, Some(Weight::Double(expected)));
    }
    let v1: Vec<_> = csr.neighbors(1)?.collect();
    assert_eq!(v1[0].weight, Some(Weight::Double(0.25)));
    csr.verify_complete()?;
    Ok(())
}

#[test]
fn cardinality_mismatch_abandons_the_build() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let registry = CsrRegistry::new(RegistryOptions::new().metrics(metrics.clone()));
    let id = CsrId(3);
    build_vertex_degrees(&registry, id, 2, &[0, 1], &[1, 1])?;

    let mismatch = EdgeShape {
        vertex_count: 2,
        expected_edges: 2,
        observed_edges: 1,
    };
    let err = build_edges(&registry, id, mismatch, EdgeBatch::new(&[0], &[1], &[0]))
        .unwrap_err();
    assert!(err.is_constraint_violation());
    assert!(registry.is_marked_for_deletion(id));
    assert!(registry.lookup(id).is_none());

    // Every later phase call for the id is refused.
    let err = build_vertex_degrees(&registry, id, 2, &[0], &[1]).unwrap_err();
    assert!(matches!(err, CsrError::AlreadyDeleted(_)));
    assert_eq!(err.kind(), ErrorKind::Constraint);
    let err = build_edges(&registry, id, shape(2, 2), EdgeBatch::new(&[0], &[1], &[0]))
        .unwrap_err();
    assert!(matches!(err, CsrError::AlreadyDeleted(_)));
    assert_eq!(metrics.builds_failed.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.edges_inserted.load(Ordering::Relaxed), 0);

    // The next query may reuse the id.
    let report = registry.query_end();
    assert_eq!(report.cleared_marks, 1);
    build_vertex_degrees(&registry, id, 2, &[0, 1], &[1, 1])?;
    build_edges(
        &registry,
        id,
        shape(2, 2),
        EdgeBatch::new(&[0, 1], &[1, 0], &[0, 1]),
    )?;
    registry.lookup(id).unwrap().verify_complete()?;
    Ok(())
}

#[test]
fn unsupported_weight_type_is_not_implemented() -> Result<()> {
    let registry = CsrRegistry::default();
    let id = CsrId(4);
    registry.ensure_vertex_offsets(id, 1)?;
    registry.ensure_edge_storage(id, 1, 0)?;
    let err = registry
        .ensure_weight_storage(id, 0, LogicalType::Integer)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);
    assert!(!registry.is_marked_for_deletion(id));
    Ok(())
}

#[test]
fn allocation_failure_is_internal() {
    let registry = CsrRegistry::new(RegistryOptions::new().max_elements(16));
    let id = CsrId(5);
    let err = build_vertex_degrees(&registry, id, 100, &[0], &[1]).unwrap_err();
    assert!(matches!(err, CsrError::AllocationFailure { .. }));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn out_of_range_rows_abandon_the_build() -> Result<()> {
    let registry = CsrRegistry::default();

    let err = build_vertex_degrees(&registry, CsrId(6), 2, &[2], &[1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(registry.is_marked_for_deletion(CsrId(6)));

    assert!(build_vertex_degrees(&registry, CsrId(8), 2, &[0], &[-1]).is_err());
    assert!(registry.lookup(CsrId(8)).is_none());

    let id = CsrId(9);
    build_vertex_degrees(&registry, id, 2, &[0, 1], &[1, 1])?;
    let err = build_edges(
        &registry,
        id,
        shape(2, 2),
        EdgeBatch::new(&[0, 1], &[1, 9], &[0, 1]),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(registry.lookup(id).is_none());
    assert!(registry.is_marked_for_deletion(id));
    let err = build_edges(&registry, id, shape(2, 2), EdgeBatch::new(&[1], &[0], &[1]))
        .unwrap_err();
    assert!(matches!(err, CsrError::AlreadyDeleted(_)));
    Ok(())
}

#[test]
fn rows_beyond_a_degree_abandon_the_build() -> Result<()> {
    let registry = CsrRegistry::default();
    let id = CsrId(10);
    build_vertex_degrees(&registry, id, 3, &[0, 1, 2], &[2, 1, 1])?;
    let held = registry.ensure_vertex_offsets(id, 3)?;
    let err = build_edges(
        &registry,
        id,
        shape(3, 4),
        EdgeBatch::new(&[0, 1, 1, 2], &[1, 2, 0, 0], &[100, 101, 102, 103]),
    )
    .unwrap_err();
    assert!(matches!(err, CsrError::InvalidArgument(_)));
    assert!(registry.lookup(id).is_none());
    // Vertex 2's range was never touched by the extra row of vertex 1.
    assert_eq!(held.edges().unwrap().edge_ids(), vec![100, 0, 101, 0]);
    assert!(held.verify_complete().is_err());
    Ok(())
}

#[test]
fn explicit_delete_and_sweep() -> Result<()> {
    let registry = CsrRegistry::default();
    for raw in 0..4 {
        build_vertex_degrees(&registry, CsrId(raw), 1, &[0], &[0])?;
    }
    assert!(delete_csr(&registry, CsrId(0)));
    assert!(!delete_csr(&registry, CsrId(0)));
    assert_eq!(registry.ids(), vec![CsrId(1), CsrId(2), CsrId(3)]);

    let reader = registry.lookup(CsrId(2)).unwrap();
    let report = registry.query_end();
    assert_eq!(report.removed, vec![CsrId(1), CsrId(3)]);
    assert_eq!(report.retained, vec![CsrId(2)]);
    assert!(!reader.is_discarded());
    drop(reader);
    registry.query_end();
    assert!(registry.is_empty());
    Ok(())
}

#[test]
fn snapshot_serializes_to_json() -> Result<()> {
    let registry = CsrRegistry::default();
    let id = CsrId(7);
    build_vertex_degrees(&registry, id, 2, &[0, 1], &[1, 0])?;
    let ints = [3];
    build_edges(
        &registry,
        id,
        shape(2, 1),
        EdgeBatch::new(&[0], &[1], &[42]).with_weights(WeightColumn::Int(&ints)),
    )?;
    let json = serde_json::to_value(registry.lookup(id).unwrap().snapshot()).unwrap();
    assert_eq!(json["offsets"], serde_json::json!([0, 1, 1, 1]));
    assert_eq!(json["edge_ids"], serde_json::json!([42]));
    assert_eq!(json["weights"], serde_json::json!([3]));
    assert_eq!(json["weight_kind"], serde_json::json!("int"));
    assert_eq!(json["state"], serde_json::json!("weighted"));
    Ok(())
}
