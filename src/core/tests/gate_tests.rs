use crate::core::activity::ActivityConfig;
use crate::core::entity::Entity;
use crate::core::gate::BatchPolicy;
use crate::core::processor::Routine;
use crate::core::routing::RouteTarget;
use crate::core::simulation::Simulation;
use crate::error::SimError;
use crate::Item;

#[test]
fn test_batch_gate_waits_for_a_full_batch() {
    // Batch size 3: two items must not move; the third releases all three
    // as one batch.
    let mut sim = Simulation::new();
    let stage = sim
        .add_activity(
            "stage",
            ActivityConfig {
                in_policy: BatchPolicy::Batch(3),
                ..ActivityConfig::default()
            },
            Routine::new(),
        )
        .unwrap();
    sim.connect(stage, RouteTarget::Sink).unwrap();

    sim.submit(stage, Entity::new());
    sim.submit(stage, Entity::new());
    sim.run(None).unwrap();

    let snap = sim.snapshot(stage);
    assert_eq!(snap.in_level, 2);
    assert_eq!(snap.to_process_level, 0);
    assert_eq!(sim.completed_count(), 0);

    sim.submit(stage, Entity::new());
    sim.run(None).unwrap();

    assert_eq!(sim.snapshot(stage).in_level, 0);
    let completed = sim.completed();
    assert_eq!(completed.len(), 1);
    let (_, item) = &completed[0];
    assert!(item.as_batch().is_some());
    assert_eq!(item.leaf_count(), 3);
}

#[test]
fn test_batch_gate_never_moves_partial_batches() {
    // Seven items through batch size 3: two full batches move, one
    // remainder stays behind.
    let mut sim = Simulation::new();
    let stage = sim
        .add_activity(
            "stage",
            ActivityConfig {
                in_policy: BatchPolicy::Batch(3),
                ..ActivityConfig::default()
            },
            Routine::new(),
        )
        .unwrap();
    sim.connect(stage, RouteTarget::Sink).unwrap();

    for _ in 0..7 {
        sim.submit(stage, Entity::new());
    }
    sim.run(None).unwrap();

    assert_eq!(sim.completed_count(), 2);
    for (_, item) in sim.completed() {
        assert_eq!(item.leaf_count(), 3);
    }
    assert_eq!(sim.snapshot(stage).in_level, 1);
}

#[test]
fn test_unbatch_gate_restores_batch_contents_in_order() {
    // An upstream stage wraps pairs; the downstream stage unwraps them and
    // processes the original entities individually.
    let mut sim = Simulation::new();
    let wrap = sim
        .add_activity(
            "wrap",
            ActivityConfig {
                out_policy: BatchPolicy::Batch(2),
                ..ActivityConfig::default()
            },
            Routine::new(),
        )
        .unwrap();
    let unwrap_stage = sim
        .add_activity(
            "unwrap",
            ActivityConfig {
                in_policy: BatchPolicy::Unbatch,
                ..ActivityConfig::default()
            },
            Routine::new(),
        )
        .unwrap();
    sim.connect(wrap, RouteTarget::Activity(unwrap_stage)).unwrap();
    sim.connect(unwrap_stage, RouteTarget::Sink).unwrap();

    let mut submitted = Vec::new();
    for _ in 0..4 {
        let entity = Entity::new();
        submitted.push(entity.id);
        sim.submit(wrap, entity);
    }
    sim.run(None).unwrap();

    let completed = sim.completed();
    assert_eq!(completed.len(), 4);
    let ids: Vec<_> = completed
        .iter()
        .map(|(_, item)| {
            assert!(matches!(item, Item::Entity(_)));
            item.id()
        })
        .collect();
    assert_eq!(ids, submitted);
}

#[test]
fn test_unbatch_of_a_bare_entity_is_fatal() {
    // An unbatch gate fed plain entities indicates a miswired pipeline.
    let mut sim = Simulation::new();
    let stage = sim
        .add_activity(
            "stage",
            ActivityConfig {
                in_policy: BatchPolicy::Unbatch,
                ..ActivityConfig::default()
            },
            Routine::new(),
        )
        .unwrap();
    sim.connect(stage, RouteTarget::Sink).unwrap();

    sim.submit(stage, Entity::new());
    let err = sim.run(None).unwrap_err();
    assert!(matches!(err, SimError::Invariant(_)));
}
