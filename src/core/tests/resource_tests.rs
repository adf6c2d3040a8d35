use crate::core::activity::ActivityConfig;
use crate::core::entity::Entity;
use crate::core::processor::Routine;
use crate::core::routing::RouteTarget;
use crate::core::simulation::Simulation;

#[test]
fn test_pick_blocks_until_the_claimed_resource_frees() {
    // One worker shared by two processors: the second pick suspends until
    // the first place releases, so the holds serialize.
    let mut sim = Simulation::new();
    let worker = sim.add_resource("worker", 1);
    let stage = sim
        .add_activity(
            "stage",
            ActivityConfig {
                process_cap: 2,
                ..ActivityConfig::default()
            },
            Routine::new().pick(&[worker]).hold(5).place_all(),
        )
        .unwrap();
    sim.connect(stage, RouteTarget::Sink).unwrap();

    sim.submit(stage, Entity::new());
    sim.submit(stage, Entity::new());
    sim.run(None).unwrap();

    let times: Vec<_> = sim.completed().iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![5, 10]);
    assert_eq!(sim.resource_claimed(worker), 0);
}

#[test]
fn test_pick_returns_only_after_the_full_set_is_held() {
    // Two resources, two items, one of each resource's units: the second
    // item cannot start its hold until both of its claims are granted.
    let mut sim = Simulation::new();
    let machine = sim.add_resource("machine", 1);
    let worker = sim.add_resource("worker", 1);
    let stage = sim
        .add_activity(
            "stage",
            ActivityConfig {
                process_cap: 2,
                ..ActivityConfig::default()
            },
            Routine::new().pick(&[machine, worker]).hold(3).place_all(),
        )
        .unwrap();
    sim.connect(stage, RouteTarget::Sink).unwrap();

    sim.submit(stage, Entity::new());
    sim.submit(stage, Entity::new());
    sim.run(None).unwrap();

    let times: Vec<_> = sim.completed().iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![3, 6]);
    assert_eq!(sim.resource_claimed(machine), 0);
    assert_eq!(sim.resource_claimed(worker), 0);
}

#[test]
fn test_place_releases_only_the_named_subset() {
    // Release the worker mid-routine, keep the machine to the end of the
    // run: the machine claim outlives the item.
    let mut sim = Simulation::new();
    let machine = sim.add_resource("machine", 1);
    let worker = sim.add_resource("worker", 1);
    let stage = sim
        .add_activity(
            "stage",
            ActivityConfig::default(),
            Routine::new()
                .pick(&[machine, worker])
                .hold(2)
                .place(&[worker])
                .hold(3),
        )
        .unwrap();
    sim.connect(stage, RouteTarget::Sink).unwrap();

    sim.submit(stage, Entity::new());
    sim.run(None).unwrap();

    assert_eq!(sim.completed_count(), 1);
    assert_eq!(sim.resource_claimed(worker), 0);
    // Never placed, still held by the processor's outstanding requestor.
    assert_eq!(sim.resource_claimed(machine), 1);
}

#[test]
fn test_waiting_on_a_resource_is_not_an_error() {
    // A claim that can never be granted leaves the run quiescent, not
    // failed: contention is ordinary suspension.
    let mut sim = Simulation::new();
    let worker = sim.add_resource("worker", 0);
    let stage = sim
        .add_activity(
            "stage",
            ActivityConfig::default(),
            Routine::new().pick(&[worker]).hold(1).place_all(),
        )
        .unwrap();
    sim.connect(stage, RouteTarget::Sink).unwrap();

    sim.submit(stage, Entity::new());
    let end = sim.run(None).unwrap();
    assert_eq!(end, 0);
    assert_eq!(sim.completed_count(), 0);
    assert_eq!(sim.resource_queued(worker), 1);
}
