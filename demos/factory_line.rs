//! Two-stage cutting and packing line.
//!
//! Blanks arrive every few ticks, are cut by a two-slot saw whose operators
//! work a shift pattern, leave the saw in batches of four, and are unpacked
//! and finished one by one at the packing bench.
//!
//! Run with `RUST_LOG=debug` to watch the coordination protocol at work.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use flowsim::{
    ActivityConfig, ArrivalPattern, BatchPolicy, Capacity, RouteTarget, Routine, ShiftPlan,
    ShiftSpan, Simulation,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut sim = Simulation::new();

    // The shift controller owns the operators' capacity.
    let operators = sim.add_resource("operators", 0);

    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(7)));
    let cut_time: Normal<f64> = Normal::new(6.0, 1.5)?;

    let saw = {
        let rng = rng.clone();
        sim.add_activity(
            "saw",
            ActivityConfig {
                process_cap: 2,
                in_buffer_cap: Capacity::Finite(12),
                out_buffer_cap: Capacity::Finite(8),
                in_policy: BatchPolicy::None,
                out_policy: BatchPolicy::Batch(4),
            },
            Routine::new()
                .pick(&[operators])
                .hold_with(move |_| {
                    cut_time.sample(&mut *rng.borrow_mut()).round().max(1.0) as u64
                })
                .place_all()
                .apply(|item| item.set_step("cut")),
        )?
    };

    let pack = sim.add_activity(
        "pack",
        ActivityConfig {
            process_cap: 1,
            in_buffer_cap: Capacity::Finite(4),
            out_buffer_cap: Capacity::Unbounded,
            in_policy: BatchPolicy::Unbatch,
            out_policy: BatchPolicy::None,
        },
        Routine::new().hold(2).apply(|item| item.set_step("packed")),
    )?;

    sim.connect(saw, RouteTarget::Activity(pack))?;
    sim.connect(pack, RouteTarget::Sink)?;

    sim.add_generator("blanks", ArrivalPattern::Periodic { interval: 4 }, saw, 0)?;
    sim.add_shift_controller(
        "operator_shift",
        operators,
        2,
        0,
        ShiftPlan::Pattern(vec![ShiftSpan { on: 60, off: 30 }]),
    )?;

    let end = sim.run(Some(360))?;

    println!("run ended at t={}", end);
    println!(
        "completed {} entities, {} still in process",
        sim.completed_total(),
        sim.wip()
    );
    for stage in [saw, pack] {
        let snap = sim.snapshot(stage);
        println!(
            "{:>5}: in={} to_process={} processing={} complete={} out={} (out entities={}) idle={}",
            snap.name,
            snap.in_level,
            snap.to_process_level,
            snap.processing_level,
            snap.complete_level,
            snap.out_level,
            snap.out_expanded,
            snap.idle_processors,
        );
    }

    Ok(())
}
