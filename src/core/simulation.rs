use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use serde::Serialize;

use crate::core::activity::{
    ActivityConfig, ActivityId, ActivityRef, ActivityShared, Arbiter, ProcessorHandle,
};
use crate::core::buffer::{Buffer, BufferProc, BufferRole, Capacity};
use crate::core::entity::{Entity, EntityState, Item};
use crate::core::gate::{BatchPolicy, Gate, GateRole};
use crate::core::processor::{Processor, Routine};
use crate::core::routing::{Delivery, RouteTarget, Router, SinkStore};
use crate::error::{ConfigError, SimError};
use crate::flow::generator::{ArrivalPattern, EntityGenerator};
use crate::flow::shift::{ShiftController, ShiftPlan};
use crate::flow::tracker::TrackerHandle;
use crate::kernel::engine::{Ctx, Engine};
use crate::kernel::process::SimTime;
use crate::kernel::queue::FifoQueue;
use crate::kernel::resource::ResourceId;
use crate::kernel::signal::SignalValue;

/// Handle to a generator registered with a simulation.
pub type GeneratorId = usize;

/// Read-only view of one activity's buffer levels and pool state.
#[derive(Debug, Clone, Serialize)]
pub struct ActivitySnapshot {
    pub name: String,
    pub in_level: usize,
    pub to_process_level: usize,
    pub processing_level: usize,
    pub complete_level: usize,
    pub out_level: usize,
    pub in_full: bool,
    pub out_full: bool,
    /// Leaf entities in the out buffer; differs from `out_level` when the
    /// out gate batches.
    pub out_expanded: usize,
    pub idle_processors: usize,
}

/// Facade owning the engine and everything built on it.
///
/// Build the pipeline (resources, activities, routes, generators, shifts),
/// then `run`. Configuration is validated here, at construction; nothing is
/// reconfigurable afterwards.
pub struct Simulation {
    engine: Engine,
    activities: Vec<ActivityRef>,
    routed: Vec<bool>,
    sink: Rc<RefCell<SinkStore>>,
    tracker: TrackerHandle,
    generators: Vec<crate::kernel::signal::SignalId>,
}

impl Simulation {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        let tracker = TrackerHandle::new(&mut engine.ctx, "entities");
        Self {
            engine,
            activities: Vec::new(),
            routed: Vec::new(),
            sink: Rc::new(RefCell::new(SinkStore::new())),
            tracker,
            generators: Vec::new(),
        }
    }

    pub fn add_resource(&mut self, name: &str, capacity: usize) -> ResourceId {
        self.engine.ctx.add_resource(name, capacity)
    }

    /// Build one pipeline stage: five buffers, three gates, the arbitration
    /// loop, and a pool of `process_cap` processors sharing `routine`.
    pub fn add_activity(
        &mut self,
        name: &str,
        config: ActivityConfig,
        routine: Routine,
    ) -> Result<ActivityId, ConfigError> {
        config.validate()?;
        let ctx = &mut self.engine.ctx;

        let in_buf = Buffer::new(ctx, name, BufferRole::In, config.in_buffer_cap);
        let to_process = Buffer::new(ctx, name, BufferRole::ToProcess, Capacity::Unbounded);
        let processing = Buffer::new(
            ctx,
            name,
            BufferRole::Processing,
            Capacity::Finite(config.process_cap),
        );
        let complete = Buffer::new(ctx, name, BufferRole::Complete, Capacity::Unbounded);
        let out_buf = Buffer::new(ctx, name, BufferRole::Out, config.out_buffer_cap);

        let assign = ctx.create_signal(format!("{}_assign", name), SignalValue::Bool(false));
        let assigned = ctx.create_signal(format!("{}_assigned", name), SignalValue::Bool(false));
        let done = ctx.create_signal(format!("{}_done", name), SignalValue::Bool(false));
        let done_ack = ctx.create_signal(format!("{}_done_ack", name), SignalValue::Bool(false));
        let idle_count = ctx.create_signal(format!("{}_idle_count", name), SignalValue::Int(0));

        let activity: ActivityRef = Rc::new(RefCell::new(ActivityShared {
            name: name.to_string(),
            config: config.clone(),
            in_buf: in_buf.clone(),
            to_process: to_process.clone(),
            processing: processing.clone(),
            complete: complete.clone(),
            out_buf: out_buf.clone(),
            processor_q: FifoQueue::new(),
            processors: Vec::new(),
            processee_q: FifoQueue::new(),
            done_q: FifoQueue::new(),
            assign,
            assigned,
            done,
            done_ack,
            idle_count,
        }));

        for buf in [&in_buf, &to_process, &processing, &complete, &out_buf] {
            self.engine.spawn(Box::new(BufferProc::new(buf.clone())));
        }

        self.engine.spawn(Box::new(Gate::new(
            name,
            GateRole::In,
            config.in_policy,
            in_buf.clone(),
            to_process.clone(),
            activity.clone(),
        )));
        self.engine.spawn(Box::new(Gate::new(
            name,
            GateRole::Process,
            BatchPolicy::None,
            to_process.clone(),
            processing.clone(),
            activity.clone(),
        )));
        self.engine.spawn(Box::new(Gate::new(
            name,
            GateRole::Out,
            config.out_policy,
            complete.clone(),
            out_buf.clone(),
            activity.clone(),
        )));

        self.engine.spawn(Box::new(Arbiter::new(activity.clone())));

        let routine = Rc::new(routine);
        for index in 0..config.process_cap {
            let slot = Rc::new(RefCell::new(None));
            let pid = self.engine.spawn(Box::new(Processor::new(
                name,
                index,
                activity.clone(),
                processing.clone(),
                complete.clone(),
                routine.clone(),
                slot.clone(),
            )));
            activity
                .borrow_mut()
                .processors
                .push(ProcessorHandle { pid, slot });
        }

        self.activities.push(activity);
        self.routed.push(false);
        Ok(self.activities.len() - 1)
    }

    /// Route an activity's finished items onward. Each activity is routed
    /// exactly once.
    pub fn connect(&mut self, from: ActivityId, target: RouteTarget) -> Result<(), ConfigError> {
        if self.routed[from] {
            return Err(ConfigError::new(
                self.activities[from].borrow().name.clone(),
                "route",
                "each activity routed exactly once",
            ));
        }
        let delivery = match target {
            RouteTarget::Activity(next) => Delivery::Forward(self.activities[next].clone()),
            RouteTarget::Sink => Delivery::Retire,
        };
        self.engine.spawn(Box::new(Router::new(
            self.activities[from].clone(),
            delivery,
            self.sink.clone(),
            self.tracker,
        )));
        self.routed[from] = true;
        Ok(())
    }

    /// Enter one entity into an activity's in buffer.
    pub fn submit(&mut self, activity: ActivityId, mut entity: Entity) {
        entity.state = EntityState::InPipeline;
        self.tracker.entered(&mut self.engine.ctx);
        let in_buf = self.activities[activity].borrow().in_buf.clone();
        let mut buf = in_buf.borrow_mut();
        buf.enqueue(Item::Entity(entity));
        buf.request_transact(&mut self.engine.ctx);
    }

    pub fn add_generator(
        &mut self,
        name: &str,
        pattern: ArrivalPattern,
        target: ActivityId,
        start_at: SimTime,
    ) -> Result<GeneratorId, ConfigError> {
        let generator = EntityGenerator::new(
            &mut self.engine.ctx,
            name,
            pattern,
            self.activities[target].clone(),
            self.tracker,
            start_at,
        )?;
        self.generators.push(generator.ordered_qty);
        self.engine.spawn(Box::new(generator));
        Ok(self.generators.len() - 1)
    }

    /// Place an order with an `Ordered` generator. Orders accumulate until
    /// the generator starts fulfilling them.
    pub fn send_order(&mut self, generator: GeneratorId, qty: u64) {
        self.engine.ctx.add(self.generators[generator], qty as i64);
    }

    pub fn add_shift_controller(
        &mut self,
        name: &str,
        worker: ResourceId,
        on_capacity: usize,
        start_at: SimTime,
        plan: ShiftPlan,
    ) -> Result<(), ConfigError> {
        let controller =
            ShiftController::new(&mut self.engine.ctx, name, worker, on_capacity, start_at, plan)?;
        self.engine.spawn(Box::new(controller));
        Ok(())
    }

    /// Run until quiescence, or until the clock would pass `until`.
    pub fn run(&mut self, until: Option<SimTime>) -> Result<SimTime, SimError> {
        for (id, activity) in self.activities.iter().enumerate() {
            if !self.routed[id] {
                warn!(
                    "[simulation] activity '{}' has no route; its out gate will stall",
                    activity.borrow().name
                );
            }
        }
        self.engine.run(until)
    }

    pub fn now(&self) -> SimTime {
        self.engine.ctx.now()
    }

    // --- observability ---

    pub fn snapshot(&self, activity: ActivityId) -> ActivitySnapshot {
        let act = self.activities[activity].borrow();
        let in_buf = act.in_buf.borrow();
        let out_buf = act.out_buf.borrow();
        let to_process = act.to_process.borrow();
        let processing = act.processing.borrow();
        let complete = act.complete.borrow();
        ActivitySnapshot {
            name: act.name.clone(),
            in_level: in_buf.level(),
            to_process_level: to_process.level(),
            processing_level: processing.level(),
            complete_level: complete.level(),
            out_level: out_buf.level(),
            in_full: in_buf.is_full(),
            out_full: out_buf.is_full(),
            out_expanded: out_buf.expanded_count(),
            idle_processors: act.processor_q.len(),
        }
    }

    /// Retired items with their completion times, in completion order.
    pub fn completed(&self) -> Vec<(SimTime, Item)> {
        self.sink.borrow().items().to_vec()
    }

    pub fn completed_count(&self) -> usize {
        self.sink.borrow().len()
    }

    /// Entities currently in the system.
    pub fn wip(&self) -> i64 {
        self.tracker.wip(&self.engine.ctx)
    }

    /// Leaf entities retired so far.
    pub fn completed_total(&self) -> i64 {
        self.tracker.complete(&self.engine.ctx)
    }

    pub fn resource_claimed(&self, resource: ResourceId) -> usize {
        self.engine.ctx.resource_claimed(resource)
    }

    pub fn resource_capacity(&self, resource: ResourceId) -> usize {
        self.engine.ctx.resource_capacity(resource)
    }

    pub fn resource_queued(&self, resource: ResourceId) -> usize {
        self.engine.ctx.resource_queued(resource)
    }

    /// Direct access to the underlying engine context, for embedding code
    /// that builds its own processes on the same kernel.
    pub fn ctx_mut(&mut self) -> &mut Ctx {
        &mut self.engine.ctx
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
