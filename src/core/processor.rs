use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};
use uuid::Uuid;

use crate::core::activity::ActivityRef;
use crate::core::buffer::BufferRef;
use crate::core::entity::Item;
use crate::core::requestor::{Requestor, RequestorHandle};
use crate::error::SimError;
use crate::kernel::engine::Ctx;
use crate::kernel::process::{Process, SimTime, Step};
use crate::kernel::resource::ResourceId;
use crate::kernel::signal::Cond;

/// One instruction of a process routine.
pub enum RoutineOp {
    /// Suspend for a fixed duration.
    Hold(SimTime),
    /// Suspend for a duration computed from the assigned item.
    HoldWith(Rc<dyn Fn(&Item) -> SimTime>),
    /// Acquire the full set of resources before continuing.
    Pick(Vec<ResourceId>),
    /// Release the named resources, or all outstanding ones when `None`.
    Place(Option<Vec<ResourceId>>),
    /// Synchronously mutate the assigned item.
    Apply(Rc<dyn Fn(&mut Item)>),
}

/// The domain-supplied program a processor executes per assigned item.
///
/// Built once per activity and shared by its processor pool.
pub struct Routine {
    ops: Vec<RoutineOp>,
}

impl Routine {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn hold(mut self, duration: SimTime) -> Self {
        self.ops.push(RoutineOp::Hold(duration));
        self
    }

    pub fn hold_with(mut self, f: impl Fn(&Item) -> SimTime + 'static) -> Self {
        self.ops.push(RoutineOp::HoldWith(Rc::new(f)));
        self
    }

    pub fn pick(mut self, resources: &[ResourceId]) -> Self {
        self.ops.push(RoutineOp::Pick(resources.to_vec()));
        self
    }

    pub fn place(mut self, resources: &[ResourceId]) -> Self {
        self.ops.push(RoutineOp::Place(Some(resources.to_vec())));
        self
    }

    pub fn place_all(mut self) -> Self {
        self.ops.push(RoutineOp::Place(None));
        self
    }

    pub fn apply(mut self, f: impl Fn(&mut Item) + 'static) -> Self {
        self.ops.push(RoutineOp::Apply(Rc::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Default for Routine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum ProcessorPhase {
    /// First step: enter the idle pool.
    Boot,
    /// Parked in the idle pool; resumed means an item was assigned.
    Idle,
    /// Execute the next routine op.
    RunOp,
    /// Awaiting `fulfilled` from each requestor of the current pick.
    AwaitFulfilled,
    /// Awaiting `released` from each requestor of the current place.
    AwaitReleased,
    /// Awaiting the processing buffer's transact after removing the item.
    AwaitRemoveTxn,
    /// Awaiting the complete buffer's transact after depositing the item.
    AwaitCompleteTxn,
}

/// A reusable execution slot: runs the activity's routine against one
/// assigned item at a time.
///
/// The assigned item stays in the `processing` buffer for the whole run (its
/// level is what bounds concurrency); the processor only takes ownership for
/// the final move into `complete`.
pub struct Processor {
    name: String,
    index: usize,
    activity: ActivityRef,
    processing: BufferRef,
    complete: BufferRef,
    routine: Rc<Routine>,
    slot: Rc<RefCell<Option<Uuid>>>,
    requestors: Vec<RequestorHandle>,
    carrying: Option<Item>,
    ip: usize,
    sub: usize,
    pick_start: usize,
    pick_len: usize,
    pending_release: Vec<usize>,
    phase: ProcessorPhase,
}

impl Processor {
    pub fn new(
        activity_name: &str,
        index: usize,
        activity: ActivityRef,
        processing: BufferRef,
        complete: BufferRef,
        routine: Rc<Routine>,
        slot: Rc<RefCell<Option<Uuid>>>,
    ) -> Self {
        Self {
            name: format!("{}_processor_{}", activity_name, index),
            index,
            activity,
            processing,
            complete,
            routine,
            slot,
            requestors: Vec::new(),
            carrying: None,
            ip: 0,
            sub: 0,
            pick_start: 0,
            pick_len: 0,
            pending_release: Vec::new(),
            phase: ProcessorPhase::Boot,
        }
    }

    fn assigned_id(&self) -> Result<Uuid, SimError> {
        self.slot
            .borrow()
            .ok_or_else(|| SimError::invariant(format!("{}: resumed with an empty slot", self.name)))
    }

    fn enter_idle_pool(&mut self, ctx: &mut Ctx) {
        let idle_count = {
            let mut act = self.activity.borrow_mut();
            act.processor_q.enter(self.index);
            act.idle_count
        };
        ctx.add(idle_count, 1);
    }

    /// Start releasing the selected requestors; returns their indices.
    fn begin_place(
        &mut self,
        ctx: &mut Ctx,
        selection: &Option<Vec<ResourceId>>,
    ) -> Result<Vec<usize>, SimError> {
        let targets = match selection {
            None => (0..self.requestors.len()).collect::<Vec<_>>(),
            Some(resources) => {
                let mut targets = Vec::with_capacity(resources.len());
                for resource in resources {
                    let idx = self
                        .requestors
                        .iter()
                        .enumerate()
                        .find(|(i, h)| h.resource == *resource && !targets.contains(i))
                        .map(|(i, _)| i)
                        .ok_or_else(|| {
                            SimError::invariant(format!(
                                "{}: place for resource {} with no outstanding requestor",
                                self.name, resource
                            ))
                        })?;
                    targets.push(idx);
                }
                targets
            }
        };

        for &idx in &targets {
            ctx.set_bool(self.requestors[idx].release_requested, true);
        }
        Ok(targets)
    }
}

impl Process for Processor {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        loop {
            match self.phase {
                ProcessorPhase::Boot => {
                    self.enter_idle_pool(ctx);
                    self.phase = ProcessorPhase::Idle;
                    return Ok(Step::Park);
                }

                ProcessorPhase::Idle => {
                    debug!("[{}] assigned item {}", self.name, self.assigned_id()?);
                    self.ip = 0;
                    self.phase = ProcessorPhase::RunOp;
                }

                ProcessorPhase::RunOp => {
                    if self.ip >= self.routine.ops.len() {
                        // Routine finished: move the item processing -> complete.
                        let id = self.assigned_id()?;
                        let txn_done = {
                            let mut buf = self.processing.borrow_mut();
                            let item = buf.take(id).ok_or_else(|| {
                                SimError::invariant(format!(
                                    "{}: item {} missing from processing buffer",
                                    self.name, id
                                ))
                            })?;
                            self.carrying = Some(item);
                            buf.request_transact(ctx);
                            buf.txn_done
                        };
                        self.phase = ProcessorPhase::AwaitRemoveTxn;
                        return Ok(Step::Wait(txn_done, Cond::Truthy));
                    }

                    let routine = self.routine.clone();
                    match &routine.ops[self.ip] {
                        RoutineOp::Hold(duration) => {
                            self.ip += 1;
                            return Ok(Step::Hold(*duration));
                        }

                        RoutineOp::HoldWith(f) => {
                            let id = self.assigned_id()?;
                            let duration = {
                                let buf = self.processing.borrow();
                                let item = buf.find(id).ok_or_else(|| {
                                    SimError::invariant(format!(
                                        "{}: item {} missing from processing buffer",
                                        self.name, id
                                    ))
                                })?;
                                f(item)
                            };
                            self.ip += 1;
                            return Ok(Step::Hold(duration));
                        }

                        RoutineOp::Apply(f) => {
                            let id = self.assigned_id()?;
                            let mut buf = self.processing.borrow_mut();
                            let item = buf.find_mut(id).ok_or_else(|| {
                                SimError::invariant(format!(
                                    "{}: item {} missing from processing buffer",
                                    self.name, id
                                ))
                            })?;
                            f(item);
                            drop(buf);
                            self.ip += 1;
                        }

                        RoutineOp::Pick(resources) => {
                            self.pick_start = self.requestors.len();
                            self.pick_len = resources.len();
                            // Issue every claim before awaiting any fulfillment.
                            for resource in resources {
                                let handle = RequestorHandle::new(ctx, &self.name, *resource);
                                ctx.spawn(Box::new(Requestor::new(&self.name, handle)));
                                self.requestors.push(handle);
                            }
                            debug!("[{}] picking {} resource(s)", self.name, self.pick_len);
                            self.sub = 0;
                            self.phase = ProcessorPhase::AwaitFulfilled;
                        }

                        RoutineOp::Place(selection) => {
                            let selection = selection.clone();
                            self.pending_release = self.begin_place(ctx, &selection)?;
                            debug!(
                                "[{}] placing {} resource(s)",
                                self.name,
                                self.pending_release.len()
                            );
                            self.sub = 0;
                            self.phase = ProcessorPhase::AwaitReleased;
                        }
                    }
                }

                ProcessorPhase::AwaitFulfilled => {
                    if self.sub < self.pick_len {
                        let handle = self.requestors[self.pick_start + self.sub];
                        self.sub += 1;
                        return Ok(Step::Wait(handle.fulfilled, Cond::IsTrue));
                    }
                    self.ip += 1;
                    self.phase = ProcessorPhase::RunOp;
                }

                ProcessorPhase::AwaitReleased => {
                    if self.sub < self.pending_release.len() {
                        let handle = self.requestors[self.pending_release[self.sub]];
                        self.sub += 1;
                        return Ok(Step::Wait(handle.released, Cond::IsTrue));
                    }
                    // Retire the released requestors, highest index first.
                    let mut indices = std::mem::take(&mut self.pending_release);
                    indices.sort_unstable_by(|a, b| b.cmp(a));
                    for idx in indices {
                        self.requestors.remove(idx);
                    }
                    self.ip += 1;
                    self.phase = ProcessorPhase::RunOp;
                }

                ProcessorPhase::AwaitRemoveTxn => {
                    let item = self.carrying.take().ok_or_else(|| {
                        SimError::invariant(format!("{}: lost the item in transit", self.name))
                    })?;
                    let txn_done = {
                        let mut buf = self.complete.borrow_mut();
                        buf.enqueue(item);
                        buf.request_transact(ctx);
                        buf.txn_done
                    };
                    self.phase = ProcessorPhase::AwaitCompleteTxn;
                    return Ok(Step::Wait(txn_done, Cond::Truthy));
                }

                ProcessorPhase::AwaitCompleteTxn => {
                    if !self.requestors.is_empty() {
                        warn!(
                            "[{}] finished with {} resource claim(s) still held",
                            self.name,
                            self.requestors.len()
                        );
                    }
                    *self.slot.borrow_mut() = None;
                    debug!("[{}] idle", self.name);
                    self.enter_idle_pool(ctx);
                    self.phase = ProcessorPhase::Idle;
                    return Ok(Step::Park);
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
