use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info};

use crate::core::activity::{ActivityId, ActivityRef};
use crate::core::buffer::BufferRef;
use crate::core::entity::{EntityState, Item};
use crate::error::SimError;
use crate::flow::tracker::TrackerHandle;
use crate::kernel::engine::Ctx;
use crate::kernel::process::{Process, SimTime, Step};
use crate::kernel::signal::Cond;

/// Where an activity's finished items go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Forward into another activity's in buffer.
    Activity(ActivityId),
    /// Retire into the simulation's completed store.
    Sink,
}

/// Terminal store for retired items.
pub struct SinkStore {
    items: Vec<(SimTime, Item)>,
}

impl SinkStore {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[(SimTime, Item)] {
        &self.items
    }

    pub fn take(&mut self) -> Vec<(SimTime, Item)> {
        std::mem::take(&mut self.items)
    }
}

impl Default for SinkStore {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) enum Delivery {
    Forward(ActivityRef),
    Retire,
}

#[derive(Debug, Clone, Copy)]
enum RouterPhase {
    /// Wait for the out gate to announce a finished item.
    AwaitDone,
    /// Out-buffer removal transact acknowledged.
    AwaitOutTxn,
    /// Hand the item to its destination.
    Deliver,
    /// Forward delivery transact acknowledged.
    AwaitInTxn,
}

/// Per-activity consumer of the out gate's completion notifications.
///
/// Handles exactly one item per `done` pulse, in announcement order, and
/// only acknowledges once the routing action finished, so the out gate
/// cannot outrun downstream delivery.
pub struct Router {
    name: String,
    activity: ActivityRef,
    out_buf: BufferRef,
    delivery: Delivery,
    sink: Rc<RefCell<SinkStore>>,
    tracker: TrackerHandle,
    carrying: Option<Item>,
    phase: RouterPhase,
}

impl Router {
    pub(crate) fn new(
        activity: ActivityRef,
        delivery: Delivery,
        sink: Rc<RefCell<SinkStore>>,
        tracker: TrackerHandle,
    ) -> Self {
        let (name, out_buf) = {
            let act = activity.borrow();
            (format!("{}_router", act.name), act.out_buf.clone())
        };
        Self {
            name,
            activity,
            out_buf,
            delivery,
            sink,
            tracker,
            carrying: None,
            phase: RouterPhase::AwaitDone,
        }
    }

    fn ack(&self, ctx: &mut Ctx) {
        let done_ack = self.activity.borrow().done_ack;
        ctx.trigger_max(done_ack, 1);
    }
}

impl Process for Router {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        loop {
            match self.phase {
                RouterPhase::AwaitDone => {
                    let (popped, done) = {
                        let mut act = self.activity.borrow_mut();
                        (act.done_q.pop(), act.done)
                    };
                    let item_id = match popped {
                        None => return Ok(Step::Wait(done, Cond::Truthy)),
                        Some(id) => id,
                    };

                    let txn_done = {
                        let mut out = self.out_buf.borrow_mut();
                        let item = out.take(item_id).ok_or_else(|| {
                            SimError::invariant(format!(
                                "{}: announced item {} missing from out buffer",
                                self.name, item_id
                            ))
                        })?;
                        self.carrying = Some(item);
                        out.request_transact(ctx);
                        out.txn_done
                    };
                    self.phase = RouterPhase::AwaitOutTxn;
                    return Ok(Step::Wait(txn_done, Cond::Truthy));
                }

                RouterPhase::AwaitOutTxn => {
                    self.phase = RouterPhase::Deliver;
                }

                RouterPhase::Deliver => match &self.delivery {
                    Delivery::Retire => {
                        let mut item = self.carrying.take().ok_or_else(|| {
                            SimError::invariant(format!("{}: lost the item in transit", self.name))
                        })?;
                        item.set_state(EntityState::Complete);
                        self.tracker.completed(ctx, item.leaf_count() as i64);
                        info!("[{}] retired item {} at t={}", self.name, item.id(), ctx.now());
                        self.sink.borrow_mut().items.push((ctx.now(), item));
                        self.ack(ctx);
                        self.phase = RouterPhase::AwaitDone;
                    }
                    Delivery::Forward(next) => {
                        let in_buf = next.borrow().in_buf.clone();
                        let (full, full_sig) = {
                            let buf = in_buf.borrow();
                            (buf.is_full(), buf.full_sig)
                        };
                        if full {
                            return Ok(Step::Wait(full_sig, Cond::IsFalse));
                        }

                        let mut item = self.carrying.take().ok_or_else(|| {
                            SimError::invariant(format!("{}: lost the item in transit", self.name))
                        })?;
                        item.set_state(EntityState::InPipeline);
                        debug!(
                            "[{}] forwarded item {} to {}",
                            self.name,
                            item.id(),
                            next.borrow().name
                        );
                        let txn_done = {
                            let mut buf = in_buf.borrow_mut();
                            buf.enqueue(item);
                            buf.request_transact(ctx);
                            buf.txn_done
                        };
                        self.phase = RouterPhase::AwaitInTxn;
                        return Ok(Step::Wait(txn_done, Cond::Truthy));
                    }
                },

                RouterPhase::AwaitInTxn => {
                    self.ack(ctx);
                    self.phase = RouterPhase::AwaitDone;
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
