use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::buffer::{BufferRef, Capacity};
use crate::core::entity::EntityState;
use crate::core::gate::BatchPolicy;
use crate::error::{ConfigError, SimError};
use crate::kernel::engine::Ctx;
use crate::kernel::process::{Pid, Process, Step};
use crate::kernel::queue::FifoQueue;
use crate::kernel::signal::{Cond, SignalId};

/// Handle to an activity registered with a simulation.
pub type ActivityId = usize;

/// Immutable configuration of one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Processor pool size: the bound on concurrent processing.
    pub process_cap: usize,
    pub in_buffer_cap: Capacity,
    pub out_buffer_cap: Capacity,
    pub in_policy: BatchPolicy,
    pub out_policy: BatchPolicy,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            process_cap: 1,
            in_buffer_cap: Capacity::Unbounded,
            out_buffer_cap: Capacity::Unbounded,
            in_policy: BatchPolicy::None,
            out_policy: BatchPolicy::None,
        }
    }
}

impl ActivityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.process_cap == 0 {
            return Err(ConfigError::new(
                self.process_cap,
                "process_cap",
                "an integer >= 1",
            ));
        }
        for (policy, field) in [(self.in_policy, "in_policy"), (self.out_policy, "out_policy")] {
            if let BatchPolicy::Batch(0) = policy {
                return Err(ConfigError::new(
                    policy,
                    field,
                    "none, batch(n) with n >= 1, or unbatch",
                ));
            }
        }
        if let Capacity::Finite(0) = self.in_buffer_cap {
            return Err(ConfigError::new(
                self.in_buffer_cap,
                "in_buffer_cap",
                "a capacity >= 1, or unbounded",
            ));
        }
        if let Capacity::Finite(0) = self.out_buffer_cap {
            return Err(ConfigError::new(
                self.out_buffer_cap,
                "out_buffer_cap",
                "a capacity >= 1, or unbounded",
            ));
        }
        Ok(())
    }
}

/// One member of an activity's processor pool.
pub struct ProcessorHandle {
    pub pid: Pid,
    /// The id of the item currently assigned, `None` while idle.
    pub slot: Rc<RefCell<Option<Uuid>>>,
}

/// Shared state of one pipeline stage: its five buffers, the queues and
/// signals of the assignment and completion handshakes, and the processor
/// pool.
pub struct ActivityShared {
    pub name: String,
    pub config: ActivityConfig,
    pub in_buf: BufferRef,
    pub to_process: BufferRef,
    pub processing: BufferRef,
    pub complete: BufferRef,
    pub out_buf: BufferRef,
    /// Indices of idle processors, FIFO.
    pub processor_q: FifoQueue<usize>,
    pub processors: Vec<ProcessorHandle>,
    /// Items moved by the process gate, awaiting a processor.
    pub processee_q: FifoQueue<Uuid>,
    /// Items announced done by the out gate, in announcement order.
    pub done_q: FifoQueue<Uuid>,
    /// Pulse: one ready item awaits assignment.
    pub assign: SignalId,
    /// Pulse: assignment acknowledged to the process gate.
    pub assigned: SignalId,
    /// Pulse: one item finished, its id at the head of `done_q`.
    pub done: SignalId,
    /// Pulse: the completion consumer took the announced item.
    pub done_ack: SignalId,
    /// Mirror of `processor_q` length, for the defensive arbitration wait.
    pub idle_count: SignalId,
}

pub type ActivityRef = Rc<RefCell<ActivityShared>>;

#[derive(Debug, Clone, Copy)]
enum ArbiterPhase {
    AwaitAssign,
    AwaitIdle,
}

/// The activity's arbitration loop: pairs each ready item with an idle
/// processor, one at a time.
///
/// The process gate never raises `assign` again before receiving
/// `assigned`, so at most one pairing is ever outstanding and ready items
/// meet processors strictly in arrival order.
pub struct Arbiter {
    name: String,
    activity: ActivityRef,
    phase: ArbiterPhase,
}

impl Arbiter {
    pub fn new(activity: ActivityRef) -> Self {
        let name = format!("{}_arbiter", activity.borrow().name);
        Self {
            name,
            activity,
            phase: ArbiterPhase::AwaitAssign,
        }
    }

    fn assign_next(&mut self, ctx: &mut Ctx) -> Result<(), SimError> {
        let (index, item_id, assigned, idle_count) = {
            let mut act = self.activity.borrow_mut();
            let index = act.processor_q.pop().ok_or_else(|| {
                SimError::invariant(format!("{}: no idle processor after idle wait", self.name))
            })?;
            let item_id = act.processee_q.pop().ok_or_else(|| {
                SimError::invariant(format!(
                    "{}: assignment signaled with no ready item",
                    self.name
                ))
            })?;
            (index, item_id, act.assigned, act.idle_count)
        };

        let (pid, processing) = {
            let act = self.activity.borrow();
            *act.processors[index].slot.borrow_mut() = Some(item_id);
            (act.processors[index].pid, act.processing.clone())
        };
        if let Some(item) = processing.borrow_mut().find_mut(item_id) {
            item.set_state(EntityState::Processing);
        }

        ctx.add(idle_count, -1);
        debug!("[{}] item {} -> processor {}", self.name, item_id, index);
        ctx.resume(pid);
        ctx.trigger_max(assigned, 1);
        Ok(())
    }
}

impl Process for Arbiter {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        loop {
            match self.phase {
                ArbiterPhase::AwaitAssign => {
                    let (assign, idle_count, pool_empty) = {
                        let act = self.activity.borrow();
                        (act.assign, act.idle_count, act.processor_q.is_empty())
                    };
                    // An assign pulse has been consumed when we get here with
                    // a pending ready item; otherwise this is the initial
                    // entry and we just start waiting.
                    if self.activity.borrow().processee_q.is_empty() {
                        return Ok(Step::Wait(assign, Cond::Truthy));
                    }
                    if pool_empty {
                        // A processor can still be mid-handshake on its way
                        // back to the pool when the gate fires.
                        debug!("[{}] pool momentarily empty, waiting", self.name);
                        self.phase = ArbiterPhase::AwaitIdle;
                        return Ok(Step::Wait(idle_count, Cond::Positive));
                    }
                    self.assign_next(ctx)?;
                }

                ArbiterPhase::AwaitIdle => {
                    self.assign_next(ctx)?;
                    self.phase = ArbiterPhase::AwaitAssign;
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
