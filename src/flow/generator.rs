use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::activity::ActivityRef;
use crate::core::entity::{Entity, Item};
use crate::error::{ConfigError, SimError};
use crate::flow::tracker::TrackerHandle;
use crate::kernel::engine::Ctx;
use crate::kernel::process::{Process, SimTime, Step};
use crate::kernel::signal::{Cond, SignalId, SignalValue};

/// How a generator decides when entities enter the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrivalPattern {
    /// One entity per tick, as fast as the in buffer accepts them.
    Continuous,
    /// One entity every `interval` ticks.
    Periodic { interval: SimTime },
    /// Entities are made when ordered through `send_order`.
    Ordered,
    /// Keep work-in-process topped up to `level`.
    InventoryBased { level: i64 },
}

impl ArrivalPattern {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ArrivalPattern::Periodic { interval: 0 } => Err(ConfigError::new(
                0,
                "interval",
                "a duration >= 1 tick",
            )),
            ArrivalPattern::InventoryBased { level } if *level <= 0 => Err(ConfigError::new(
                *level,
                "level",
                "an inventory level >= 1",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GeneratorPhase {
    Start,
    /// Decide how many entities the pattern wants next.
    Decide,
    /// Wait for in-buffer space, then submit one entity.
    AwaitSpace,
    /// Submission transact acknowledged.
    AwaitEnqueueTxn,
}

/// Feeds entities into an activity according to an arrival pattern.
///
/// Every submission respects the target in buffer's fullness: the generator
/// is backpressured like any other producer.
pub struct EntityGenerator {
    name: String,
    pattern: ArrivalPattern,
    target: ActivityRef,
    tracker: TrackerHandle,
    /// Orders placed through `send_order`; only read for `Ordered`.
    pub ordered_qty: SignalId,
    start_at: SimTime,
    remaining: u64,
    made: u64,
    phase: GeneratorPhase,
}

impl EntityGenerator {
    pub fn new(
        ctx: &mut Ctx,
        name: impl Into<String>,
        pattern: ArrivalPattern,
        target: ActivityRef,
        tracker: TrackerHandle,
        start_at: SimTime,
    ) -> Result<Self, ConfigError> {
        pattern.validate()?;
        let name = name.into();
        let ordered_qty =
            ctx.create_signal(format!("{}_ordered_qty", name), SignalValue::Int(0));
        Ok(Self {
            name,
            pattern,
            target,
            tracker,
            ordered_qty,
            start_at,
            remaining: 0,
            made: 0,
            phase: GeneratorPhase::Start,
        })
    }

    fn submit_one(&mut self, ctx: &mut Ctx) -> usize {
        self.made += 1;
        let entity = Entity::new().with_step(format!("{}_{}", self.name, self.made));
        debug!("[{}] made entity {} ({})", self.name, entity.id, self.made);
        self.tracker.entered(ctx);

        let in_buf = self.target.borrow().in_buf.clone();
        let mut buf = in_buf.borrow_mut();
        buf.enqueue(Item::Entity(entity));
        buf.request_transact(ctx);
        buf.txn_done
    }
}

impl Process for EntityGenerator {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        loop {
            match self.phase {
                GeneratorPhase::Start => {
                    self.phase = GeneratorPhase::Decide;
                    if self.start_at > 0 {
                        return Ok(Step::Hold(self.start_at));
                    }
                }

                GeneratorPhase::Decide => match self.pattern {
                    ArrivalPattern::Continuous | ArrivalPattern::Periodic { .. } => {
                        self.remaining = 1;
                        self.phase = GeneratorPhase::AwaitSpace;
                    }
                    ArrivalPattern::Ordered => {
                        let qty = ctx.int(self.ordered_qty);
                        if qty <= 0 {
                            return Ok(Step::Wait(self.ordered_qty, Cond::Positive));
                        }
                        info!("[{}] fulfilling order of {}", self.name, qty);
                        ctx.set_int(self.ordered_qty, 0);
                        self.remaining = qty as u64;
                        self.phase = GeneratorPhase::AwaitSpace;
                    }
                    ArrivalPattern::InventoryBased { level } => {
                        let wip = self.tracker.wip(ctx);
                        if wip >= level {
                            return Ok(Step::Wait(self.tracker.wip_count, Cond::LessThan(level)));
                        }
                        self.remaining = (level - wip) as u64;
                        self.phase = GeneratorPhase::AwaitSpace;
                    }
                },

                GeneratorPhase::AwaitSpace => {
                    let in_buf = self.target.borrow().in_buf.clone();
                    let (full, full_sig) = {
                        let buf = in_buf.borrow();
                        (buf.is_full(), buf.full_sig)
                    };
                    if full {
                        return Ok(Step::Wait(full_sig, Cond::IsFalse));
                    }
                    let txn_done = self.submit_one(ctx);
                    self.phase = GeneratorPhase::AwaitEnqueueTxn;
                    return Ok(Step::Wait(txn_done, Cond::Truthy));
                }

                GeneratorPhase::AwaitEnqueueTxn => {
                    self.remaining -= 1;
                    if self.remaining > 0 {
                        self.phase = GeneratorPhase::AwaitSpace;
                        continue;
                    }
                    self.phase = GeneratorPhase::Decide;
                    match self.pattern {
                        ArrivalPattern::Continuous => return Ok(Step::Hold(1)),
                        ArrivalPattern::Periodic { interval } => return Ok(Step::Hold(interval)),
                        ArrivalPattern::Ordered | ArrivalPattern::InventoryBased { .. } => {}
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
