use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::activity::ActivityRef;
use crate::core::buffer::BufferRef;
use crate::core::entity::{Batch, EntityState, Item};
use crate::error::SimError;
use crate::kernel::engine::Ctx;
use crate::kernel::process::{Process, Step};
use crate::kernel::signal::Cond;

/// How a gate transforms the items it moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchPolicy {
    /// Move single items unchanged.
    None,
    /// Collect this many items and wrap them into one batch.
    Batch(usize),
    /// Replace one batch with its contents.
    Unbatch,
}

impl std::fmt::Display for BatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchPolicy::None => write!(f, "none"),
            BatchPolicy::Batch(n) => write!(f, "batch({})", n),
            BatchPolicy::Unbatch => write!(f, "unbatch"),
        }
    }
}

/// The three gate positions inside an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRole {
    In,
    Process,
    Out,
}

impl GateRole {
    fn label(&self) -> &'static str {
        match self {
            GateRole::In => "in",
            GateRole::Process => "process",
            GateRole::Out => "out",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GatePhase {
    /// Check egress fullness before starting a transfer.
    CheckEgress,
    /// Woken from the egress not-full wait.
    SpaceReady,
    /// Wait for enough ingress items, then pull them.
    AwaitIngress,
    /// Pull transact acknowledged; transform and put.
    Transform,
    /// Put transact acknowledged; run the role follow-up.
    Delivered,
    /// Process role: wait for the processor-assignment acknowledgment.
    AwaitAssigned,
    /// Out role: announce the next moved item.
    Announce,
    /// Out role: announcement acknowledged.
    Acked,
}

/// Transfer protocol between two buffers.
///
/// A gate moves items from its ingress to its egress, applying its batching
/// policy, and never holds items across a suspension except mid-transfer:
/// observers see either zero or all items moved. One transfer runs to
/// completion, through all role follow-ups, before the next begins.
pub struct Gate {
    name: String,
    role: GateRole,
    policy: BatchPolicy,
    ingress: BufferRef,
    egress: BufferRef,
    activity: ActivityRef,
    on_move: Vec<Item>,
    moved_ids: Vec<Uuid>,
    announce_idx: usize,
    phase: GatePhase,
}

impl Gate {
    pub fn new(
        activity_name: &str,
        role: GateRole,
        policy: BatchPolicy,
        ingress: BufferRef,
        egress: BufferRef,
        activity: ActivityRef,
    ) -> Self {
        Self {
            name: format!("{}_{}_gate", activity_name, role.label()),
            role,
            policy,
            ingress,
            egress,
            activity,
            on_move: Vec::new(),
            moved_ids: Vec::new(),
            announce_idx: 0,
            phase: GatePhase::CheckEgress,
        }
    }

    fn pull_amount(&self) -> usize {
        match self.policy {
            BatchPolicy::Batch(n) => n,
            BatchPolicy::None | BatchPolicy::Unbatch => 1,
        }
    }

    fn pull_cond(&self) -> Cond {
        match self.policy {
            BatchPolicy::Batch(n) => Cond::AtLeast(n as i64),
            BatchPolicy::None | BatchPolicy::Unbatch => Cond::Positive,
        }
    }

    fn apply_policy(&mut self) -> Result<(), SimError> {
        match self.policy {
            BatchPolicy::None => {}
            BatchPolicy::Batch(_) => {
                let members = std::mem::take(&mut self.on_move);
                debug!("[{}] batched {} item(s)", self.name, members.len());
                self.on_move.push(Item::Batch(Batch::new(members)));
            }
            BatchPolicy::Unbatch => {
                let item = self.on_move.pop().ok_or_else(|| {
                    SimError::invariant(format!("{}: unbatch with empty working set", self.name))
                })?;
                match item {
                    Item::Batch(batch) => {
                        self.on_move = batch.into_contents();
                        debug!("[{}] unbatched into {} item(s)", self.name, self.on_move.len());
                    }
                    Item::Entity(e) => {
                        return Err(SimError::invariant(format!(
                            "{}: unbatch pulled a bare entity {}",
                            self.name, e.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Process for Gate {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        loop {
            match self.phase {
                GatePhase::CheckEgress => {
                    let (full, full_sig) = {
                        let eg = self.egress.borrow();
                        (eg.is_full(), eg.full_sig)
                    };
                    if full {
                        self.phase = GatePhase::SpaceReady;
                        return Ok(Step::Wait(full_sig, Cond::IsFalse));
                    }
                    self.phase = GatePhase::AwaitIngress;
                }

                GatePhase::SpaceReady => {
                    self.phase = GatePhase::AwaitIngress;
                }

                GatePhase::AwaitIngress => {
                    let need = self.pull_amount();
                    let (level, lvl_sig, txn_done) = {
                        let ing = self.ingress.borrow();
                        (ing.level(), ing.lvl_sig, ing.txn_done)
                    };
                    if level < need {
                        return Ok(Step::Wait(lvl_sig, self.pull_cond()));
                    }

                    {
                        let mut ing = self.ingress.borrow_mut();
                        for _ in 0..need {
                            let item = ing.dequeue().ok_or_else(|| {
                                SimError::invariant(format!(
                                    "{}: ingress level said {} but queue ran dry",
                                    self.name, level
                                ))
                            })?;
                            self.on_move.push(item);
                        }
                        ing.request_transact(ctx);
                    }
                    debug!("[{}] pulled {} item(s)", self.name, need);
                    self.phase = GatePhase::Transform;
                    return Ok(Step::Wait(txn_done, Cond::Truthy));
                }

                GatePhase::Transform => {
                    self.apply_policy()?;

                    self.moved_ids.clear();
                    let txn_done = {
                        let mut eg = self.egress.borrow_mut();
                        for mut item in self.on_move.drain(..) {
                            if self.role == GateRole::In {
                                item.set_state(EntityState::Waiting);
                            }
                            self.moved_ids.push(item.id());
                            eg.enqueue(item);
                        }
                        eg.request_transact(ctx);
                        eg.txn_done
                    };
                    debug!("[{}] put {} item(s)", self.name, self.moved_ids.len());
                    self.phase = GatePhase::Delivered;
                    return Ok(Step::Wait(txn_done, Cond::Truthy));
                }

                GatePhase::Delivered => match self.role {
                    GateRole::In => {
                        self.moved_ids.clear();
                        self.phase = GatePhase::CheckEgress;
                    }
                    GateRole::Process => {
                        if self.moved_ids.len() != 1 {
                            return Err(SimError::invariant(format!(
                                "{}: moved {} items into processing, expected 1",
                                self.name,
                                self.moved_ids.len()
                            )));
                        }
                        let id = self.moved_ids[0];
                        let (assign, assigned) = {
                            let mut act = self.activity.borrow_mut();
                            act.processee_q.enter(id);
                            (act.assign, act.assigned)
                        };
                        ctx.trigger_max(assign, 1);
                        self.phase = GatePhase::AwaitAssigned;
                        return Ok(Step::Wait(assigned, Cond::Truthy));
                    }
                    GateRole::Out => {
                        self.announce_idx = 0;
                        self.phase = GatePhase::Announce;
                    }
                },

                GatePhase::AwaitAssigned => {
                    self.moved_ids.clear();
                    self.phase = GatePhase::CheckEgress;
                }

                GatePhase::Announce => {
                    if self.announce_idx >= self.moved_ids.len() {
                        self.moved_ids.clear();
                        self.phase = GatePhase::CheckEgress;
                        continue;
                    }
                    let id = self.moved_ids[self.announce_idx];
                    let (done, done_ack) = {
                        let mut act = self.activity.borrow_mut();
                        act.done_q.enter(id);
                        (act.done, act.done_ack)
                    };
                    ctx.trigger_max(done, 1);
                    self.phase = GatePhase::Acked;
                    return Ok(Step::Wait(done_ack, Cond::Truthy));
                }

                GatePhase::Acked => {
                    self.announce_idx += 1;
                    self.phase = GatePhase::Announce;
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
