use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::entity::Item;
use crate::error::SimError;
use crate::kernel::engine::Ctx;
use crate::kernel::process::{Process, Step};
use crate::kernel::queue::FifoQueue;
use crate::kernel::signal::{Cond, SignalId, SignalValue};
use uuid::Uuid;

/// Capacity bound of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capacity {
    Finite(usize),
    Unbounded,
}

impl Capacity {
    fn is_full_at(&self, level: usize) -> bool {
        match self {
            Capacity::Finite(cap) => level >= *cap,
            Capacity::Unbounded => false,
        }
    }
}

impl std::fmt::Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capacity::Finite(cap) => write!(f, "{}", cap),
            Capacity::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// The five buffer positions inside an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    In,
    ToProcess,
    Processing,
    Complete,
    Out,
}

impl BufferRole {
    fn label(&self) -> &'static str {
        match self {
            BufferRole::In => "in",
            BufferRole::ToProcess => "to_process",
            BufferRole::Processing => "processing",
            BufferRole::Complete => "complete",
            BufferRole::Out => "out",
        }
    }
}

/// A capacity-bounded holding area with level and fullness tracking.
///
/// `level` and `is_full` are cached and recomputed only by the buffer's own
/// process, through the transact protocol: a mutator edits the queue, bumps
/// `txn`, and waits on `txn_done`; the buffer process performs exactly one
/// recomputation and one `txn_done` wake-up per pending bump. `txn` is a
/// counter rather than a pulse so two mutators transacting back-to-back each
/// still get their own recompute and wake-up, in FIFO order.
pub struct Buffer {
    name: String,
    role: BufferRole,
    cap: Capacity,
    q: FifoQueue<Item>,
    lvl: usize,
    full: bool,
    /// Mirror of `lvl` for predicate waits.
    pub lvl_sig: SignalId,
    /// Mirror of `full` for predicate waits.
    pub full_sig: SignalId,
    /// Pending-transaction counter.
    pub txn: SignalId,
    /// Pulse: one transaction's recompute is visible.
    pub txn_done: SignalId,
}

pub type BufferRef = Rc<RefCell<Buffer>>;

impl Buffer {
    pub fn new(ctx: &mut Ctx, activity: &str, role: BufferRole, cap: Capacity) -> BufferRef {
        let name = format!("{}_{}_buffer", activity, role.label());
        let lvl_sig = ctx.create_signal(format!("{}_lvl", name), SignalValue::Int(0));
        let full_sig = ctx.create_signal(format!("{}_is_full", name), SignalValue::Bool(false));
        let txn = ctx.create_signal(format!("{}_txn", name), SignalValue::Int(0));
        let txn_done = ctx.create_signal(format!("{}_txn_done", name), SignalValue::Bool(false));

        Rc::new(RefCell::new(Self {
            name,
            role,
            cap,
            q: FifoQueue::new(),
            lvl: 0,
            full: cap.is_full_at(0),
            lvl_sig,
            full_sig,
            txn,
            txn_done,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }

    pub fn capacity(&self) -> Capacity {
        self.cap
    }

    pub fn enqueue(&mut self, item: Item) {
        self.q.enter(item);
    }

    pub fn dequeue(&mut self) -> Option<Item> {
        self.q.pop()
    }

    /// Remove a specific member out of turn.
    pub fn take(&mut self, id: Uuid) -> Option<Item> {
        self.q.leave_where(|item| item.id() == id)
    }

    pub fn find(&self, id: Uuid) -> Option<&Item> {
        self.q.find(|item| item.id() == id)
    }

    pub fn find_mut(&mut self, id: Uuid) -> Option<&mut Item> {
        self.q.find_mut(|item| item.id() == id)
    }

    /// Announce a queue mutation. The caller must then wait on `txn_done`
    /// before relying on `level`/`is_full`; external callers that cannot
    /// suspend may skip the wait, the recompute still happens before any
    /// gate observes the buffer.
    pub fn request_transact(&self, ctx: &mut Ctx) {
        ctx.add(self.txn, 1);
    }

    /// Cached queue length. The single source of truth for backpressure.
    pub fn level(&self) -> usize {
        self.lvl
    }

    /// Cached fullness flag; `is_full == (level >= cap)` at every
    /// observation point outside an in-flight transact.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Total leaf entities across all slots, for observability. A batch
    /// occupies one slot but may expand to many entities.
    pub fn expanded_count(&self) -> usize {
        self.q.iter().map(Item::leaf_count).sum()
    }

    fn recompute(&mut self, ctx: &mut Ctx) {
        self.lvl = self.q.len();
        self.full = self.cap.is_full_at(self.lvl);
        ctx.set_int(self.lvl_sig, self.lvl as i64);
        ctx.set_bool(self.full_sig, self.full);
        debug!(
            "[{}] level={} full={}",
            self.name, self.lvl, self.full
        );
    }
}

/// The buffer's own process: serves transact requests one at a time.
pub struct BufferProc {
    buf: BufferRef,
    name: String,
}

impl BufferProc {
    pub fn new(buf: BufferRef) -> Self {
        let name = buf.borrow().name.clone();
        Self { buf, name }
    }
}

impl Process for BufferProc {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        let (txn, txn_done) = {
            let buf = self.buf.borrow();
            (buf.txn, buf.txn_done)
        };

        while ctx.int(txn) > 0 {
            self.buf.borrow_mut().recompute(ctx);
            ctx.add(txn, -1);
            ctx.trigger_max(txn_done, 1);
        }
        Ok(Step::Wait(txn, Cond::Positive))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
