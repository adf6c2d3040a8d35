use crate::kernel::engine::Ctx;
use crate::kernel::signal::{SignalId, SignalValue};

/// Work-in-process and completion counters, kept as signals so processes
/// (the inventory-based generator in particular) can predicate-wait on them.
///
/// Not a process itself: the counts are updated by whoever moves entities
/// in or out of the system.
#[derive(Debug, Clone, Copy)]
pub struct TrackerHandle {
    pub wip_count: SignalId,
    pub complete_count: SignalId,
}

impl TrackerHandle {
    pub fn new(ctx: &mut Ctx, name: &str) -> Self {
        Self {
            wip_count: ctx.create_signal(format!("{}_wip_count", name), SignalValue::Int(0)),
            complete_count: ctx
                .create_signal(format!("{}_complete_count", name), SignalValue::Int(0)),
        }
    }

    /// An entity entered the system.
    pub fn entered(&self, ctx: &mut Ctx) {
        ctx.add(self.wip_count, 1);
    }

    /// `leaves` entities left the system as complete.
    pub fn completed(&self, ctx: &mut Ctx, leaves: i64) {
        ctx.add(self.wip_count, -leaves);
        ctx.add(self.complete_count, leaves);
    }

    pub fn wip(&self, ctx: &Ctx) -> i64 {
        ctx.int(self.wip_count)
    }

    pub fn complete(&self, ctx: &Ctx) -> i64 {
        ctx.int(self.complete_count)
    }
}
