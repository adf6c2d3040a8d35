use log::debug;

use crate::error::SimError;
use crate::kernel::engine::Ctx;
use crate::kernel::process::{Process, Step};
use crate::kernel::resource::ResourceId;
use crate::kernel::signal::{Cond, SignalId, SignalValue};

/// A processor's view of one outstanding resource request.
///
/// The three signals are latched booleans and fire strictly in order:
/// `fulfilled` → `release_requested` → `released`.
#[derive(Debug, Clone, Copy)]
pub struct RequestorHandle {
    pub resource: ResourceId,
    pub fulfilled: SignalId,
    pub release_requested: SignalId,
    pub released: SignalId,
}

impl RequestorHandle {
    pub fn new(ctx: &mut Ctx, owner: &str, resource: ResourceId) -> Self {
        let base = format!("{}_requestor", owner);
        Self {
            resource,
            fulfilled: ctx.create_signal(format!("{}_fulfilled", base), SignalValue::Bool(false)),
            release_requested: ctx
                .create_signal(format!("{}_release_requested", base), SignalValue::Bool(false)),
            released: ctx.create_signal(format!("{}_released", base), SignalValue::Bool(false)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RequestorPhase {
    Claim,
    Granted,
    AwaitReleaseRequest,
}

/// Proxy process for one resource claim.
///
/// Issuing each claim from its own process is what lets a processor hold an
/// arbitrary set of resources without imposing an acquisition order: every
/// claim queues with the resource's own fair arbitration, and the processor
/// only proceeds once all of them have latched `fulfilled`.
pub struct Requestor {
    name: String,
    handle: RequestorHandle,
    phase: RequestorPhase,
}

impl Requestor {
    pub fn new(owner: &str, handle: RequestorHandle) -> Self {
        Self {
            name: format!("{}_requestor", owner),
            handle,
            phase: RequestorPhase::Claim,
        }
    }
}

impl Process for Requestor {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        loop {
            match self.phase {
                RequestorPhase::Claim => {
                    self.phase = RequestorPhase::Granted;
                    if !ctx.claim(self.handle.resource) {
                        // Queued; the resource resumes us on grant.
                        return Ok(Step::Park);
                    }
                }

                RequestorPhase::Granted => {
                    debug!("[{}] fulfilled", self.name);
                    ctx.set_bool(self.handle.fulfilled, true);
                    self.phase = RequestorPhase::AwaitReleaseRequest;
                    return Ok(Step::Wait(self.handle.release_requested, Cond::IsTrue));
                }

                RequestorPhase::AwaitReleaseRequest => {
                    ctx.release(self.handle.resource);
                    ctx.set_bool(self.handle.released, true);
                    debug!("[{}] released", self.name);
                    return Ok(Step::Done);
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
