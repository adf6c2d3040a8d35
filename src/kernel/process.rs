use crate::error::SimError;
use crate::kernel::engine::Ctx;
use crate::kernel::signal::{Cond, SignalId};

/// Simulated time, in whole ticks.
pub type SimTime = u64;

/// Identifier of a process registered with the engine.
pub type Pid = usize;

/// What a process does next after a step.
///
/// A step runs to its next suspension point and describes that point in the
/// returned value; the engine performs the bookkeeping. `Wait` is evaluated
/// against the signal's current value before suspending, so a condition that
/// already holds never blocks.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Suspend until the signal satisfies the condition.
    Wait(SignalId, Cond),
    /// Suspend for a duration of simulated time.
    Hold(SimTime),
    /// Suspend until explicitly resumed by another process.
    Park,
    /// The process is finished and is removed from the engine.
    Done,
}

/// A cooperative process: a state machine advanced by the engine's run loop.
///
/// `step` is called whenever the process is runnable and must leave the
/// process in a state from which the next call can continue. All shared
/// mutable state is visible only between steps; within one step no other
/// process runs.
pub trait Process {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError>;

    /// Name used in logs and invariant messages.
    fn name(&self) -> &str;
}

/// Lifecycle of a process as tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Ready,
    Running,
    Waiting,
    Holding,
    Parked,
    Done,
}
