use std::collections::HashMap;
use std::collections::VecDeque;

use log::debug;

use crate::error::SimError;
use crate::kernel::process::{Pid, ProcState, Process, SimTime, Step};
use crate::kernel::resource::{ResourceId, ResourceTable};
use crate::kernel::scheduler::TimerQueue;
use crate::kernel::signal::{Cond, SignalId, SignalTable, SignalValue};

/// Kernel services visible to a process during a step: the clock, the signal
/// table, timers, the ready queue, resources, and mid-step process spawning.
pub struct Ctx {
    now: SimTime,
    current: Pid,
    signals: SignalTable,
    resources: ResourceTable,
    timers: TimerQueue,
    ready: VecDeque<Pid>,
    status: HashMap<Pid, ProcState>,
    spawned: Vec<(Pid, Box<dyn Process>)>,
    next_pid: Pid,
}

impl Ctx {
    fn new() -> Self {
        Self {
            now: 0,
            current: 0,
            signals: SignalTable::new(),
            resources: ResourceTable::new(),
            timers: TimerQueue::new(),
            ready: VecDeque::new(),
            status: HashMap::new(),
            spawned: Vec::new(),
            next_pid: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    // --- signals ---

    pub fn create_signal(&mut self, name: impl Into<String>, initial: SignalValue) -> SignalId {
        self.signals.create(name, initial)
    }

    pub fn value(&self, id: SignalId) -> SignalValue {
        self.signals.value(id)
    }

    pub fn int(&self, id: SignalId) -> i64 {
        self.signals.value(id).as_int()
    }

    pub fn is_true(&self, id: SignalId) -> bool {
        self.signals.value(id).as_bool()
    }

    pub fn set(&mut self, id: SignalId, value: SignalValue) {
        let woken = self.signals.set(id, value);
        self.wake_waiting(woken);
    }

    pub fn set_int(&mut self, id: SignalId, value: i64) {
        self.set(id, SignalValue::Int(value));
    }

    pub fn set_bool(&mut self, id: SignalId, value: bool) {
        self.set(id, SignalValue::Bool(value));
    }

    pub fn add(&mut self, id: SignalId, delta: i64) {
        let woken = self.signals.add(id, delta);
        self.wake_waiting(woken);
    }

    pub fn trigger_max(&mut self, id: SignalId, max: usize) {
        let woken = self.signals.trigger_max(id, max);
        self.wake_waiting(woken);
    }

    // --- processes ---

    /// Register a process mid-step. It becomes runnable immediately and is
    /// installed in the process table when the current step returns.
    pub fn spawn(&mut self, process: Box<dyn Process>) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        self.status.insert(pid, ProcState::Ready);
        self.ready.push_back(pid);
        self.spawned.push((pid, process));
        pid
    }

    /// Resume a parked process. Resuming anything else is a no-op; a process
    /// waiting on a signal is woken through that signal, never directly.
    pub fn resume(&mut self, pid: Pid) {
        if self.status.get(&pid) == Some(&ProcState::Parked) {
            self.make_ready(pid);
        }
    }

    // --- resources ---

    pub fn add_resource(&mut self, name: impl Into<String>, capacity: usize) -> ResourceId {
        self.resources.create(name, capacity)
    }

    /// Claim one unit of a resource for the currently running process.
    /// Returns true when granted immediately; otherwise the process should
    /// park and will be resumed when the grant arrives.
    pub fn claim(&mut self, id: ResourceId) -> bool {
        self.resources.claim(id, self.current)
    }

    pub fn release(&mut self, id: ResourceId) {
        let granted = self.resources.release(id);
        self.wake_parked(granted);
    }

    pub fn set_capacity(&mut self, id: ResourceId, capacity: usize) {
        let granted = self.resources.set_capacity(id, capacity);
        self.wake_parked(granted);
    }

    pub fn resource_capacity(&self, id: ResourceId) -> usize {
        self.resources.capacity(id)
    }

    pub fn resource_claimed(&self, id: ResourceId) -> usize {
        self.resources.claimed(id)
    }

    pub fn resource_queued(&self, id: ResourceId) -> usize {
        self.resources.queued(id)
    }

    // --- internals ---

    fn wake_waiting(&mut self, pids: Vec<Pid>) {
        for pid in pids {
            if self.status.get(&pid) == Some(&ProcState::Waiting) {
                self.make_ready(pid);
            }
        }
    }

    fn wake_parked(&mut self, pids: Vec<Pid>) {
        for pid in pids {
            if self.status.get(&pid) == Some(&ProcState::Parked) {
                self.make_ready(pid);
            }
        }
    }

    fn make_ready(&mut self, pid: Pid) {
        self.status.insert(pid, ProcState::Ready);
        self.ready.push_back(pid);
    }
}

/// The cooperative engine: a single logical thread of control driving every
/// process as a state machine.
///
/// The run loop drains the ready queue to quiescence, then advances the
/// clock to the earliest due timer and wakes it, until nothing is left to do
/// or the caller's horizon is reached. Dispatch order is deterministic: the
/// ready queue is FIFO, timers tie-break by schedule sequence, and signal
/// waiters wake in wait order.
pub struct Engine {
    processes: HashMap<Pid, Box<dyn Process>>,
    pub ctx: Ctx,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            processes: HashMap::new(),
            ctx: Ctx::new(),
        }
    }

    /// Register a process before the run starts.
    pub fn spawn(&mut self, process: Box<dyn Process>) -> Pid {
        let pid = self.ctx.spawn(process);
        self.install_spawned();
        pid
    }

    /// Run until quiescence, or until the clock would pass `until`.
    /// Returns the simulated time at which the run stopped.
    pub fn run(&mut self, until: Option<SimTime>) -> Result<SimTime, SimError> {
        loop {
            self.drain_ready()?;

            match self.ctx.timers.peek_due() {
                Some(due) if until.map_or(true, |u| due <= u) => {
                    debug!("=== t={} ===", due);
                    self.ctx.now = due;
                    let woken = self.ctx.timers.pop_due(due);
                    for pid in woken {
                        if self.ctx.status.get(&pid) == Some(&ProcState::Holding) {
                            self.ctx.make_ready(pid);
                        }
                    }
                }
                _ => break,
            }
        }

        if let Some(u) = until {
            if u > self.ctx.now {
                self.ctx.now = u;
            }
        }
        Ok(self.ctx.now)
    }

    fn drain_ready(&mut self) -> Result<(), SimError> {
        while let Some(pid) = self.ctx.ready.pop_front() {
            if self.ctx.status.get(&pid) != Some(&ProcState::Ready) {
                continue;
            }
            self.dispatch(pid)?;
            self.install_spawned();
        }
        Ok(())
    }

    fn dispatch(&mut self, pid: Pid) -> Result<(), SimError> {
        self.ctx.status.insert(pid, ProcState::Running);
        self.ctx.current = pid;

        let process = self
            .processes
            .get_mut(&pid)
            .ok_or_else(|| SimError::invariant(format!("no process registered for pid {}", pid)))?;
        let step = process.step(&mut self.ctx)?;

        match step {
            Step::Wait(signal, cond) => {
                // A condition that already holds never suspends.
                if cond.eval(&self.ctx.signals.value(signal)) {
                    self.ctx.make_ready(pid);
                } else {
                    self.ctx.status.insert(pid, ProcState::Waiting);
                    self.ctx.signals.add_waiter(signal, pid, cond);
                }
            }
            Step::Hold(duration) => {
                self.ctx.status.insert(pid, ProcState::Holding);
                self.ctx.timers.schedule(pid, self.ctx.now + duration);
            }
            Step::Park => {
                self.ctx.status.insert(pid, ProcState::Parked);
            }
            Step::Done => {
                self.ctx.status.insert(pid, ProcState::Done);
                self.processes.remove(&pid);
            }
        }
        Ok(())
    }

    fn install_spawned(&mut self) {
        for (pid, process) in self.ctx.spawned.drain(..) {
            self.processes.insert(pid, process);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
