use std::collections::VecDeque;

use log::debug;

use crate::kernel::process::Pid;

/// Identifier of a countable resource.
pub type ResourceId = usize;

struct ResourceState {
    name: String,
    capacity: usize,
    claimed: usize,
    pending: VecDeque<Pid>,
}

/// Countable resources with FIFO-fair claim/release and runtime-adjustable
/// capacity.
///
/// A claim under capacity is granted immediately; otherwise the claimer
/// queues and is granted strictly in arrival order as units free up. Held
/// claims are never preempted: lowering capacity (a worker going off shift)
/// only stops new grants, it does not take units back.
pub struct ResourceTable {
    entries: Vec<ResourceState>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn create(&mut self, name: impl Into<String>, capacity: usize) -> ResourceId {
        let id = self.entries.len();
        self.entries.push(ResourceState {
            name: name.into(),
            capacity,
            claimed: 0,
            pending: VecDeque::new(),
        });
        id
    }

    /// Claim one unit for `pid`. Returns true when granted immediately;
    /// otherwise the claim queues and `pid` is woken through a later grant.
    pub fn claim(&mut self, id: ResourceId, pid: Pid) -> bool {
        let res = &mut self.entries[id];
        if res.pending.is_empty() && res.claimed < res.capacity {
            res.claimed += 1;
            debug!("[resource:{}] claim granted ({}/{})", res.name, res.claimed, res.capacity);
            true
        } else {
            res.pending.push_back(pid);
            debug!(
                "[resource:{}] claim queued ({} waiting)",
                res.name,
                res.pending.len()
            );
            false
        }
    }

    /// Release one unit and return the pids granted as a result.
    pub fn release(&mut self, id: ResourceId) -> Vec<Pid> {
        let res = &mut self.entries[id];
        res.claimed = res.claimed.saturating_sub(1);
        debug!("[resource:{}] released ({}/{})", res.name, res.claimed, res.capacity);
        Self::grant_pending(res)
    }

    /// Adjust capacity at runtime. An increase may grant queued claims; a
    /// decrease strands claims above the new capacity until natural releases.
    pub fn set_capacity(&mut self, id: ResourceId, capacity: usize) -> Vec<Pid> {
        let res = &mut self.entries[id];
        debug!("[resource:{}] capacity {} -> {}", res.name, res.capacity, capacity);
        res.capacity = capacity;
        Self::grant_pending(res)
    }

    fn grant_pending(res: &mut ResourceState) -> Vec<Pid> {
        let mut granted = Vec::new();
        while res.claimed < res.capacity {
            match res.pending.pop_front() {
                Some(pid) => {
                    res.claimed += 1;
                    granted.push(pid);
                }
                None => break,
            }
        }
        if !granted.is_empty() {
            debug!(
                "[resource:{}] granted {} queued claim(s) ({}/{})",
                res.name,
                granted.len(),
                res.claimed,
                res.capacity
            );
        }
        granted
    }

    pub fn capacity(&self, id: ResourceId) -> usize {
        self.entries[id].capacity
    }

    pub fn claimed(&self, id: ResourceId) -> usize {
        self.entries[id].claimed
    }

    pub fn queued(&self, id: ResourceId) -> usize {
        self.entries[id].pending.len()
    }

    pub fn name(&self, id: ResourceId) -> &str {
        &self.entries[id].name
    }
}
