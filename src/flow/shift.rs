use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SimError};
use crate::kernel::engine::Ctx;
use crate::kernel::process::{Process, SimTime, Step};
use crate::kernel::resource::ResourceId;
use crate::kernel::signal::{SignalId, SignalValue};

/// One worked shift: time on the clock followed by time off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSpan {
    pub on: SimTime,
    pub off: SimTime,
}

/// Shift plan for a worker resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftPlan {
    /// The same shift, repeated forever.
    Continuous(ShiftSpan),
    /// A repeating sequence of shifts.
    Pattern(Vec<ShiftSpan>),
    /// A finite sequence of shifts, worked once.
    Custom(Vec<ShiftSpan>),
}

impl ShiftPlan {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let spans: &[ShiftSpan] = match self {
            ShiftPlan::Continuous(span) => std::slice::from_ref(span),
            ShiftPlan::Pattern(spans) | ShiftPlan::Custom(spans) => {
                if spans.is_empty() {
                    return Err(ConfigError::new(
                        "[]",
                        "shifts",
                        "at least one shift span",
                    ));
                }
                spans
            }
        };
        for span in spans {
            if span.on == 0 {
                return Err(ConfigError::new(span.on, "shift_duration", "a duration >= 1 tick"));
            }
        }
        Ok(())
    }

    /// The span worked for shift number `n`, if any.
    fn span(&self, n: usize) -> Option<ShiftSpan> {
        match self {
            ShiftPlan::Continuous(span) => Some(*span),
            ShiftPlan::Pattern(spans) => Some(spans[n % spans.len()]),
            ShiftPlan::Custom(spans) => spans.get(n).copied(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ShiftPhase {
    Start,
    ClockOn,
    ClockOff,
}

/// Drives a worker resource's capacity on and off shift.
///
/// Going off shift sets the capacity to zero: no new claims are granted, but
/// claims held across the boundary are not preempted and drain naturally.
pub struct ShiftController {
    name: String,
    worker: ResourceId,
    on_capacity: usize,
    start_at: SimTime,
    plan: ShiftPlan,
    shift_num: usize,
    current: ShiftSpan,
    /// Latched on-clock flag, for observers.
    pub on_clock: SignalId,
    phase: ShiftPhase,
}

impl ShiftController {
    pub fn new(
        ctx: &mut Ctx,
        name: impl Into<String>,
        worker: ResourceId,
        on_capacity: usize,
        start_at: SimTime,
        plan: ShiftPlan,
    ) -> Result<Self, ConfigError> {
        plan.validate()?;
        if on_capacity == 0 {
            return Err(ConfigError::new(on_capacity, "on_capacity", "an integer >= 1"));
        }
        let name = name.into();
        let on_clock = ctx.create_signal(format!("{}_on_clock", name), SignalValue::Bool(false));
        Ok(Self {
            name,
            worker,
            on_capacity,
            start_at,
            plan,
            shift_num: 0,
            current: ShiftSpan { on: 0, off: 0 },
            on_clock,
            phase: ShiftPhase::Start,
        })
    }
}

impl Process for ShiftController {
    fn step(&mut self, ctx: &mut Ctx) -> Result<Step, SimError> {
        loop {
            match self.phase {
                ShiftPhase::Start => {
                    // Workers are off the clock until the first shift starts.
                    ctx.set_capacity(self.worker, 0);
                    self.phase = ShiftPhase::ClockOn;
                    if self.start_at > 0 {
                        return Ok(Step::Hold(self.start_at));
                    }
                }

                ShiftPhase::ClockOn => {
                    let span = match self.plan.span(self.shift_num) {
                        Some(span) => span,
                        None => {
                            info!("[{}] all shifts worked", self.name);
                            return Ok(Step::Done);
                        }
                    };
                    self.current = span;
                    info!("[{}] on clock for {} tick(s)", self.name, span.on);
                    ctx.set_capacity(self.worker, self.on_capacity);
                    ctx.set_bool(self.on_clock, true);
                    self.phase = ShiftPhase::ClockOff;
                    return Ok(Step::Hold(span.on));
                }

                ShiftPhase::ClockOff => {
                    info!("[{}] off clock for {} tick(s)", self.name, self.current.off);
                    ctx.set_capacity(self.worker, 0);
                    ctx.set_bool(self.on_clock, false);
                    self.shift_num += 1;
                    self.phase = ShiftPhase::ClockOn;
                    if self.current.off > 0 {
                        return Ok(Step::Hold(self.current.off));
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_validation() {
        assert!(ShiftPlan::Pattern(vec![]).validate().is_err());
        assert!(ShiftPlan::Continuous(ShiftSpan { on: 0, off: 5 }).validate().is_err());
        assert!(ShiftPlan::Continuous(ShiftSpan { on: 8, off: 16 }).validate().is_ok());
    }

    #[test]
    fn test_pattern_repeats_and_custom_ends() {
        let pattern = ShiftPlan::Pattern(vec![
            ShiftSpan { on: 8, off: 4 },
            ShiftSpan { on: 6, off: 6 },
        ]);
        assert_eq!(pattern.span(0), Some(ShiftSpan { on: 8, off: 4 }));
        assert_eq!(pattern.span(3), Some(ShiftSpan { on: 6, off: 6 }));

        let custom = ShiftPlan::Custom(vec![ShiftSpan { on: 8, off: 4 }]);
        assert_eq!(custom.span(0), Some(ShiftSpan { on: 8, off: 4 }));
        assert_eq!(custom.span(1), None);
    }
}
