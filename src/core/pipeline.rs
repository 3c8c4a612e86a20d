//! Ordered step execution.
//!
//! Steps run strictly in the order given. A step may skip itself; the first
//! failure terminates the run and no later step is invoked.

use std::fmt;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
    Skipped,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Succeeded => "succeeded",
            StepOutcome::Failed => "failed",
            StepOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named pipeline step over a shared context.
pub struct Step<C> {
    pub name: &'static str,
    pub run: fn(&mut C) -> Result<StepOutcome>,
}

/// Execute steps in order, halting at the first failure.
///
/// A step that returns an error is reported and treated as `Failed`. The
/// return value summarizes the run: `Failed` if any step failed, otherwise
/// `Succeeded`.
pub fn run_steps<C>(context: &mut C, steps: &[Step<C>]) -> StepOutcome {
    for step in steps {
        log_status!("pipeline", "Applying step {}", step.name);
        let outcome = match (step.run)(context) {
            Ok(outcome) => outcome,
            Err(err) => {
                eprintln!("[pipeline] Step {} error: {}", step.name, err);
                StepOutcome::Failed
            }
        };
        log_status!("pipeline", "Step {} {}", step.name, outcome);
        if outcome == StepOutcome::Failed {
            eprintln!("[pipeline] Step {} failed. Terminated", step.name);
            return StepOutcome::Failed;
        }
    }
    StepOutcome::Succeeded
}
