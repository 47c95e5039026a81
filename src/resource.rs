//! Resource limits for the interpreter.
//!
//! A small struct of configurable ceilings, consulted at the handful of
//! points where an unbounded user program could otherwise exhaust the host
//! stack or loop forever. Exceeding a limit surfaces as an ordinary
//! [`RunError`](crate::error::RunError), never a panic.

use crate::error::{ExcType, RunError};

/// Default recursion ceiling.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 4_000;

/// Default ceiling on CPS reduction steps for a single [`crate::interp::Interpreter::run`] call,
/// guarding against non-terminating user programs — the interpreter has no
/// timeout of its own.
pub const DEFAULT_MAX_STEPS: usize = 10_000_000;

/// Resource ceilings for one interpreter run.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_recursion_depth: usize,
    pub max_steps: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH, max_steps: DEFAULT_MAX_STEPS }
    }
}

impl Limits {
    pub fn check_recursion_depth(&self, depth: usize) -> Result<(), RunError> {
        if depth > self.max_recursion_depth {
            return Err(RunError::new(
                ExcType::Runtime,
                format!("maximum recursion depth exceeded ({depth} > {})", self.max_recursion_depth),
            ));
        }
        Ok(())
    }

    pub fn check_steps(&self, steps: usize) -> Result<(), RunError> {
        if steps > self.max_steps {
            return Err(RunError::new(
                ExcType::Runtime,
                format!("interpreter step budget exceeded ({steps} > {})", self.max_steps),
            ));
        }
        Ok(())
    }
}
