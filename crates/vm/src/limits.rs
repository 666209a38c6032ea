//! Engine limits.

use neonova_config::{
    MAX_INVOCATION_STACK_SIZE, MAX_ITEM_SIZE, MAX_STACK_SIZE, MAX_TRY_NESTING_DEPTH,
};

/// Hard bounds on a single VM run. Defaults carry the protocol constants;
/// embedders only tighten them for special-purpose runs.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionEngineLimits {
    /// Total live stack items across all frames.
    pub max_stack_size: usize,
    /// Largest single item, in serialized bytes.
    pub max_item_size: usize,
    /// Deepest allowed invocation stack.
    pub max_invocation_stack_size: usize,
    /// Deepest try nesting within one frame.
    pub max_try_nesting_depth: usize,
    /// Largest shift amount accepted by SHL/SHR.
    pub max_shift: u32,
}

impl Default for ExecutionEngineLimits {
    fn default() -> Self {
        Self {
            max_stack_size: MAX_STACK_SIZE,
            max_item_size: MAX_ITEM_SIZE,
            max_invocation_stack_size: MAX_INVOCATION_STACK_SIZE,
            max_try_nesting_depth: MAX_TRY_NESTING_DEPTH,
            max_shift: 256,
        }
    }
}
