//! Pure stack-shuffling instructions.

use crate::execution_engine::ExecutionEngine;
use crate::stack_item::StackItem;
use crate::VmResult;

impl ExecutionEngine {
    fn with_stack<R>(
        &mut self,
        f: impl FnOnce(&mut crate::EvaluationStack) -> VmResult<R>,
    ) -> VmResult<R> {
        let context = self.current_context()?;
        let mut stack = context.evaluation_stack().borrow_mut();
        f(&mut stack)
    }

    pub(super) fn op_depth(&mut self) -> VmResult<()> {
        let depth = self.stack_depth()?;
        self.push(StackItem::from_int(depth as i64))
    }

    pub(super) fn op_drop(&mut self) -> VmResult<()> {
        self.pop()?;
        Ok(())
    }

    pub(super) fn op_nip(&mut self) -> VmResult<()> {
        self.with_stack(|s| s.remove(1).map(|_| ()))
    }

    pub(super) fn op_xdrop(&mut self) -> VmResult<()> {
        let n = self.pop_index()?;
        self.with_stack(|s| s.remove(n).map(|_| ()))
    }

    pub(super) fn op_clear(&mut self) -> VmResult<()> {
        self.with_stack(|s| {
            s.clear();
            Ok(())
        })
    }

    pub(super) fn op_dup(&mut self) -> VmResult<()> {
        let top = self.peek(0)?;
        self.push(top)
    }

    pub(super) fn op_over(&mut self) -> VmResult<()> {
        let item = self.peek(1)?;
        self.push(item)
    }

    pub(super) fn op_pick(&mut self) -> VmResult<()> {
        let n = self.pop_index()?;
        let item = self.peek(n)?;
        self.push(item)
    }

    pub(super) fn op_tuck(&mut self) -> VmResult<()> {
        let top = self.peek(0)?;
        self.with_stack(|s| s.insert(2, top))
    }

    pub(super) fn op_swap(&mut self) -> VmResult<()> {
        self.with_stack(|s| {
            let item = s.remove(1)?;
            s.push(item)
        })
    }

    pub(super) fn op_rot(&mut self) -> VmResult<()> {
        self.with_stack(|s| {
            let item = s.remove(2)?;
            s.push(item)
        })
    }

    pub(super) fn op_roll(&mut self) -> VmResult<()> {
        let n = self.pop_index()?;
        if n == 0 {
            return Ok(());
        }
        self.with_stack(|s| {
            let item = s.remove(n)?;
            s.push(item)
        })
    }

    pub(super) fn op_reverse(&mut self, n: usize) -> VmResult<()> {
        self.with_stack(|s| s.reverse(n))
    }

    pub(super) fn op_reverse_n(&mut self) -> VmResult<()> {
        let n = self.pop_index()?;
        self.with_stack(|s| s.reverse(n))
    }
}
