//! Cross-contract call machinery.

use super::ApplicationEngine;
use crate::native::management;
use crate::ContractState;
use neonova_core::UInt160;
use neonova_vm::{
    CallFlags, EvaluationStack, ExecutionContext, Script, StackItem, VmError, VmResult, VmState,
};
use std::cell::RefCell;
use std::rc::Rc;

impl ApplicationEngine {
    /// Resolves a deployed (or native) contract by hash.
    pub fn contract_by_hash(&self, hash: &UInt160) -> Option<ContractState> {
        management::get_contract(&self.dao, hash)
    }

    /// `System.Contract.Call` semantics: resolve, authorize, load a frame.
    /// The caller resumes once the callee returns; its result (or the Null
    /// placeholder for void methods) lands on the caller's stack.
    pub(crate) fn call_contract(
        &mut self,
        hash: UInt160,
        method: &str,
        requested_flags: CallFlags,
        args: Vec<StackItem>,
        expects_return: bool,
    ) -> VmResult<()> {
        if method.starts_with('_') {
            return Err(VmError::throw(format!(
                "method {method} is reserved and cannot be called"
            )));
        }
        let callee = self
            .contract_by_hash(&hash)
            .ok_or_else(|| VmError::throw(format!("contract {hash} not found")))?;
        let declaration = callee
            .manifest
            .method(method, args.len())
            .ok_or_else(|| {
                VmError::throw(format!("method {method}/{} not found", args.len()))
            })?
            .clone();
        // Void methods still leave a Null placeholder for callers that
        // expect a value; the reverse mismatch cannot be papered over.
        if !expects_return && declaration.has_return_value() {
            return Err(VmError::throw(format!(
                "method {method} returns a value the caller does not expect"
            )));
        }

        // The caller's manifest must grant the call when the caller is a
        // deployed contract (entry scripts carry no manifest).
        let caller_hash = self.vm.current_context()?.script_hash();
        if let Some(caller) = self.contract_by_hash(&caller_hash) {
            if !caller
                .manifest
                .can_call(&hash, &callee.manifest.groups, method)
            {
                return Err(VmError::throw(format!(
                    "contract {caller_hash} is not allowed to call {method} of {hash}"
                )));
            }
        }

        let current_flags = self.vm.current_context()?.call_flags;
        let mut flags = current_flags & requested_flags;
        if declaration.safe {
            flags &= !(CallFlags::WRITE_STATES | CallFlags::ALLOW_NOTIFY);
        }
        self.load_contract_frame(
            &callee,
            method,
            declaration.offset as usize,
            declaration.has_return_value(),
            expects_return,
            flags,
            caller_hash,
            args,
        )
    }

    /// CALLT: resolves a NEF method token of the current contract.
    pub(crate) fn call_token(&mut self, token_index: u16) -> VmResult<()> {
        let caller_hash = self.vm.current_context()?.script_hash();
        let caller = self
            .contract_by_hash(&caller_hash)
            .ok_or_else(|| VmError::invalid_operation("CALLT outside a deployed contract"))?;
        let token = caller
            .nef
            .tokens
            .get(token_index as usize)
            .ok_or_else(|| {
                VmError::invalid_operation(format!("method token {token_index} out of range"))
            })?
            .clone();
        let flags = CallFlags::from_bits(token.call_flags)
            .ok_or_else(|| VmError::invalid_operation("invalid token call flags"))?;
        let args = self.pop_args(token.parameters_count as usize)?;
        self.call_contract(
            token.hash,
            &token.method,
            flags,
            args,
            token.has_return_value,
        )
    }

    /// A call initiated by native code (deploy hooks, NEP-17 onPayment).
    /// Runs the callee to completion and returns its result.
    pub fn call_from_native(
        &mut self,
        callee: UInt160,
        method: &str,
        args: Vec<StackItem>,
        has_return: bool,
    ) -> VmResult<Option<StackItem>> {
        let contract = self
            .contract_by_hash(&callee)
            .ok_or_else(|| VmError::throw(format!("contract {callee} not found")))?;
        let declaration = contract
            .manifest
            .method(method, args.len())
            .ok_or_else(|| VmError::throw(format!("method {method} not found on {callee}")))?
            .clone();
        let caller_hash = self
            .vm
            .current_context()
            .map(|c| c.script_hash())
            .unwrap_or_default();

        let depth_before = self.vm.invocation_depth();
        self.load_contract_frame(
            &contract,
            method,
            declaration.offset as usize,
            has_return && declaration.has_return_value(),
            true,
            CallFlags::ALL,
            caller_hash,
            args,
        )?;

        // Drive the nested frames until the callee unwinds.
        while self.vm.invocation_depth() > depth_before
            && self.vm.state() != VmState::Halt
            && self.vm.state() != VmState::Fault
        {
            self.step();
        }
        if self.vm.state() == VmState::Fault {
            return Err(VmError::throw(format!(
                "nested call to {method} of {callee} faulted"
            )));
        }
        if self.vm.invocation_depth() < depth_before {
            // An exception unwound past the invoking native frame; the
            // native's remaining work cannot safely continue.
            return Err(VmError::Abort(format!(
                "exception escaped nested call to {method} of {callee}"
            )));
        }
        // The result (or its Null placeholder) sits on the invoking frame.
        let result = self.vm.pop()?;
        Ok(Some(result))
    }

    /// Loads the `verify` method of the contract deployed at `hash` for
    /// witness verification, with arguments produced by the invocation
    /// script. Read-only flags; exactly one boolean is expected back.
    pub fn load_verify_frame(
        &mut self,
        hash: UInt160,
        args: Vec<StackItem>,
    ) -> VmResult<()> {
        let contract = self
            .contract_by_hash(&hash)
            .ok_or_else(|| VmError::throw(format!("contract {hash} not found")))?;
        let declaration = contract
            .manifest
            .method("verify", args.len())
            .ok_or_else(|| {
                VmError::throw(format!("no verify/{} method on {hash}", args.len()))
            })?
            .clone();
        self.load_contract_frame(
            &contract,
            "verify",
            declaration.offset as usize,
            declaration.has_return_value(),
            true,
            CallFlags::READ_ONLY,
            UInt160::zero(),
            args,
        )
    }

    /// Loads a frame for a contract method: fresh evaluation stack seeded
    /// with the arguments, frame identity set to the contract hash, and the
    /// `_initialize` hook queued for first touch.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn load_contract_frame(
        &mut self,
        contract: &ContractState,
        method: &str,
        offset: usize,
        has_return: bool,
        expects_return: bool,
        flags: CallFlags,
        caller_hash: UInt160,
        args: Vec<StackItem>,
    ) -> VmResult<()> {
        self.bump_invocation_counter(contract.hash);
        let script = Script::new(contract.nef.script.clone());
        let rc = self.vm.reference_counter().clone();
        let eval = Rc::new(RefCell::new(EvaluationStack::new(rc.clone())));
        let rvcount = if has_return { 1 } else { 0 };
        let mut context = ExecutionContext::new(script, rvcount, eval, flags);
        context.set_script_hash(contract.hash);
        context.set_calling_script_hash(Some(caller_hash));
        context.null_on_unload = expects_return && !has_return;
        context.jump(offset)?;
        let is_native = contract.id < 0;
        let method_frame = self.vm.load_context(context)?;
        {
            let mut stack = method_frame.evaluation_stack().borrow_mut();
            if is_native {
                // Native stubs dispatch by name: they pop the method string
                // and the packed argument array.
                stack.push(StackItem::new_array(&rc, args)?)?;
                stack.push(StackItem::from_string(method))?;
            } else {
                // Arguments are pushed in reverse so the first argument is
                // popped first by INITSLOT.
                for arg in args.into_iter().rev() {
                    stack.push(arg)?;
                }
            }
        }
        // `_initialize` runs once per contract per engine, before the first
        // method frame, sharing its stack and statics.
        if !is_native && self.initialized_contracts.insert(contract.hash) {
            if let Some(init) = contract.manifest.method_any_arity("_initialize") {
                let init_offset = init.offset as usize;
                let init_frame = self.vm.current_context()?.fork(init_offset);
                self.vm.load_context(init_frame)?;
            }
        }
        Ok(())
    }
}
