//! Instruction semantics, grouped by category.
//!
//! Dispatch is a single match over the opcode; the handlers are plain
//! methods so the hot loop never goes through dynamic dispatch.

mod compound;
mod control;
mod numeric;
mod push;
mod slots;
mod splice;
mod stack_ops;
mod types;

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::VmResult;

impl ExecutionEngine {
    pub(crate) fn execute_instruction(&mut self, instruction: &Instruction) -> VmResult<()> {
        use OpCode::*;
        match instruction.opcode {
            // Constants
            PUSHINT8 | PUSHINT16 | PUSHINT32 | PUSHINT64 | PUSHINT128 | PUSHINT256 => {
                self.op_push_int(instruction)
            }
            PUSHT => self.op_push_bool(true),
            PUSHF => self.op_push_bool(false),
            PUSHA => self.op_push_a(instruction),
            PUSHNULL => self.op_push_null(),
            PUSHDATA1 | PUSHDATA2 | PUSHDATA4 => self.op_push_data(instruction),
            PUSHM1 | PUSH0 | PUSH1 | PUSH2 | PUSH3 | PUSH4 | PUSH5 | PUSH6 | PUSH7 | PUSH8
            | PUSH9 | PUSH10 | PUSH11 | PUSH12 | PUSH13 | PUSH14 | PUSH15 | PUSH16 => {
                self.op_push_small(instruction)
            }

            // Flow control
            NOP => Ok(()),
            JMP | JMP_L => self.op_jmp(instruction),
            JMPIF | JMPIF_L => self.op_jmp_if(instruction, true),
            JMPIFNOT | JMPIFNOT_L => self.op_jmp_if(instruction, false),
            JMPEQ | JMPEQ_L => self.op_jmp_equal(instruction, true),
            JMPNE | JMPNE_L => self.op_jmp_equal(instruction, false),
            JMPGT | JMPGT_L => self.op_jmp_cmp(instruction, |o| o.is_gt()),
            JMPGE | JMPGE_L => self.op_jmp_cmp(instruction, |o| o.is_ge()),
            JMPLT | JMPLT_L => self.op_jmp_cmp(instruction, |o| o.is_lt()),
            JMPLE | JMPLE_L => self.op_jmp_cmp(instruction, |o| o.is_le()),
            CALL | CALL_L => self.op_call(instruction),
            CALLA => self.op_call_a(),
            CALLT => Err(crate::VmError::CallTokenNeedsHost),
            ABORT => self.op_abort(None),
            ABORTMSG => self.op_abort_msg(),
            ASSERT => self.op_assert(None),
            ASSERTMSG => self.op_assert_msg(),
            THROW => self.op_throw(),
            TRY | TRY_L => self.op_try(instruction),
            ENDTRY | ENDTRY_L => self.op_end_try(instruction),
            ENDFINALLY => self.op_end_finally(),
            RET => self.unload_context(),
            SYSCALL => Err(crate::VmError::SyscallNeedsHost(instruction.operand_as_u32())),

            // Stack
            DEPTH => self.op_depth(),
            DROP => self.op_drop(),
            NIP => self.op_nip(),
            XDROP => self.op_xdrop(),
            CLEAR => self.op_clear(),
            DUP => self.op_dup(),
            OVER => self.op_over(),
            PICK => self.op_pick(),
            TUCK => self.op_tuck(),
            SWAP => self.op_swap(),
            ROT => self.op_rot(),
            ROLL => self.op_roll(),
            REVERSE3 => self.op_reverse(3),
            REVERSE4 => self.op_reverse(4),
            REVERSEN => self.op_reverse_n(),

            // Slots
            INITSSLOT => self.op_init_static_slot(instruction),
            INITSLOT => self.op_init_slot(instruction),
            LDSFLD0 | LDSFLD1 | LDSFLD2 | LDSFLD3 | LDSFLD4 | LDSFLD5 | LDSFLD6 => {
                self.op_load_static(instruction.opcode as usize - LDSFLD0 as usize)
            }
            LDSFLD => self.op_load_static(instruction.operand_as_u8() as usize),
            STSFLD0 | STSFLD1 | STSFLD2 | STSFLD3 | STSFLD4 | STSFLD5 | STSFLD6 => {
                self.op_store_static(instruction.opcode as usize - STSFLD0 as usize)
            }
            STSFLD => self.op_store_static(instruction.operand_as_u8() as usize),
            LDLOC0 | LDLOC1 | LDLOC2 | LDLOC3 | LDLOC4 | LDLOC5 | LDLOC6 => {
                self.op_load_local(instruction.opcode as usize - LDLOC0 as usize)
            }
            LDLOC => self.op_load_local(instruction.operand_as_u8() as usize),
            STLOC0 | STLOC1 | STLOC2 | STLOC3 | STLOC4 | STLOC5 | STLOC6 => {
                self.op_store_local(instruction.opcode as usize - STLOC0 as usize)
            }
            STLOC => self.op_store_local(instruction.operand_as_u8() as usize),
            LDARG0 | LDARG1 | LDARG2 | LDARG3 | LDARG4 | LDARG5 | LDARG6 => {
                self.op_load_arg(instruction.opcode as usize - LDARG0 as usize)
            }
            LDARG => self.op_load_arg(instruction.operand_as_u8() as usize),
            STARG0 | STARG1 | STARG2 | STARG3 | STARG4 | STARG5 | STARG6 => {
                self.op_store_arg(instruction.opcode as usize - STARG0 as usize)
            }
            STARG => self.op_store_arg(instruction.operand_as_u8() as usize),

            // Splice
            NEWBUFFER => self.op_new_buffer(),
            MEMCPY => self.op_memcpy(),
            CAT => self.op_cat(),
            SUBSTR => self.op_substr(),
            LEFT => self.op_left(),
            RIGHT => self.op_right(),

            // Bitwise logic
            INVERT => self.op_invert(),
            AND => self.op_bitwise(|a, b| a & b),
            OR => self.op_bitwise(|a, b| a | b),
            XOR => self.op_bitwise(|a, b| a ^ b),
            EQUAL => self.op_equal(true),
            NOTEQUAL => self.op_equal(false),

            // Arithmetic
            SIGN => self.op_sign(),
            ABS => self.op_unary(|v| v.magnitude().clone().into()),
            NEGATE => self.op_unary(|v| -v),
            INC => self.op_unary(|v| v + 1),
            DEC => self.op_unary(|v| v - 1),
            ADD => self.op_binary(|a, b| a + b),
            SUB => self.op_binary(|a, b| a - b),
            MUL => self.op_binary(|a, b| a * b),
            DIV => self.op_div(),
            MOD => self.op_mod(),
            POW => self.op_pow(),
            SQRT => self.op_sqrt(),
            MODMUL => self.op_mod_mul(),
            MODPOW => self.op_mod_pow(),
            SHL => self.op_shift(true),
            SHR => self.op_shift(false),
            NOT => self.op_not(),
            BOOLAND => self.op_bool_binary(|a, b| a && b),
            BOOLOR => self.op_bool_binary(|a, b| a || b),
            NZ => self.op_nz(),
            NUMEQUAL => self.op_num_equal(true),
            NUMNOTEQUAL => self.op_num_equal(false),
            LT => self.op_compare(|o| o.is_lt()),
            LE => self.op_compare(|o| o.is_le()),
            GT => self.op_compare(|o| o.is_gt()),
            GE => self.op_compare(|o| o.is_ge()),
            MIN => self.op_binary(|a, b| a.min(b)),
            MAX => self.op_binary(|a, b| a.max(b)),
            WITHIN => self.op_within(),

            // Compound types
            PACKMAP => self.op_pack_map(),
            PACKSTRUCT => self.op_pack(true),
            PACK => self.op_pack(false),
            UNPACK => self.op_unpack(),
            NEWARRAY0 => self.op_new_array(true, Some(0)),
            NEWARRAY | NEWARRAY_T => self.op_new_array(true, None),
            NEWSTRUCT0 => self.op_new_array(false, Some(0)),
            NEWSTRUCT => self.op_new_array(false, None),
            NEWMAP => self.op_new_map(),
            SIZE => self.op_size(),
            HASKEY => self.op_has_key(),
            KEYS => self.op_keys(),
            VALUES => self.op_values(),
            PICKITEM => self.op_pick_item(),
            APPEND => self.op_append(),
            SETITEM => self.op_set_item(),
            REVERSEITEMS => self.op_reverse_items(),
            REMOVE => self.op_remove(),
            CLEARITEMS => self.op_clear_items(),
            POPITEM => self.op_pop_item(),

            // Types
            ISNULL => self.op_is_null(),
            ISTYPE => self.op_is_type(instruction),
            CONVERT => self.op_convert(instruction),
        }
    }
}
