//! End-to-end execution tests driving the engine with assembled scripts.

use neonova_vm::{ExecutionEngine, OpCode, Script, ScriptBuilder, StackItem, VmState};

fn run(script: Script) -> ExecutionEngine {
    let mut engine = ExecutionEngine::new();
    engine
        .load_script(script, -1, neonova_vm::CallFlags::ALL)
        .unwrap();
    engine.execute();
    engine
}

fn run_bytes(bytes: Vec<u8>) -> ExecutionEngine {
    run(Script::new(bytes))
}

#[test]
fn push_add_halts_with_three() {
    // PUSH1 PUSH2 ADD
    let engine = run_bytes(vec![0x11, 0x12, 0x9e]);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().len(), 1);
    assert_eq!(
        engine.result_stack().items()[0].as_i64().unwrap(),
        3
    );
}

#[test]
fn arithmetic_division_semantics() {
    // -7 / 2 truncates toward zero; -7 % 2 keeps the dividend sign.
    let mut b = ScriptBuilder::new();
    b.push_int(-7).push_int(2).emit(OpCode::DIV);
    b.push_int(-7).push_int(2).emit(OpCode::MOD);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Halt);
    let items = engine.result_stack().items();
    assert_eq!(items[0].as_i64().unwrap(), -3);
    assert_eq!(items[1].as_i64().unwrap(), -1);
}

#[test]
fn division_by_zero_faults() {
    let mut b = ScriptBuilder::new();
    b.push_int(1).push_int(0).emit(OpCode::DIV);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Fault);
    assert!(engine.uncaught_exception().is_some());
}

#[test]
fn jmpif_skips_branch() {
    // PUSHT JMPIF +3 (skip PUSH9) PUSH2
    let mut b = ScriptBuilder::new();
    b.emit(OpCode::PUSHT);
    b.emit_with(OpCode::JMPIF, &[3]);
    b.push_int(9);
    b.push_int(2);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Halt);
    let items = engine.result_stack().items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_i64().unwrap(), 2);
}

#[test]
fn call_and_ret_share_stack() {
    // Layout: 0 PUSH2, 1 PUSH3, 2 CALL +3 (→ 5), 4 RET, 5 MUL, 6 RET.
    // The CALL frame shares the caller's stack, so MUL sees both operands.
    let mut b = ScriptBuilder::new();
    b.push_int(2).push_int(3);
    b.emit_with(OpCode::CALL, &[3]);
    b.emit(OpCode::RET);
    b.emit(OpCode::MUL);
    b.emit(OpCode::RET);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().items()[0].as_i64().unwrap(), 6);
}

#[test]
fn calla_rejects_foreign_pointer() {
    let mut b = ScriptBuilder::new();
    b.push_int(0);
    b.emit(OpCode::CALLA);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn throw_without_try_faults_with_exception_value() {
    let mut b = ScriptBuilder::new();
    b.push_string("boom").emit(OpCode::THROW);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Fault);
    let exception = engine.uncaught_exception().unwrap();
    assert_eq!(exception.as_string().unwrap(), "boom");
}

#[test]
fn try_catch_recovers() {
    // The thrown value lands on the stack at the catch target.
    let mut manual = Vec::new();
    manual.extend_from_slice(&[0x3b, 10, 0]); // TRY, catch at offset 10
    manual.extend_from_slice(&[0x0c, 4]); // PUSHDATA1 len 4 (offset 3)
    manual.extend_from_slice(b"oops");
    manual.push(0x3a); // THROW at offset 9
    manual.push(0x17); // catch at offset 10: PUSH7
    manual.push(0x40); // RET
    let engine = run_bytes(manual);
    assert_eq!(engine.state(), VmState::Halt);
    let items = engine.result_stack().items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_string().unwrap(), "oops");
    assert_eq!(items[1].as_i64().unwrap(), 7);
}

#[test]
fn endtry_runs_finally_then_continues() {
    // TRY(no catch, finally=+5): body pushes 1 then ENDTRY; finally pushes 2;
    // continuation pushes 3.
    let mut manual = Vec::new();
    manual.extend_from_slice(&[0x3b, 0, 7]); // TRY finally at offset 7
    manual.push(0x11); // PUSH1 (offset 3)
    manual.extend_from_slice(&[0x3d, 6]); // ENDTRY → end target = 4+6 = 10 (offset 4)
    manual.push(0x00); // padding byte (never executed)
    manual.push(0x12); // PUSH2 at offset 7 (finally)
    manual.push(0x3f); // ENDFINALLY at offset 8
    manual.push(0x00); // padding
    manual.push(0x13); // PUSH3 at offset 10 (end target)
    let engine = run_bytes(manual);
    assert_eq!(engine.state(), VmState::Halt);
    let values: Vec<i64> = engine
        .result_stack()
        .items()
        .iter()
        .map(|i| i.as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn gas_exhaustion_faults() {
    let mut b = ScriptBuilder::new();
    for _ in 0..100 {
        b.push_int(1);
        b.emit(OpCode::DROP);
    }
    let mut engine = ExecutionEngine::new();
    engine.set_gas_limit(10);
    engine
        .load_script(b.into_script(), -1, neonova_vm::CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Fault);
}

#[test]
fn reference_limit_faults() {
    // Loop: NEWARRAY0 JMP back — each iteration leaves an array on the
    // stack; the 2049th item crosses the reference limit, and since every
    // array is still reachable the sweep reclaims nothing.
    let mut bytes = Vec::new();
    bytes.push(0xc2); // NEWARRAY0
    bytes.extend_from_slice(&[0x22, 0xff]); // JMP -1
    let engine = run_bytes(bytes);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn discarded_cycles_are_reclaimed_not_faulted() {
    // 3000 iterations of: build a self-referencing array, drop it. Each
    // iteration leaks one cycle edge; the count-exceed traverse reclaims
    // the garbage so the script runs to completion.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&[0x01, 0xb8, 0x0b]); // PUSHINT16 3000 (counter)
    bytes.push(0x4a); // 3: DUP
    bytes.extend_from_slice(&[0x26, 0x0a]); // 4: JMPIFNOT → 14 (end)
    bytes.push(0xc2); // 6: NEWARRAY0
    bytes.push(0x4a); // 7: DUP
    bytes.push(0x4a); // 8: DUP
    bytes.push(0xcf); // 9: APPEND (array now contains itself)
    bytes.push(0x45); // 10: DROP (last external handle gone)
    bytes.push(0x9d); // 11: DEC
    bytes.extend_from_slice(&[0x22, 0xf7]); // 12: JMP → 3
    let engine = run_bytes(bytes);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().items()[0].as_i64().unwrap(), 0);
}

#[test]
fn pow_exponent_is_bounded() {
    // A huge exponent must fault up front instead of materializing the
    // intermediate value.
    let mut b = ScriptBuilder::new();
    b.push_int(2).push_int(0x7fff_ffff).emit(OpCode::POW);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Fault);

    let mut b = ScriptBuilder::new();
    b.push_int(2).push_int(8).emit(OpCode::POW);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().items()[0].as_i64().unwrap(), 256);
}

#[test]
fn integer_overflow_faults() {
    // (2^255 - 1) * 2 exceeds the 32-byte bound.
    let mut b = ScriptBuilder::new();
    let huge = (num_bigint::BigInt::from(1) << 255) - 1;
    b.push_int(huge).push_int(2).emit(OpCode::MUL);
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn compound_and_map_round_trip() {
    // NEWMAP DUP PUSH1 PUSH2 SETITEM PUSH1 PICKITEM → 2
    let mut bytes = Vec::new();
    bytes.push(0xc8); // NEWMAP
    bytes.push(0x4a); // DUP
    bytes.push(0x11); // PUSH1 (key)
    bytes.push(0x12); // PUSH2 (value)
    bytes.push(0xd0); // SETITEM
    bytes.push(0x11); // PUSH1
    bytes.push(0xce); // PICKITEM
    let engine = run_bytes(bytes);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().items()[0].as_i64().unwrap(), 2);
}

#[test]
fn pack_unpack_preserves_order() {
    let mut b = ScriptBuilder::new();
    b.push_int(10).push_int(20).push_int(30).push_int(3);
    b.emit(OpCode::PACK);
    b.emit(OpCode::UNPACK);
    b.emit(OpCode::DROP); // drop the count
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Halt);
    let values: Vec<i64> = engine
        .result_stack()
        .items()
        .iter()
        .map(|i| i.as_i64().unwrap())
        .collect();
    // PACK makes [30,20,10][0]=30; UNPACK pushes reversed, so the stack
    // is restored to the original order.
    assert_eq!(values, vec![10, 20, 30]);
}

#[test]
fn initslot_binds_arguments() {
    // args: [5]; INITSLOT 0 locals, 1 arg; LDARG0 doubles it.
    let mut bytes = Vec::new();
    bytes.push(0x15); // PUSH5
    bytes.extend_from_slice(&[0x57, 0, 1]); // INITSLOT locals=0 args=1
    bytes.push(0x78); // LDARG0
    bytes.push(0x78); // LDARG0
    bytes.push(0x9e); // ADD
    let engine = run_bytes(bytes);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().items()[0].as_i64().unwrap(), 10);
}

#[test]
fn convert_between_types() {
    let mut b = ScriptBuilder::new();
    b.push_int(1);
    b.emit_with(OpCode::CONVERT, &[0x20]); // to Boolean
    let engine = run(b.into_script());
    assert_eq!(engine.state(), VmState::Halt);
    assert!(matches!(
        engine.result_stack().items()[0],
        StackItem::Boolean(true)
    ));
}

#[test]
fn abort_is_not_catchable() {
    let mut manual = Vec::new();
    manual.extend_from_slice(&[0x3b, 4, 0]); // TRY catch=+4
    manual.push(0x38); // ABORT (offset 3)
    manual.push(0x11); // catch: PUSH1 (offset 4)
    let engine = run_bytes(manual);
    assert_eq!(engine.state(), VmState::Fault);
}
