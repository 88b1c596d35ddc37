// Expressions compiled in a stopped frame and run through the host.

mod common;

use common::*;
use vmdbg_debugger::{DebugError, Debugger, ErrorCode, Evaluation, Value};

/// Stops at the first statement of `main` and returns the fixture.
fn stopped() -> (Debugger, MockVm) {
    let (mut debugger, mut vm) = program();
    let mut ui = RecordingUi::new();
    step_at(&mut debugger, &mut vm, &mut ui, MAIN);
    (debugger, vm)
}

fn eval(debugger: &mut Debugger, vm: &mut MockVm, text: &str) -> Evaluation {
    debugger.evaluate(vm, text, 0, false).unwrap()
}

#[test]
fn test_integer_literals() {
    let (mut debugger, mut vm) = stopped();

    assert_eq!(eval(&mut debugger, &mut vm, "0xFFFFFFFF").value, Value::Int(-1));
    assert_eq!(eval(&mut debugger, &mut vm, "-2147483648").value, Value::Int(i32::MIN));
    assert_eq!(eval(&mut debugger, &mut vm, "0x10 + 10").text, "26");
}

#[test]
fn test_arithmetic_overflow_is_an_error() {
    let (mut debugger, mut vm) = stopped();
    vm.set_local(0, 0, Value::Int(i32::MAX));

    let err = debugger.evaluate(&mut vm, "x + 1", 0, false).unwrap_err();
    assert!(matches!(err, DebugError::Runtime(ref e) if e.code() == Some(ErrorCode::NUM_OVERFLOW)));
    assert_eq!(err.to_string(), "error: numeric overflow");
}

#[test]
fn test_strings_concatenate_scalars() {
    let (mut debugger, mut vm) = stopped();

    let result = eval(&mut debugger, &mut vm, "'x=' + x + ', ' + nil");
    assert_eq!(result.value, Value::from_str("x=1, nil"));
    assert_eq!(result.text, "'x=1, nil'");
    assert!(!result.is_openable);
}

#[test]
fn test_lists_index_from_one() {
    let (mut debugger, mut vm) = stopped();

    assert_eq!(eval(&mut debugger, &mut vm, "[10, 20, 30][2]").value, Value::Int(20));
    let err = debugger.evaluate(&mut vm, "[10, 20, 30][0]", 0, false).unwrap_err();
    assert!(matches!(err, DebugError::Runtime(ref e) if e.code() == Some(ErrorCode::INDEX_OUT_OF_RANGE)));

    let list = eval(&mut debugger, &mut vm, "[x, y] + 3 - 1");
    assert_eq!(list.text, "[2,3]");
    assert!(list.is_openable);
}

#[test]
fn test_list_element_store_pads_with_nil() {
    let (mut debugger, mut vm) = stopped();

    eval(&mut debugger, &mut vm, "y = [1]");
    eval(&mut debugger, &mut vm, "y[3] = 9");
    assert_eq!(
        vm.frames[0].locals[1],
        Value::from_list(vec![Value::Int(1), Value::Nil, Value::Int(9)])
    );
}

#[test]
fn test_logical_and_conditional_operators() {
    let (mut debugger, mut vm) = stopped();

    assert_eq!(eval(&mut debugger, &mut vm, "x == 1 && y == 2").value, Value::True);
    assert_eq!(eval(&mut debugger, &mut vm, "x == 2 || y == 3").value, Value::Nil);
    assert_eq!(eval(&mut debugger, &mut vm, "!x").value, Value::Nil);
    assert_eq!(
        eval(&mut debugger, &mut vm, "x > 0 ? 'pos' : 'neg'").value,
        Value::from_str("pos")
    );
}

#[test]
fn test_properties_and_self() {
    let (mut debugger, mut vm) = stopped();

    // a bare property name reads it from self
    assert_eq!(eval(&mut debugger, &mut vm, "count").value, Value::Int(0));
    eval(&mut debugger, &mut vm, "obj.count = a * 2");
    assert_eq!(vm.props[&(OBJ, COUNT)], Value::Int(14));
    assert_eq!(eval(&mut debugger, &mut vm, "self.count").text, "14");
    assert_eq!(eval(&mut debugger, &mut vm, "self").text, "obj");
}

#[test]
fn test_function_calls_reach_the_host() {
    let (mut debugger, mut vm) = stopped();

    assert_eq!(eval(&mut debugger, &mut vm, "helper(1, 2, 3)").value, Value::Int(3));
    assert_eq!(eval(&mut debugger, &mut vm, "helper").text, "helper");
}

#[test]
fn test_compile_errors_are_single_line() {
    let (mut debugger, mut vm) = stopped();

    for text in ["x +", "(x", "1 = 2", "'open"] {
        match debugger.evaluate(&mut vm, text, 0, false) {
            Err(DebugError::Compile(err)) => assert!(!err.message().contains('\n'), "{text}"),
            other => panic!("{text}: expected a compile error, got {other:?}"),
        }
    }
    assert!(vm.units.is_empty());
}

#[test]
fn test_dynamic_code_exhaustion_is_reported() {
    let (mut debugger, mut vm) = stopped();
    vm.max_units = 0;

    let err = debugger.evaluate(&mut vm, "x", 0, false).unwrap_err();
    assert!(matches!(err, DebugError::Compile(ref e) if e.message() == "out of dynamic code space"));
}
