#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::config::{GcConfig, RuntimeConfig};
use crate::error::RuntimeError;
use crate::executor::NullExecutor;
use crate::state::GlobalState;
use crate::thread::{ThreadId, ThreadState};
use crate::value::Value;

fn setup() -> (GlobalState, ThreadState) {
    let global = GlobalState::new(RuntimeConfig::default(), GcConfig::default());
    let thread = ThreadState::new(ThreadId(1), 64, 1024);
    (global, thread)
}

fn native_one(t: &mut ThreadState, _g: &mut crate::state::GlobalState) -> RuntimeResult<i32> {
    let a = t.stack.get(t.call_stack.last().unwrap().base);
    let _ = t.stack.pop();
    let _ = t.stack.push(a);
    Ok(1)
}

#[test]
fn stack_push_pop_and_top_track_the_function_relative_base() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    assert_eq!(api.top(), 0);
    api.push_int(1).unwrap();
    api.push_int(2).unwrap();
    assert_eq!(api.top(), 2);
    api.pop(1);
    assert_eq!(api.top(), 1);
}

#[test]
fn negative_indices_resolve_from_the_top() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(10).unwrap();
    api.push_int(20).unwrap();
    assert_eq!(api.get(-1), Value::Int(20));
    assert_eq!(api.get(-2), Value::Int(10));
    assert_eq!(api.get(1), Value::Int(10));
}

#[test]
fn is_none_distinguishes_an_absent_slot_from_a_pushed_nil() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    assert!(api.is_none(1));
    api.push_nil().unwrap();
    assert!(!api.is_none(1));
    assert!(api.is_nil(1));
    assert!(api.is_none_or_nil(1));
    assert!(api.is_none_or_nil(2));
}

#[test]
fn push_value_duplicates_and_copy_overwrites_without_moving_top() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(1).unwrap();
    api.push_int(2).unwrap();
    api.push_value(1).unwrap();
    assert_eq!(api.top(), 3);
    assert_eq!(api.get(-1), Value::Int(1));

    api.copy(2, 1);
    assert_eq!(api.get(1), Value::Int(2));
    assert_eq!(api.top(), 3, "copy does not move top");
}

#[test]
fn rotate_shifts_a_range_of_the_stack() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(1).unwrap();
    api.push_int(2).unwrap();
    api.push_int(3).unwrap();
    api.rotate(1, 1);
    assert_eq!(api.get(1), Value::Int(3));
    assert_eq!(api.get(2), Value::Int(1));
    assert_eq!(api.get(3), Value::Int(2));
}

#[test]
fn to_number_and_to_integer_accept_numeric_strings_and_reject_non_numeric_ones() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.push_string(b" 42 ").unwrap();
    api.push_string(b"nope").unwrap();
    api.push_float(2.0).unwrap();
    api.push_float(2.5).unwrap();

    assert_eq!(api.to_number(1), Some(42.0));
    assert_eq!(api.to_integer(1), Some(42));
    assert_eq!(api.to_number(2), None);
    assert_eq!(api.to_integer(3), Some(2), "2.0 has an exact integer representation");
    assert_eq!(api.to_integer(4), None, "2.5 does not");
}

#[test]
fn to_string_converts_and_writes_back_numbers_but_leaves_other_types_alone() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(7).unwrap();
    api.push_bool(true).unwrap();

    assert_eq!(api.to_string(1).unwrap(), Some(b"7".to_vec()));
    assert_eq!(api.type_name(1), "string", "the int slot was converted in place");
    assert_eq!(api.to_string(2).unwrap(), None);
}

#[test]
fn raw_get_and_raw_set_bypass_metamethods() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap();
    assert!(!api.get_metatable(1), "fresh table has no metatable yet");

    api.push_int(5).unwrap(); // key
    api.push_int(9).unwrap(); // value
    api.raw_set(1).unwrap();
    api.raw_get_index(1, 5);
    assert_eq!(api.get(-1), Value::Int(9));
}

#[test]
fn raw_set_rejects_nil_and_nan_keys() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap();
    api.push_nil().unwrap();
    api.push_int(1).unwrap();
    assert!(api.raw_set(1).is_err());

    api.push_float(f64::NAN).unwrap();
    api.push_int(1).unwrap();
    assert!(api.raw_set(1).is_err());
}

#[test]
fn set_metatable_and_get_metatable_round_trip_on_a_table() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap();
    api.new_table().unwrap();
    api.set_metatable(1).unwrap();
    assert!(api.get_metatable(1));
}

#[test]
fn set_metatable_registers_a_weak_table_with_a_w_mode() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap(); // slot 1: the table that will become weak
    api.new_table().unwrap(); // slot 2: its metatable

    let mode_key = Value::String(api.global.gc.intern(b"__mode"));
    let mode_val = Value::String(api.global.gc.intern(b"v"));
    let mt = match api.get(2) {
        Value::Table(r) => r,
        _ => unreachable!(),
    };
    api.global.gc.table_set(mt, mode_key, mode_val);

    api.push_value(2).unwrap();
    api.set_metatable(1).unwrap();
    assert!(api.get_metatable(1));
}

#[test]
fn set_metatable_rejects_a_non_nil_non_table_value() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap();
    api.push_int(1).unwrap();
    assert!(api.set_metatable(1).is_err());
}

#[test]
fn call_invokes_a_native_closure_and_leaves_its_result_on_the_stack() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_closure(native_one, 0).unwrap();
    api.push_int(77).unwrap();
    api.call(1, 1, &mut executor).unwrap();
    assert_eq!(api.get(-1), Value::Int(77));
}

#[test]
fn pcall_catches_an_error_and_leaves_the_message_on_the_stack() {
    fn always_fails(_t: &mut ThreadState, _g: &mut crate::state::GlobalState) -> RuntimeResult<i32> {
        Err(RuntimeError::runtime("boom"))
    }
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_closure(always_fails, 0).unwrap();
    let status = api.pcall(0, 0, &mut executor);
    assert_eq!(status, crate::error::StatusCode::ErrRun);
    assert!(matches!(api.get(-1), Value::String(_)));
}

#[test]
fn pcall_on_a_non_callable_value_reports_an_error_without_panicking() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(1).unwrap();
    let status = api.pcall(0, 0, &mut executor);
    assert_eq!(status, crate::error::StatusCode::ErrRun);
}

#[test]
fn arith_add_prefers_the_integer_fast_path() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(2).unwrap();
    api.push_int(3).unwrap();
    api.arith(ArithOp::Add, &mut executor).unwrap();
    assert_eq!(api.get(-1), Value::Int(5));
}

#[test]
fn arith_add_promotes_to_float_when_either_operand_is_a_float() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(2).unwrap();
    api.push_float(0.5).unwrap();
    api.arith(ArithOp::Add, &mut executor).unwrap();
    assert_eq!(api.get(-1), Value::Float(2.5));
}

#[test]
fn arith_on_non_numeric_operands_without_a_metamethod_errors() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_bool(true).unwrap();
    api.push_int(1).unwrap();
    assert!(api.arith(ArithOp::Add, &mut executor).is_err());
}

#[test]
fn arith_unary_negation_of_an_integer_wraps_on_min() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(i64::MIN).unwrap();
    api.arith(ArithOp::Unm, &mut executor).unwrap();
    assert_eq!(api.get(-1), Value::Int(i64::MIN));
}

#[test]
fn compare_eq_uses_raw_equality_when_no_metamethod_applies() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(3).unwrap();
    api.push_float(3.0).unwrap();
    assert!(api.compare(1, 2, CompareOp::Eq, &mut executor).unwrap());
}

#[test]
fn compare_lt_and_le_on_integers() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(1).unwrap();
    api.push_int(2).unwrap();
    assert!(api.compare(1, 2, CompareOp::Lt, &mut executor).unwrap());
    assert!(api.compare(1, 2, CompareOp::Le, &mut executor).unwrap());
    assert!(!api.compare(2, 1, CompareOp::Lt, &mut executor).unwrap());
}

#[test]
fn compare_on_strings_is_byte_lexicographic() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_string(b"abc").unwrap();
    api.push_string(b"abd").unwrap();
    assert!(api.compare(1, 2, CompareOp::Lt, &mut executor).unwrap());
}

#[test]
fn concat_joins_strings_and_numbers_right_to_left() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_string(b"a").unwrap();
    api.push_int(1).unwrap();
    api.push_string(b"b").unwrap();
    api.concat(3, &mut executor).unwrap();
    assert_eq!(api.to_string(-1).unwrap(), Some(b"a1b".to_vec()));
}

#[test]
fn concat_of_zero_values_pushes_the_empty_string() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.concat(0, &mut executor).unwrap();
    assert_eq!(api.to_string(-1).unwrap(), Some(Vec::new()));
}

#[test]
fn concat_on_a_table_without_a_metamethod_errors() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_string(b"a").unwrap();
    api.new_table().unwrap();
    assert!(api.concat(2, &mut executor).is_err());
}

#[test]
fn length_of_a_string_is_its_byte_length() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.push_string(b"hello").unwrap();
    api.length(1, &mut executor).unwrap();
    assert_eq!(api.get(-1), Value::Int(5));
}

#[test]
fn length_of_a_table_uses_the_raw_array_boundary() {
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap();
    api.push_int(10).unwrap();
    api.raw_set_index(1, 1);
    api.length(1, &mut executor).unwrap();
    assert_eq!(api.get(-1), Value::Int(1));
}

#[test]
fn next_walks_a_tables_entries_and_stops_when_exhausted() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap();
    api.push_int(10).unwrap();
    api.raw_set_index(1, 1);

    api.push_nil().unwrap();
    assert!(api.next(1).unwrap());
    assert_eq!(api.get(-2), Value::Int(1));
    assert_eq!(api.get(-1), Value::Int(10));
    api.pop(1); // drop value, leave key as the next cursor
    assert!(!api.next(1).unwrap());
}

#[test]
fn next_on_a_non_table_errors() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.push_int(1).unwrap();
    api.push_nil().unwrap();
    assert!(api.next(1).is_err());
}

#[test]
fn gc_count_reflects_allocated_tables_and_collect_reclaims_unreachable_ones() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap();
    api.pop(1);
    let before = api.gc(GcControl::Count);
    assert!(before >= 0);
    assert_eq!(api.gc(GcControl::Collect), 0);
}

#[test]
fn gc_stop_and_restart_toggle_is_running() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    assert_eq!(api.gc(GcControl::IsRunning), 1);
    api.gc(GcControl::Stop);
    assert_eq!(api.gc(GcControl::IsRunning), 0);
    api.gc(GcControl::Restart);
    assert_eq!(api.gc(GcControl::IsRunning), 1);
}

#[test]
fn gc_set_pause_and_step_mul_return_the_previous_value() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    let old_pause = api.gc(GcControl::SetPause(300));
    assert_eq!(old_pause, 200);
    let old_step = api.gc(GcControl::SetStepMul(150));
    assert_eq!(old_step, 100);
}

#[test]
fn error_wraps_a_string_value_and_describes_non_string_ones() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.push_string(b"bad thing").unwrap();
    let err = api.error();
    match err {
        RuntimeError::Runtime { message, .. } => assert_eq!(message, "bad thing"),
        _ => panic!("expected a Runtime error"),
    }

    api.push_int(1).unwrap();
    let err = api.error();
    match err {
        RuntimeError::Runtime { message, .. } => assert!(message.contains("number")),
        _ => panic!("expected a Runtime error"),
    }
}

#[test]
fn raw_equal_compares_without_invoking_eq_metamethods() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table().unwrap();
    api.push_value(1).unwrap();
    assert!(api.raw_equal(1, 2));
    api.new_table().unwrap();
    assert!(!api.raw_equal(1, 3));
}

#[test]
fn format_float_appends_a_trailing_zero_for_integral_floats() {
    assert_eq!(format_float(3.0), "3.0");
    assert_eq!(format_float(f64::INFINITY), "inf");
    assert_eq!(format_float(f64::NAN), "nan");
}

#[test]
fn push_closure_captures_are_readable_as_negative_pseudo_indices() {
    fn read_capture(t: &mut ThreadState, g: &mut crate::state::GlobalState) -> RuntimeResult<i32> {
        let captured = {
            let api = Api::new(t, g);
            api.get(crate::stack::REGISTRY_INDEX - 1)
        };
        t.stack.push(captured)?;
        Ok(1)
    }
    let (mut global, mut thread) = setup();
    let mut executor = NullExecutor;
    {
        let mut api = Api::new(&mut thread, &mut global);
        api.push_int(42).unwrap();
        api.push_closure(read_capture, 1).unwrap();
    }
    let mut api = Api::new(&mut thread, &mut global);
    api.call(0, 1, &mut executor).unwrap();
    assert_eq!(api.get(-1), Value::Int(42));
}

#[test]
fn push_thread_pushes_the_main_thread_and_reports_true() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    let main_thread = api.global.main_thread;
    assert!(api.push_thread());
    assert_eq!(api.get(-1), Value::Thread(main_thread));
}

#[test]
fn new_table_sized_preallocates_without_changing_observable_behavior() {
    let (mut global, mut thread) = setup();
    let mut api = Api::new(&mut thread, &mut global);
    api.new_table_sized(4, 4).unwrap();
    assert!(matches!(api.get(-1), Value::Table(_)));
}
