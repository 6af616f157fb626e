use super::*;
use crate::object::GcRef;

#[test]
fn truthiness() {
    assert!(!Value::Nil.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(Value::Bool(true).is_truthy());
    assert!(Value::Int(0).is_truthy());
    assert!(Value::Float(0.0).is_truthy());
}

#[test]
fn type_names() {
    assert_eq!(Value::Nil.type_name(), "nil");
    assert_eq!(Value::Bool(true).type_name(), "boolean");
    assert_eq!(Value::Int(1).type_name(), "number");
    assert_eq!(Value::Float(1.0).type_name(), "number");
    assert_eq!(Value::Table(GcRef::from_index(0)).type_name(), "table");
    assert_eq!(Value::Closure(GcRef::from_index(0)).type_name(), "function");
}

#[test]
fn normalize_key_collapses_exact_floats() {
    assert_eq!(Value::Float(3.0).normalize_key(), Value::Int(3));
    assert_eq!(Value::Float(-1.0).normalize_key(), Value::Int(-1));
    assert_eq!(Value::Float(3.5).normalize_key(), Value::Float(3.5));
}

#[test]
fn raw_eq_treats_int_and_equal_float_key_as_same() {
    assert!(Value::Int(3).raw_eq(&Value::Float(3.0)));
    assert!(!Value::Int(3).raw_eq(&Value::Float(3.5)));
}

#[test]
fn raw_eq_distinguishes_gc_refs_by_identity() {
    let a = Value::Table(GcRef::from_index(1));
    let b = Value::Table(GcRef::from_index(2));
    assert!(!a.raw_eq(&b));
    assert!(a.raw_eq(&Value::Table(GcRef::from_index(1))));
}

#[test]
fn raw_eq_does_not_conflate_different_base_types() {
    assert!(!Value::Nil.raw_eq(&Value::Bool(false)));
    assert!(!Value::Int(0).raw_eq(&Value::Bool(false)));
}

#[test]
fn nan_is_not_a_valid_key_but_other_floats_are() {
    assert!(!Value::Float(f64::NAN).is_valid_key());
    assert!(Value::Float(1.5).is_valid_key());
    assert!(!Value::Nil.is_valid_key());
}

#[test]
fn is_collectable_matches_gc_ref_presence() {
    let r = GcRef::from_index(0);
    assert!(Value::Table(r).is_collectable());
    assert!(Value::Table(r).gc_ref().is_some());
    assert!(!Value::Int(1).is_collectable());
    assert!(Value::Int(1).gc_ref().is_none());
    assert!(!Value::LightFn(|_, _| 0).is_collectable());
}
