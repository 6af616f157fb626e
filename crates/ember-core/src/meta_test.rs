#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::config::{GcConfig, RuntimeConfig};
use crate::table::Table;

fn fresh_state() -> GlobalState {
    GlobalState::new(RuntimeConfig::default(), GcConfig::default())
}

fn intern(g: &mut GlobalState, s: &str) -> Value {
    Value::String(g.gc.intern(s.as_bytes()))
}

#[test]
fn tag_names_match_dunder_convention() {
    assert_eq!(Tag::Index.name(), "__index");
    assert_eq!(Tag::Call.name(), "__call");
    assert_eq!(Tag::Eq.name(), "__eq");
}

#[test]
fn only_the_first_six_tags_carry_a_cache_bit() {
    assert_eq!(Tag::Index.cache_bit(), Some(NoTagMethods::INDEX));
    assert_eq!(Tag::Eq.cache_bit(), Some(NoTagMethods::EQ));
    assert_eq!(Tag::Add.cache_bit(), None);
    assert_eq!(Tag::Call.cache_bit(), None);
}

#[test]
fn get_metamethod_returns_nil_without_a_metatable() {
    let mut g = fresh_state();
    let t = g.gc.alloc_table(Table::new());
    assert!(get_metamethod(&Value::Table(t), Tag::Index, &g).is_nil());
}

#[test]
fn get_metamethod_finds_a_field_on_the_metatable() {
    let mut g = fresh_state();
    let mt = g.gc.alloc_table(Table::new());
    let index_name = intern(&mut g, "__index");
    let target = g.gc.alloc_table(Table::new());
    g.gc.table_set(mt, index_name, Value::Table(target));

    let t = g.gc.alloc_table(Table::new());
    if let Some(GcObject::Table(table)) = g.gc.get_mut(t) {
        table.metatable = Some(mt);
    }

    let found = get_metamethod(&Value::Table(t), Tag::Index, &g);
    assert_eq!(found, Value::Table(target));
}

#[test]
fn negative_lookup_cache_sticks_after_a_miss() {
    let mut g = fresh_state();
    let mt = g.gc.alloc_table(Table::new());
    let t = g.gc.alloc_table(Table::new());
    if let Some(GcObject::Table(table)) = g.gc.get_mut(t) {
        table.metatable = Some(mt);
    }
    assert!(get_metamethod(&Value::Table(t), Tag::Index, &g).is_nil());
    if let Some(GcObject::Table(table)) = g.gc.get(t) {
        assert!(table.no_tag_methods().has(NoTagMethods::INDEX));
    } else {
        panic!("table missing");
    }
}

#[test]
fn index_returns_raw_value_when_present() {
    let mut g = fresh_state();
    let t = g.gc.alloc_table(Table::new());
    g.gc.table_set(t, Value::Int(1), Value::Int(99));
    match index(Value::Table(t), &Value::Int(1), &g).unwrap() {
        IndexStep::Value(v) => assert_eq!(v, Value::Int(99)),
        IndexStep::Call(_) => panic!("expected a raw value"),
    }
}

#[test]
fn index_follows_a_table_index_chain() {
    let mut g = fresh_state();
    let base = g.gc.alloc_table(Table::new());
    g.gc.table_set(base, Value::Int(1), Value::Int(7));

    let mt = g.gc.alloc_table(Table::new());
    let index_name = intern(&mut g, "__index");
    g.gc.table_set(mt, index_name, Value::Table(base));

    let t = g.gc.alloc_table(Table::new());
    if let Some(GcObject::Table(table)) = g.gc.get_mut(t) {
        table.metatable = Some(mt);
    }

    match index(Value::Table(t), &Value::Int(1), &g).unwrap() {
        IndexStep::Value(v) => assert_eq!(v, Value::Int(7)),
        IndexStep::Call(_) => panic!("expected a raw value via chain"),
    }
}

#[test]
fn index_on_a_non_table_without_a_metamethod_errors() {
    let g = fresh_state();
    let err = index(Value::Int(1), &Value::Int(1), &g).unwrap_err();
    assert!(matches!(err, RuntimeError::Runtime { .. }));
}

#[test]
fn new_index_writes_raw_when_no_newindex_metamethod() {
    let mut g = fresh_state();
    let t = g.gc.alloc_table(Table::new());
    let step = new_index(Value::Table(t), Value::Int(1), Value::Int(5), &mut g).unwrap();
    assert!(matches!(step, NewIndexStep::Done));
    assert_eq!(g.gc.get(t).and_then(GcObject::as_table).unwrap().get(&Value::Int(1), g.gc.seed(), &g.gc), Value::Int(5));
}

#[test]
fn new_index_writes_raw_when_key_already_exists_even_with_newindex_set() {
    let mut g = fresh_state();
    let t = g.gc.alloc_table(Table::new());
    g.gc.table_set(t, Value::Int(1), Value::Int(1));

    let mt = g.gc.alloc_table(Table::new());
    let newindex_name = intern(&mut g, "__newindex");
    let sink = g.gc.alloc_table(Table::new());
    g.gc.table_set(mt, newindex_name, Value::Table(sink));
    if let Some(GcObject::Table(table)) = g.gc.get_mut(t) {
        table.metatable = Some(mt);
    }

    let step = new_index(Value::Table(t), Value::Int(1), Value::Int(2), &mut g).unwrap();
    assert!(matches!(step, NewIndexStep::Done));
    assert_eq!(g.gc.get(t).and_then(GcObject::as_table).unwrap().get(&Value::Int(1), g.gc.seed(), &g.gc), Value::Int(2));
}

#[test]
fn new_index_defers_to_a_function_newindex() {
    let mut g = fresh_state();
    let t = g.gc.alloc_table(Table::new());
    let mt = g.gc.alloc_table(Table::new());
    let newindex_name = intern(&mut g, "__newindex");
    g.gc.table_set(mt, newindex_name, Value::LightFn(|_, _| 0));
    if let Some(GcObject::Table(table)) = g.gc.get_mut(t) {
        table.metatable = Some(mt);
    }
    let step = new_index(Value::Table(t), Value::Int(1), Value::Int(2), &mut g).unwrap();
    assert!(matches!(step, NewIndexStep::Call(Value::LightFn(_))));
}

#[test]
fn binary_handler_prefers_the_left_operand() {
    let mut g = fresh_state();
    let mt_a = g.gc.alloc_table(Table::new());
    let add_name = intern(&mut g, "__add");
    g.gc.table_set(mt_a, add_name, Value::LightFn(|_, _| 1));
    let a = g.gc.alloc_table(Table::new());
    if let Some(GcObject::Table(table)) = g.gc.get_mut(a) {
        table.metatable = Some(mt_a);
    }
    let b = g.gc.alloc_table(Table::new());
    let found = binary_handler(&Value::Table(a), &Value::Table(b), Tag::Add, &g);
    assert!(matches!(found, Value::LightFn(_)));
}

#[test]
fn eq_handler_skips_non_table_non_userdata_values() {
    let g = fresh_state();
    assert!(eq_handler(&Value::Int(1), &Value::Int(1), &g).is_none());
}

#[test]
fn eq_handler_skips_mismatched_types() {
    let mut g = fresh_state();
    let t = g.gc.alloc_table(Table::new());
    assert!(eq_handler(&Value::Table(t), &Value::Int(1), &g).is_none());
}
