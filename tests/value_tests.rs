/// Value model integration tests: collections, positions, conversions and
/// the style stack as seen through the public API.

use passage_engine::core::collections::map_from_pairs;
use passage_engine::core::position::Position;
use passage_engine::core::style::{Style, StyleError};
use passage_engine::core::types::{CombineOp, CompareOp, TypeRegistry, ValueError};
use passage_engine::schema::value::{Value, ValueKind};
use proptest::prelude::*;

fn numbers(items: &[i32]) -> Vec<Value> {
    items.iter().map(|&n| Value::from(n)).collect()
}

fn map(registry: &TypeRegistry, pairs: &[(&str, i32)]) -> Value {
    let args = pairs
        .iter()
        .flat_map(|&(k, v)| [Value::text(k), Value::from(v)])
        .collect();
    map_from_pairs(registry, args).unwrap()
}

#[test]
fn member_reads_are_deep_copies() {
    let registry = TypeRegistry::builtin();
    let outer = Value::list(vec![Value::list(numbers(&[1, 2])), Value::from(3)]);

    let mut inner = outer.get_member(&registry, &Value::text("1st")).unwrap();
    inner
        .set_member(&registry, &Value::from(1), Value::from(99))
        .unwrap();

    assert_eq!(inner, Value::list(numbers(&[99, 2])));
    assert_eq!(
        outer.get_member(&registry, &Value::from(1)).unwrap(),
        Value::list(numbers(&[1, 2]))
    );
}

#[test]
fn list_and_set_equality() {
    let a = Value::text("a");
    let b = Value::text("b");
    assert_eq!(Value::list(vec![a.clone(), b.clone()]), Value::list(vec![a.clone(), b.clone()]));
    assert_ne!(Value::list(vec![a.clone(), b.clone()]), Value::list(vec![b.clone(), a.clone()]));
    assert_eq!(Value::set(vec![a.clone(), b.clone()]), Value::set(vec![b, a]));
}

#[test]
fn position_addressing_on_five_elements() {
    let registry = TypeRegistry::builtin();
    let list = Value::list(numbers(&[10, 20, 30, 40, 50]));
    let at = |token: &str| list.get_member(&registry, &Value::text(token));

    assert_eq!(at("1st").unwrap(), Value::from(10));
    assert_eq!(at("last").unwrap(), Value::from(50));
    assert_eq!(at("2ndlast").unwrap(), Value::from(40));
    assert!(matches!(at("6th"), Err(ValueError::PositionOutOfRange { len: 5, .. })));

    assert_eq!(Position::parse("2ndlast").unwrap().resolve(5).unwrap(), 3);
    assert_eq!(Position::from_raw(-1).resolve(5).unwrap(), 3);
    assert_eq!(Position::from_raw(0).resolve(5).unwrap(), 4);
}

#[test]
fn map_combination() {
    let registry = TypeRegistry::builtin();
    let left = map(&registry, &[("a", 1), ("b", 2)]);

    let merged = left
        .combine(&registry, CombineOp::Add, &map(&registry, &[("b", 3), ("c", 4)]))
        .unwrap();
    assert_eq!(merged, map(&registry, &[("a", 1), ("b", 3), ("c", 4)]));

    let trimmed = left
        .combine(&registry, CombineOp::Subtract, &map(&registry, &[("b", 9)]))
        .unwrap();
    assert_eq!(trimmed, map(&registry, &[("a", 1)]));

    let by_list = left
        .combine(&registry, CombineOp::Subtract, &Value::list(vec![Value::text("a")]))
        .unwrap();
    assert_eq!(by_list, map(&registry, &[("b", 2)]));
}

#[test]
fn odd_map_construction_is_rejected() {
    let registry = TypeRegistry::builtin();
    assert_eq!(
        map_from_pairs(&registry, vec![Value::text("a")]).unwrap_err(),
        ValueError::InvalidConstructionArity(1)
    );
}

#[test]
fn spreads_flatten_into_collections() {
    let inner = Value::list(numbers(&[2, 3]));
    let list = Value::list(vec![Value::from(1), Value::spread(inner.clone()), Value::from(4)]);
    assert_eq!(list, Value::list(numbers(&[1, 2, 3, 4])));

    let set = Value::set(vec![Value::from(2), Value::spread(inner)]);
    assert_eq!(set.as_items().map(<[Value]>::len), Some(2));
}

#[test]
fn list_arithmetic() {
    let registry = TypeRegistry::builtin();
    let list = Value::list(numbers(&[1, 2, 2, 3]));
    assert_eq!(
        list.combine(&registry, CombineOp::Subtract, &Value::list(numbers(&[2])))
            .unwrap(),
        Value::list(numbers(&[1, 2, 3]))
    );
    assert_eq!(
        list.combine(&registry, CombineOp::Add, &Value::list(numbers(&[4])))
            .unwrap(),
        Value::list(numbers(&[1, 2, 2, 3, 4]))
    );
    assert!(list
        .compare(&registry, CompareOp::Contains, &Value::from(3))
        .unwrap());
}

#[test]
fn unsupported_operations_are_reported() {
    let registry = TypeRegistry::builtin();
    let err = Value::Bool(true)
        .combine(&registry, CombineOp::Multiply, &Value::Bool(false))
        .unwrap_err();
    assert!(matches!(
        err,
        ValueError::TypeOperationUnsupported {
            kind: ValueKind::Bool,
            ..
        }
    ));
}

#[test]
fn numeric_text_comparison_coerces() {
    let registry = TypeRegistry::builtin();
    assert!(Value::from(10)
        .compare(&registry, CompareOp::Greater, &Value::text("9"))
        .unwrap());
    assert_eq!(
        Value::text("n = ")
            .combine(&registry, CombineOp::Add, &Value::from(2))
            .unwrap(),
        Value::text("n = 2")
    );
}

#[test]
fn conversions_truncate_explicitly() {
    let registry = TypeRegistry::builtin();
    assert_eq!(
        Value::text("12 apples")
            .convert_to(&registry, ValueKind::Number, false)
            .unwrap(),
        Value::from(12)
    );
    assert!(Value::text("12 apples")
        .convert_to(&registry, ValueKind::Number, true)
        .is_err());
}

#[test]
fn style_scoping_scenario() {
    let root = Style::new();
    let hook = Style::with_entries(vec![("hook".to_string(), Value::text("x"))]);
    let color = Style::with_entries(vec![("color".to_string(), Value::text("red"))]);

    let hook_scope = root.apply(&hook).unwrap();
    let color_scope = root.apply(&color).unwrap();
    assert_eq!(root.get("hook"), vec![Value::text("x")]);

    drop(hook_scope);
    assert!(root.get("hook").is_empty());
    assert_eq!(root.get("color"), vec![Value::text("red")]);
    drop(color_scope);
    assert!(root.get("color").is_empty());
}

#[test]
fn style_misuse_is_rejected() {
    let root = Style::new();
    let child = Style::new();
    let _scope = root.apply(&child).unwrap();
    assert_eq!(root.apply(&child).unwrap_err(), StyleError::AlreadyApplied);

    let composite = Style::combine(&Style::new(), &Style::new());
    assert_eq!(root.apply(&composite).unwrap_err(), StyleError::CannotApplyComposite);
}

#[test]
fn frozen_style_is_detached() {
    let root = Style::new();
    let tense = Style::with_entries(vec![("mood".to_string(), Value::text("tense"))]);
    let scope = root.apply(&tense).unwrap();
    let frozen = root.freeze();
    drop(scope);
    let _calm = root
        .apply(&Style::with_entries(vec![("mood".to_string(), Value::text("calm"))]))
        .unwrap();

    assert_eq!(frozen.get("mood"), vec![Value::text("tense")]);
    assert_eq!(root.get("mood"), vec![Value::text("calm")]);
}

proptest! {
    #[test]
    fn set_equality_ignores_order(items in prop::collection::vec(-50i32..50, 0..12)) {
        let forward = Value::set(numbers(&items));
        let mut reversed = items.clone();
        reversed.reverse();
        prop_assert_eq!(forward, Value::set(numbers(&reversed)));
    }

    #[test]
    fn list_copies_are_independent(items in prop::collection::vec(-50i32..50, 1..12), replacement in 100i32..200) {
        let registry = TypeRegistry::builtin();
        let original = Value::list(numbers(&items));
        let mut copy = original.clone();
        copy.set_member(&registry, &Value::text("last"), Value::from(replacement)).unwrap();
        prop_assert_eq!(original, Value::list(numbers(&items)));
        prop_assert_ne!(copy, Value::list(numbers(&items)));
    }

    #[test]
    fn ordinal_positions_resolve_or_fail(len in 1usize..20, n in 1usize..25) {
        let forward = Position::parse(&format!("{}th", n)).unwrap().resolve(len);
        let backward = Position::parse(&format!("{}thlast", n)).unwrap().resolve(len);
        if n <= len {
            prop_assert_eq!(forward.unwrap(), n - 1);
            prop_assert_eq!(backward.unwrap(), len - n);
        } else {
            let out_of_range = matches!(forward, Err(ValueError::PositionOutOfRange { .. }));
            prop_assert!(out_of_range);
            prop_assert!(backward.is_err());
        }
    }

    #[test]
    fn map_add_is_right_biased(
        left in prop::collection::btree_map("[a-e]", -10i32..10, 0..5),
        right in prop::collection::btree_map("[a-e]", -10i32..10, 0..5),
    ) {
        let registry = TypeRegistry::builtin();
        let to_map = |entries: &std::collections::BTreeMap<String, i32>| {
            let pairs: Vec<(&str, i32)> = entries.iter().map(|(k, v)| (k.as_str(), *v)).collect();
            map(&registry, &pairs)
        };
        let merged = to_map(&left).combine(&registry, CombineOp::Add, &to_map(&right)).unwrap();
        for (key, value) in &right {
            prop_assert_eq!(merged.get_member(&registry, &Value::text(key.as_str())).unwrap(), Value::from(*value));
        }
        for (key, value) in left.iter().filter(|(k, _)| !right.contains_key(*k)) {
            prop_assert_eq!(merged.get_member(&registry, &Value::text(key.as_str())).unwrap(), Value::from(*value));
        }
    }
}
