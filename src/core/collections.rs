//! Built-in collection services: ordered lists, unique sets, string-keyed maps.

use std::collections::BTreeMap;

use crate::core::position::Position;
use crate::core::types::{unsupported, CombineOp, CompareOp, TypeRegistry, TypeService, ValueError};
use crate::schema::value::{Complex, Value, ValueKind};

/// Build a map from alternating key/value arguments. Keys are converted to
/// their text form.
pub fn map_from_pairs(registry: &TypeRegistry, args: Vec<Value>) -> Result<Value, ValueError> {
    if args.len() % 2 != 0 {
        return Err(ValueError::InvalidConstructionArity(args.len()));
    }
    let mut map = BTreeMap::new();
    let mut args = args.into_iter();
    while let (Some(key), Some(value)) = (args.next(), args.next()) {
        map.insert(registry.to_text(&key), value);
    }
    Ok(Value::Complex(Complex::Map(map)))
}

fn items_mut<'a>(value: &'a mut Value, operation: &'static str) -> Result<&'a mut Vec<Value>, ValueError> {
    match value {
        Value::Complex(Complex::List(items)) | Value::Complex(Complex::Set(items)) => Ok(items),
        other => Err(unsupported(other, operation)),
    }
}

fn items<'a>(value: &'a Value, operation: &'static str) -> Result<&'a [Value], ValueError> {
    value.as_items().ok_or_else(|| unsupported(value, operation))
}

fn joined_text(registry: &TypeRegistry, items: &[Value]) -> String {
    items
        .iter()
        .map(|item| registry.to_text(item))
        .collect::<Vec<_>>()
        .join(",")
}

fn sorted(items: &[Value]) -> Vec<Value> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

fn position_of(key: &Value, len: usize) -> Result<usize, ValueError> {
    Position::from_value(key)?.resolve(len)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListService;

impl TypeService for ListService {
    fn kind(&self) -> ValueKind {
        ValueKind::List
    }

    fn compare(
        &self,
        _registry: &TypeRegistry,
        op: CompareOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<bool, ValueError> {
        match op {
            CompareOp::Equal => Ok(lhs == rhs),
            CompareOp::NotEqual => Ok(lhs != rhs),
            CompareOp::Contains => Ok(items(lhs, op.name())?.contains(rhs)),
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn combine(
        &self,
        _registry: &TypeRegistry,
        op: CombineOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, ValueError> {
        let left = items(lhs, op.name())?;
        let right = match rhs {
            Value::Complex(Complex::List(right)) | Value::Complex(Complex::Set(right)) => right,
            _ => return Err(unsupported(lhs, op.name())),
        };
        match op {
            CombineOp::Add => {
                let mut joined = left.to_vec();
                joined.extend(right.iter().cloned());
                Ok(Value::Complex(Complex::List(joined)))
            }
            CombineOp::Subtract => {
                // Multiset difference: each rhs element removes one occurrence
                let mut remaining = left.to_vec();
                for item in right {
                    if let Some(i) = remaining.iter().position(|candidate| candidate == item) {
                        remaining.remove(i);
                    }
                }
                Ok(Value::Complex(Complex::List(remaining)))
            }
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn convert(
        &self,
        registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        _strict: bool,
    ) -> Result<Value, ValueError> {
        let list = items(value, "conversion")?;
        match target {
            ValueKind::List => Ok(value.clone()),
            ValueKind::Set => Ok(Value::set(list.iter().cloned())),
            ValueKind::Text => Ok(Value::Text(joined_text(registry, list))),
            _ => Err(ValueError::ConversionFailed {
                from: value.kind(),
                to: target,
            }),
        }
    }

    fn get_member(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        key: &Value,
    ) -> Result<Value, ValueError> {
        let list = items(value, "member access")?;
        if key.as_str() == Some("length") {
            return Ok(Value::Number(list.len() as f64));
        }
        Ok(list[position_of(key, list.len())?].clone())
    }

    fn set_member(
        &self,
        _registry: &TypeRegistry,
        target: &mut Value,
        key: &Value,
        value: Value,
    ) -> Result<(), ValueError> {
        let list = items_mut(target, "member assignment")?;
        let index = position_of(key, list.len())?;
        list[index] = value;
        Ok(())
    }

    fn remove_member(
        &self,
        _registry: &TypeRegistry,
        target: &mut Value,
        key: &Value,
    ) -> Result<(), ValueError> {
        let list = items_mut(target, "member removal")?;
        let index = position_of(key, list.len())?;
        list.remove(index);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetService;

impl TypeService for SetService {
    fn kind(&self) -> ValueKind {
        ValueKind::Set
    }

    fn compare(
        &self,
        _registry: &TypeRegistry,
        op: CompareOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<bool, ValueError> {
        match op {
            CompareOp::Equal => Ok(lhs == rhs),
            CompareOp::NotEqual => Ok(lhs != rhs),
            CompareOp::Contains => Ok(items(lhs, op.name())?.contains(rhs)),
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn combine(
        &self,
        _registry: &TypeRegistry,
        op: CombineOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, ValueError> {
        let left = items(lhs, op.name())?;
        let right = match rhs {
            Value::Complex(Complex::List(right)) | Value::Complex(Complex::Set(right)) => right,
            _ => return Err(unsupported(lhs, op.name())),
        };
        match op {
            CombineOp::Add => Ok(Value::set(left.iter().chain(right.iter()).cloned())),
            CombineOp::Subtract => Ok(Value::set(
                left.iter().filter(|item| !right.contains(item)).cloned(),
            )),
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn convert(
        &self,
        registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        _strict: bool,
    ) -> Result<Value, ValueError> {
        let set = items(value, "conversion")?;
        match target {
            ValueKind::Set => Ok(value.clone()),
            ValueKind::List => Ok(Value::Complex(Complex::List(sorted(set)))),
            ValueKind::Text => Ok(Value::Text(joined_text(registry, &sorted(set)))),
            _ => Err(ValueError::ConversionFailed {
                from: value.kind(),
                to: target,
            }),
        }
    }

    fn get_member(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        key: &Value,
    ) -> Result<Value, ValueError> {
        let set = items(value, "member access")?;
        match key.as_str() {
            Some("length") => Ok(Value::Number(set.len() as f64)),
            _ => Err(unsupported(value, "member access")),
        }
    }

    /// Removing a member from a set removes that element, if present.
    fn remove_member(
        &self,
        _registry: &TypeRegistry,
        target: &mut Value,
        key: &Value,
    ) -> Result<(), ValueError> {
        items_mut(target, "member removal")?.retain(|item| item != key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MapService;

impl MapService {
    fn map<'a>(value: &'a Value, operation: &'static str) -> Result<&'a BTreeMap<String, Value>, ValueError> {
        value.as_map().ok_or_else(|| unsupported(value, operation))
    }

    fn map_mut<'a>(
        value: &'a mut Value,
        operation: &'static str,
    ) -> Result<&'a mut BTreeMap<String, Value>, ValueError> {
        match value {
            Value::Complex(Complex::Map(map)) => Ok(map),
            other => Err(unsupported(other, operation)),
        }
    }
}

impl TypeService for MapService {
    fn kind(&self) -> ValueKind {
        ValueKind::Map
    }

    fn compare(
        &self,
        registry: &TypeRegistry,
        op: CompareOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<bool, ValueError> {
        match op {
            CompareOp::Equal => Ok(lhs == rhs),
            CompareOp::NotEqual => Ok(lhs != rhs),
            CompareOp::Contains => {
                Ok(Self::map(lhs, op.name())?.contains_key(&registry.to_text(rhs)))
            }
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn combine(
        &self,
        registry: &TypeRegistry,
        op: CombineOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, ValueError> {
        let left = Self::map(lhs, op.name())?;
        match (op, rhs) {
            (CombineOp::Add, Value::Complex(Complex::Map(right))) => {
                let mut merged = left.clone();
                for (key, value) in right {
                    merged.insert(key.clone(), value.clone());
                }
                Ok(Value::Complex(Complex::Map(merged)))
            }
            (CombineOp::Subtract, _) => {
                let keys: Vec<String> = match rhs {
                    Value::Complex(Complex::Map(right)) => right.keys().cloned().collect(),
                    Value::Complex(Complex::List(right)) | Value::Complex(Complex::Set(right)) => {
                        right.iter().map(|key| registry.to_text(key)).collect()
                    }
                    _ => return Err(unsupported(lhs, op.name())),
                };
                let mut remaining = left.clone();
                for key in &keys {
                    remaining.remove(key);
                }
                Ok(Value::Complex(Complex::Map(remaining)))
            }
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn convert(
        &self,
        registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        _strict: bool,
    ) -> Result<Value, ValueError> {
        let map = Self::map(value, "conversion")?;
        match target {
            ValueKind::Map => Ok(value.clone()),
            ValueKind::Text => {
                let body = map
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, registry.to_text(value)))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(Value::Text(format!("({})", body)))
            }
            _ => Err(ValueError::ConversionFailed {
                from: value.kind(),
                to: target,
            }),
        }
    }

    /// Missing keys read as void.
    fn get_member(
        &self,
        registry: &TypeRegistry,
        value: &Value,
        key: &Value,
    ) -> Result<Value, ValueError> {
        let map = Self::map(value, "member access")?;
        Ok(map.get(&registry.to_text(key)).cloned().unwrap_or(Value::Void))
    }

    fn set_member(
        &self,
        registry: &TypeRegistry,
        target: &mut Value,
        key: &Value,
        value: Value,
    ) -> Result<(), ValueError> {
        let key = registry.to_text(key);
        Self::map_mut(target, "member assignment")?.insert(key, value);
        Ok(())
    }

    fn remove_member(
        &self,
        registry: &TypeRegistry,
        target: &mut Value,
        key: &Value,
    ) -> Result<(), ValueError> {
        let key = registry.to_text(key);
        Self::map_mut(target, "member removal")?.remove(&key);
        Ok(())
    }
}
