//! Built-in services for primitive kinds, plus the format extension kinds
//! (hook references and spread markers).

use crate::core::position::Position;
use crate::core::types::{
    unsupported, CombineOp, CompareOp, TypeRegistry, TypeService, UnaryOp, ValueError,
};
use crate::schema::value::{format_number, Value, ValueKind};

fn conversion_failed(value: &Value, target: ValueKind) -> ValueError {
    ValueError::ConversionFailed {
        from: value.kind(),
        to: target,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VoidService;

impl TypeService for VoidService {
    fn kind(&self) -> ValueKind {
        ValueKind::Void
    }

    fn convert(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        strict: bool,
    ) -> Result<Value, ValueError> {
        match target {
            ValueKind::Void => Ok(Value::Void),
            ValueKind::Text if !strict => Ok(Value::text("")),
            _ => Err(conversion_failed(value, target)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberService;

impl TypeService for NumberService {
    fn kind(&self) -> ValueKind {
        ValueKind::Number
    }

    fn compare(
        &self,
        _registry: &TypeRegistry,
        op: CompareOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<bool, ValueError> {
        let a = lhs.as_number().ok_or_else(|| unsupported(lhs, op.name()))?;
        match (op, rhs) {
            (CompareOp::Equal, _) => Ok(lhs == rhs),
            (CompareOp::NotEqual, _) => Ok(lhs != rhs),
            (CompareOp::Less, Value::Number(b)) => Ok(a < *b),
            (CompareOp::LessOrEqual, Value::Number(b)) => Ok(a <= *b),
            (CompareOp::Greater, Value::Number(b)) => Ok(a > *b),
            (CompareOp::GreaterOrEqual, Value::Number(b)) => Ok(a >= *b),
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
        let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
            return Err(unsupported(lhs, op.name()));
        };
        let result = match op {
            CombineOp::Add => a + b,
            CombineOp::Subtract => a - b,
            CombineOp::Multiply => a * b,
            CombineOp::Divide | CombineOp::Modulo if *b == 0.0 => {
                return Err(ValueError::DivisionByZero)
            }
            CombineOp::Divide => a / b,
            CombineOp::Modulo => a % b,
            CombineOp::And | CombineOp::Or => return Err(unsupported(lhs, op.name())),
        };
        Ok(Value::Number(result))
    }

    fn unary(
        &self,
        _registry: &TypeRegistry,
        op: UnaryOp,
        value: &Value,
    ) -> Result<Value, ValueError> {
        let n = value.as_number().ok_or_else(|| unsupported(value, op.name()))?;
        Ok(Value::Number(match op {
            UnaryOp::Increment => n + 1.0,
            UnaryOp::Decrement => n - 1.0,
        }))
    }

    fn convert(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        strict: bool,
    ) -> Result<Value, ValueError> {
        let n = value
            .as_number()
            .ok_or_else(|| conversion_failed(value, target))?;
        match target {
            ValueKind::Number => Ok(Value::Number(n)),
            ValueKind::Text => Ok(Value::Text(format_number(n))),
            ValueKind::Bool if !strict => Ok(Value::Bool(n != 0.0)),
            _ => Err(conversion_failed(value, target)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolService;

impl TypeService for BoolService {
    fn kind(&self) -> ValueKind {
        ValueKind::Bool
    }

    fn combine(
        &self,
        _registry: &TypeRegistry,
        op: CombineOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, ValueError> {
        match (op, lhs, rhs) {
            (CombineOp::And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
            (CombineOp::Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn convert(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        strict: bool,
    ) -> Result<Value, ValueError> {
        let b = value
            .as_bool()
            .ok_or_else(|| conversion_failed(value, target))?;
        match target {
            ValueKind::Bool => Ok(Value::Bool(b)),
            ValueKind::Text => Ok(Value::Text(b.to_string())),
            ValueKind::Number if !strict => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
            _ => Err(conversion_failed(value, target)),
        }
    }
}

/// Built-in string service: lexical ordering, substring containment,
/// concatenation, and character access by position.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextService;

impl TypeService for TextService {
    fn kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn compare(
        &self,
        registry: &TypeRegistry,
        op: CompareOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<bool, ValueError> {
        let a = lhs.as_str().ok_or_else(|| unsupported(lhs, op.name()))?;
        match (op, rhs) {
            (CompareOp::Equal, _) => Ok(lhs == rhs),
            (CompareOp::NotEqual, _) => Ok(lhs != rhs),
            (CompareOp::Contains, _) => Ok(a.contains(registry.to_text(rhs).as_str())),
            (CompareOp::Less, Value::Text(b)) => Ok(a < b.as_str()),
            (CompareOp::LessOrEqual, Value::Text(b)) => Ok(a <= b.as_str()),
            (CompareOp::Greater, Value::Text(b)) => Ok(a > b.as_str()),
            (CompareOp::GreaterOrEqual, Value::Text(b)) => Ok(a >= b.as_str()),
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
        match (op, lhs, rhs) {
            (CombineOp::Add, Value::Text(a), Value::Text(b)) => Ok(Value::Text(format!("{}{}", a, b))),
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn convert(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        strict: bool,
    ) -> Result<Value, ValueError> {
        let text = value
            .as_str()
            .ok_or_else(|| conversion_failed(value, target))?;
        match target {
            ValueKind::Text => Ok(value.clone()),
            ValueKind::Number => parse_number(text, strict)
                .map(Value::Number)
                .ok_or_else(|| conversion_failed(value, target)),
            ValueKind::Bool => match text {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ if !strict => Ok(Value::Bool(!text.is_empty())),
                _ => Err(conversion_failed(value, target)),
            },
            ValueKind::List if !strict => Ok(Value::list(
                text.chars().map(|c| Value::Text(c.to_string())),
            )),
            _ => Err(conversion_failed(value, target)),
        }
    }

    fn get_member(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        key: &Value,
    ) -> Result<Value, ValueError> {
        let text = value
            .as_str()
            .ok_or_else(|| unsupported(value, "member access"))?;
        if key.as_str() == Some("length") {
            return Ok(Value::Number(text.chars().count() as f64));
        }
        let index = Position::from_value(key)?.resolve(text.chars().count())?;
        let c = text
            .chars()
            .nth(index)
            .ok_or_else(|| unsupported(value, "member access"))?;
        Ok(Value::Text(c.to_string()))
    }
}

/// Strict parsing needs the whole (trimmed) string to be a number; lossy
/// parsing takes the longest numeric prefix.
fn parse_number(text: &str, strict: bool) -> Option<f64> {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        return Some(n);
    }
    if strict {
        return None;
    }
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        let sign = i == 0 && (c == '-' || c == '+');
        if c.is_ascii_digit() || c == '.' || sign {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    (0..=end)
        .rev()
        .find_map(|cut| trimmed[..cut].parse::<f64>().ok())
}

/// Hook references compare by name and render as `?name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookService;

impl TypeService for HookService {
    fn kind(&self) -> ValueKind {
        ValueKind::Hook
    }

    fn convert(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        _strict: bool,
    ) -> Result<Value, ValueError> {
        match target {
            ValueKind::Hook => Ok(value.clone()),
            ValueKind::Text => Ok(Value::Text(value.to_string())),
            _ => Err(conversion_failed(value, target)),
        }
    }

    fn get_member(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        key: &Value,
    ) -> Result<Value, ValueError> {
        match (value.as_hook(), key.as_str()) {
            (Some(hook), Some("name")) => Ok(Value::Text(hook.name.clone())),
            _ => Err(unsupported(value, "member access")),
        }
    }
}

/// Spread markers only exist inside construction argument lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadService;

impl TypeService for SpreadService {
    fn kind(&self) -> ValueKind {
        ValueKind::Spread
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::builtin()
    }

    #[test]
    fn number_arithmetic() {
        let r = registry();
        let seven = Value::from(7);
        let two = Value::from(2);
        assert_eq!(r.combine(CombineOp::Add, &seven, &two).unwrap(), Value::from(9));
        assert_eq!(r.combine(CombineOp::Subtract, &seven, &two).unwrap(), Value::from(5));
        assert_eq!(r.combine(CombineOp::Divide, &seven, &two).unwrap(), Value::from(3.5));
        assert_eq!(r.combine(CombineOp::Modulo, &seven, &two).unwrap(), Value::from(1));
        assert_eq!(
            r.combine(CombineOp::Divide, &seven, &Value::from(0)).unwrap_err(),
            ValueError::DivisionByZero
        );
    }

    #[test]
    fn number_increment() {
        let r = registry();
        assert_eq!(r.unary(UnaryOp::Increment, &Value::from(1)).unwrap(), Value::from(2));
        assert_eq!(r.unary(UnaryOp::Decrement, &Value::from(1)).unwrap(), Value::from(0));
        assert!(r.unary(UnaryOp::Increment, &Value::text("1")).is_err());
    }

    #[test]
    fn bool_logic() {
        let r = registry();
        let t = Value::Bool(true);
        let f = Value::Bool(false);
        assert_eq!(r.combine(CombineOp::And, &t, &f).unwrap(), f);
        assert_eq!(r.combine(CombineOp::Or, &t, &f).unwrap(), t);
        assert!(r.convert(&t, ValueKind::Number, true).is_err());
        assert_eq!(r.convert(&t, ValueKind::Number, false).unwrap(), Value::from(1));
    }

    #[test]
    fn text_conversions() {
        let r = registry();
        assert_eq!(
            r.convert(&Value::text(" 42 "), ValueKind::Number, true).unwrap(),
            Value::from(42)
        );
        assert!(r.convert(&Value::text("12 apples"), ValueKind::Number, true).is_err());
        assert_eq!(
            r.convert(&Value::text("12 apples"), ValueKind::Number, false).unwrap(),
            Value::from(12)
        );
        assert!(r.convert(&Value::text("apples"), ValueKind::Number, false).is_err());
        assert!(r.convert(&Value::text("yes"), ValueKind::Bool, true).is_err());
    }

    #[test]
    fn text_indexing() {
        let r = registry();
        let word = Value::text("lantern");
        assert_eq!(r.get_member(&word, &Value::text("1st")).unwrap(), Value::text("l"));
        assert_eq!(r.get_member(&word, &Value::text("last")).unwrap(), Value::text("n"));
        assert_eq!(r.get_member(&word, &Value::from(2)).unwrap(), Value::text("a"));
        assert_eq!(r.get_member(&word, &Value::text("length")).unwrap(), Value::from(7));
        assert!(matches!(
            r.get_member(&word, &Value::text("8th")),
            Err(ValueError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn text_contains() {
        let r = registry();
        let text = Value::text("room 101");
        assert!(r.compare(CompareOp::Contains, &text, &Value::text("room")).unwrap());
        assert!(r.compare(CompareOp::Contains, &text, &Value::from(101)).unwrap());
    }

    #[test]
    fn hook_members() {
        let r = registry();
        let hook = Value::hook("door");
        assert_eq!(r.get_member(&hook, &Value::text("name")).unwrap(), Value::text("door"));
        assert_eq!(r.to_text(&hook), "?door");
    }

    #[test]
    fn spread_supports_nothing_but_equality() {
        let r = registry();
        let spread = Value::spread(Value::from(1));
        assert!(r.combine(CombineOp::Add, &spread, &spread).is_err());
        assert!(r.get_member(&spread, &Value::from(1)).is_err());
    }
}
