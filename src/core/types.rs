//! Type services — per-kind operator and member-access capability tables.
//!
//! Every [`ValueKind`] is served by exactly one [`TypeService`]. Services are
//! held in a [`TypeRegistry`] owned by the story and passed by reference to
//! anything that evaluates values. A format can override a built-in
//! service (for example a custom string service); the last registration for
//! a kind wins.

use std::fmt;
use thiserror::Error;

use crate::core::collections::{ListService, MapService, SetService};
use crate::core::primitives::{
    BoolService, HookService, NumberService, SpreadService, TextService, VoidService,
};
use crate::schema::value::{Value, ValueKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("{kind} does not support {operation}")]
    TypeOperationUnsupported {
        kind: ValueKind,
        operation: &'static str,
    },
    #[error("position '{position}' is out of range for length {len}")]
    PositionOutOfRange { position: String, len: usize },
    #[error("'{0}' is not a valid position")]
    InvalidPosition(String),
    #[error("key/value construction needs an even number of arguments, got {0}")]
    InvalidConstructionArity(usize),
    #[error("division by zero")]
    DivisionByZero,
    #[error("cannot convert {from} to {to}")]
    ConversionFailed { from: ValueKind, to: ValueKind },
}

/// Shorthand for the error every unimplemented capability returns.
pub fn unsupported(value: &Value, operation: &'static str) -> ValueError {
    ValueError::TypeOperationUnsupported {
        kind: value.kind(),
        operation,
    }
}

/// Comparison operators, including containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// `lhs contains rhs`.
    Contains,
}

impl CompareOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Equal => "is",
            Self::NotEqual => "is not",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Contains => "contains",
        }
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::Less | Self::LessOrEqual | Self::Greater | Self::GreaterOrEqual
        )
    }
}

/// Binary combination operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombineOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
}

impl CombineOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Increment,
    Decrement,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }
}

/// The capability table for one concrete value kind.
///
/// Capabilities a kind does not implement keep the default body and fail
/// with [`ValueError::TypeOperationUnsupported`]. Equality is the exception:
/// values compare structurally by default.
pub trait TypeService {
    /// The kind this service serves.
    fn kind(&self) -> ValueKind;

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
            _ => Err(unsupported(lhs, op.name())),
        }
    }

    fn combine(
        &self,
        _registry: &TypeRegistry,
        op: CombineOp,
        lhs: &Value,
        _rhs: &Value,
    ) -> Result<Value, ValueError> {
        Err(unsupported(lhs, op.name()))
    }

    fn unary(
        &self,
        _registry: &TypeRegistry,
        op: UnaryOp,
        value: &Value,
    ) -> Result<Value, ValueError> {
        Err(unsupported(value, op.name()))
    }

    /// Convert `value` to `target`. A strict conversion fails where a lossy
    /// one would approximate.
    fn convert(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        target: ValueKind,
        _strict: bool,
    ) -> Result<Value, ValueError> {
        if value.kind() == target {
            return Ok(value.clone());
        }
        Err(ValueError::ConversionFailed {
            from: value.kind(),
            to: target,
        })
    }

    fn get_member(
        &self,
        _registry: &TypeRegistry,
        value: &Value,
        _key: &Value,
    ) -> Result<Value, ValueError> {
        Err(unsupported(value, "member access"))
    }

    fn set_member(
        &self,
        _registry: &TypeRegistry,
        target: &mut Value,
        _key: &Value,
        _value: Value,
    ) -> Result<(), ValueError> {
        Err(unsupported(target, "member assignment"))
    }

    fn remove_member(
        &self,
        _registry: &TypeRegistry,
        target: &mut Value,
        _key: &Value,
    ) -> Result<(), ValueError> {
        Err(unsupported(target, "member removal"))
    }
}

/// Kind-indexed dispatch table of type services.
pub struct TypeRegistry {
    services: Vec<Box<dyn TypeService>>,
}

impl TypeRegistry {
    /// The built-in services for every kind.
    pub fn builtin() -> Self {
        let services: Vec<Box<dyn TypeService>> = vec![
            Box::new(VoidService),
            Box::new(NumberService),
            Box::new(BoolService),
            Box::new(TextService),
            Box::new(ListService),
            Box::new(SetService),
            Box::new(MapService),
            Box::new(HookService),
            Box::new(SpreadService),
        ];
        Self { services }
    }

    /// Replace the service for the kind `service` declares.
    pub fn register(&mut self, service: Box<dyn TypeService>) {
        let index = service.kind().index();
        self.services[index] = service;
    }

    pub fn service(&self, kind: ValueKind) -> &dyn TypeService {
        self.services[kind.index()].as_ref()
    }

    /// Compare two values with the left-hand value's service.
    ///
    /// When the service does not support a mixed-kind ordering, the
    /// right-hand side is coerced (lossy) to the left-hand kind and the
    /// comparison retried, so `"10" > 9` and `10 > "9"` both work.
    pub fn compare(&self, op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, ValueError> {
        let service = self.service(lhs.kind());
        match service.compare(self, op, lhs, rhs) {
            Err(err @ ValueError::TypeOperationUnsupported { .. })
                if op.is_ordering() && lhs.kind() != rhs.kind() =>
            {
                match self.convert(rhs, lhs.kind(), false) {
                    Ok(coerced) => service.compare(self, op, lhs, &coerced),
                    Err(_) => Err(err),
                }
            }
            other => other,
        }
    }

    /// Combine two values with the left-hand value's service.
    ///
    /// Adding a string to a primitive (or a primitive to a string) falls
    /// back to concatenating their text forms.
    pub fn combine(&self, op: CombineOp, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
        match self.service(lhs.kind()).combine(self, op, lhs, rhs) {
            Err(err @ ValueError::TypeOperationUnsupported { .. }) if op == CombineOp::Add => {
                let text_involved =
                    lhs.kind() == ValueKind::Text || rhs.kind() == ValueKind::Text;
                if text_involved && is_primitive(lhs) && is_primitive(rhs) {
                    Ok(Value::Text(format!("{}{}", self.to_text(lhs), self.to_text(rhs))))
                } else {
                    Err(err)
                }
            }
            other => other,
        }
    }

    pub fn unary(&self, op: UnaryOp, value: &Value) -> Result<Value, ValueError> {
        self.service(value.kind()).unary(self, op, value)
    }

    pub fn convert(
        &self,
        value: &Value,
        target: ValueKind,
        strict: bool,
    ) -> Result<Value, ValueError> {
        self.service(value.kind()).convert(self, value, target, strict)
    }

    pub fn get_member(&self, value: &Value, key: &Value) -> Result<Value, ValueError> {
        self.service(value.kind()).get_member(self, value, key)
    }

    pub fn set_member(&self, target: &mut Value, key: &Value, value: Value) -> Result<(), ValueError> {
        let kind = target.kind();
        self.service(kind).set_member(self, target, key, value)
    }

    pub fn remove_member(&self, target: &mut Value, key: &Value) -> Result<(), ValueError> {
        let kind = target.kind();
        self.service(kind).remove_member(self, target, key)
    }

    /// The text form of a value, as its (possibly overridden) service
    /// renders it. Falls back to the built-in display form.
    pub fn to_text(&self, value: &Value) -> String {
        match self.convert(value, ValueKind::Text, false) {
            Ok(Value::Text(text)) => text,
            _ => value.to_string(),
        }
    }

    /// Lossy conversion to a number.
    pub fn to_number(&self, value: &Value) -> Result<f64, ValueError> {
        match self.convert(value, ValueKind::Number, false)? {
            Value::Number(n) => Ok(n),
            other => Err(ValueError::ConversionFailed {
                from: other.kind(),
                to: ValueKind::Number,
            }),
        }
    }
}

fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::Bool(_) | Value::Text(_))
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.services.iter().map(|s| s.kind()))
            .finish()
    }
}

/// Operator entry points on values, dispatched through a registry.
impl Value {
    pub fn compare(&self, registry: &TypeRegistry, op: CompareOp, other: &Value) -> Result<bool, ValueError> {
        registry.compare(op, self, other)
    }

    pub fn combine(&self, registry: &TypeRegistry, op: CombineOp, other: &Value) -> Result<Value, ValueError> {
        registry.combine(op, self, other)
    }

    pub fn unary(&self, registry: &TypeRegistry, op: UnaryOp) -> Result<Value, ValueError> {
        registry.unary(op, self)
    }

    pub fn convert_to(&self, registry: &TypeRegistry, target: ValueKind, strict: bool) -> Result<Value, ValueError> {
        registry.convert(self, target, strict)
    }

    /// Read a member. The result is always an independent copy.
    pub fn get_member(&self, registry: &TypeRegistry, key: &Value) -> Result<Value, ValueError> {
        registry.get_member(self, key)
    }

    pub fn set_member(&mut self, registry: &TypeRegistry, key: &Value, value: Value) -> Result<(), ValueError> {
        registry.set_member(self, key, value)
    }

    pub fn remove_member(&mut self, registry: &TypeRegistry, key: &Value) -> Result<(), ValueError> {
        registry.remove_member(self, key)
    }
}
