//! The universal story value: a closed tagged union over primitives and
//! built-in/format-specific complex types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A dynamic value held by variables, collections, styles and output records.
///
/// Every `Value` owns its content outright. Cloning a complex value deep
/// copies it, so a value read out of a collection or variable can be
/// mutated freely without touching the storage it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Void,
    Number(f64),
    Bool(bool),
    Text(String),
    Complex(Complex),
}

/// Complex values. Each variant is served by exactly one type service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Complex {
    /// Ordered list; duplicates allowed.
    List(Vec<Value>),
    /// Unique set; stored in insertion order, compared order-independently.
    Set(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Reference to a named hook (`?name`).
    Hook(HookRef),
    /// Spread marker (`...value`), flattened away on collection construction.
    Spread(Box<Value>),
}

/// A reference to a named hook, used as an enchantment target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HookRef {
    pub name: String,
}

/// The concrete kind of a value, used to index the type-service registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    Void,
    Number,
    Bool,
    Text,
    List,
    Set,
    Map,
    Hook,
    Spread,
}

impl ValueKind {
    /// All kinds, in registry order.
    pub const ALL: [ValueKind; 9] = [
        Self::Void,
        Self::Number,
        Self::Bool,
        Self::Text,
        Self::List,
        Self::Set,
        Self::Map,
        Self::Hook,
        Self::Spread,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Number => "number",
            Self::Bool => "boolean",
            Self::Text => "string",
            Self::List => "array",
            Self::Set => "dataset",
            Self::Map => "datamap",
            Self::Hook => "hook reference",
            Self::Spread => "spread",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PartialEq for Complex {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len() && a.iter().all(|item| b.contains(item))
            }
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Hook(a), Self::Hook(b)) => a == b,
            (Self::Spread(a), Self::Spread(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn hook(name: impl Into<String>) -> Self {
        Self::Complex(Complex::Hook(HookRef { name: name.into() }))
    }

    pub fn spread(inner: Value) -> Self {
        Self::Complex(Complex::Spread(Box::new(inner)))
    }

    /// Build an ordered list, flattening any spread markers in `items`.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Complex(Complex::List(flatten_spread(items)))
    }

    /// Build a unique set, flattening spreads and dropping duplicates.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut unique: Vec<Value> = Vec::new();
        for item in flatten_spread(items) {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Self::Complex(Complex::Set(unique))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Void => ValueKind::Void,
            Self::Number(_) => ValueKind::Number,
            Self::Bool(_) => ValueKind::Bool,
            Self::Text(_) => ValueKind::Text,
            Self::Complex(Complex::List(_)) => ValueKind::List,
            Self::Complex(Complex::Set(_)) => ValueKind::Set,
            Self::Complex(Complex::Map(_)) => ValueKind::Map,
            Self::Complex(Complex::Hook(_)) => ValueKind::Hook,
            Self::Complex(Complex::Spread(_)) => ValueKind::Spread,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Elements of a list or set, in stored order.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Self::Complex(Complex::List(items)) | Self::Complex(Complex::Set(items)) => {
                Some(items)
            }
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Complex(Complex::Map(map)) => Some(map),
            _ => None,
        }
    }

    pub fn as_hook(&self) -> Option<&HookRef> {
        match self {
            Self::Complex(Complex::Hook(hook)) => Some(hook),
            _ => None,
        }
    }

    /// A total ordering used to sort values deterministically: by kind first,
    /// then numbers numerically, strings lexically, everything else by its
    /// display form.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => match self.kind().cmp(&other.kind()) {
                Ordering::Equal => self.to_string().cmp(&other.to_string()),
                unequal => unequal,
            },
        }
    }
}

/// Expand spread markers into the surrounding element sequence.
///
/// A spread list or set contributes its elements, a spread string its
/// characters; any other spread value contributes itself.
pub fn flatten_spread(items: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut flat = Vec::new();
    for item in items {
        match item {
            Value::Complex(Complex::Spread(inner)) => match *inner {
                Value::Complex(Complex::List(inner_items))
                | Value::Complex(Complex::Set(inner_items)) => flat.extend(inner_items),
                Value::Text(text) => flat.extend(text.chars().map(|c| Value::Text(c.to_string()))),
                other => flat.push(other),
            },
            other => flat.push(other),
        }
    }
    flat
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Complex> for Value {
    fn from(complex: Complex) -> Self {
        Self::Complex(complex)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => Ok(()),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Text(text) => f.write_str(text),
            Self::Complex(Complex::List(items)) => write_joined(f, items.iter()),
            Self::Complex(Complex::Set(items)) => {
                let mut sorted: Vec<&Value> = items.iter().collect();
                sorted.sort_by(|a, b| a.total_cmp(b));
                write_joined(f, sorted.into_iter())
            }
            Self::Complex(Complex::Map(map)) => {
                f.write_str("(")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str(")")
            }
            Self::Complex(Complex::Hook(hook)) => write!(f, "?{}", hook.name),
            Self::Complex(Complex::Spread(inner)) => write!(f, "...{}", inner),
        }
    }
}

fn write_joined<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a Value>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Render a number the way story text shows it: integral values without a
/// fractional part, and no negative zero.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    n.to_string()
}
