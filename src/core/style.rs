//! Cascading style — a stack-scoped, named multi-value map.
//!
//! A [`Style`] node holds its own values plus the child nodes currently
//! applied to it. Its merged view lists its own values first, then each
//! applied child's merged view in apply order, so the most recently applied
//! value for a name is last. Applying returns a [`StyleScope`] guard; dropping
//! the guard detaches the child and recomputes every ancestor's merged view,
//! whichever way the owning code exits.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;

use crate::schema::value::Value;

/// Style name carrying hook tags.
pub const HOOK: &str = "hook";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleError {
    #[error("style is already applied")]
    AlreadyApplied,
    #[error("a composite style cannot be applied")]
    CannotApplyComposite,
    #[error("no style scope is open")]
    NotApplied,
}

/// An immutable, detached snapshot of a merged style.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrozenStyle {
    entries: Vec<(String, Value)>,
}

impl FrozenStyle {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    /// All values recorded under `name`, oldest first.
    pub fn get(&self, name: &str) -> Vec<Value> {
        self.entries
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// The most recently applied value for `name`.
    pub fn last(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    /// True if a `hook` entry names `hook`, either as text or a hook reference.
    pub fn has_hook(&self, hook: &str) -> bool {
        self.entries.iter().any(|(key, value)| {
            key == HOOK
                && match value {
                    Value::Text(name) => name == hook,
                    other => other.as_hook().is_some_and(|h| h.name == hook),
                }
        })
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct StyleNode {
    own: Vec<(String, Value)>,
    children: Vec<Style>,
    parent: Weak<RefCell<StyleNode>>,
    merged: Vec<(String, Value)>,
}

/// A shared handle to a live style node.
#[derive(Clone)]
pub struct Style {
    node: Rc<RefCell<StyleNode>>,
}

impl Style {
    pub fn new() -> Self {
        Self::with_entries(Vec::new())
    }

    pub fn with_entries(entries: Vec<(String, Value)>) -> Self {
        let node = StyleNode {
            merged: entries.clone(),
            own: entries,
            children: Vec::new(),
            parent: Weak::new(),
        };
        Self {
            node: Rc::new(RefCell::new(node)),
        }
    }

    /// A fresh, unattached node carrying a snapshot's values.
    pub fn from_frozen(frozen: &FrozenStyle) -> Self {
        Self::with_entries(frozen.entries.clone())
    }

    /// Merge two styles into a new composite node. The operands are copied,
    /// so `a` and `b` stay independent. The result cannot be applied.
    pub fn combine(a: &Style, b: &Style) -> Style {
        let merged = Style::new();
        for operand in [a, b] {
            let copy = Style::from_frozen(&operand.freeze());
            copy.node.borrow_mut().parent = Rc::downgrade(&merged.node);
            merged.node.borrow_mut().children.push(copy);
        }
        Self::refresh(&merged.node);
        merged
    }

    /// Append a value under `name` to this node's own values.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.node.borrow_mut().own.push((name.into(), value));
        Self::refresh(&self.node);
    }

    /// The merged values for `name`, oldest first.
    pub fn get(&self, name: &str) -> Vec<Value> {
        self.node
            .borrow()
            .merged
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn freeze(&self) -> FrozenStyle {
        FrozenStyle {
            entries: self.node.borrow().merged.clone(),
        }
    }

    pub fn is_composite(&self) -> bool {
        !self.node.borrow().children.is_empty()
    }

    pub fn is_applied(&self) -> bool {
        self.node.borrow().parent.upgrade().is_some()
    }

    /// Apply `child` beneath this node until the returned scope is dropped.
    pub fn apply(&self, child: &Style) -> Result<StyleScope, StyleError> {
        if Rc::ptr_eq(&self.node, &child.node) {
            return Err(StyleError::AlreadyApplied);
        }
        {
            let inner = child.node.borrow();
            if inner.parent.upgrade().is_some() {
                return Err(StyleError::AlreadyApplied);
            }
            if !inner.children.is_empty() {
                return Err(StyleError::CannotApplyComposite);
            }
        }

        child.node.borrow_mut().parent = Rc::downgrade(&self.node);
        self.node.borrow_mut().children.push(child.clone());
        Self::refresh(&self.node);

        Ok(StyleScope {
            parent: Rc::downgrade(&self.node),
            child: child.clone(),
        })
    }

    /// Recompute merged views from `node` up to the root.
    fn refresh(node: &Rc<RefCell<StyleNode>>) {
        let mut current = Some(node.clone());
        while let Some(node) = current {
            let merged = {
                let inner = node.borrow();
                let mut merged = inner.own.clone();
                for child in &inner.children {
                    merged.extend(child.node.borrow().merged.iter().cloned());
                }
                merged
            };
            let mut inner = node.borrow_mut();
            inner.merged = merged;
            current = inner.parent.upgrade();
        }
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.node.borrow();
        f.debug_struct("Style")
            .field("own", &inner.own)
            .field("children", &inner.children.len())
            .field("merged", &inner.merged)
            .finish()
    }
}

/// Keeps a child style applied. Dropping it detaches the child.
#[must_use = "dropping the scope immediately unapplies the style"]
pub struct StyleScope {
    parent: Weak<RefCell<StyleNode>>,
    child: Style,
}

impl StyleScope {
    pub fn child(&self) -> &Style {
        &self.child
    }
}

impl Drop for StyleScope {
    fn drop(&mut self) {
        self.child.node.borrow_mut().parent = Weak::new();
        if let Some(parent) = self.parent.upgrade() {
            parent
                .borrow_mut()
                .children
                .retain(|c| !Rc::ptr_eq(&c.node, &self.child.node));
            Style::refresh(&parent);
        }
    }
}

impl fmt::Debug for StyleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleScope").field("child", &self.child).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, value: &str) -> Vec<(String, Value)> {
        vec![(name.to_string(), Value::text(value))]
    }

    #[test]
    fn applied_children_merge_in_order() {
        let root = Style::new();
        let hook = Style::with_entries(entry(HOOK, "x"));
        let color = Style::with_entries(entry("color", "red"));
        let _hook_scope = root.apply(&hook).unwrap();
        let _color_scope = root.apply(&color).unwrap();

        assert_eq!(root.get(HOOK), vec![Value::text("x")]);
        assert_eq!(root.get("color"), vec![Value::text("red")]);
    }

    #[test]
    fn dropping_scope_unapplies() {
        let root = Style::new();
        let hook = Style::with_entries(entry(HOOK, "x"));
        let color = Style::with_entries(entry("color", "red"));
        let hook_scope = root.apply(&hook).unwrap();
        let _color_scope = root.apply(&color).unwrap();

        drop(hook_scope);
        assert!(root.get(HOOK).is_empty());
        assert_eq!(root.get("color"), vec![Value::text("red")]);
        assert!(!hook.is_applied());
    }

    #[test]
    fn last_applied_value_is_last() {
        let root = Style::new();
        root.set("color", Value::text("black"));
        let red = Style::with_entries(entry("color", "red"));
        let _scope = root.apply(&red).unwrap();
        let frozen = root.freeze();
        assert_eq!(frozen.get("color").len(), 2);
        assert_eq!(frozen.last("color"), Some(&Value::text("red")));
    }

    #[test]
    fn reapplying_is_rejected() {
        let root = Style::new();
        let other = Style::new();
        let child = Style::with_entries(entry("mood", "calm"));
        let _scope = root.apply(&child).unwrap();
        assert_eq!(other.apply(&child).unwrap_err(), StyleError::AlreadyApplied);
        assert_eq!(root.apply(&root).unwrap_err(), StyleError::AlreadyApplied);
    }

    #[test]
    fn composite_cannot_be_applied() {
        let a = Style::with_entries(entry("color", "red"));
        let b = Style::with_entries(entry("font", "serif"));
        let both = Style::combine(&a, &b);
        assert!(both.is_composite());
        assert_eq!(both.get("font"), vec![Value::text("serif")]);

        let root = Style::new();
        assert_eq!(root.apply(&both).unwrap_err(), StyleError::CannotApplyComposite);
        // Operands were copied, not adopted
        assert!(!a.is_applied());
        assert!(root.apply(&a).is_ok());
    }

    #[test]
    fn nested_changes_reach_the_root() {
        let root = Style::new();
        let middle = Style::new();
        let _scope = root.apply(&middle).unwrap();
        middle.set("mood", Value::text("tense"));
        assert_eq!(root.get("mood"), vec![Value::text("tense")]);
    }

    #[test]
    fn frozen_snapshot_is_detached() {
        let root = Style::new();
        let tense = Style::with_entries(entry("mood", "tense"));
        let scope = root.apply(&tense).unwrap();
        let frozen = root.freeze();
        drop(scope);
        let calm = Style::with_entries(entry("mood", "calm"));
        let _calm_scope = root.apply(&calm).unwrap();
        assert_eq!(frozen.last("mood"), Some(&Value::text("tense")));
        assert_eq!(root.get("mood"), vec![Value::text("calm")]);
    }

    #[test]
    fn scope_released_on_error_path() {
        fn failing(root: &Style) -> Result<(), StyleError> {
            let child = Style::with_entries(entry(HOOK, "trap"));
            let _scope = root.apply(&child)?;
            Err(StyleError::NotApplied)
        }

        let root = Style::new();
        assert!(failing(&root).is_err());
        assert!(root.get(HOOK).is_empty());
    }

    #[test]
    fn frozen_hook_lookup() {
        let frozen = FrozenStyle::new(vec![
            (HOOK.to_string(), Value::text("door")),
            (HOOK.to_string(), Value::hook("window")),
        ]);
        assert!(frozen.has_hook("door"));
        assert!(frozen.has_hook("window"));
        assert!(!frozen.has_hook("roof"));
    }
}
