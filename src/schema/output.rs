//! Output records — the immutable log of what passage threads produced.

use serde::{Deserialize, Serialize};

use crate::core::enchant::EnchantCommand;
use crate::core::style::FrozenStyle;
use crate::core::thread::Continuation;
use crate::schema::value::Value;

/// One entry in the story's output log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Emission number, assigned once when the record is logged. Records an
    /// enchantment inserts later get fresh numbers, so log order is by
    /// position in the log, not by index.
    pub index: usize,
    pub name: Option<String>,
    /// Style in scope when the record was emitted.
    pub style: FrozenStyle,
    pub kind: OutputKind,
    /// Set when history is rewound or an enchantment takes the record's place.
    pub removed: bool,
    /// History entry the record belongs to.
    pub visit: usize,
    /// Action of the enchantment whose link restored or produced this
    /// record. That enchantment never matches the record again.
    #[serde(skip)]
    pub enchanted_by: Option<Continuation>,
}

impl Output {
    /// The visible text of a text or link record.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            OutputKind::Text { text } => Some(text),
            OutputKind::Link(link) => Some(&link.text),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match &self.kind {
            OutputKind::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.removed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputKind {
    Text { text: String },
    Link(Link),
    PassageEntry { name: String, tags: Vec<String> },
    Embed(EmbedMarker),
    StyleMarker { boundary: StyleBoundary, inner: FrozenStyle },
    LineBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StyleBoundary {
    Opener,
    Closer,
}

/// A link to another passage or to inline logic.
///
/// Links are identified structurally: same text, same target, same
/// continuation reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub name: Option<String>,
    pub target: Option<String>,
    #[serde(skip)]
    pub continuation: Option<Continuation>,
    /// Present on links synthesized by an enchantment.
    #[serde(skip)]
    pub enchantment: Option<EnchantLink>,
}

impl Link {
    pub fn to_passage(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            name: None,
            target: Some(target.into()),
            continuation: None,
            enchantment: None,
        }
    }

    pub fn inline(text: impl Into<String>, continuation: Continuation) -> Self {
        Self {
            text: text.into(),
            name: None,
            target: None,
            continuation: Some(continuation),
            enchantment: None,
        }
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.target == other.target
            && self.continuation == other.continuation
    }
}

/// What an enchantment link stands in for.
#[derive(Debug, Clone)]
pub struct EnchantLink {
    pub command: EnchantCommand,
    /// The enchantment's action, shared by all of its links.
    pub action: Continuation,
    /// The records the link replaced, as they were when matched.
    pub span: Vec<Output>,
}

/// Marks where an embedded passage or continuation started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedMarker {
    pub passage: Option<String>,
    pub parameters: Vec<Value>,
    #[serde(skip)]
    pub continuation: Option<Continuation>,
}

/// An output record as a thread yields it, before the engine stamps it
/// with a position and style.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDraft {
    pub name: Option<String>,
    pub kind: OutputKind,
}

impl OutputDraft {
    pub fn new(kind: OutputKind) -> Self {
        Self { name: None, kind }
    }

    pub fn named(name: impl Into<String>, kind: OutputKind) -> Self {
        Self {
            name: Some(name.into()),
            kind,
        }
    }
}
