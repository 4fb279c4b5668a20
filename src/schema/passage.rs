//! Passages and the passage table.

use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::core::thread::{OutputEvent, Sequence, Thread, ThreadFactory};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassageError {
    #[error("unknown passage: {0}")]
    UnknownPassage(String),
    #[error("passage name '{name}' is ambiguous ({count} passages share it)")]
    DuplicatePassageLookup { name: String, count: usize },
}

/// A named, tagged unit of compiled narrative logic.
#[derive(Clone)]
pub struct Passage {
    pub name: String,
    pub tags: Vec<String>,
    factory: ThreadFactory,
}

impl Passage {
    pub fn new<F>(name: impl Into<String>, tags: Vec<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Thread> + 'static,
    {
        Self {
            name: name.into(),
            tags,
            factory: Rc::new(factory),
        }
    }

    /// A passage whose thread replays a fixed list of events.
    pub fn from_events(name: impl Into<String>, tags: Vec<String>, events: Vec<OutputEvent>) -> Self {
        Self::new(name, tags, move || {
            Box::new(Sequence::from(events.clone())) as Box<dyn Thread>
        })
    }

    /// Open a fresh thread for this passage.
    pub fn open(&self) -> Box<dyn Thread> {
        (self.factory)()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl fmt::Debug for Passage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passage")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// All passages of a story, built once before execution begins.
///
/// The table keeps every passage it is given, even when names repeat;
/// looking up a repeated name is an error rather than a silent pick.
#[derive(Debug, Clone, Default)]
pub struct PassageTable {
    passages: Vec<Passage>,
    index: FxHashMap<String, Vec<usize>>,
}

impl PassageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, passage: Passage) {
        self.index
            .entry(passage.name.clone())
            .or_default()
            .push(self.passages.len());
        self.passages.push(passage);
    }

    pub fn get(&self, name: &str) -> Result<&Passage, PassageError> {
        match self.index.get(name).map(Vec::as_slice) {
            None | Some([]) => Err(PassageError::UnknownPassage(name.to_string())),
            Some([only]) => Ok(&self.passages[*only]),
            Some(many) => Err(PassageError::DuplicatePassageLookup {
                name: name.to_string(),
                count: many.len(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Move every passage of `other` into this table.
    pub fn merge(&mut self, other: PassageTable) {
        for passage in other.passages {
            self.insert(passage);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Passage> {
        self.passages.iter()
    }

    /// Distinct passage names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

impl FromIterator<Passage> for PassageTable {
    fn from_iter<I: IntoIterator<Item = Passage>>(iter: I) -> Self {
        let mut table = Self::new();
        for passage in iter {
            table.insert(passage);
        }
        table
    }
}
