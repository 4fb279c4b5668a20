//! RON-authored passages.
//!
//! A story file maps passage names to step lists:
//!
//! ```ron
//! {
//!     "Start": Passage(
//!         tags: ["intro"],
//!         steps: [
//!             Text("You wake in a cloakroom. "),
//!             Link(text: "Leave", target: "Foyer"),
//!         ],
//!     ),
//! }
//! ```
//!
//! Steps compile to a [`ScriptThread`] that yields one event per call.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::core::enchant::{EnchantCommand, EnchantTarget, Enchantment};
use crate::core::library;
use crate::core::thread::{Continuation, OutputEvent, Thread, ThreadContext, ThreadError};
use crate::core::types::{CombineOp, CompareOp};
use crate::schema::passage::{Passage, PassageTable};
use crate::schema::value::Value;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid step in passage '{passage}': {reason}")]
    InvalidStep { passage: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptStep {
    Text(String),
    /// Print a variable's text form.
    Print(String),
    Set {
        var: String,
        value: Value,
    },
    /// Combine-add onto a variable; a missing variable takes the value.
    Add {
        var: String,
        value: Value,
    },
    LineBreak,
    Link {
        text: String,
        target: String,
    },
    LinkThen {
        text: String,
        steps: Vec<ScriptStep>,
    },
    BeginStyle(Vec<(String, Value)>),
    EndStyle,
    /// Run `steps` inside a hook scope named `name`.
    Hook {
        name: String,
        steps: Vec<ScriptStep>,
    },
    /// Wait for `seconds`, or for a click when absent.
    Wait {
        #[serde(default)]
        seconds: Option<f64>,
    },
    Embed {
        passage: String,
        #[serde(default)]
        parameters: Vec<Value>,
    },
    /// Print the embed parameter at this 0-based index.
    Parameter(usize),
    GoTo(String),
    If {
        var: String,
        equals: Value,
        then: Vec<ScriptStep>,
        #[serde(default)]
        otherwise: Vec<ScriptStep>,
    },
    /// Enchant `target` so that clicking it runs `steps`. Stays open until
    /// the passage ends.
    Click {
        target: EnchantTarget,
        #[serde(default)]
        command: EnchantCommand,
        steps: Vec<ScriptStep>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "Passage")]
pub struct ScriptPassage {
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<ScriptStep>,
}

/// A parsed story file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptSet {
    pub passages: BTreeMap<String, ScriptPassage>,
}

impl ScriptSet {
    pub fn load_from_ron(path: &Path) -> Result<ScriptSet, ScriptError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<ScriptSet, ScriptError> {
        let passages: BTreeMap<String, ScriptPassage> = ron::from_str(input)?;
        for (name, passage) in &passages {
            validate(name, &passage.steps)?;
        }
        Ok(ScriptSet { passages })
    }

    /// Compile every passage into a thread factory.
    pub fn into_table(self) -> PassageTable {
        self.passages
            .into_iter()
            .map(|(name, passage)| {
                let steps = passage.steps;
                Passage::new(name, passage.tags, move || {
                    Box::new(ScriptThread::new(steps.clone())) as Box<dyn Thread>
                })
            })
            .collect()
    }
}

fn validate(passage: &str, steps: &[ScriptStep]) -> Result<(), ScriptError> {
    let invalid = |reason: String| ScriptError::InvalidStep {
        passage: passage.to_string(),
        reason,
    };
    for step in steps {
        match step {
            ScriptStep::Wait { seconds: Some(s) } if !(s.is_finite() && *s >= 0.0) => {
                return Err(invalid(format!("wait of {} seconds", s)));
            }
            ScriptStep::Hook { name, .. } if name.is_empty() => {
                return Err(invalid("hook without a name".to_string()));
            }
            ScriptStep::Click {
                target: EnchantTarget::Text(pattern),
                ..
            } if pattern.is_empty() => {
                return Err(invalid("click on empty text".to_string()));
            }
            _ => {}
        }
        for nested in nested_steps(step) {
            validate(passage, nested)?;
        }
    }
    Ok(())
}

/// Step lists nested directly inside `step`.
pub fn nested_steps(step: &ScriptStep) -> Vec<&[ScriptStep]> {
    match step {
        ScriptStep::LinkThen { steps, .. }
        | ScriptStep::Hook { steps, .. }
        | ScriptStep::Click { steps, .. } => vec![steps.as_slice()],
        ScriptStep::If { then, otherwise, .. } => vec![then.as_slice(), otherwise.as_slice()],
        _ => Vec::new(),
    }
}

enum Pending {
    Step(ScriptStep),
    Event(OutputEvent),
}

/// Runs a step list lazily. Nested blocks are spliced into the queue when
/// reached, so conditions see variables as they are at that point.
pub struct ScriptThread {
    queue: VecDeque<Pending>,
}

impl ScriptThread {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            queue: steps.into_iter().map(Pending::Step).collect(),
        }
    }

    fn splice(&mut self, items: Vec<Pending>) {
        for item in items.into_iter().rev() {
            self.queue.push_front(item);
        }
    }
}

fn continuation(steps: Vec<ScriptStep>) -> Continuation {
    Continuation::new(move || Box::new(ScriptThread::new(steps.clone())) as Box<dyn Thread>)
}

impl Thread for ScriptThread {
    fn next(&mut self, ctx: &mut ThreadContext<'_>) -> Result<Option<OutputEvent>, ThreadError> {
        loop {
            let step = match self.queue.pop_front() {
                None => return Ok(None),
                Some(Pending::Event(event)) => return Ok(Some(event)),
                Some(Pending::Step(step)) => step,
            };
            let event = match step {
                ScriptStep::Text(text) => OutputEvent::text(text),
                ScriptStep::Print(var) => {
                    let value = ctx.variables().get(&var);
                    OutputEvent::text(ctx.registry().to_text(&value))
                }
                ScriptStep::Set { var, value } => {
                    ctx.variables_mut().set(var, value);
                    continue;
                }
                ScriptStep::Add { var, value } => {
                    let current = ctx.variables().get(&var);
                    let sum = if current.is_void() {
                        value
                    } else {
                        current.combine(ctx.registry(), CombineOp::Add, &value)?
                    };
                    ctx.variables_mut().set(var, sum);
                    continue;
                }
                ScriptStep::LineBreak => OutputEvent::line_break(),
                ScriptStep::Link { text, target } => OutputEvent::link(text, target),
                ScriptStep::LinkThen { text, steps } => OutputEvent::link_then(text, continuation(steps)),
                ScriptStep::BeginStyle(entries) => OutputEvent::style(entries),
                ScriptStep::EndStyle => OutputEvent::EndStyle,
                ScriptStep::Hook { name, steps } => {
                    let mut items = vec![Pending::Event(OutputEvent::hook(name))];
                    items.extend(steps.into_iter().map(Pending::Step));
                    items.push(Pending::Event(OutputEvent::EndStyle));
                    self.splice(items);
                    continue;
                }
                ScriptStep::Wait { seconds: None } => OutputEvent::wait_for_click(),
                ScriptStep::Wait { seconds: Some(seconds) } => {
                    let duration = Duration::try_from_secs_f64(seconds)
                        .map_err(|e| ThreadError::Custom(format!("wait of {} seconds: {}", seconds, e)))?;
                    OutputEvent::wait_for(duration)
                }
                ScriptStep::Embed { passage, parameters } => OutputEvent::embed_passage(passage, parameters),
                ScriptStep::Parameter(index) => {
                    let value = library::parameter(ctx, index);
                    OutputEvent::text(ctx.registry().to_text(&value))
                }
                ScriptStep::GoTo(passage) => OutputEvent::GoTo(passage),
                ScriptStep::If {
                    var,
                    equals,
                    then,
                    otherwise,
                } => {
                    let current = ctx.variables().get(&var);
                    let branch = if current.compare(ctx.registry(), CompareOp::Equal, &equals)? {
                        then
                    } else {
                        otherwise
                    };
                    self.splice(branch.into_iter().map(Pending::Step).collect());
                    continue;
                }
                ScriptStep::Click { target, command, steps } => {
                    OutputEvent::Enchant(Enchantment::new(target, command, continuation(steps)))
                }
            };
            return Ok(Some(event));
        }
    }
}
