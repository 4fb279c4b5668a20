//! Threads — lazy, suspendable sequences of output events.
//!
//! A passage's compiled logic is a [`Thread`]: each call to
//! [`Thread::next`] runs the logic up to its next yield point and hands the
//! engine one [`OutputEvent`]. The engine is the only scheduler; a thread
//! never runs except inside that call.

use rand::rngs::StdRng;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

use crate::core::engine::HistoryEntry;
use crate::core::enchant::Enchantment;
use crate::core::style::{Style, StyleError, HOOK};
use crate::core::types::{TypeRegistry, ValueError};
use crate::core::variables::Variables;
use crate::schema::output::{Link, Output, OutputDraft, OutputKind};
use crate::schema::passage::PassageError;
use crate::schema::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThreadError {
    #[error("value error: {0}")]
    Value(#[from] ValueError),
    #[error("style error: {0}")]
    Style(#[from] StyleError),
    #[error("passage error: {0}")]
    Passage(#[from] PassageError),
    #[error("embed depth exceeded {0}")]
    EmbedDepthExceeded(usize),
    #[error("no enchantment is open")]
    UnbalancedEnchant,
    #[error("{0}")]
    Custom(String),
}

/// Produces a fresh thread each time a passage or continuation is entered.
pub type ThreadFactory = Rc<dyn Fn() -> Box<dyn Thread>>;

/// The lazy output sequence of a passage, embed or continuation.
pub trait Thread {
    /// Run to the next yield point. `Ok(None)` means the thread is exhausted.
    fn next(&mut self, ctx: &mut ThreadContext<'_>) -> Result<Option<OutputEvent>, ThreadError>;
}

/// A reference to inline passage logic, e.g. the body behind a link.
///
/// Two continuations are equal only if they are the same reference.
#[derive(Clone)]
pub struct Continuation {
    factory: ThreadFactory,
}

impl Continuation {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Thread> + 'static,
    {
        Self {
            factory: Rc::new(factory),
        }
    }

    pub fn from_factory(factory: ThreadFactory) -> Self {
        Self { factory }
    }

    /// A continuation that replays a fixed list of events.
    pub fn from_events(events: Vec<OutputEvent>) -> Self {
        Self::new(move || Box::new(Sequence::from(events.clone())) as Box<dyn Thread>)
    }

    pub fn spawn(&self) -> Box<dyn Thread> {
        (self.factory)()
    }
}

impl PartialEq for Continuation {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.factory, &other.factory)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Continuation({:p})", Rc::as_ptr(&self.factory))
    }
}

/// How a paused thread expects to be resumed.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitKind {
    /// Resume after a duration has elapsed (the host keeps the clock).
    Timed,
    /// Resume on a player click.
    Click,
    /// Any other host-defined gate.
    Host(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wait {
    pub kind: WaitKind,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbedSource {
    Passage(String),
    Continuation(Continuation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub source: EmbedSource,
    pub parameters: Vec<Value>,
}

/// What a thread hands the engine at each yield point.
#[derive(Debug, Clone)]
pub enum OutputEvent {
    Emit(OutputDraft),
    BeginStyle(Vec<(String, Value)>),
    EndStyle,
    Wait(Wait),
    Embed(Embed),
    /// Leave the current passage for another one.
    GoTo(String),
    /// Apply an enchantment until the matching `EndEnchant` (or thread end).
    Enchant(Enchantment),
    EndEnchant,
}

impl OutputEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Emit(OutputDraft::new(OutputKind::Text { text: text.into() }))
    }

    pub fn line_break() -> Self {
        Self::Emit(OutputDraft::new(OutputKind::LineBreak))
    }

    pub fn link(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Emit(OutputDraft::new(OutputKind::Link(Link::to_passage(text, target))))
    }

    pub fn link_then(text: impl Into<String>, continuation: Continuation) -> Self {
        Self::Emit(OutputDraft::new(OutputKind::Link(Link::inline(text, continuation))))
    }

    pub fn style(entries: Vec<(String, Value)>) -> Self {
        Self::BeginStyle(entries)
    }

    /// Open a hook scope named `name`.
    pub fn hook(name: impl Into<String>) -> Self {
        Self::BeginStyle(vec![(HOOK.to_string(), Value::Text(name.into()))])
    }

    pub fn wait_for(duration: Duration) -> Self {
        Self::Wait(Wait {
            kind: WaitKind::Timed,
            duration: Some(duration),
        })
    }

    pub fn wait_for_click() -> Self {
        Self::Wait(Wait {
            kind: WaitKind::Click,
            duration: None,
        })
    }

    pub fn embed_passage(name: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self::Embed(Embed {
            source: EmbedSource::Passage(name.into()),
            parameters,
        })
    }

    pub fn embed(continuation: Continuation, parameters: Vec<Value>) -> Self {
        Self::Embed(Embed {
            source: EmbedSource::Continuation(continuation),
            parameters,
        })
    }
}

/// Everything a thread may see or touch while it runs.
pub struct ThreadContext<'a> {
    pub(crate) registry: &'a TypeRegistry,
    pub(crate) variables: &'a mut Variables,
    pub(crate) style: &'a Style,
    pub(crate) output: &'a [Output],
    pub(crate) cursor: usize,
    pub(crate) history: &'a [HistoryEntry],
    pub(crate) rng: &'a mut StdRng,
    pub(crate) passage: &'a str,
}

impl<'a> ThreadContext<'a> {
    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn variables(&self) -> &Variables {
        &*self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut *self.variables
    }

    /// The live style at this point of execution.
    pub fn style(&self) -> &'a Style {
        self.style
    }

    /// The output log before the current insertion point.
    pub fn output(&self) -> &[Output] {
        &self.output[..self.cursor]
    }

    pub fn history(&self) -> &'a [HistoryEntry] {
        self.history
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }

    /// Name of the passage this thread belongs to.
    pub fn passage(&self) -> &str {
        self.passage
    }
}

impl fmt::Debug for ThreadContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("passage", &self.passage)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

type StepFn = Box<dyn FnMut(&mut ThreadContext<'_>) -> Result<Vec<OutputEvent>, ThreadError>>;

enum Step {
    Event(OutputEvent),
    Run(StepFn),
}

/// A step-driven thread: fixed events interleaved with logic that runs
/// lazily, only when the sequence reaches it.
#[derive(Default)]
pub struct Sequence {
    steps: VecDeque<Step>,
    pending: VecDeque<OutputEvent>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, event: OutputEvent) -> Self {
        self.steps.push_back(Step::Event(event));
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.event(OutputEvent::text(text))
    }

    pub fn link(self, text: impl Into<String>, target: impl Into<String>) -> Self {
        self.event(OutputEvent::link(text, target))
    }

    /// Run `step` when reached; the events it returns are yielded in order.
    pub fn run<F>(mut self, step: F) -> Self
    where
        F: FnMut(&mut ThreadContext<'_>) -> Result<Vec<OutputEvent>, ThreadError> + 'static,
    {
        self.steps.push_back(Step::Run(Box::new(step)));
        self
    }
}

impl From<Vec<OutputEvent>> for Sequence {
    fn from(events: Vec<OutputEvent>) -> Self {
        Self {
            steps: events.into_iter().map(Step::Event).collect(),
            pending: VecDeque::new(),
        }
    }
}

impl Thread for Sequence {
    fn next(&mut self, ctx: &mut ThreadContext<'_>) -> Result<Option<OutputEvent>, ThreadError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            match self.steps.pop_front() {
                None => return Ok(None),
                Some(Step::Event(event)) => return Ok(Some(event)),
                Some(Step::Run(mut step)) => self.pending.extend(step(ctx)?),
            }
        }
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("steps", &self.steps.len())
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sequence_runs_steps_lazily() {
        let registry = TypeRegistry::builtin();
        let mut variables = Variables::new();
        let style = Style::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = ThreadContext {
            registry: &registry,
            variables: &mut variables,
            style: &style,
            output: &[],
            cursor: 0,
            history: &[],
            rng: &mut rng,
            passage: "test",
        };

        let mut seq = Sequence::new()
            .text("before")
            .run(|ctx| {
                ctx.variables_mut().set("ran", Value::Bool(true));
                Ok(vec![OutputEvent::text("one"), OutputEvent::text("two")])
            })
            .text("after");

        assert!(matches!(seq.next(&mut ctx).unwrap(), Some(OutputEvent::Emit(_))));
        assert!(!ctx.variables().contains("ran"));

        let mut rest = 0;
        while seq.next(&mut ctx).unwrap().is_some() {
            rest += 1;
        }
        assert_eq!(rest, 3);
        assert_eq!(ctx.variables().get("ran"), Value::Bool(true));
    }

    #[test]
    fn continuation_identity() {
        let a = Continuation::from_events(vec![OutputEvent::text("x")]);
        let b = Continuation::from_events(vec![OutputEvent::text("x")]);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
