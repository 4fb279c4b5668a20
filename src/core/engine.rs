//! The story engine: Passage → Thread → Output orchestration.
//!
//! Looks up passages, drives their threads one event at a time, stamps each
//! emitted record with a frozen copy of the live style, and keeps the
//! history of visited passages.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::enchant::{
    hook_segments, link_for, span_text, split_text, text_matches, EnchantCommand, EnchantTarget,
    Enchantment, TextSegment,
};
use crate::core::script::{ScriptError, ScriptSet};
use crate::core::style::{Style, StyleError, StyleScope};
use crate::core::thread::{
    Continuation, Embed, EmbedSource, OutputEvent, Thread, ThreadContext, ThreadError, Wait,
};
use crate::core::types::{TypeRegistry, TypeService};
use crate::core::variables::Variables;
use crate::schema::output::{EmbedMarker, Link, Output, OutputKind, StyleBoundary};
use crate::schema::passage::{PassageError, PassageTable};

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("passage error: {0}")]
    Passage(#[from] PassageError),
    #[error("style error: {0}")]
    Style(#[from] StyleError),
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("fault in passage '{passage}': {source}")]
    Thread {
        passage: String,
        #[source]
        source: ThreadError,
    },
    #[error("link '{0}' has neither a target passage nor a continuation")]
    InvalidLink(String),
    #[error("link '{0}' is no longer in the output")]
    StaleLink(String),
    #[error("history index {index} is out of range for {len} entries")]
    InvalidHistoryIndex { index: usize, len: usize },
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: StoryState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoryState {
    Idle,
    Playing,
    Paused,
    Complete,
}

/// One visited passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub passage: String,
    /// Position of the passage's entry record in the output log.
    pub output_start: usize,
    /// Variables as they were when the passage was entered.
    pub variables: Variables,
}

/// Change notifications delivered to subscribers.
#[derive(Debug)]
pub enum StoryEvent<'a> {
    OutputAppended(&'a Output),
    OutputRemoved(&'a Output),
    StateChanged { from: StoryState, to: StoryState },
}

pub type Listener = Box<dyn FnMut(&StoryEvent<'_>)>;

/// Engine settings, loadable from RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryConfig {
    pub seed: u64,
    /// Pump threads automatically after Begin/Advance/Resume. When off, the
    /// host drives execution with [`Story::step`].
    pub auto_pump: bool,
    pub max_embed_depth: usize,
    pub start_passage: Option<String>,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            auto_pump: true,
            max_embed_depth: 64,
            start_passage: None,
        }
    }
}

impl StoryConfig {
    pub fn load_from_ron(path: &Path) -> Result<StoryConfig, StoryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<StoryConfig, StoryError> {
        Ok(ron::from_str(input)?)
    }
}

/// A running thread and the scopes it holds open.
struct Frame {
    thread: Box<dyn Thread>,
    passage: String,
    /// History entry that owns what this thread emits.
    visit: usize,
    styles: Vec<StyleScope>,
    enchantments: Vec<Enchantment>,
    /// Frozen style re-applied around an enchantment action; detached when
    /// the frame finishes.
    context: Option<StyleScope>,
    /// Set on an enchantment action's frame.
    enchanted_by: Option<Continuation>,
    /// Insertion point to restore when this frame finishes.
    saved_cursor: Option<Option<usize>>,
    /// Wait to fall back into when this frame finishes.
    restore_wait: Option<Wait>,
}

impl Frame {
    fn new(thread: Box<dyn Thread>, passage: String, visit: usize) -> Self {
        Self {
            thread,
            passage,
            visit,
            styles: Vec::new(),
            enchantments: Vec::new(),
            context: None,
            enchanted_by: None,
            saved_cursor: None,
            restore_wait: None,
        }
    }
}

/// The top-level story engine. Built via `Story::builder()`.
pub struct Story {
    passages: PassageTable,
    registry: TypeRegistry,
    config: StoryConfig,
    variables: Variables,
    style: Style,
    output: Vec<Output>,
    history: Vec<HistoryEntry>,
    state: StoryState,
    frames: Vec<Frame>,
    /// Where new records go; `None` appends at the end of the log.
    cursor: Option<usize>,
    next_index: usize,
    pending_wait: Option<Wait>,
    rng: StdRng,
    listeners: Vec<Listener>,
}

impl Story {
    pub fn builder() -> StoryBuilder {
        StoryBuilder::default()
    }

    pub fn state(&self) -> StoryState {
        self.state
    }

    /// The full output log, including removed records.
    pub fn output(&self) -> &[Output] {
        &self.output
    }

    pub fn live_output(&self) -> impl Iterator<Item = &Output> {
        self.output.iter().filter(|record| !record.removed)
    }

    /// Links currently present in the output, in log order.
    pub fn links(&self) -> Vec<&Link> {
        self.live_output().filter_map(Output::as_link).collect()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn history_names(&self) -> Vec<&str> {
        self.history.iter().map(|entry| entry.passage.as_str()).collect()
    }

    pub fn current_passage(&self) -> Option<&str> {
        self.history.last().map(|entry| entry.passage.as_str())
    }

    pub fn current_style(&self) -> &Style {
        &self.style
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn passages(&self) -> &PassageTable {
        &self.passages
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    pub fn pending_wait(&self) -> Option<&Wait> {
        self.pending_wait.as_ref()
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&StoryEvent<'_>) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Enter `passage` and start playing it.
    pub fn begin(&mut self, passage: &str) -> Result<(), StoryError> {
        self.enter_passage(passage)?;
        self.set_state(StoryState::Playing);
        self.run()
    }

    /// Begin at the configured start passage, or `Start`.
    pub fn begin_default(&mut self) -> Result<(), StoryError> {
        let start = self
            .config
            .start_passage
            .clone()
            .unwrap_or_else(|| "Start".to_string());
        self.begin(&start)
    }

    /// Trigger a link: enter its target passage, run its continuation, or
    /// fire the enchantment it stands for.
    pub fn advance(&mut self, link: &Link) -> Result<(), StoryError> {
        if link.enchantment.is_some() {
            self.trigger_enchantment(link)?;
        } else if let Some(target) = &link.target {
            self.enter_passage(target)?;
        } else if let Some(continuation) = &link.continuation {
            let label = self.current_passage().unwrap_or_default().to_string();
            let visit = self.current_visit();
            let mut frame = Frame::new(continuation.spawn(), label, visit);
            frame.restore_wait = self.take_wait();
            self.frames.push(frame);
        } else {
            return Err(StoryError::InvalidLink(link.text.clone()));
        }
        debug!(link = %link.text, "advanced");
        self.set_state(StoryState::Playing);
        self.run()
    }

    pub fn pause(&mut self) -> Result<(), StoryError> {
        match self.state {
            StoryState::Playing => {
                self.set_state(StoryState::Paused);
                Ok(())
            }
            StoryState::Paused => Ok(()),
            state => Err(StoryError::InvalidState {
                operation: "pause",
                state,
            }),
        }
    }

    pub fn resume(&mut self) -> Result<(), StoryError> {
        if self.state != StoryState::Paused {
            return Err(StoryError::InvalidState {
                operation: "resume",
                state: self.state,
            });
        }
        self.pending_wait = None;
        self.set_state(StoryState::Playing);
        self.run()
    }

    /// Undo back to history entry `index`. Later entries are dropped, the
    /// records they own are tombstoned, and variables return to their
    /// values at the moment the kept passage was left.
    pub fn rewind(&mut self, index: usize) -> Result<(), StoryError> {
        let len = self.history.len();
        if index >= len {
            return Err(StoryError::InvalidHistoryIndex { index, len });
        }
        if index + 1 == len {
            return Ok(());
        }

        let dropped = self.history.split_off(index + 1);
        self.variables = dropped[0].variables.clone();
        for position in 0..self.output.len() {
            if self.output[position].visit > index {
                self.tombstone(position);
            }
        }
        self.frames.clear();
        self.cursor = None;
        self.pending_wait = None;
        debug!(to = index, dropped = dropped.len(), "rewound history");
        self.set_state(StoryState::Complete);
        Ok(())
    }

    /// Pump until the story pauses, completes or faults.
    pub fn pump(&mut self) -> Result<(), StoryError> {
        while self.step()? {}
        Ok(())
    }

    /// Pull and handle exactly one event from the innermost thread.
    /// Returns whether the story is still playing.
    pub fn step(&mut self) -> Result<bool, StoryError> {
        if self.state != StoryState::Playing {
            return Ok(false);
        }

        let cursor = self.cursor.unwrap_or(self.output.len());
        let polled = match self.frames.last_mut() {
            None => None,
            Some(frame) => {
                let mut ctx = ThreadContext {
                    registry: &self.registry,
                    variables: &mut self.variables,
                    style: &self.style,
                    output: &self.output,
                    cursor,
                    history: &self.history,
                    rng: &mut self.rng,
                    passage: &frame.passage,
                };
                Some(frame.thread.next(&mut ctx))
            }
        };

        match polled {
            None => self.set_state(StoryState::Complete),
            Some(Ok(Some(event))) => {
                if let Err(source) = self.handle(event) {
                    return Err(self.fault(source));
                }
            }
            Some(Ok(None)) => self.finish_frame(),
            Some(Err(source)) => return Err(self.fault(source)),
        }
        Ok(self.state == StoryState::Playing)
    }

    fn run(&mut self) -> Result<(), StoryError> {
        if self.config.auto_pump {
            self.pump()
        } else {
            Ok(())
        }
    }

    fn handle(&mut self, event: OutputEvent) -> Result<(), ThreadError> {
        match event {
            OutputEvent::Emit(draft) => {
                self.emit(draft.name, draft.kind);
            }
            OutputEvent::BeginStyle(entries) => {
                let child = Style::with_entries(entries);
                let scope = self.style.apply(&child)?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.styles.push(scope);
                }
                self.emit(
                    None,
                    OutputKind::StyleMarker {
                        boundary: StyleBoundary::Opener,
                        inner: child.freeze(),
                    },
                );
            }
            OutputEvent::EndStyle => {
                let scope = self
                    .frames
                    .last_mut()
                    .and_then(|frame| frame.styles.pop())
                    .ok_or(StyleError::NotApplied)?;
                self.close_style(scope);
            }
            OutputEvent::Wait(wait) => {
                debug!(?wait, "thread is waiting");
                self.pending_wait = Some(wait);
                self.set_state(StoryState::Paused);
            }
            OutputEvent::Embed(embed) => self.embed(embed)?,
            OutputEvent::GoTo(passage) => self.enter_passage(&passage)?,
            OutputEvent::Enchant(enchantment) => {
                self.enchant(&enchantment, self.current_visit());
                if let Some(frame) = self.frames.last_mut() {
                    frame.enchantments.push(enchantment);
                }
            }
            OutputEvent::EndEnchant => {
                let enchantment = self
                    .frames
                    .last_mut()
                    .and_then(|frame| frame.enchantments.pop())
                    .ok_or(ThreadError::UnbalancedEnchant)?;
                // Cover whatever was emitted while it was open
                self.enchant(&enchantment, self.current_visit());
            }
        }
        Ok(())
    }

    fn enter_passage(&mut self, name: &str) -> Result<(), PassageError> {
        let passage = self.passages.get(name)?;
        let name = passage.name.clone();
        let tags = passage.tags.clone();
        let thread = passage.open();
        debug!(passage = %name, "entering passage");

        self.frames.clear();
        self.cursor = None;
        self.pending_wait = None;
        self.history.push(HistoryEntry {
            passage: name.clone(),
            output_start: self.output.len(),
            variables: self.variables.clone(),
        });
        self.emit(
            None,
            OutputKind::PassageEntry {
                name: name.clone(),
                tags,
            },
        );
        let visit = self.current_visit();
        self.frames.push(Frame::new(thread, name, visit));
        Ok(())
    }

    fn embed(&mut self, embed: Embed) -> Result<(), ThreadError> {
        let limit = self.config.max_embed_depth;
        if self.frames.len() >= limit {
            return Err(ThreadError::EmbedDepthExceeded(limit));
        }

        let (thread, label, marker) = match embed.source {
            EmbedSource::Passage(name) => {
                let passage = self.passages.get(&name)?;
                let marker = EmbedMarker {
                    passage: Some(name),
                    parameters: embed.parameters,
                    continuation: None,
                };
                (passage.open(), passage.name.clone(), marker)
            }
            EmbedSource::Continuation(continuation) => {
                let label = self
                    .frames
                    .last()
                    .map(|frame| frame.passage.clone())
                    .unwrap_or_default();
                let marker = EmbedMarker {
                    passage: None,
                    parameters: embed.parameters,
                    continuation: Some(continuation.clone()),
                };
                (continuation.spawn(), label, marker)
            }
        };
        debug!(passage = %label, depth = self.frames.len(), "embedding thread");
        self.emit(None, OutputKind::Embed(marker));
        let frame = Frame::new(thread, label, self.current_visit());
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the innermost frame after its thread is exhausted.
    ///
    /// Open enchantments are rescanned before open styles are closed, so the
    /// closing markers are never matched on their own.
    fn finish_frame(&mut self) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        let visit = frame.visit;
        let enchantments = std::mem::take(&mut frame.enchantments);
        for enchantment in enchantments.iter().rev() {
            self.enchant(enchantment, visit);
        }
        while let Some(scope) = self.frames.last_mut().and_then(|frame| frame.styles.pop()) {
            self.close_style(scope);
        }

        let Some(mut frame) = self.frames.pop() else {
            return;
        };
        drop(frame.context.take());
        if let Some(saved) = frame.saved_cursor.take() {
            self.cursor = saved;
        }
        let restore_wait = frame.restore_wait.take();
        drop(frame);

        if self.frames.is_empty() {
            self.set_state(StoryState::Complete);
        } else if let Some(wait) = restore_wait {
            self.pending_wait = Some(wait);
            self.set_state(StoryState::Paused);
        }
    }

    fn close_style(&mut self, scope: StyleScope) {
        let inner = scope.child().freeze();
        self.emit(
            None,
            OutputKind::StyleMarker {
                boundary: StyleBoundary::Closer,
                inner,
            },
        );
        drop(scope);
    }

    /// Abandon all threads after a fault and report it with the passage name.
    fn fault(&mut self, source: ThreadError) -> StoryError {
        let passage = self
            .frames
            .last()
            .map(|frame| frame.passage.clone())
            .or_else(|| self.current_passage().map(str::to_string))
            .unwrap_or_default();
        warn!(passage = %passage, error = %source, "passage thread faulted");
        self.frames.clear();
        self.cursor = None;
        self.pending_wait = None;
        self.set_state(StoryState::Complete);
        StoryError::Thread { passage, source }
    }

    fn take_wait(&mut self) -> Option<Wait> {
        if self.state == StoryState::Paused {
            self.pending_wait.take()
        } else {
            None
        }
    }

    /// History entry that owns records emitted now.
    fn current_visit(&self) -> usize {
        self.frames
            .last()
            .map_or_else(|| self.history.len().saturating_sub(1), |frame| frame.visit)
    }

    /// Action of the enchantment whose link is running, if any.
    fn current_enchantment(&self) -> Option<Continuation> {
        self.frames.iter().rev().find_map(|frame| frame.enchanted_by.clone())
    }

    fn set_state(&mut self, to: StoryState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(?from, ?to, "story state changed");
        let event = StoryEvent::StateChanged { from, to };
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// Emit a record at the insertion point, stamped with the live style.
    fn emit(&mut self, name: Option<String>, kind: OutputKind) -> usize {
        let record = Output {
            index: 0,
            name,
            style: self.style.freeze(),
            kind,
            removed: false,
            visit: self.current_visit(),
            enchanted_by: self.current_enchantment(),
        };
        let position = self.cursor.unwrap_or(self.output.len());
        self.insert(position, record)
    }

    /// Put `record` at `position` with the next emission number. Records
    /// already in the log keep their numbers.
    fn insert(&mut self, position: usize, mut record: Output) -> usize {
        record.index = self.next_index;
        record.removed = false;
        self.next_index += 1;
        let visit = record.visit;
        self.output.insert(position, record);

        if let Some(cursor) = self.cursor.as_mut() {
            if *cursor >= position {
                *cursor += 1;
            }
        }
        for frame in &mut self.frames {
            if let Some(Some(saved)) = frame.saved_cursor.as_mut() {
                if *saved >= position {
                    *saved += 1;
                }
            }
        }
        // A record landing on a later visit's first position belongs before it
        for (i, entry) in self.history.iter_mut().enumerate() {
            if entry.output_start > position || (i > visit && entry.output_start == position) {
                entry.output_start += 1;
            }
        }
        self.notify_output(position);
        position
    }

    fn tombstone(&mut self, position: usize) {
        let Some(record) = self.output.get_mut(position) else {
            return;
        };
        if record.removed {
            return;
        }
        record.removed = true;
        self.notify_output(position);
    }

    fn notify_output(&mut self, position: usize) {
        let record = &self.output[position];
        let event = if record.removed {
            StoryEvent::OutputRemoved(record)
        } else {
            StoryEvent::OutputAppended(record)
        };
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// Scan the output of history entry `visit` and put enchantment links
    /// in place of every match.
    fn enchant(&mut self, enchantment: &Enchantment, visit: usize) {
        let action = &enchantment.action;
        match &enchantment.target {
            EnchantTarget::Hook(hook) => {
                let segments = hook_segments(&self.output, visit, hook, action);
                debug!(hook = %hook, segments = segments.len(), "enchanting hook");
                for segment in segments.iter().rev() {
                    let span: Vec<Output> = segment.iter().map(|&i| self.output[i].clone()).collect();
                    let (Some(first), Some(&last)) = (span.first(), segment.last()) else {
                        continue;
                    };
                    let mut record = first.clone();
                    let text = span_text(&span);
                    record.name = None;
                    record.kind = OutputKind::Link(link_for(enchantment, text, span));
                    for &position in segment {
                        self.tombstone(position);
                    }
                    self.insert(last + 1, record);
                }
            }
            EnchantTarget::Text(pattern) => {
                let matches = text_matches(&self.output, visit, pattern, action);
                debug!(pattern = %pattern, records = matches.len(), "enchanting text");
                for &position in matches.iter().rev() {
                    let original = self.output[position].clone();
                    let Some(text) = original.text() else {
                        continue;
                    };
                    self.tombstone(position);
                    let mut at = position + 1;
                    for segment in split_text(text, pattern) {
                        let kind = match segment {
                            TextSegment::Plain("") => continue,
                            TextSegment::Plain(plain) => OutputKind::Text {
                                text: plain.to_string(),
                            },
                            TextSegment::Match(matched) => {
                                let mut span = original.clone();
                                span.kind = OutputKind::Text {
                                    text: matched.to_string(),
                                };
                                OutputKind::Link(link_for(enchantment, matched.to_string(), vec![span]))
                            }
                        };
                        let record = Output {
                            kind,
                            ..original.clone()
                        };
                        self.insert(at, record);
                        at += 1;
                    }
                }
            }
        }
    }

    /// Fire an enchantment link: retire it, restore or drop the span it
    /// stood for, and run the action with the span's style re-applied.
    fn trigger_enchantment(&mut self, link: &Link) -> Result<(), StoryError> {
        let (Some(enchant), Some(action)) = (&link.enchantment, &link.continuation) else {
            return Err(StoryError::InvalidLink(link.text.clone()));
        };
        let position = self
            .output
            .iter()
            .rposition(|record| {
                !record.removed
                    && record
                        .as_link()
                        .is_some_and(|l| l.enchantment.is_some() && l == link)
            })
            .ok_or_else(|| StoryError::StaleLink(link.text.clone()))?;

        let context = self.output[position].style.clone();
        let visit = self.output[position].visit;
        self.tombstone(position);

        let at = position + 1;
        if enchant.command != EnchantCommand::Replace {
            for (offset, record) in enchant.span.iter().enumerate() {
                let restored = Output {
                    visit,
                    enchanted_by: Some(enchant.action.clone()),
                    ..record.clone()
                };
                self.insert(at + offset, restored);
            }
        }
        let saved = self.cursor;
        self.cursor = match enchant.command {
            EnchantCommand::Replace | EnchantCommand::Prepend => Some(at),
            EnchantCommand::Append => Some(at + enchant.span.len()),
            EnchantCommand::None => None,
        };

        let scope = self.style.apply(&Style::from_frozen(&context))?;
        let label = self
            .history
            .get(visit)
            .map(|entry| entry.passage.clone())
            .unwrap_or_default();
        debug!(link = %link.text, command = ?enchant.command, "enchantment triggered");
        let mut frame = Frame::new(action.spawn(), label, visit);
        frame.context = Some(scope);
        frame.enchanted_by = Some(enchant.action.clone());
        frame.saved_cursor = Some(saved);
        frame.restore_wait = self.take_wait();
        self.frames.push(frame);
        Ok(())
    }
}

impl fmt::Debug for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Story")
            .field("state", &self.state)
            .field("passages", &self.passages.len())
            .field("history", &self.history_names())
            .field("output", &self.output.len())
            .field("frames", &self.frames.len())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a `Story`.
#[derive(Default)]
pub struct StoryBuilder {
    passages: Option<PassageTable>,
    script_files: Vec<String>,
    script_dir: Option<String>,
    config_path: Option<String>,
    seed: Option<u64>,
    /// Directly provided config (for testing without files).
    config: Option<StoryConfig>,
    services: Vec<Box<dyn TypeService>>,
}

impl StoryBuilder {
    pub fn passages(mut self, passages: PassageTable) -> Self {
        self.passages = Some(passages);
        self
    }

    pub fn script_file(mut self, path: &str) -> Self {
        self.script_files.push(path.to_string());
        self
    }

    pub fn script_dir(mut self, path: &str) -> Self {
        self.script_dir = Some(path.to_string());
        self
    }

    pub fn config_file(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Provide config directly (for testing without files).
    pub fn with_config(mut self, config: StoryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the configured seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the built-in service for the kind `service` declares.
    /// Overrides apply in registration order.
    pub fn with_type_service(mut self, service: Box<dyn TypeService>) -> Self {
        self.services.push(service);
        self
    }

    pub fn build(self) -> Result<Story, StoryError> {
        let mut config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => StoryConfig::load_from_ron(Path::new(path))?,
            (None, None) => StoryConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        let mut passages = self.passages.unwrap_or_default();
        for path in &self.script_files {
            passages.merge(ScriptSet::load_from_ron(Path::new(path))?.into_table());
        }
        if let Some(ref dir) = self.script_dir {
            if Path::new(dir).exists() {
                load_ron_files_from_dir(dir, |path| {
                    passages.merge(ScriptSet::load_from_ron(path)?.into_table());
                    Ok(())
                })?;
            }
        }

        let mut registry = TypeRegistry::builtin();
        for service in self.services {
            registry.register(service);
        }

        debug!(passages = passages.len(), seed = config.seed, "story built");
        Ok(Story {
            passages,
            registry,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            variables: Variables::new(),
            style: Style::new(),
            output: Vec::new(),
            history: Vec::new(),
            state: StoryState::Idle,
            frames: Vec::new(),
            cursor: None,
            next_index: 0,
            pending_wait: None,
            listeners: Vec::new(),
        })
    }
}

/// Load all .ron files from a directory, in name order, calling `loader`
/// for each.
fn load_ron_files_from_dir<F>(dir: &str, mut loader: F) -> Result<(), StoryError>
where
    F: FnMut(&Path) -> Result<(), StoryError>,
{
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in &paths {
        loader(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::thread::{Continuation, Sequence};
    use crate::schema::passage::Passage;
    use crate::schema::value::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn story(passages: Vec<Passage>) -> Story {
        Story::builder()
            .passages(passages.into_iter().collect())
            .build()
            .unwrap()
    }

    fn texts(story: &Story) -> Vec<String> {
        story
            .live_output()
            .filter_map(|record| match &record.kind {
                OutputKind::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn builder_defaults() {
        let story = Story::builder().seed(7).build().unwrap();
        assert_eq!(story.state(), StoryState::Idle);
        assert_eq!(story.config().seed, 7);
        assert!(story.config().auto_pump);
    }

    #[test]
    fn config_parses_from_ron() {
        let config = StoryConfig::parse_ron("(seed: 9, start_passage: Some(\"Intro\"))").unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.start_passage.as_deref(), Some("Intro"));
        assert_eq!(config.max_embed_depth, 64);
    }

    #[test]
    fn indexes_stay_put_on_insert() {
        let mut story = story(vec![Passage::from_events(
            "Start",
            vec![],
            vec![OutputEvent::text("a"), OutputEvent::text("b")],
        )]);
        story.begin("Start").unwrap();
        let record = Output {
            kind: OutputKind::LineBreak,
            ..story.output()[1].clone()
        };
        story.insert(1, record);
        let indexes: Vec<usize> = story.output().iter().map(|record| record.index).collect();
        assert_eq!(indexes, vec![0, 3, 1, 2]);
    }

    #[test]
    fn inserts_at_a_visit_boundary_stay_with_their_visit() {
        let mut story = story(vec![
            Passage::from_events("A", vec![], vec![OutputEvent::link("Go", "B")]),
            Passage::from_events("B", vec![], vec![OutputEvent::text("b")]),
        ]);
        story.begin("A").unwrap();
        let go = story.links()[0].clone();
        story.advance(&go).unwrap();
        assert_eq!(story.history()[1].output_start, 2);

        let late = Output {
            kind: OutputKind::Text {
                text: "late".to_string(),
            },
            ..story.output()[1].clone()
        };
        story.insert(2, late);
        assert_eq!(story.history()[1].output_start, 3);
        assert!(matches!(
            story.output()[3].kind,
            OutputKind::PassageEntry { ref name, .. } if name == "B"
        ));

        story.rewind(0).unwrap();
        assert_eq!(texts(&story), vec!["late"]);
    }

    #[test]
    fn unclosed_styles_close_when_thread_ends() {
        let mut story = story(vec![Passage::from_events(
            "Start",
            vec![],
            vec![OutputEvent::hook("open"), OutputEvent::text("inside")],
        )]);
        story.begin("Start").unwrap();
        let last = story.output().last().unwrap();
        assert!(matches!(
            last.kind,
            OutputKind::StyleMarker {
                boundary: StyleBoundary::Closer,
                ..
            }
        ));
        assert!(story.current_style().get("hook").is_empty());
    }

    #[test]
    fn end_style_without_begin_faults() {
        let mut story = story(vec![Passage::from_events("Start", vec![], vec![OutputEvent::EndStyle])]);
        let err = story.begin("Start").unwrap_err();
        assert!(matches!(
            err,
            StoryError::Thread {
                ref passage,
                source: ThreadError::Style(StyleError::NotApplied),
            } if passage == "Start"
        ));
        assert_eq!(story.state(), StoryState::Complete);
    }

    #[test]
    fn inline_link_runs_in_place_of_passage_change() {
        let body = Continuation::from_events(vec![OutputEvent::text("revealed")]);
        let mut story = story(vec![Passage::from_events(
            "Start",
            vec![],
            vec![OutputEvent::link_then("look", body)],
        )]);
        story.begin("Start").unwrap();
        let link = story.links()[0].clone();
        story.advance(&link).unwrap();
        assert_eq!(story.history_names(), vec!["Start"]);
        assert_eq!(texts(&story), vec!["revealed"]);
        assert_eq!(story.state(), StoryState::Complete);
    }

    #[test]
    fn inline_link_during_wait_returns_to_pause() {
        let body = Continuation::from_events(vec![OutputEvent::text("aside")]);
        let mut story = story(vec![Passage::from_events(
            "Start",
            vec![],
            vec![
                OutputEvent::link_then("aside", body),
                OutputEvent::wait_for_click(),
                OutputEvent::text("after"),
            ],
        )]);
        story.begin("Start").unwrap();
        assert_eq!(story.state(), StoryState::Paused);

        let link = story.links()[0].clone();
        story.advance(&link).unwrap();
        assert_eq!(story.state(), StoryState::Paused);
        assert_eq!(texts(&story), vec!["aside"]);

        story.resume().unwrap();
        assert_eq!(texts(&story), vec!["aside", "after"]);
    }

    #[test]
    fn manual_stepping_allows_pause() {
        let config = StoryConfig {
            auto_pump: false,
            ..StoryConfig::default()
        };
        let mut story = Story::builder()
            .with_config(config)
            .passages(
                [Passage::from_events(
                    "Start",
                    vec![],
                    vec![OutputEvent::text("one"), OutputEvent::text("two")],
                )]
                .into_iter()
                .collect(),
            )
            .build()
            .unwrap();

        story.begin("Start").unwrap();
        assert_eq!(story.state(), StoryState::Playing);
        assert!(story.step().unwrap());
        story.pause().unwrap();
        assert!(!story.step().unwrap());
        assert_eq!(texts(&story), vec!["one"]);

        story.resume().unwrap();
        story.pump().unwrap();
        assert_eq!(texts(&story), vec!["one", "two"]);
        assert_eq!(story.state(), StoryState::Complete);
    }

    #[test]
    fn resume_requires_pause() {
        let mut story = story(Vec::new());
        assert!(matches!(
            story.resume(),
            Err(StoryError::InvalidState {
                operation: "resume",
                state: StoryState::Idle,
            })
        ));
    }

    #[test]
    fn embed_depth_is_bounded() {
        let config = StoryConfig {
            max_embed_depth: 4,
            ..StoryConfig::default()
        };
        let mut story = Story::builder()
            .with_config(config)
            .passages(
                [Passage::from_events(
                    "Loop",
                    vec![],
                    vec![OutputEvent::embed_passage("Loop", Vec::new())],
                )]
                .into_iter()
                .collect(),
            )
            .build()
            .unwrap();
        let err = story.begin("Loop").unwrap_err();
        assert!(matches!(
            err,
            StoryError::Thread {
                source: ThreadError::EmbedDepthExceeded(4),
                ..
            }
        ));
    }

    #[test]
    fn listeners_see_appends_and_removals() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let mut story = story(vec![
            Passage::from_events("Start", vec![], vec![OutputEvent::link("Go", "Next")]),
            Passage::from_events("Next", vec![], vec![OutputEvent::text("there")]),
        ]);
        story.subscribe(move |event| {
            let tag = match event {
                StoryEvent::OutputAppended(record) => format!("+{}", record.index),
                StoryEvent::OutputRemoved(record) => format!("-{}", record.index),
                StoryEvent::StateChanged { to, .. } => format!("{:?}", to),
            };
            log.borrow_mut().push(tag);
        });
        story.begin("Start").unwrap();
        let link = story.links()[0].clone();
        story.advance(&link).unwrap();
        story.rewind(0).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                "+0", "Playing", "+1", "Complete", "+2", "Playing", "+3", "Complete", "-2", "-3",
            ]
        );
    }

    #[test]
    fn sequence_logic_sees_variables() {
        let mut story = story(vec![Passage::new("Start", vec![], || {
            Box::new(Sequence::new().run(|ctx| {
                let coins = ctx.variables().get("coins");
                Ok(vec![OutputEvent::text(format!("coins: {}", coins))])
            })) as Box<dyn Thread>
        })]);
        story.variables_mut().set("coins", Value::from(3));
        story.begin("Start").unwrap();
        assert_eq!(texts(&story), vec!["coins: 3"]);
    }
}
