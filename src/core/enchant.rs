//! Enchantment — turning already-emitted output into links after the fact.
//!
//! An enchantment names a target (a text pattern or a hook) and an action.
//! Applying it scans the current passage's output for matches and puts an
//! enchantment link in place of each match; the engine owns the log and
//! performs the rewrite, this module only finds what to rewrite.

use serde::{Deserialize, Serialize};

use crate::core::thread::Continuation;
use crate::schema::output::{EnchantLink, Link, Output, OutputKind};

/// What an enchantment looks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnchantTarget {
    /// Every occurrence of a literal pattern in text output.
    Text(String),
    /// Every contiguous run of output styled with this hook.
    Hook(String),
}

/// Where the action's output goes relative to the matched span when the
/// link is triggered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnchantCommand {
    /// Span restored in place; action output goes to the end of the log.
    #[default]
    None,
    /// Action output takes the span's place.
    Replace,
    /// Action output follows the span.
    Append,
    /// Action output precedes the span.
    Prepend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enchantment {
    pub target: EnchantTarget,
    pub command: EnchantCommand,
    pub action: Continuation,
}

impl Enchantment {
    pub fn new(target: EnchantTarget, command: EnchantCommand, action: Continuation) -> Self {
        Self {
            target,
            command,
            action,
        }
    }
}

/// A piece of text split around pattern matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSegment<'a> {
    Plain(&'a str),
    Match(&'a str),
}

/// Split `text` around non-overlapping occurrences of `pattern`.
///
/// Plain pieces are kept even when empty, so the result always starts and
/// ends with a plain piece and alternates in between.
pub fn split_text<'a>(text: &'a str, pattern: &str) -> Vec<TextSegment<'a>> {
    if pattern.is_empty() {
        return vec![TextSegment::Plain(text)];
    }
    let mut segments = Vec::new();
    let mut last = 0;
    for (start, matched) in text.match_indices(pattern) {
        segments.push(TextSegment::Plain(&text[last..start]));
        segments.push(TextSegment::Match(matched));
        last = start + matched.len();
    }
    segments.push(TextSegment::Plain(&text[last..]));
    segments
}

/// True for links an enchantment synthesized. These are never matched
/// again, which keeps enchantments from overlapping.
pub fn is_enchanted(record: &Output) -> bool {
    record.as_link().is_some_and(|link| link.enchantment.is_some())
}

/// Whether a live record can be part of a match for the enchantment whose
/// action is `action`, scanning history entry `visit`.
fn in_reach(record: &Output, visit: usize, action: &Continuation) -> bool {
    record.visit == visit && !is_enchanted(record) && record.enchanted_by.as_ref() != Some(action)
}

/// Contiguous runs of live records of history entry `visit` whose style
/// carries `hook`, as log positions. A live record without the hook, or out
/// of reach, ends the current run; removed records are skipped without
/// breaking it. Runs holding nothing but style markers are dropped.
pub fn hook_segments(output: &[Output], visit: usize, hook: &str, action: &Continuation) -> Vec<Vec<usize>> {
    let mut segments = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for (position, record) in output.iter().enumerate() {
        if record.removed {
            continue;
        }
        if record.style.has_hook(hook) && in_reach(record, visit, action) {
            current.push(position);
        } else if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments.retain(|segment| {
        segment
            .iter()
            .any(|&position| !matches!(output[position].kind, OutputKind::StyleMarker { .. }))
    });
    segments
}

/// Positions of live text records of history entry `visit` that contain
/// `pattern`.
pub fn text_matches(output: &[Output], visit: usize, pattern: &str, action: &Continuation) -> Vec<usize> {
    if pattern.is_empty() {
        return Vec::new();
    }
    output
        .iter()
        .enumerate()
        .filter(|(_, record)| !record.removed && in_reach(record, visit, action))
        .filter(|(_, record)| matches!(&record.kind, OutputKind::Text { text } if text.contains(pattern)))
        .map(|(position, _)| position)
        .collect()
}

/// The link an enchantment puts in place of `span`.
///
/// Every link gets its own continuation wrapping the action, so links
/// sharing text and action still compare unequal and can be told apart
/// when one is triggered.
pub fn link_for(enchantment: &Enchantment, text: String, span: Vec<Output>) -> Link {
    let action = enchantment.action.clone();
    Link {
        text,
        name: None,
        target: None,
        continuation: Some(Continuation::new(move || action.spawn())),
        enchantment: Some(EnchantLink {
            command: enchantment.command,
            action: enchantment.action.clone(),
            span,
        }),
    }
}

/// The visible text of a span: its text and link records, concatenated.
pub fn span_text(span: &[Output]) -> String {
    span.iter().filter_map(Output::text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::style::{FrozenStyle, HOOK};
    use crate::schema::output::StyleBoundary;
    use crate::schema::value::Value;

    fn action() -> Continuation {
        Continuation::from_events(Vec::new())
    }

    fn record(index: usize, text: &str, hook: Option<&str>) -> Output {
        let style = match hook {
            Some(name) => FrozenStyle::new(vec![(HOOK.to_string(), Value::text(name))]),
            None => FrozenStyle::default(),
        };
        Output {
            index,
            name: None,
            style,
            kind: OutputKind::Text {
                text: text.to_string(),
            },
            removed: false,
            visit: 0,
            enchanted_by: None,
        }
    }

    #[test]
    fn split_around_each_occurrence() {
        let segments = split_text("the cat sat on the mat", "at");
        let plains: Vec<&str> = segments
            .iter()
            .filter_map(|s| match s {
                TextSegment::Plain(p) => Some(*p),
                TextSegment::Match(_) => None,
            })
            .collect();
        let matches = segments
            .iter()
            .filter(|s| matches!(s, TextSegment::Match(_)))
            .count();
        assert_eq!(plains, vec!["the c", " s", " on the m", ""]);
        assert_eq!(matches, 3);
        assert_eq!(segments[1], TextSegment::Match("at"));
    }

    #[test]
    fn split_without_match_is_one_plain() {
        assert_eq!(split_text("nothing", "zz"), vec![TextSegment::Plain("nothing")]);
        assert_eq!(split_text("nothing", ""), vec![TextSegment::Plain("nothing")]);
    }

    #[test]
    fn split_does_not_overlap() {
        let segments = split_text("aaa", "aa");
        assert_eq!(
            segments,
            vec![
                TextSegment::Plain(""),
                TextSegment::Match("aa"),
                TextSegment::Plain("a"),
            ]
        );
    }

    #[test]
    fn hook_runs_break_on_gaps() {
        let output = vec![
            record(0, "a", Some("door")),
            record(1, "b", Some("door")),
            record(2, "gap", None),
            record(3, "c", Some("door")),
            record(4, "other", Some("window")),
        ];
        assert_eq!(hook_segments(&output, 0, "door", &action()), vec![vec![0, 1], vec![3]]);
    }

    #[test]
    fn hook_runs_stay_within_their_visit() {
        let mut output = vec![
            record(0, "a", Some("door")),
            record(1, "b", Some("door")),
            record(2, "c", Some("door")),
        ];
        output[1].visit = 1;
        output[2].visit = 1;
        assert_eq!(hook_segments(&output, 0, "door", &action()), vec![vec![0]]);
        assert_eq!(hook_segments(&output, 1, "door", &action()), vec![vec![1, 2]]);
    }

    #[test]
    fn marker_only_runs_are_dropped() {
        let mut output = vec![record(0, "a", Some("door")), record(1, "", Some("door"))];
        output[1].kind = OutputKind::StyleMarker {
            boundary: StyleBoundary::Closer,
            inner: FrozenStyle::default(),
        };
        output[0].kind = OutputKind::LineBreak;
        assert_eq!(hook_segments(&output, 0, "door", &action()), vec![vec![0, 1]]);

        output[0].removed = true;
        assert!(hook_segments(&output, 0, "door", &action()).is_empty());
    }

    #[test]
    fn records_from_an_action_are_out_of_its_reach() {
        let fired = action();
        let mut output = vec![
            record(0, "a bell", Some("door")),
            record(1, "another bell", Some("door")),
        ];
        output[1].enchanted_by = Some(fired.clone());
        assert_eq!(hook_segments(&output, 0, "door", &fired), vec![vec![0]]);
        assert_eq!(text_matches(&output, 0, "bell", &fired), vec![0]);
        // Other enchantments still see it
        assert_eq!(text_matches(&output, 0, "bell", &action()), vec![0, 1]);
    }

    #[test]
    fn removed_records_are_transparent() {
        let mut output = vec![
            record(0, "a", Some("door")),
            record(1, "gone", None),
            record(2, "b", Some("door")),
        ];
        output[1].removed = true;
        assert_eq!(hook_segments(&output, 0, "door", &action()), vec![vec![0, 2]]);
        assert_eq!(span_text(&output), "agoneb");
    }

    #[test]
    fn text_matches_skip_removed() {
        let mut output = vec![record(0, "a cat", None), record(1, "a cat", None)];
        output[0].removed = true;
        assert_eq!(text_matches(&output, 0, "cat", &action()), vec![1]);
    }

    #[test]
    fn synthesized_links_are_distinct() {
        let enchantment = Enchantment::new(
            EnchantTarget::Text("at".to_string()),
            EnchantCommand::Replace,
            Continuation::from_events(Vec::new()),
        );
        let a = link_for(&enchantment, "at".to_string(), Vec::new());
        let b = link_for(&enchantment, "at".to_string(), Vec::new());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(is_enchanted(&Output {
            index: 0,
            name: None,
            style: FrozenStyle::default(),
            kind: OutputKind::Link(a),
            removed: false,
            visit: 0,
            enchanted_by: None,
        }));
    }
}
