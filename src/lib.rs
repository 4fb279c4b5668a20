//! Passage Engine — the execution core of an interactive-fiction runtime.
//!
//! Runs author-defined passages (compiled thread functions) against a
//! dynamically-typed value model and a cascading style stack, and records
//! everything they produce as an ordered, inspectable output log that a
//! presentation layer can render.

pub mod core;
pub mod schema;
