//! Runtime machinery: type services, styles, threads, the story engine.

pub mod collections;
pub mod enchant;
pub mod engine;
pub mod library;
pub mod position;
pub mod primitives;
pub mod script;
pub mod style;
pub mod thread;
pub mod types;
pub mod variables;
