//! Plain data carried through the engine: values, output records, passages.

pub mod output;
pub mod passage;
pub mod value;
