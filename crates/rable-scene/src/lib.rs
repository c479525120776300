//! Minimal document tree the Rable engine renders into.
//!
//! Nodes live in an arena owned by a [`Document`]; a [`NodeId`] is a plain
//! copyable handle. The tree supports what a reactive template needs:
//! attributes, class list, inline style, control value and checked state,
//! bubbling event listeners, cloning, structural edits, simple selectors and
//! HTML serialization.

mod document;
pub mod markup;
pub mod selector;

pub use document::{Document, Event, EventListener, NodeId, kebab_case};
pub use selector::SelectorError;
