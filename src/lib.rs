#![warn(missing_docs)]

//! Searchable select fields for forms the page does not own.
//!
//! `autofield` finds a plain text field by its label, hides it, and puts a
//! fuzzy-searchable picker over it. The picked item is written back into the
//! original field right before submit, so the host form's own validation and
//! submission keep working unchanged. Datasets come inline, from a JSON URL,
//! or from a script-callback endpoint, and are loaded once per source.
//!
//! The entry point is [`Enhancer`]; the page is modeled by
//! [`dom::Document`].

/// Text folding and label normalization.
pub mod normalize;

/// Error types.
pub mod error;

/// The in-memory document the engine attaches to.
pub mod dom;

/// Tiered match classification and the default fuzzy scorer.
pub mod ranking;

/// Weighted search keys over canonical items.
pub mod key;

/// Canonical items and datasets.
pub mod item;

/// Initialization options and per-field configuration.
pub mod options;

/// Ranked search over one dataset.
pub mod matcher;

/// Dataset loading and memoization.
pub mod loader;

/// Finding label, wrapper and carrier of a field.
pub mod locator;

/// Controls that switch a field between list, free-text and disabled modes.
pub mod conditions;

/// Per-field selection state.
pub mod state;

/// Submit value resolution and carrier handling.
pub mod bridge;

/// The synthetic input, results panel and hint.
pub mod overlay;

/// Best-effort rewriting of host-rendered error text.
pub mod host_errors;

/// Virtual-time task queue.
pub mod scheduler;

/// Page events.
pub mod event;

/// Attachment, event routing and teardown.
pub mod controller;

// Re-export primary public API types and functions at the crate root.
pub use bridge::{Rejection, Resolution, resolve_submit_value};
pub use conditions::{ConditionValue, ConditionValues, FieldMode};
pub use controller::{Enhancer, Outcome, SubmitReport};
pub use dom::{Document, NodeId};
pub use error::{ConfigError, LoadError, LocateError, SelectorError};
pub use event::{DomEvent, EventKind};
pub use item::{CanonicalItem, Dataset};
pub use key::{KeyPath, SearchKey};
pub use loader::{Offline, Transport};
pub use matcher::Matcher;
pub use options::{FieldConfig, Options, SubmitValue};
pub use ranking::{Ranking, Scorer, TieredScorer, classify};
