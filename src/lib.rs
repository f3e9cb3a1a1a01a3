//! ff: parallel filesystem search with a typed attribute expression
//! language.
//!
//! The crate walks one or more directory trees in parallel, evaluates a
//! boolean expression over per-entry attributes, and emits matching
//! entries as records, JSON, counts, or arguments to external commands.
//! Expensive attribute values are memoized per entry and cached across
//! runs keyed by `(path, mtime, size)`.

pub mod cache;
pub mod cli;
pub mod context;
pub mod error;
pub mod eval;
pub mod expr;
pub mod ignores;
pub mod output;
pub mod registry;
pub mod types;
pub mod walk;

// Re-export error types for convenient access
pub use error::{AttributeError, ExprError, FfError, PluginError, TypeError};
