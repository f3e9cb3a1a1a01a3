//! The provider capability interface.

use crate::context::Context;
use crate::types::ValueKind;

/// One attribute as declared by its provider.
#[derive(Debug, Clone, Copy)]
pub struct AttributeDef {
    /// Unqualified name; the full name is `provider.name`.
    pub name: &'static str,
    pub kind: ValueKind,
    /// Relative cost; higher means more expensive to compute. The
    /// evaluator runs cheap tests first.
    pub cost: u8,
    /// Whether values may be memoized in the persistent cache.
    pub cacheable: bool,
    pub help: &'static str,
}

/// A bundle that declares and computes a set of attributes.
///
/// `process` is invoked at most once per entry and may populate several
/// attributes in one call, amortizing expensive work (one file read can
/// feed every attribute derived from the content). Attributes left unset
/// after `process` returns are recorded as missing for the entry.
///
/// Providers must be pure over the context: repeated runs against an
/// unchanged entry produce the same values, and no observable external
/// side effects are permitted. The evaluator's cost reordering relies on
/// this.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-line description for `--help-plugins`.
    fn help(&self) -> &'static str {
        ""
    }

    /// Names of providers that must be registered for this one to load.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    fn attributes(&self) -> &'static [AttributeDef];

    /// Computes attribute values for the context's entry via
    /// `Context::set`.
    fn process(&self, ctx: &mut Context);
}
