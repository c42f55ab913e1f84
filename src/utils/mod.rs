//! Small cross-cutting helpers shared by several subsystems.

pub mod ids;

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Convenience alias for the loosely-typed maps that flow through envelopes,
/// route decisions, and node configuration.
pub type VarMap = FxHashMap<String, Value>;

/// Construct an empty [`VarMap`] without spelling out the hasher type at
/// every call site.
#[must_use]
pub fn new_var_map() -> VarMap {
    FxHashMap::default()
}
