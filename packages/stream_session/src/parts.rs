//! Mapping from configurator part keys to outbound command names.
//!
//! The wire protocol predates the part catalog, so a few parts send under a
//! name that differs from their key. Those live in one override table with a
//! default-suffix rule for everything else; adding a part is a table entry,
//! never a new branch.

use serde_json::{Value, json};

/// Parts whose outbound command name does not follow the
/// `<key>_paint` rule.
const WIRE_NAME_OVERRIDES: &[(&str, &str)] = &[("superstructure", "coachroof_paint")];

const DEFAULT_SUFFIX: &str = "_paint";

/// Outbound command name for a part key.
pub fn wire_name(key: &str) -> String {
    WIRE_NAME_OVERRIDES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, wire)| (*wire).to_string())
        .unwrap_or_else(|| format!("{key}{DEFAULT_SUFFIX}"))
}

/// Build a paint interaction for a part, returning the coalescing key
/// alongside the payload so both can go straight into
/// [`CommandCoalescer::enqueue`](crate::CommandCoalescer::enqueue).
pub fn paint_command(part: &str, color: &str) -> (String, Value) {
    (
        part.to_string(),
        json!({ "action": wire_name(part), "value": color }),
    )
}
