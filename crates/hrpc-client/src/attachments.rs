//! Merging returned attachments into the caller's context data.
//!
//! A response that declares `returnedKeys` discards every context-data
//! entry the caller held that isn't `RETURNED_CONTEXT_DATA_KEY` itself,
//! even entries set before the call: the declared set is the complete view
//! of what survived the exchange, and stale locals would mislead the
//! caller.

use hrpc_codec::WireValue;
use hrpc_core::headers::{RETURNED_CONTEXT_DATA_KEY, WELL_KNOWN_KEYS};

pub type ContextData = std::collections::HashMap<String, WireValue>;

/// Merges `returned` attachments from a bean invoke response into the
/// caller's `context`. Only keys the response declared returned, plus the
/// process-wide well-known keys, are installed.
pub fn merge(context: &mut ContextData, returned: Vec<(String, WireValue)>) {
    let returned_keys = context.get(RETURNED_CONTEXT_DATA_KEY).cloned();

    if let Some(returned_keys) = &returned_keys {
        context.retain(|key, _| key == RETURNED_CONTEXT_DATA_KEY);
        let allowed = returned_key_set(returned_keys);
        for (key, value) in returned {
            if matches!(value, WireValue::Null) {
                continue;
            }
            if allowed.contains(key.as_str()) || WELL_KNOWN_KEYS.contains(&key.as_str()) {
                context.insert(key, value);
            }
        }
    } else {
        for (key, value) in returned {
            if matches!(value, WireValue::Null) {
                continue;
            }
            if WELL_KNOWN_KEYS.contains(&key.as_str()) {
                context.insert(key, value);
            }
        }
    }
}

fn returned_key_set(value: &WireValue) -> std::collections::HashSet<String> {
    match value {
        WireValue::List(items) => items
            .iter()
            .filter_map(|item| match item {
                WireValue::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        WireValue::Str(s) => std::iter::once(s.clone()).collect(),
        _ => std::collections::HashSet::new(),
    }
}
