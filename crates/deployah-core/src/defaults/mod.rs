//! Schema-driven default values
//!
//! Defaults are extracted once per schema version into a flat map keyed by
//! dotted paths (`components.[<pattern>].port`, `environments.[0].configFile`)
//! and then applied to typed manifest values through the [`ApplyDefaults`]
//! visitor, which only ever fills fields that are still unset.

mod apply;
mod coerce;
mod extract;

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub use apply::{ApplyDefaults, DefaultApplier, DefaultField, Scope, apply_defaults};
pub use coerce::{Coerce, decode};
pub(crate) use coerce::coerce_with_serde;
pub use extract::extract_defaults;

/// Default literals keyed by schema path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultValues(BTreeMap<String, JsonValue>);

impl DefaultValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        self.0.get(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, value: JsonValue) {
        self.0.insert(path.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, JsonValue)> for DefaultValues {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
