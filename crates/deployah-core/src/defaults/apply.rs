//! Default application over typed values
//!
//! Every manifest type implements [`ApplyDefaults`], naming its fields with
//! their serialized names. The [`DefaultApplier`] resolves the default for a
//! field in three steps:
//!
//! 1. the direct path (`components.web.port`)
//! 2. the array sentinel, every element index replaced by `[0]`
//!    (`environments.[2].configFile` becomes `environments.[0].configFile`)
//! 3. the pattern sentinel, the dynamic map key replaced by the schema's
//!    `patternProperties` regex (`components.[^[a-z]...$].port`)
//!
//! Fields that are already set are never touched, which makes application
//! idempotent.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::coerce::{Coerce, decode};
use super::DefaultValues;
use crate::error::{ManifestError, Result};
use crate::schema::SchemaRegistry;

static INDEX_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|\.)\[\d+\]").expect("index pattern is valid"));

const NAME_PLACEHOLDER: &str = "{name}";

/// A value whose fields can be filled from schema defaults
pub trait ApplyDefaults {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()>;
}

/// A field that default application may fill
pub trait DefaultField: Sized {
    /// Whether the field still holds its "absent" value
    fn is_unset(&self) -> bool;

    fn from_default(value: &JsonValue) -> std::result::Result<Self, String>;
}

impl<T: Coerce> DefaultField for Option<T> {
    fn is_unset(&self) -> bool {
        self.is_none()
    }

    fn from_default(value: &JsonValue) -> std::result::Result<Self, String> {
        T::coerce(value).map(Some)
    }
}

impl DefaultField for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn from_default(value: &JsonValue) -> std::result::Result<Self, String> {
        String::coerce(value)
    }
}

impl<T: DeserializeOwned> DefaultField for Vec<T> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn from_default(value: &JsonValue) -> std::result::Result<Self, String> {
        decode(value)
    }
}

impl<V: DeserializeOwned> DefaultField for IndexMap<String, V> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn from_default(value: &JsonValue) -> std::result::Result<Self, String> {
        decode(value)
    }
}

/// Where the traversal currently is, innermost last
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Inside an environment entry; `name` replaces `{name}` in defaults
    Environment { name: String },
    /// Inside the value stored under `key` in the map at `map_path`
    MapEntry { map_path: String, key: String },
}

/// Fills unset fields from a set of extracted defaults
pub struct DefaultApplier<'a> {
    defaults: &'a DefaultValues,
    registry: &'a SchemaRegistry,
    version: &'a str,
    scopes: Vec<Scope>,
    applied: usize,
}

impl<'a> DefaultApplier<'a> {
    pub fn new(
        defaults: &'a DefaultValues,
        registry: &'a SchemaRegistry,
        version: &'a str,
    ) -> Self {
        Self {
            defaults,
            registry,
            version,
            scopes: Vec::new(),
            applied: 0,
        }
    }

    /// Number of fields filled so far
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Fill `field` from the default for `path.name` if it is unset
    pub fn fill<T: DefaultField>(&mut self, field: &mut T, path: &str, name: &str) -> Result<()> {
        if !field.is_unset() {
            return Ok(());
        }

        let Some(default) = self.lookup(path, name)? else {
            return Ok(());
        };
        let default = self.substitute_name(default);

        *field = T::from_default(&default).map_err(|message| ManifestError::DefaultApplication {
            path: join(path, name),
            message,
        })?;
        self.applied += 1;
        Ok(())
    }

    /// Recurse into a nested value stored under `path.name`
    pub fn descend<T: ApplyDefaults + ?Sized>(
        &mut self,
        value: &mut T,
        path: &str,
        name: &str,
    ) -> Result<()> {
        value.apply_defaults(self, &join(path, name))
    }

    /// Run `f` with `scope` pushed, popping it even when `f` fails
    pub fn scoped<F>(&mut self, scope: Scope, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.scopes.push(scope);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn lookup(&self, path: &str, name: &str) -> Result<Option<JsonValue>> {
        let direct = join(path, name);
        if let Some(value) = self.defaults.get(&direct) {
            return Ok(Some(value.clone()));
        }

        let sentinel = normalize_indices(&direct);
        if sentinel != direct {
            if let Some(value) = self.defaults.get(&sentinel) {
                return Ok(Some(value.clone()));
            }
        }

        let Some((map_path, key)) = self.current_map_entry() else {
            return Ok(None);
        };

        let map_path = normalize_indices(map_path);
        let Some(pattern) = self.registry.pattern_property(self.version, &map_path)? else {
            return Ok(None);
        };

        let entry = join(&map_path, key);
        let Some(rest) = sentinel.strip_prefix(entry.as_str()) else {
            return Ok(None);
        };

        let candidate = format!("{}{}", join(&map_path, &format!("[{}]", pattern)), rest);
        Ok(self.defaults.get(&candidate).cloned())
    }

    fn current_map_entry(&self) -> Option<(&str, &str)> {
        self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::MapEntry { map_path, key } => Some((map_path.as_str(), key.as_str())),
            Scope::Environment { .. } => None,
        })
    }

    fn current_environment(&self) -> Option<&str> {
        self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::Environment { name } => Some(name.as_str()),
            Scope::MapEntry { .. } => None,
        })
    }

    fn substitute_name(&self, value: JsonValue) -> JsonValue {
        match self.current_environment() {
            Some(name) => replace_placeholder(value, name),
            None => value,
        }
    }
}

fn replace_placeholder(value: JsonValue, name: &str) -> JsonValue {
    match value {
        JsonValue::String(s) if s.contains(NAME_PLACEHOLDER) => {
            JsonValue::String(s.replace(NAME_PLACEHOLDER, name))
        }
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(|v| replace_placeholder(v, name))
                .collect(),
        ),
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (k, replace_placeholder(v, name)))
                .collect(),
        ),
        other => other,
    }
}

/// Replace every element index in a path by the `[0]` sentinel
fn normalize_indices(path: &str) -> String {
    INDEX_SEGMENT.replace_all(path, "${1}[0]").into_owned()
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

impl<T: ApplyDefaults> ApplyDefaults for Option<T> {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        match self {
            Some(inner) => inner.apply_defaults(applier, path),
            None => Ok(()),
        }
    }
}

impl<T: ApplyDefaults> ApplyDefaults for Box<T> {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        self.as_mut().apply_defaults(applier, path)
    }
}

impl<T: ApplyDefaults> ApplyDefaults for Vec<T> {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        for (index, item) in self.iter_mut().enumerate() {
            item.apply_defaults(applier, &join(path, &format!("[{}]", index)))?;
        }
        Ok(())
    }
}

impl<T: ApplyDefaults> ApplyDefaults for IndexMap<String, T> {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        for (key, value) in self.iter_mut() {
            let scope = Scope::MapEntry {
                map_path: path.to_string(),
                key: key.clone(),
            };
            let entry_path = join(path, key);
            applier.scoped(scope, |applier| value.apply_defaults(applier, &entry_path))?;
        }
        Ok(())
    }
}

/// Fill every unset field of `target` from `defaults`
///
/// `path` is the schema path of `target` itself, empty for a whole manifest.
/// Returns how many fields were filled.
pub fn apply_defaults<T: ApplyDefaults + ?Sized>(
    target: &mut T,
    defaults: &DefaultValues,
    registry: &SchemaRegistry,
    path: &str,
    version: &str,
) -> Result<usize> {
    let mut applier = DefaultApplier::new(defaults, registry, version);
    target.apply_defaults(&mut applier, path)?;
    Ok(applier.applied())
}
