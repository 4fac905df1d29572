//! Versioned manifest schemas
//!
//! Every supported `apiVersion` ships an embedded JSON Schema document. The
//! [`SchemaRegistry`] compiles them on first use into strict validators
//! (unknown fields are violations), and memoizes compiled schemas, extracted
//! defaults and dynamic-key patterns per version.

use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::defaults::{DefaultValues, extract_defaults};
use crate::error::{ManifestError, Result, ValidationErrorInfo};
use crate::validate::FieldValidators;
use crate::version::sort_versions;

/// Schema documents compiled into the binary, keyed by version
const EMBEDDED_SCHEMAS: &[(&str, &str)] = &[
    (
        "v1-alpha.1",
        include_str!("../schemas/v1-alpha.1/manifest.json"),
    ),
    (
        "v1-alpha.2",
        include_str!("../schemas/v1-alpha.2/manifest.json"),
    ),
];

static EMBEDDED: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::new);

/// Which part of the manifest a schema validates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    /// The complete manifest document
    Manifest,
    /// Only the `environments` list, checked before variable substitution
    Environments,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Manifest => "manifest",
            SchemaType::Environments => "environments",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled schema together with the document it came from
pub struct SchemaInfo {
    /// Strict validator
    pub validator: jsonschema::Validator,
    /// Raw schema document, used for default extraction
    pub raw: JsonValue,
}

impl fmt::Debug for SchemaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaInfo").field("raw", &self.raw).finish_non_exhaustive()
    }
}

impl SchemaInfo {
    /// Collect every violation of `instance`
    pub fn violations(&self, instance: &JsonValue) -> Vec<ValidationErrorInfo> {
        if self.validator.is_valid(instance) {
            return Vec::new();
        }

        self.validator
            .iter_errors(instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                ValidationErrorInfo {
                    path: if path.is_empty() {
                        "(root)".to_string()
                    } else {
                        path
                    },
                    message: format_validation_error(&e),
                }
            })
            .collect()
    }
}

/// Registry of versioned schemas with process-wide memoization
///
/// Construct one per embedding (or use [`SchemaRegistry::embedded`]) and pass
/// it by reference to the loader. Caches are read-mostly: lookups take a
/// shared lock and only the first compilation of a key takes the exclusive one.
#[derive(Debug)]
pub struct SchemaRegistry {
    documents: BTreeMap<String, String>,
    versions: Vec<String>,
    compiled: RwLock<HashMap<String, Arc<SchemaInfo>>>,
    defaults: RwLock<HashMap<String, Arc<DefaultValues>>>,
    patterns: RwLock<HashMap<String, Option<String>>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Create a registry over the embedded schema documents
    pub fn new() -> Self {
        Self::from_documents(
            EMBEDDED_SCHEMAS
                .iter()
                .map(|(version, doc)| (version.to_string(), doc.to_string())),
        )
    }

    /// Create a registry over caller-supplied `(version, document)` pairs
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let documents: BTreeMap<String, String> = documents.into_iter().collect();
        let mut versions: Vec<String> = documents.keys().cloned().collect();
        sort_versions(&mut versions);

        Self {
            documents,
            versions,
            compiled: RwLock::new(HashMap::new()),
            defaults: RwLock::new(HashMap::new()),
            patterns: RwLock::new(HashMap::new()),
        }
    }

    /// Shared registry over the embedded schemas
    pub fn embedded() -> &'static SchemaRegistry {
        &EMBEDDED
    }

    /// Supported versions in ascending order
    pub fn valid_versions(&self) -> &[String] {
        &self.versions
    }

    /// Highest supported version
    pub fn latest_version(&self) -> Option<&str> {
        self.versions.last().map(String::as_str)
    }

    pub fn is_supported(&self, version: &str) -> bool {
        self.documents.contains_key(version)
    }

    /// Compiled schema for `(version, schema_type)`, compiling on first use
    pub fn schema(&self, version: &str, schema_type: SchemaType) -> Result<Arc<SchemaInfo>> {
        let key = cache_key(version, schema_type.as_str());

        if let Some(info) = read(&self.compiled).get(&key) {
            return Ok(Arc::clone(info));
        }

        let mut cache = write(&self.compiled);
        // Another caller may have compiled it while we waited for the lock
        if let Some(info) = cache.get(&key) {
            return Ok(Arc::clone(info));
        }

        let raw = self.raw_document(version, schema_type)?;
        let mut strict = raw.clone();
        enforce_strict(&mut strict);

        let validator =
            jsonschema::validator_for(&strict).map_err(|e| ManifestError::SchemaCompile {
                version: version.to_string(),
                schema_type,
                message: e.to_string(),
            })?;

        tracing::debug!(version, schema_type = %schema_type, "compiled schema");

        let info = Arc::new(SchemaInfo { validator, raw });
        cache.insert(key, Arc::clone(&info));
        Ok(info)
    }

    /// Validate `instance`, reporting every violation at once
    pub fn validate(
        &self,
        instance: &JsonValue,
        version: &str,
        schema_type: SchemaType,
    ) -> Result<()> {
        let info = self.schema(version, schema_type)?;
        let errors = info.violations(instance);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ManifestError::SchemaValidation {
                version: version.to_string(),
                schema_type,
                errors,
            })
        }
    }

    /// Defaults declared by the schema for `(version, schema_type)`
    pub fn defaults(&self, version: &str, schema_type: SchemaType) -> Result<Arc<DefaultValues>> {
        let key = cache_key(version, schema_type.as_str());

        if let Some(defaults) = read(&self.defaults).get(&key) {
            return Ok(Arc::clone(defaults));
        }

        let info = self.schema(version, schema_type)?;
        let defaults = Arc::new(extract_defaults(&info.raw));

        write(&self.defaults)
            .entry(key)
            .or_insert_with(|| Arc::clone(&defaults));
        Ok(defaults)
    }

    /// The `patternProperties` key governing the map at `map_path`
    ///
    /// `map_path` uses the same dotted notation as default paths, e.g.
    /// `components`. Returns `None` when that map has no dynamic-key pattern.
    pub fn pattern_property(&self, version: &str, map_path: &str) -> Result<Option<String>> {
        let key = cache_key(version, map_path);

        if let Some(pattern) = read(&self.patterns).get(&key) {
            return Ok(pattern.clone());
        }

        let info = self.schema(version, SchemaType::Manifest)?;
        let pattern = schema_at(&info.raw, map_path)
            .and_then(|node| node.get("patternProperties"))
            .and_then(|p| p.as_object())
            .and_then(|p| p.keys().next().cloned());

        write(&self.patterns).insert(key, pattern.clone());
        Ok(pattern)
    }

    /// Prompt validators for `version`
    pub fn field_validators(&self, version: &str) -> Result<FieldValidators> {
        FieldValidators::new(self, version)
    }

    /// Prompt validators for the latest supported version
    pub fn latest_field_validators(&self) -> Result<FieldValidators> {
        let version = self
            .latest_version()
            .ok_or_else(|| self.not_found("latest"))?
            .to_string();
        FieldValidators::new(self, &version)
    }

    /// Drop every memoized entry. Intended for tests.
    pub fn clear_cache(&self) {
        write(&self.compiled).clear();
        write(&self.defaults).clear();
        write(&self.patterns).clear();
    }

    /// Number of compiled schemas currently cached
    pub fn cached_schemas(&self) -> usize {
        read(&self.compiled).len()
    }

    pub(crate) fn not_found(&self, version: &str) -> ManifestError {
        ManifestError::SchemaNotFound {
            version: version.to_string(),
            available: self.versions.clone(),
        }
    }

    fn raw_document(&self, version: &str, schema_type: SchemaType) -> Result<JsonValue> {
        let text = self
            .documents
            .get(version)
            .ok_or_else(|| self.not_found(version))?;

        let compile_error = |message: String| ManifestError::SchemaCompile {
            version: version.to_string(),
            schema_type,
            message,
        };

        let document: JsonValue =
            serde_json::from_str(text).map_err(|e| compile_error(e.to_string()))?;

        match schema_type {
            SchemaType::Manifest => Ok(document),
            SchemaType::Environments => {
                let environments = schema_at(&document, "environments")
                    .cloned()
                    .ok_or_else(|| compile_error("no `environments` property".to_string()))?;

                let mut root = serde_json::Map::new();
                if let Some(dialect) = document.get("$schema") {
                    root.insert("$schema".into(), dialect.clone());
                }
                root.insert("type".into(), JsonValue::String("object".into()));
                root.insert(
                    "properties".into(),
                    serde_json::json!({ "environments": environments }),
                );
                Ok(JsonValue::Object(root))
            }
        }
    }
}

/// Locate the sub-schema describing the value at a dotted path
///
/// `[0]` segments step into `items`, `[<regex>]` segments into the matching
/// `patternProperties` entry, anything else into `properties`.
pub(crate) fn schema_at<'a>(schema: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(schema);
    }

    let mut current = schema;
    for segment in split_path(path) {
        current = if segment == "[0]" {
            current.get("items")?
        } else if let Some(pattern) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            current.get("patternProperties")?.get(pattern)?
        } else {
            current.get("properties")?.get(segment)?
        };
    }
    Some(current)
}

/// Split a dotted path, keeping bracketed segments intact even if they contain dots
fn split_path(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                segments.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&path[start..]);
    segments
}

/// Reject unknown fields in every object sub-schema that does not say otherwise
fn enforce_strict(schema: &mut JsonValue) {
    let Some(obj) = schema.as_object_mut() else {
        return;
    };

    let describes_object = obj.contains_key("properties") || obj.contains_key("patternProperties");
    if describes_object && !obj.contains_key("additionalProperties") {
        obj.insert("additionalProperties".into(), JsonValue::Bool(false));
    }

    for (keyword, child) in obj.iter_mut() {
        match keyword.as_str() {
            "properties" | "patternProperties" | "definitions" | "$defs" => {
                if let Some(children) = child.as_object_mut() {
                    children.values_mut().for_each(enforce_strict);
                }
            }
            "allOf" | "anyOf" | "oneOf" => {
                if let Some(branches) = child.as_array_mut() {
                    branches.iter_mut().for_each(enforce_strict);
                }
            }
            "items" | "additionalProperties" | "not" | "if" | "then" | "else" => {
                enforce_strict(child)
            }
            _ => {}
        }
    }
}

fn cache_key(version: &str, kind: &str) -> String {
    format!("{}-{}", version, kind)
}

// Caches only memoize pure computations, so a poisoned lock still holds valid data
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Format a validation error into a user-friendly message
fn format_validation_error(error: &jsonschema::ValidationError) -> String {
    error.to_string().replace('"', "'")
}
