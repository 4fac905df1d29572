//! Field validators for interactive prompts
//!
//! Each rule is read from the schema of a given version, so prompts accept
//! exactly what the manifest schema accepts.

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::{ManifestError, Result};
use crate::schema::{SchemaRegistry, SchemaType, schema_at};

/// Validators for single manifest fields
#[derive(Debug, Clone)]
pub struct FieldValidators {
    version: String,
    project: Regex,
    component: Regex,
    environment: Regex,
    env_var: Regex,
    hostname: Regex,
    port_min: i64,
    port_max: i64,
}

impl FieldValidators {
    /// Build validators from the manifest schema of `version`
    pub fn new(registry: &SchemaRegistry, version: &str) -> Result<Self> {
        let info = registry.schema(version, SchemaType::Manifest)?;
        let raw = &info.raw;

        let component_key = registry.pattern_property(version, "components")?.ok_or_else(|| {
            missing(version, "components.patternProperties")
        })?;
        let component_path = format!("components.[{}]", component_key);

        let pattern_at = |path: &str, nested: Option<&str>| -> Result<Regex> {
            let mut node = schema_at(raw, path);
            if let Some(keyword) = nested {
                node = node.and_then(|n| n.get(keyword));
            }
            let location = match nested {
                Some(keyword) => format!("{path}.{keyword}.pattern"),
                None => format!("{path}.pattern"),
            };
            let pattern = node
                .and_then(|n| n.get("pattern"))
                .and_then(JsonValue::as_str)
                .ok_or_else(|| missing(version, &location))?;
            compile(version, pattern)
        };

        let port = schema_at(raw, &format!("{component_path}.port"));
        let bound = |keyword: &str, fallback: i64| {
            port.and_then(|p| p.get(keyword))
                .and_then(JsonValue::as_i64)
                .unwrap_or(fallback)
        };

        Ok(Self {
            version: version.to_string(),
            project: pattern_at("project", None)?,
            component: compile(version, &component_key)?,
            environment: pattern_at("environments.[0].name", None)?,
            env_var: pattern_at(&format!("{component_path}.env"), Some("propertyNames"))?,
            hostname: pattern_at(&format!("{component_path}.ingress.host"), None)?,
            port_min: bound("minimum", 1),
            port_max: bound("maximum", 65535),
        })
    }

    /// Schema version the rules were read from
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn project_name(&self, value: &str) -> Result<()> {
        check(&self.project, "project name", value)
    }

    pub fn component_name(&self, value: &str) -> Result<()> {
        check(&self.component, "component name", value)
    }

    pub fn environment_name(&self, value: &str) -> Result<()> {
        check(&self.environment, "environment name", value)
    }

    pub fn env_var_name(&self, value: &str) -> Result<()> {
        check(&self.env_var, "environment variable name", value)
    }

    pub fn hostname(&self, value: &str) -> Result<()> {
        check(&self.hostname, "hostname", value)
    }

    /// Parse a port and check it against the schema bounds
    pub fn port(&self, value: &str) -> Result<u16> {
        let invalid = |reason: String| ManifestError::InvalidField {
            field: "port".to_string(),
            value: value.to_string(),
            reason,
        };

        let port: i64 = value
            .trim()
            .parse()
            .map_err(|_| invalid("must be an integer".to_string()))?;

        if port < self.port_min || port > self.port_max {
            return Err(invalid(format!(
                "must be between {} and {}",
                self.port_min, self.port_max
            )));
        }

        u16::try_from(port).map_err(|_| invalid("does not fit in a port number".to_string()))
    }
}

fn check(rule: &Regex, field: &str, value: &str) -> Result<()> {
    if rule.is_match(value) {
        Ok(())
    } else {
        Err(ManifestError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("must match {}", rule.as_str()),
        })
    }
}

fn compile(version: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ManifestError::SchemaCompile {
        version: version.to_string(),
        schema_type: SchemaType::Manifest,
        message: format!("pattern {pattern}: {e}"),
    })
}

fn missing(version: &str, location: &str) -> ManifestError {
    ManifestError::SchemaCompile {
        version: version.to_string(),
        schema_type: SchemaType::Manifest,
        message: format!("no rule at {location}"),
    }
}

fn latest() -> Result<FieldValidators> {
    SchemaRegistry::embedded().latest_field_validators()
}

/// Validate a project name against the latest embedded schema
pub fn validate_project_name(value: &str) -> Result<()> {
    latest()?.project_name(value)
}

pub fn validate_component_name(value: &str) -> Result<()> {
    latest()?.component_name(value)
}

pub fn validate_environment_name(value: &str) -> Result<()> {
    latest()?.environment_name(value)
}

pub fn validate_env_var_name(value: &str) -> Result<()> {
    latest()?.env_var_name(value)
}

pub fn validate_hostname(value: &str) -> Result<()> {
    latest()?.hostname(value)
}

/// Parse and validate a port against the latest embedded schema
pub fn validate_port(value: &str) -> Result<u16> {
    latest()?.port(value)
}
