//! Core error types

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::schema::SchemaType;

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrorInfo {
    /// JSON pointer of the offending value, `(root)` for the document itself
    pub path: String,
    /// Human readable description of the violation
    pub message: String,
}

impl std::fmt::Display for ValidationErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum ManifestError {
    #[error("Failed to read {path}: {source}")]
    #[diagnostic(code(deployah::manifest::read))]
    ManifestRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest: {message}")]
    #[diagnostic(code(deployah::manifest::invalid))]
    InvalidManifest { message: String },

    #[error("Manifest has no apiVersion")]
    #[diagnostic(
        code(deployah::manifest::api_version),
        help("add `apiVersion: <version>` at the top of the manifest")
    )]
    MissingApiVersion,

    #[error("No schema for apiVersion '{version}' (supported: {})", .available.join(", "))]
    #[diagnostic(code(deployah::schema::not_found))]
    SchemaNotFound {
        version: String,
        available: Vec<String>,
    },

    #[error("Embedded {schema_type} schema for {version} does not compile: {message}")]
    #[diagnostic(code(deployah::schema::compile))]
    SchemaCompile {
        version: String,
        schema_type: SchemaType,
        message: String,
    },

    #[error(
        "Manifest does not match the {schema_type} schema for {version}:{}",
        format_violations(.errors)
    )]
    #[diagnostic(code(deployah::schema::validation))]
    SchemaValidation {
        version: String,
        schema_type: SchemaType,
        errors: Vec<ValidationErrorInfo>,
    },

    #[error("Multiple environments declared ({}), select one explicitly", .available.join(", "))]
    #[diagnostic(
        code(deployah::environment::ambiguous),
        help("pass the environment name to load, e.g. --environment <name>")
    )]
    AmbiguousEnvironment { available: Vec<String> },

    #[error("Environment '{name}' not found (declared: {})", display_names(.available))]
    #[diagnostic(code(deployah::environment::not_found))]
    EnvironmentNotFound {
        name: String,
        available: Vec<String>,
        #[help]
        help: Option<String>,
    },

    #[error("Env file {path} for environment '{environment}' does not exist")]
    #[diagnostic(
        code(deployah::envfile::missing),
        help("create the file or remove `envFile` to fall back to .env lookup")
    )]
    ExplicitFileMissing { environment: String, path: String },

    #[error("Cannot apply default at {path}: {message}")]
    #[diagnostic(code(deployah::defaults::apply))]
    DefaultApplication { path: String, message: String },

    #[error("Component '{component}' sets both resources and resourcePreset")]
    #[diagnostic(
        code(deployah::component::resources),
        help("keep either explicit resources or a resourcePreset, not both")
    )]
    ConflictingResourceFields { component: String },

    #[error(
        "Component '{component}' targets unknown environment '{environment}' (declared: {})",
        display_names(.available)
    )]
    #[diagnostic(code(deployah::component::environment))]
    UnknownTargetEnvironment {
        component: String,
        environment: String,
        available: Vec<String>,
    },

    #[error("Unresolved variables: {}", .names.join(", "))]
    #[diagnostic(
        code(deployah::variables::unresolved),
        help(
            "define them in the environment's variables or env file, \
             or export them with the template prefix"
        )
    )]
    UnresolvedVariables { names: Vec<String> },

    #[error("Invalid {field} '{value}': {reason}")]
    #[diagnostic(code(deployah::field::invalid))]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse YAML: {0}")]
    #[diagnostic(code(deployah::manifest::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to decode manifest: {0}")]
    #[diagnostic(code(deployah::manifest::json))]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(deployah::io))]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;

fn format_violations(errors: &[ValidationErrorInfo]) -> String {
    errors.iter().map(|e| format!("\n  - {e}")).collect()
}

fn display_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
