//! Deployah Core - Manifest resolution for Deployah deployments
//!
//! This crate turns a `.deployah.yaml` manifest into a validated, defaulted,
//! typed value:
//! - `SchemaRegistry`: embedded versioned JSON Schemas, compiled strictly and cached
//! - `defaults`: schema default extraction and application
//! - `environment` / `envfile`: environment selection and env file discovery
//! - `variables`: `${VAR}` substitution from manifest, env file and process environment
//! - `ManifestLoader`: the full load pipeline, plus `save_manifest`
//! - `FieldValidators`: schema-derived validators for interactive prompts

pub mod config;
pub mod defaults;
pub mod envfile;
pub mod environment;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod preset;
pub mod schema;
pub mod validate;
pub mod variables;
pub mod version;

pub use config::LoadOptions;
pub use envfile::{EnvFileResolver, ResolvedEnvFile, parse_env_file};
pub use environment::{
    EnvironmentOrigin, SelectedEnvironment, resolve_environment, sanitize_environment_name,
};
pub use error::{ManifestError, Result, ValidationErrorInfo};
pub use loader::{LoadedManifest, ManifestLoader, load_manifest, save_manifest};
pub use manifest::{Autoscaling, Component, Environment, Ingress, Kind, Manifest, Resources, Role};
pub use preset::ResourcePreset;
pub use schema::{SchemaInfo, SchemaRegistry, SchemaType};
pub use validate::{
    FieldValidators, validate_component_name, validate_env_var_name, validate_environment_name,
    validate_hostname, validate_port, validate_project_name,
};
pub use variables::{
    Substitution, VariableSources, process_template_env, substitute, template_env,
};
pub use version::{SchemaVersion, compare_versions, sort_versions};

/// Manifest file looked up when no path is given
pub const DEFAULT_MANIFEST_FILE: &str = ".deployah.yaml";

/// Env file of the environment used when none is declared
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Config file of the environment used when none is declared
pub const DEFAULT_CONFIG_FILE: &str = ".deployah/config.yaml";

/// Prefix marking template variables in env files and the process environment
pub const TEMPLATE_PREFIX: &str = "DPY_VAR_";
