//! Manifest loading and saving
//!
//! Loading runs the whole resolution pipeline: version check, environment
//! selection, env file discovery, variable substitution, strict validation,
//! default application, preset resolution and target environment assignment.
//! A manifest is only returned once every step has succeeded.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use crate::config::LoadOptions;
use crate::defaults::apply_defaults;
use crate::envfile::{EnvFileResolver, ResolvedEnvFile};
use crate::environment::{DEFAULT_ENVIRONMENT, SelectedEnvironment, resolve_environment};
use crate::error::{ManifestError, Result};
use crate::manifest::{Environment, Manifest};
use crate::preset::{check_resource_conflicts, resolve_presets, unresolve_presets};
use crate::schema::{SchemaRegistry, SchemaType};
use crate::variables::{VariableSources, process_template_env, substitute};

/// A fully resolved manifest together with how it was resolved
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    /// The environment the manifest was resolved for
    pub environment: SelectedEnvironment,
    pub env_file: ResolvedEnvFile,
    /// Env file variables without the template prefix, for the workload
    pub passthrough: IndexMap<String, String>,
    /// Variables referenced but not defined
    pub unresolved: Vec<String>,
    /// Source file, when loaded from disk
    pub path: Option<PathBuf>,
}

impl LoadedManifest {
    pub fn into_manifest(self) -> Manifest {
        self.manifest
    }
}

impl Deref for LoadedManifest {
    type Target = Manifest;

    fn deref(&self) -> &Manifest {
        &self.manifest
    }
}

/// Resolves manifests against a schema registry
#[derive(Debug, Clone)]
pub struct ManifestLoader<'a> {
    registry: &'a SchemaRegistry,
    options: LoadOptions,
    os_env: Option<IndexMap<String, String>>,
}

impl<'a> ManifestLoader<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            options: LoadOptions::default(),
            os_env: None,
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `vars` instead of the process environment
    pub fn with_os_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.os_env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Load the manifest at `path`, resolving it for `environment`
    ///
    /// Env files are looked up relative to the manifest's directory.
    pub fn load(&self, path: &Path, environment: Option<&str>) -> Result<LoadedManifest> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::ManifestRead {
            path: path.display().to_string(),
            source,
        })?;

        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut loaded = self.load_str(&content, base_dir, environment)?;
        loaded.path = Some(path.to_path_buf());
        Ok(loaded)
    }

    /// Resolve manifest text, looking up env files under `base_dir`
    pub fn load_str(
        &self,
        content: &str,
        base_dir: &Path,
        environment: Option<&str>,
    ) -> Result<LoadedManifest> {
        let envelope: JsonValue = serde_yaml::from_str(content)?;
        if !envelope.is_object() {
            return Err(ManifestError::InvalidManifest {
                message: "top level must be a mapping".to_string(),
            });
        }

        let version = self.api_version(&envelope)?;
        let environments = self.declared_environments(&envelope, &version)?;

        let mut selected = resolve_environment(&environments, environment)?;
        let env_file = EnvFileResolver::new(base_dir).resolve(&selected)?;
        let file_vars = env_file.read(base_dir)?;

        let sources = VariableSources {
            manifest: selected.environment.variables.clone(),
            env_file: file_vars,
            os_env: match &self.os_env {
                Some(vars) => vars.clone(),
                None => process_template_env(&self.options.template_prefix),
            },
        };
        let substitution = substitute(
            content,
            &sources,
            &self.options.template_prefix,
            self.options.strict_variables,
        )?;

        let document: JsonValue = serde_yaml::from_str(&substitution.content)?;
        self.registry
            .validate(&document, &version, SchemaType::Manifest)?;

        let mut manifest: Manifest = serde_json::from_value(document)?;
        check_resource_conflicts(&manifest.components)?;

        let defaults = self.registry.defaults(&version, SchemaType::Manifest)?;
        let applied = apply_defaults(&mut manifest, &defaults, self.registry, "", &version)?;
        let presets = resolve_presets(&mut manifest.components);
        assign_target_environments(&mut manifest)?;

        record_env_file(&mut manifest, &mut selected, &env_file)?;

        tracing::debug!(
            project = %manifest.project,
            version = %version,
            environment = selected.name(),
            defaults = applied,
            presets,
            "loaded manifest"
        );

        Ok(LoadedManifest {
            manifest,
            environment: selected,
            env_file,
            passthrough: substitution.passthrough,
            unresolved: substitution.unresolved,
            path: None,
        })
    }

    fn api_version(&self, envelope: &JsonValue) -> Result<String> {
        let version = match envelope.get("apiVersion") {
            None | Some(JsonValue::Null) => return Err(ManifestError::MissingApiVersion),
            Some(JsonValue::String(v)) if v.is_empty() => {
                return Err(ManifestError::MissingApiVersion);
            }
            Some(JsonValue::String(v)) => v.clone(),
            Some(other) => {
                return Err(ManifestError::InvalidManifest {
                    message: format!("apiVersion must be a string, found {other}"),
                });
            }
        };

        if !self.registry.is_supported(&version) {
            return Err(self.registry.not_found(&version));
        }
        Ok(version)
    }

    /// Validate and decode the environment list ahead of substitution
    fn declared_environments(
        &self,
        envelope: &JsonValue,
        version: &str,
    ) -> Result<Vec<Environment>> {
        let Some(raw) = envelope.get("environments") else {
            return Ok(Vec::new());
        };

        let mut scoped = serde_json::Map::new();
        scoped.insert("environments".to_string(), raw.clone());
        self.registry
            .validate(&JsonValue::Object(scoped), version, SchemaType::Environments)?;

        Ok(serde_json::from_value(raw.clone())?)
    }
}

/// Give every component a target environment and check the ones it names
fn assign_target_environments(manifest: &mut Manifest) -> Result<()> {
    let mut available = manifest.environment_names();
    if available.is_empty() {
        available.push(DEFAULT_ENVIRONMENT.to_string());
    }

    for (name, component) in manifest.components.iter_mut() {
        if component.environments.is_empty() {
            component.environments = available.clone();
            continue;
        }
        if let Some(unknown) = component
            .environments
            .iter()
            .find(|target| !available.contains(target))
        {
            return Err(ManifestError::UnknownTargetEnvironment {
                component: name.clone(),
                environment: unknown.clone(),
                available,
            });
        }
    }
    Ok(())
}

/// Store the env file actually used on the selected environment
///
/// The synthetic environment only names `.env` as a hint, so it ends up with
/// the path that was found, or none.
fn record_env_file(
    manifest: &mut Manifest,
    selected: &mut SelectedEnvironment,
    env_file: &ResolvedEnvFile,
) -> Result<()> {
    let used = env_file
        .path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());

    if selected.is_synthetic() {
        selected.environment.env_file = used;
        return Ok(());
    }

    let name = selected.name().to_string();
    let environment = manifest
        .environment_mut(&name)
        .ok_or_else(|| ManifestError::InvalidManifest {
            message: format!("environment '{name}' changed during variable substitution"),
        })?;

    if used.is_some() {
        environment.env_file = used;
    }
    selected.environment = environment.clone();
    Ok(())
}

/// Load a manifest with the embedded schemas and default options
pub fn load_manifest(path: impl AsRef<Path>, environment: Option<&str>) -> Result<LoadedManifest> {
    ManifestLoader::new(SchemaRegistry::embedded()).load(path.as_ref(), environment)
}

/// Write `manifest` as YAML, creating parent directories
///
/// Resources that only restate the component's preset are left out, so the
/// written file loads back to the same manifest.
pub fn save_manifest(manifest: &Manifest, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut manifest = manifest.clone();
    unresolve_presets(&mut manifest.components);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_yaml::to_string(&manifest)?;
    std::fs::write(path, content)?;
    Ok(())
}
