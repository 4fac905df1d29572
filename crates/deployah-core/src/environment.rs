//! Environment selection

use crate::error::{ManifestError, Result};
use crate::manifest::Environment;
use crate::{DEFAULT_CONFIG_FILE, DEFAULT_ENV_FILE};

/// Name of the environment used when a manifest declares none
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Maximum edit distance for a "did you mean" suggestion
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Where a selected environment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentOrigin {
    /// Declared in the manifest
    Declared,
    /// Synthesized because the manifest declares no environment
    Synthetic,
}

/// The environment a load targets
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedEnvironment {
    pub environment: Environment,
    pub origin: EnvironmentOrigin,
    /// Position in the manifest's environment list, for declared environments
    pub index: Option<usize>,
}

impl SelectedEnvironment {
    pub fn name(&self) -> &str {
        &self.environment.name
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == EnvironmentOrigin::Synthetic
    }

    /// The fallback environment for manifests that declare none
    pub fn synthetic() -> Self {
        Self {
            environment: Environment {
                name: DEFAULT_ENVIRONMENT.to_string(),
                env_file: Some(DEFAULT_ENV_FILE.to_string()),
                config_file: Some(DEFAULT_CONFIG_FILE.to_string()),
                variables: Default::default(),
            },
            origin: EnvironmentOrigin::Synthetic,
            index: None,
        }
    }
}

/// Pick the environment to load
///
/// - no environments and no request (or a request for `default`): the
///   synthetic default environment
/// - exactly one environment and no request: that environment
/// - several environments and no request: [`ManifestError::AmbiguousEnvironment`]
/// - a request: the environment whose name matches exactly, wildcard suffix
///   included
pub fn resolve_environment(
    environments: &[Environment],
    requested: Option<&str>,
) -> Result<SelectedEnvironment> {
    let available = || environments.iter().map(|e| e.name.clone()).collect::<Vec<_>>();

    let selected = match requested {
        None | Some("") => match environments {
            [] => SelectedEnvironment::synthetic(),
            [only] => declared(only, 0),
            _ => {
                return Err(ManifestError::AmbiguousEnvironment {
                    available: available(),
                });
            }
        },
        Some(name) => {
            if let Some(index) = environments.iter().position(|e| e.name == name) {
                declared(&environments[index], index)
            } else if environments.is_empty() && name == DEFAULT_ENVIRONMENT {
                SelectedEnvironment::synthetic()
            } else {
                let available = available();
                return Err(ManifestError::EnvironmentNotFound {
                    name: name.to_string(),
                    help: suggest_environment(name, &available),
                    available,
                });
            }
        }
    };

    tracing::debug!(
        environment = selected.name(),
        synthetic = selected.is_synthetic(),
        "selected environment"
    );
    Ok(selected)
}

fn declared(environment: &Environment, index: usize) -> SelectedEnvironment {
    SelectedEnvironment {
        environment: environment.clone(),
        origin: EnvironmentOrigin::Declared,
        index: Some(index),
    }
}

/// Closest declared name to a mistyped request
fn suggest_environment(name: &str, available: &[String]) -> Option<String> {
    available
        .iter()
        .map(|candidate| (strsim::levenshtein(name, candidate), candidate))
        .filter(|(distance, _)| *distance <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| format!("Did you mean `{}`?", candidate))
}

/// Make an environment name safe to embed in a file name
///
/// A trailing `/*` wildcard is dropped, then every `/`, `\`, `*` and `?` is
/// removed: `review/*` becomes `review`, `team/qa` becomes `teamqa`.
pub fn sanitize_environment_name(name: &str) -> String {
    let base = name.strip_suffix("/*").unwrap_or(name);
    base.chars()
        .filter(|c| !matches!(c, '/' | '\\' | '*' | '?'))
        .collect()
}
