//! Env file discovery and parsing

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::environment::{SelectedEnvironment, sanitize_environment_name};
use crate::error::{ManifestError, Result};

/// Directory holding project-local Deployah files
const DEPLOYAH_DIR: &str = ".deployah";

/// Outcome of env file resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEnvFile {
    /// Path relative to the manifest directory, `None` when nothing was found
    pub path: Option<PathBuf>,
    /// Whether the path was named by the manifest rather than discovered
    pub explicit: bool,
}

impl ResolvedEnvFile {
    /// Read and parse the file, if any
    pub fn read(&self, base_dir: &Path) -> Result<IndexMap<String, String>> {
        let Some(path) = &self.path else {
            return Ok(IndexMap::new());
        };
        let full = base_dir.join(path);
        let content = std::fs::read_to_string(&full).map_err(|source| ManifestError::ManifestRead {
            path: full.display().to_string(),
            source,
        })?;
        Ok(parse_env_file(&content))
    }
}

/// Locates the env file for an environment relative to a manifest directory
#[derive(Debug, Clone)]
pub struct EnvFileResolver {
    base_dir: PathBuf,
}

impl EnvFileResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Find the env file for `selected`
    ///
    /// A declared environment with `envFile` must point at an existing file.
    /// Otherwise the candidates from [`candidate_paths`] are tried in order
    /// and a miss is not an error.
    pub fn resolve(&self, selected: &SelectedEnvironment) -> Result<ResolvedEnvFile> {
        let environment = &selected.environment;

        if !selected.is_synthetic() {
            if let Some(env_file) = &environment.env_file {
                let path = PathBuf::from(env_file);
                if !self.base_dir.join(&path).is_file() {
                    return Err(ManifestError::ExplicitFileMissing {
                        environment: environment.name.clone(),
                        path: env_file.clone(),
                    });
                }
                tracing::debug!(path = %path.display(), "using explicit env file");
                return Ok(ResolvedEnvFile {
                    path: Some(path),
                    explicit: true,
                });
            }
        }

        let found = candidate_paths(&environment.name)
            .into_iter()
            .find(|candidate| self.base_dir.join(candidate).is_file());

        match &found {
            Some(path) => tracing::debug!(path = %path.display(), "discovered env file"),
            None => tracing::debug!(environment = %environment.name, "no env file found"),
        }

        Ok(ResolvedEnvFile {
            path: found,
            explicit: false,
        })
    }
}

/// Env file names tried for an environment, most specific first
pub fn candidate_paths(environment: &str) -> Vec<PathBuf> {
    let sanitized = sanitize_environment_name(environment);
    let specific = format!(".env.{}", sanitized);

    vec![
        PathBuf::from(&specific),
        Path::new(DEPLOYAH_DIR).join(&specific),
        PathBuf::from(".env"),
        Path::new(DEPLOYAH_DIR).join(".env"),
    ]
}

/// Parse `KEY=VALUE` lines
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is allowed,
/// and one level of matching quotes around the value is removed. Lines
/// without `=` are skipped with a warning.
pub fn parse_env_file(content: &str) -> IndexMap<String, String> {
    let mut vars = IndexMap::new();

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!(line = number + 1, "skipping env file line without '='");
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            tracing::warn!(line = number + 1, "skipping env file line with empty key");
            continue;
        }

        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
