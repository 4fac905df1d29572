//! Template variable substitution
//!
//! `${NAME}` references in the raw manifest are replaced before the document
//! is parsed. Values come from three tiers, later tiers winning:
//!
//! 1. the selected environment's `variables`
//! 2. env file keys carrying the template prefix (`DPY_VAR_GREETING`)
//! 3. process environment keys carrying the template prefix
//!
//! The prefix is stripped before merging. Env file keys without the prefix
//! are not template variables; they pass through to the workload.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ffi::OsString;

use crate::TEMPLATE_PREFIX;
use crate::error::{ManifestError, Result};

static VARIABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid")
});

/// Inputs to substitution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableSources {
    /// `variables` of the selected environment
    pub manifest: IndexMap<String, String>,
    /// Parsed env file
    pub env_file: IndexMap<String, String>,
    /// Process environment
    pub os_env: IndexMap<String, String>,
}

impl VariableSources {
    /// Sources with the process environment's `DPY_VAR_` entries captured
    pub fn new(manifest: IndexMap<String, String>, env_file: IndexMap<String, String>) -> Self {
        Self {
            manifest,
            env_file,
            os_env: process_template_env(TEMPLATE_PREFIX),
        }
    }

    /// Replace the captured process environment
    pub fn with_os_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.os_env = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Split the sources into template variables and passthrough variables
    pub fn merge(&self, prefix: &str) -> (IndexMap<String, String>, IndexMap<String, String>) {
        let mut template = self.manifest.clone();
        let mut passthrough = IndexMap::new();

        for (key, value) in &self.env_file {
            match strip_template_prefix(key, prefix) {
                Some(name) => {
                    template.insert(name.to_string(), value.clone());
                }
                None => {
                    passthrough.insert(key.clone(), value.clone());
                }
            }
        }

        for (key, value) in &self.os_env {
            if let Some(name) = strip_template_prefix(key, prefix) {
                template.insert(name.to_string(), value.clone());
            }
        }

        (template, passthrough)
    }
}

/// Template variables of the current process environment
pub fn process_template_env(prefix: &str) -> IndexMap<String, String> {
    template_env(std::env::vars_os(), prefix)
}

/// Keep the entries whose key carries `prefix`
///
/// Keys and values must be UTF-8. A non-UTF-8 key cannot carry the prefix and
/// is ignored; a prefixed key with a non-UTF-8 value is skipped with a warning.
pub fn template_env<I>(vars: I, prefix: &str) -> IndexMap<String, String>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            let key = key.into_string().ok()?;
            if !key.starts_with(prefix) {
                return None;
            }
            match value.into_string() {
                Ok(value) => Some((key, value)),
                Err(_) => {
                    tracing::warn!(variable = %key, "ignoring variable with a non UTF-8 value");
                    None
                }
            }
        })
        .collect()
}

fn strip_template_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|name| !name.is_empty())
}

/// Result of substitution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    /// Manifest text with every reference replaced
    pub content: String,
    /// Merged template variables
    pub template_variables: IndexMap<String, String>,
    /// Non-prefixed env file variables
    pub passthrough: IndexMap<String, String>,
    /// Names referenced but not defined, in first-seen order
    pub unresolved: Vec<String>,
}

/// Replace every `${NAME}` in `raw`
///
/// Undefined names become empty strings and are reported in
/// [`Substitution::unresolved`]; with `strict` they fail with
/// [`ManifestError::UnresolvedVariables`] instead.
pub fn substitute(
    raw: &str,
    sources: &VariableSources,
    prefix: &str,
    strict: bool,
) -> Result<Substitution> {
    let (template_variables, passthrough) = sources.merge(prefix);
    let mut unresolved: Vec<String> = Vec::new();

    let content = VARIABLE_REF
        .replace_all(raw, |caps: &Captures| {
            let name = &caps[1];
            match template_variables.get(name) {
                Some(value) => value.clone(),
                None => {
                    if !unresolved.iter().any(|n| n == name) {
                        unresolved.push(name.to_string());
                    }
                    String::new()
                }
            }
        })
        .into_owned();

    if !unresolved.is_empty() {
        if strict {
            return Err(ManifestError::UnresolvedVariables { names: unresolved });
        }
        tracing::warn!(
            variables = %unresolved.join(", "),
            "unresolved template variables replaced with empty strings"
        );
    }

    tracing::debug!(
        template = template_variables.len(),
        passthrough = passthrough.len(),
        "substituted template variables"
    );

    Ok(Substitution {
        content,
        template_variables,
        passthrough,
        unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sources(
        manifest: &[(&str, &str)],
        env_file: &[(&str, &str)],
        os_env: &[(&str, &str)],
    ) -> VariableSources {
        VariableSources::new(map(manifest), map(env_file)).with_os_env(map(os_env))
    }

    #[test]
    fn test_prefixed_env_file_variable_substitutes() {
        let sources = sources(&[], &[("DPY_VAR_GREETING", "hi"), ("DEBUG", "true")], &[]);
        let result = substitute("msg: ${GREETING}", &sources, TEMPLATE_PREFIX, false).unwrap();

        assert_eq!(result.content, "msg: hi");
        assert_eq!(result.template_variables, map(&[("GREETING", "hi")]));
        assert_eq!(result.passthrough, map(&[("DEBUG", "true")]));
        assert!(result.unresolved.is_empty());
    }

    #[test]
    fn test_passthrough_is_not_a_template_variable() {
        let sources = sources(&[], &[("DEBUG", "true")], &[]);
        let result = substitute("debug: '${DEBUG}'", &sources, TEMPLATE_PREFIX, false).unwrap();

        assert_eq!(result.content, "debug: ''");
        assert_eq!(result.unresolved, vec!["DEBUG"]);
    }

    #[test]
    fn test_precedence() {
        let sources = sources(
            &[("A", "manifest"), ("B", "manifest"), ("C", "manifest")],
            &[("DPY_VAR_B", "file"), ("DPY_VAR_C", "file")],
            &[("DPY_VAR_C", "os"), ("HOME", "/root")],
        );
        let result = substitute("${A} ${B} ${C}", &sources, TEMPLATE_PREFIX, false).unwrap();

        assert_eq!(result.content, "manifest file os");
        assert!(!result.template_variables.contains_key("HOME"));
    }

    #[test]
    fn test_unresolved_become_empty_and_are_reported_once() {
        let sources = sources(&[], &[], &[]);
        let result =
            substitute("${MISSING}-${MISSING}-${OTHER}", &sources, TEMPLATE_PREFIX, false).unwrap();

        assert_eq!(result.content, "--");
        assert_eq!(result.unresolved, vec!["MISSING", "OTHER"]);
    }

    #[test]
    fn test_strict_rejects_unresolved() {
        let sources = sources(&[], &[], &[]);
        let err = substitute("${MISSING}", &sources, TEMPLATE_PREFIX, true).unwrap_err();

        assert!(matches!(
            err,
            ManifestError::UnresolvedVariables { names } if names == vec!["MISSING"]
        ));
    }

    #[test]
    fn test_non_matching_syntax_left_alone() {
        let sources = sources(&[("X", "1")], &[], &[]);
        let result =
            substitute("$X ${1X} ${ X } ${X}", &sources, TEMPLATE_PREFIX, false).unwrap();

        assert_eq!(result.content, "$X ${1X} ${ X } 1");
    }

    #[test]
    fn test_custom_prefix_and_bare_prefix_key() {
        let sources = sources(&[], &[("APP_PORT", "80"), ("APP_", "x")], &[]);
        let result = substitute("${PORT}", &sources, "APP_", false).unwrap();

        assert_eq!(result.content, "80");
        assert_eq!(result.passthrough, map(&[("APP_", "x")]));
    }

    fn os(key: &str, value: &str) -> (OsString, OsString) {
        (OsString::from(key), OsString::from(value))
    }

    #[test]
    fn test_template_env_keeps_prefixed_entries() {
        let vars = vec![
            os("DPY_VAR_TAG", "1.0"),
            os("HOME", "/root"),
            os("DPY_VAR_REGISTRY", "ghcr.io"),
        ];

        let env = template_env(vars, TEMPLATE_PREFIX);
        assert_eq!(env, map(&[("DPY_VAR_TAG", "1.0"), ("DPY_VAR_REGISTRY", "ghcr.io")]));
    }

    #[cfg(unix)]
    #[test]
    fn test_template_env_skips_non_utf8_entries() {
        use std::os::unix::ffi::OsStringExt;

        let invalid = || OsString::from_vec(vec![0x66, 0x6f, 0xff, 0xfe]);
        let vars = vec![
            (invalid(), OsString::from("x")),
            (OsString::from("DPY_VAR_BROKEN"), invalid()),
            (OsString::from("UNRELATED"), invalid()),
            os("DPY_VAR_TAG", "1.0"),
        ];

        let env = template_env(vars, TEMPLATE_PREFIX);
        assert_eq!(env, map(&[("DPY_VAR_TAG", "1.0")]));
    }

    #[test]
    fn test_process_template_env_only_has_prefixed_keys() {
        let env = process_template_env(TEMPLATE_PREFIX);
        assert!(env.keys().all(|key| key.starts_with(TEMPLATE_PREFIX)));
    }
}
