//! Loader configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::TEMPLATE_PREFIX;

/// Options controlling how a manifest is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    /// Fail on `${VAR}` references nothing defines instead of emptying them
    #[serde(default)]
    pub strict_variables: bool,

    /// Prefix marking template variables in env files and the process environment
    #[serde(default = "default_template_prefix")]
    pub template_prefix: String,
}

fn default_template_prefix() -> String {
    TEMPLATE_PREFIX.to_string()
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            strict_variables: false,
            template_prefix: default_template_prefix(),
        }
    }
}

impl LoadOptions {
    /// Read options from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn strict(mut self) -> Self {
        self.strict_variables = true;
        self
    }
}
