//! Typed deployment manifest
//!
//! A manifest declares a project, the environments it deploys to and the
//! components it is made of:
//!
//! ```yaml
//! apiVersion: v1-alpha.1
//! project: shop
//! environments:
//!   - name: dev
//!   - name: review/*
//! components:
//!   web:
//!     image: nginx:latest
//!     resourcePreset: small
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::defaults::{ApplyDefaults, DefaultApplier, Scope, coerce_with_serde};
use crate::environment::sanitize_environment_name;
use crate::error::Result;
use crate::preset::ResourcePreset;

/// Root manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version (e.g. v1-alpha.1)
    pub api_version: String,

    /// Project name
    pub project: String,

    /// Declared environments, in file order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<Environment>,

    /// Components keyed by name
    #[serde(default)]
    pub components: IndexMap<String, Component>,
}

impl Manifest {
    /// Find a declared environment by exact name
    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    pub fn environment_mut(&mut self, name: &str) -> Option<&mut Environment> {
        self.environments.iter_mut().find(|e| e.name == name)
    }

    /// Declared environment names, in file order
    pub fn environment_names(&self) -> Vec<String> {
        self.environments.iter().map(|e| e.name.clone()).collect()
    }

    /// Components deployed to `environment`
    pub fn components_for<'a>(
        &'a self,
        environment: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Component)> + 'a {
        self.components
            .iter()
            .filter(move |(_, component)| component.targets(environment))
    }
}

/// A deployment target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Environment name, possibly with a literal `/*` suffix
    pub name: String,

    /// Variables file; set during load to the file actually used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,

    /// Environment-specific configuration file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,

    /// Template variables declared inline
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, String>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// What a component does at runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Long-running process serving traffic
    #[default]
    Service,
    /// Long-running background process
    Worker,
    /// Run-to-completion task
    Job,
}

/// Whether a component keeps state across restarts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    #[default]
    Stateless,
    Stateful,
}

/// A deployable unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,

    /// Container image reference
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Container port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<Autoscaling>,

    /// Explicit resource requests; exclusive with `resource_preset`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_preset: Option<ResourcePreset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,

    /// Container environment variables
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Environments this component is deployed to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,
}

impl Component {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Whether this component is deployed to `environment` (exact match)
    pub fn targets(&self, environment: &str) -> bool {
        self.environments.iter().any(|e| e == environment)
    }

    /// True when both explicit resources and a preset are declared
    pub fn has_conflicting_resources(&self) -> bool {
        self.resource_preset.is_some() && self.resources.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Autoscaling {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<u32>,

    #[serde(
        default,
        rename = "targetCPUUtilizationPercentage",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_cpu_utilization_percentage: Option<u32>,

    #[serde(
        default,
        rename = "targetMemoryUtilizationPercentage",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_memory_utilization_percentage: Option<u32>,
}

/// Resource requests in Kubernetes quantity notation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage: Option<String>,
}

impl Resources {
    /// True when no request is set
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none() && self.ephemeral_storage.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
}

coerce_with_serde!(Role, Kind, Autoscaling, Resources, Ingress);

impl ApplyDefaults for Manifest {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        applier.fill(&mut self.project, path, "project")?;
        applier.descend(&mut self.environments, path, "environments")?;
        applier.descend(&mut self.components, path, "components")
    }
}

impl ApplyDefaults for Environment {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        let name = sanitize_environment_name(&self.name);
        applier.scoped(Scope::Environment { name }, |applier| {
            applier.fill(&mut self.env_file, path, "envFile")?;
            applier.fill(&mut self.config_file, path, "configFile")?;
            applier.fill(&mut self.variables, path, "variables")
        })
    }
}

impl ApplyDefaults for Component {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        applier.fill(&mut self.role, path, "role")?;
        applier.fill(&mut self.kind, path, "kind")?;
        applier.fill(&mut self.image, path, "image")?;
        applier.fill(&mut self.command, path, "command")?;
        applier.fill(&mut self.args, path, "args")?;
        applier.fill(&mut self.port, path, "port")?;

        applier.fill(&mut self.autoscaling, path, "autoscaling")?;
        applier.descend(&mut self.autoscaling, path, "autoscaling")?;

        applier.fill(&mut self.resources, path, "resources")?;
        applier.descend(&mut self.resources, path, "resources")?;
        applier.fill(&mut self.resource_preset, path, "resourcePreset")?;

        applier.fill(&mut self.ingress, path, "ingress")?;
        applier.descend(&mut self.ingress, path, "ingress")?;

        applier.fill(&mut self.env, path, "env")?;
        applier.fill(&mut self.environments, path, "environments")
    }
}

impl ApplyDefaults for Autoscaling {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        applier.fill(&mut self.enabled, path, "enabled")?;
        applier.fill(&mut self.min_replicas, path, "minReplicas")?;
        applier.fill(&mut self.max_replicas, path, "maxReplicas")?;
        applier.fill(
            &mut self.target_cpu_utilization_percentage,
            path,
            "targetCPUUtilizationPercentage",
        )?;
        applier.fill(
            &mut self.target_memory_utilization_percentage,
            path,
            "targetMemoryUtilizationPercentage",
        )
    }
}

impl ApplyDefaults for Resources {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        applier.fill(&mut self.cpu, path, "cpu")?;
        applier.fill(&mut self.memory, path, "memory")?;
        applier.fill(&mut self.ephemeral_storage, path, "ephemeralStorage")
    }
}

impl ApplyDefaults for Ingress {
    fn apply_defaults(&mut self, applier: &mut DefaultApplier<'_>, path: &str) -> Result<()> {
        applier.fill(&mut self.host, path, "host")?;
        applier.fill(&mut self.path, path, "path")?;
        applier.fill(&mut self.tls, path, "tls")
    }
}
