//! Resource presets
//!
//! A preset names a canonical set of resource requests so components do not
//! have to spell out quantities. Values follow the Bitnami request sizes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::defaults::coerce_with_serde;
use crate::error::{ManifestError, Result};
use crate::manifest::{Component, Resources};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourcePreset {
    Nano,
    Micro,
    Small,
    Medium,
    Large,
    Xlarge,
    #[serde(rename = "2xlarge")]
    Xlarge2,
}

coerce_with_serde!(ResourcePreset);

/// Resource requests of a preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetRequests {
    pub cpu: &'static str,
    pub memory: &'static str,
    pub ephemeral_storage: &'static str,
}

const fn requests(cpu: &'static str, memory: &'static str) -> PresetRequests {
    PresetRequests {
        cpu,
        memory,
        ephemeral_storage: "50Mi",
    }
}

impl ResourcePreset {
    pub const ALL: [ResourcePreset; 7] = [
        ResourcePreset::Nano,
        ResourcePreset::Micro,
        ResourcePreset::Small,
        ResourcePreset::Medium,
        ResourcePreset::Large,
        ResourcePreset::Xlarge,
        ResourcePreset::Xlarge2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourcePreset::Nano => "nano",
            ResourcePreset::Micro => "micro",
            ResourcePreset::Small => "small",
            ResourcePreset::Medium => "medium",
            ResourcePreset::Large => "large",
            ResourcePreset::Xlarge => "xlarge",
            ResourcePreset::Xlarge2 => "2xlarge",
        }
    }

    /// Canonical requests for this preset
    pub fn requests(&self) -> PresetRequests {
        match self {
            ResourcePreset::Nano => requests("100m", "128Mi"),
            ResourcePreset::Micro => requests("250m", "256Mi"),
            ResourcePreset::Small => requests("500m", "512Mi"),
            ResourcePreset::Medium => requests("500m", "1024Mi"),
            ResourcePreset::Large => requests("1.0", "2048Mi"),
            ResourcePreset::Xlarge => requests("1.0", "3072Mi"),
            ResourcePreset::Xlarge2 => requests("1.0", "6144Mi"),
        }
    }

    /// Requests as a manifest resources block
    pub fn resources(&self) -> Resources {
        let requests = self.requests();
        Resources {
            cpu: Some(requests.cpu.to_string()),
            memory: Some(requests.memory.to_string()),
            ephemeral_storage: Some(requests.ephemeral_storage.to_string()),
        }
    }
}

impl std::fmt::Display for ResourcePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject components that declare both explicit resources and a preset
pub fn check_resource_conflicts(components: &IndexMap<String, Component>) -> Result<()> {
    match components.iter().find(|(_, c)| c.has_conflicting_resources()) {
        Some((name, _)) => Err(ManifestError::ConflictingResourceFields {
            component: name.clone(),
        }),
        None => Ok(()),
    }
}

/// Fill `resources` from the preset of every component that has one
///
/// Only absent or entirely empty resource blocks are filled. Returns the
/// number of components resolved.
pub fn resolve_presets(components: &mut IndexMap<String, Component>) -> usize {
    let mut resolved = 0;
    for (name, component) in components.iter_mut() {
        let Some(preset) = component.resource_preset else {
            continue;
        };
        if component.resources.as_ref().is_some_and(|r| !r.is_empty()) {
            continue;
        }
        tracing::debug!(component = %name, preset = %preset, "resolved resource preset");
        component.resources = Some(preset.resources());
        resolved += 1;
    }
    resolved
}

/// Drop resources that are exactly what the component's preset produces
///
/// Inverse of [`resolve_presets`], applied before a manifest is written out.
pub fn unresolve_presets(components: &mut IndexMap<String, Component>) {
    for component in components.values_mut() {
        let Some(preset) = component.resource_preset else {
            continue;
        };
        if component.resources.as_ref() == Some(&preset.resources()) {
            component.resources = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(entries: &[(&str, Component)]) -> IndexMap<String, Component> {
        entries
            .iter()
            .map(|(name, c)| (name.to_string(), c.clone()))
            .collect()
    }

    fn with_preset(preset: ResourcePreset) -> Component {
        Component {
            resource_preset: Some(preset),
            ..Component::new("nginx")
        }
    }

    #[test]
    fn test_preset_table_values() {
        let table = [
            ("nano", "100m", "128Mi"),
            ("micro", "250m", "256Mi"),
            ("small", "500m", "512Mi"),
            ("medium", "500m", "1024Mi"),
            ("large", "1.0", "2048Mi"),
            ("xlarge", "1.0", "3072Mi"),
            ("2xlarge", "1.0", "6144Mi"),
        ];
        assert_eq!(table.len(), ResourcePreset::ALL.len());

        for (preset, (name, cpu, memory)) in ResourcePreset::ALL.iter().zip(table) {
            assert_eq!(preset.as_str(), name);
            let requests = preset.requests();
            assert_eq!(requests.cpu, cpu, "{name} cpu");
            assert_eq!(requests.memory, memory, "{name} memory");
            assert_eq!(requests.ephemeral_storage, "50Mi", "{name} ephemeral storage");

            let resources = preset.resources();
            assert_eq!(resources.cpu.as_deref(), Some(cpu));
            assert_eq!(resources.memory.as_deref(), Some(memory));
            assert_eq!(resources.ephemeral_storage.as_deref(), Some("50Mi"));
        }
    }

    #[test]
    fn test_memory_grows_with_size() {
        let memory: Vec<u32> = ResourcePreset::ALL
            .iter()
            .map(|p| p.requests().memory.trim_end_matches("Mi").parse().unwrap())
            .collect();
        assert!(memory.windows(2).all(|w| w[0] < w[1]), "{memory:?}");
    }

    #[test]
    fn test_preset_names_roundtrip_through_serde() {
        let preset: ResourcePreset = serde_yaml::from_str("2xlarge").unwrap();
        assert_eq!(preset, ResourcePreset::Xlarge2);
        assert_eq!(serde_yaml::to_string(&preset).unwrap().trim(), "2xlarge");

        for preset in ResourcePreset::ALL {
            let parsed: ResourcePreset = serde_yaml::from_str(preset.as_str()).unwrap();
            assert_eq!(parsed, preset);
        }
    }

    #[test]
    fn test_resolve_fills_absent_and_empty_resources() {
        let mut map = components(&[
            ("a", with_preset(ResourcePreset::Nano)),
            (
                "b",
                Component {
                    resources: Some(Resources::default()),
                    ..with_preset(ResourcePreset::Medium)
                },
            ),
            ("c", Component::new("redis")),
        ]);

        assert_eq!(resolve_presets(&mut map), 2);
        assert_eq!(map["a"].resources, Some(ResourcePreset::Nano.resources()));
        assert_eq!(map["b"].resources, Some(ResourcePreset::Medium.resources()));
        assert!(map["c"].resources.is_none());
    }

    #[test]
    fn test_conflicting_resources_rejected() {
        let map = components(&[(
            "web",
            Component {
                resources: Some(Resources {
                    cpu: Some("1".to_string()),
                    ..Default::default()
                }),
                ..with_preset(ResourcePreset::Small)
            },
        )]);

        let err = check_resource_conflicts(&map).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::ConflictingResourceFields { component } if component == "web"
        ));
    }

    #[test]
    fn test_unresolve_only_drops_preset_values() {
        let mut map = components(&[
            ("a", with_preset(ResourcePreset::Large)),
            ("b", Component::new("redis")),
        ]);
        map["b"].resources = Some(Resources {
            memory: Some("64Mi".to_string()),
            ..Default::default()
        });

        resolve_presets(&mut map);
        unresolve_presets(&mut map);

        assert!(map["a"].resources.is_none());
        assert_eq!(map["a"].resource_preset, Some(ResourcePreset::Large));
        assert_eq!(map["b"].resources.as_ref().unwrap().memory.as_deref(), Some("64Mi"));
        assert!(check_resource_conflicts(&map).is_ok());
    }
}
