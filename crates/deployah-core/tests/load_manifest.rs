//! End-to-end manifest loading tests

use deployah_core::{
    DEFAULT_MANIFEST_FILE, Kind, LoadOptions, ManifestError, ManifestLoader, ResourcePreset, Role,
    SchemaRegistry, load_manifest, save_manifest,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a project directory with a manifest and extra files
fn project(manifest: &str, files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join(DEFAULT_MANIFEST_FILE);
    fs::write(&path, manifest).expect("Failed to write manifest");

    for (name, content) in files {
        let file = dir.path().join(name);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(file, content).unwrap();
    }
    (dir, path)
}

/// Loader isolated from the process environment
fn loader(registry: &SchemaRegistry) -> ManifestLoader<'_> {
    ManifestLoader::new(registry).with_os_env(Vec::<(String, String)>::new())
}

fn load(
    path: &Path,
    environment: Option<&str>,
) -> deployah_core::Result<deployah_core::LoadedManifest> {
    let registry = SchemaRegistry::embedded();
    loader(registry).load(path, environment)
}

const SINGLE_COMPONENT: &str = r#"
apiVersion: v1-alpha.1
project: shop
components:
  web:
    image: nginx:latest
"#;

const TWO_ENVIRONMENTS: &str = r#"
apiVersion: v1-alpha.1
project: shop
environments:
  - name: dev
  - name: prod
components:
  web:
    image: nginx:latest
"#;

mod environment_selection {
    use super::*;

    #[test]
    fn test_no_environments_uses_default() {
        let (_dir, path) = project(SINGLE_COMPONENT, &[]);

        let loaded = load(&path, None).unwrap();
        assert_eq!(loaded.environment.name(), "default");
        assert!(loaded.environment.is_synthetic());
        assert!(loaded.environments.is_empty());
        assert_eq!(loaded.components["web"].environments, vec!["default"]);
    }

    #[test]
    fn test_two_environments_without_selection() {
        let (_dir, path) = project(TWO_ENVIRONMENTS, &[]);

        let err = load(&path, None).unwrap_err();
        match err {
            ManifestError::AmbiguousEnvironment { available } => {
                assert_eq!(available, vec!["dev", "prod"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_explicit_selection() {
        let (_dir, path) = project(TWO_ENVIRONMENTS, &[]);

        let loaded = load(&path, Some("prod")).unwrap();
        assert_eq!(loaded.environment.name(), "prod");
        assert_eq!(loaded.environment.index, Some(1));
        assert_eq!(
            loaded.environment.environment.config_file.as_deref(),
            Some(".deployah/config.prod.yaml")
        );
    }

    #[test]
    fn test_unknown_environment() {
        let manifest = SINGLE_COMPONENT.replace(
            "components:",
            "environments:\n  - name: dev\ncomponents:",
        );
        let (_dir, path) = project(&manifest, &[]);

        let err = load(&path, Some("prod")).unwrap_err();
        assert!(err.to_string().contains("'prod'"));
        match err {
            ManifestError::EnvironmentNotFound { name, available, .. } => {
                assert_eq!(name, "prod");
                assert_eq!(available, vec!["dev"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wildcard_environment_env_file() {
        let manifest = r#"
apiVersion: v1-alpha.1
project: shop
environments:
  - name: review/*
components:
  web:
    image: "nginx:${TAG}"
"#;
        let (_dir, path) = project(manifest, &[(".deployah/.env.review", "DPY_VAR_TAG=pr-42\n")]);

        let loaded = load(&path, None).unwrap();
        assert_eq!(loaded.components["web"].image, "nginx:pr-42");
        assert_eq!(
            loaded.environments[0].env_file.as_deref(),
            Some(".deployah/.env.review")
        );
        assert_eq!(
            loaded.environments[0].config_file.as_deref(),
            Some(".deployah/config.review.yaml")
        );
    }

    #[test]
    fn test_missing_explicit_env_file() {
        let manifest =
            TWO_ENVIRONMENTS.replace("- name: prod", "- name: prod\n    envFile: prod.env");
        let (_dir, path) = project(&manifest, &[]);

        let err = load(&path, Some("prod")).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::ExplicitFileMissing { ref environment, ref path }
                if environment == "prod" && path == "prod.env"
        ));

        // Other environments are unaffected
        assert!(load(&path, Some("dev")).is_ok());
    }
}

mod defaults {
    use super::*;

    #[test]
    fn test_component_defaults() {
        let (_dir, path) = project(SINGLE_COMPONENT, &[]);

        let loaded = load(&path, None).unwrap();
        let web = &loaded.components["web"];
        assert_eq!(web.role, Some(Role::Service));
        assert_eq!(web.kind, Some(Kind::Stateless));
        assert_eq!(web.port, Some(8080));
    }

    #[test]
    fn test_defaults_follow_schema_version() {
        let manifest = r#"
apiVersion: v1-alpha.2
project: shop
components:
  web:
    image: nginx
    ingress:
      host: shop.example.com
"#;
        let (_dir, path) = project(manifest, &[]);

        let loaded = load(&path, None).unwrap();
        let ingress = loaded.components["web"].ingress.clone().unwrap();
        assert_eq!(ingress.tls, Some(false));
        assert_eq!(ingress.path.as_deref(), Some("/"));

        let older = manifest.replace("v1-alpha.2", "v1-alpha.1") + "      tls: true\n";
        let (_dir, path) = project(&older, &[]);
        assert!(matches!(
            load(&path, None).unwrap_err(),
            ManifestError::SchemaValidation { .. }
        ));
    }

    #[test]
    fn test_presets() {
        let manifest = format!("{SINGLE_COMPONENT}    resourcePreset: 2xlarge\n");
        let (_dir, path) = project(&manifest, &[]);

        let loaded = load(&path, None).unwrap();
        let resources = loaded.components["web"].resources.clone().unwrap();
        assert_eq!(resources.cpu.as_deref(), Some("1.0"));
        assert_eq!(resources.memory.as_deref(), Some("6144Mi"));
        assert_eq!(resources.ephemeral_storage.as_deref(), Some("50Mi"));
    }

    #[test]
    fn test_empty_resources_rejected() {
        let manifest = format!("{SINGLE_COMPONENT}    resources: {{}}\n");
        let (_dir, path) = project(&manifest, &[]);

        assert!(matches!(
            load(&path, None).unwrap_err(),
            ManifestError::SchemaValidation { .. }
        ));
    }
}

mod variables {
    use super::*;

    const GREETING: &str = r#"
apiVersion: v1-alpha.1
project: shop
components:
  web:
    image: nginx:latest
    env:
      MESSAGE: "${GREETING}"
"#;

    #[test]
    fn test_prefixed_and_passthrough_variables() {
        let (_dir, path) = project(GREETING, &[(".env", "DPY_VAR_GREETING=hi\nDEBUG=true\n")]);

        let loaded = load(&path, None).unwrap();
        assert_eq!(loaded.components["web"].env["MESSAGE"], "hi");
        assert_eq!(loaded.passthrough.get("DEBUG").map(String::as_str), Some("true"));
        assert!(!loaded.passthrough.contains_key("DPY_VAR_GREETING"));
        assert!(loaded.unresolved.is_empty());
    }

    #[test]
    fn test_process_environment_wins() {
        let (_dir, path) = project(GREETING, &[(".env", "DPY_VAR_GREETING=hi\n")]);

        let loaded = ManifestLoader::new(SchemaRegistry::embedded())
            .with_os_env([("DPY_VAR_GREETING", "hello"), ("GREETING", "ignored")])
            .load(&path, None)
            .unwrap();
        assert_eq!(loaded.components["web"].env["MESSAGE"], "hello");
    }

    #[test]
    fn test_unresolved_variables() {
        let (_dir, path) = project(GREETING, &[]);

        let loaded = load(&path, None).unwrap();
        assert_eq!(loaded.components["web"].env["MESSAGE"], "");
        assert_eq!(loaded.unresolved, vec!["GREETING"]);

        let err = loader(SchemaRegistry::embedded())
            .with_options(LoadOptions::default().strict())
            .load(&path, None)
            .unwrap_err();
        assert!(matches!(err, ManifestError::UnresolvedVariables { .. }));
    }
}

mod persistence {
    use super::*;

    const FULL: &str = r#"
apiVersion: v1-alpha.2
project: shop
environments:
  - name: dev
    variables:
      TAG: "1.0"
  - name: review/*
components:
  web:
    image: ghcr.io/acme/web:${TAG}
    resourcePreset: small
    autoscaling:
      enabled: true
    ingress:
      host: shop.example.com
  worker:
    role: worker
    image: ghcr.io/acme/worker:${TAG}
    command: [bundle, exec, sidekiq]
    resources:
      memory: 256Mi
    environments: [dev]
"#;

    #[test]
    fn test_save_then_load_is_stable() {
        let (dir, path) = project(FULL, &[(".env.dev", "DPY_VAR_TAG=2.0\nDEBUG=1\n")]);

        let first = load(&path, Some("dev")).unwrap().into_manifest();
        assert_eq!(first.components["web"].image, "ghcr.io/acme/web:2.0");

        let saved = dir.path().join("saved.yaml");
        save_manifest(&first, &saved).unwrap();

        let written = fs::read_to_string(&saved).unwrap();
        assert!(written.contains("resourcePreset: small"));
        assert!(!written.contains("512Mi"), "preset resources must not be written:\n{written}");
        assert!(!written.contains("null"));

        let second = load(&saved, Some("dev")).unwrap().into_manifest();
        assert_eq!(first, second);
    }

    #[test]
    fn test_save_keeps_file_order() {
        let manifest = r#"
apiVersion: v1-alpha.1
project: shop
components:
  zeta:
    image: nginx
    env:
      Z_LAST: "1"
      A_FIRST: "2"
  alpha:
    image: nginx
"#;
        let (dir, path) = project(manifest, &[]);
        let loaded = load(&path, None).unwrap().into_manifest();

        let saved = dir.path().join("saved.yaml");
        save_manifest(&loaded, &saved).unwrap();
        let written = fs::read_to_string(&saved).unwrap();

        let position = |needle: &str| {
            written
                .find(needle)
                .unwrap_or_else(|| panic!("{needle} missing from:\n{written}"))
        };
        assert!(position("zeta:") < position("alpha:"), "{written}");
        assert!(position("Z_LAST") < position("A_FIRST"), "{written}");

        let reloaded = load(&saved, None).unwrap();
        let components: Vec<&str> = reloaded.components.keys().map(String::as_str).collect();
        assert_eq!(components, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let (dir, path) = project(SINGLE_COMPONENT, &[]);
        let manifest = load(&path, None).unwrap().into_manifest();

        let nested = dir.path().join("out").join("deep").join(DEFAULT_MANIFEST_FILE);
        save_manifest(&manifest, &nested).unwrap();
        assert!(nested.is_file());
    }

    #[test]
    fn test_load_manifest_uses_embedded_registry() {
        let (_dir, path) = project(SINGLE_COMPONENT, &[]);
        let loaded = load_manifest(&path, None).unwrap();

        assert_eq!(loaded.project, "shop");
        assert_eq!(loaded.components["web"].resource_preset, None::<ResourcePreset>);
    }
}
