//! Compose project loader and label decoration.
//!
//! The loader is deliberately shallow: it checks structure (a mapping with a
//! `services` mapping, every service naming an `image` or a `build`) and keeps
//! everything else verbatim for the engine. It does not interpolate
//! variables or resolve `extends`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::LoadError;

/// File names recognised as a service definition, in lookup order.
pub const COMPOSE_FILE_NAMES: &[&str] = &[
    "docker-compose.yaml",
    "docker-compose.yml",
    "compose.yaml",
    "compose.yml",
];

/// File name used for the definition inside the project directory.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yaml";

pub const PROJECT_LABEL: &str = "com.docker.compose.project";
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
pub const VERSION_LABEL: &str = "com.docker.compose.version";
pub const WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";
pub const CONFIG_FILES_LABEL: &str = "com.docker.compose.project.config_files";
pub const ONEOFF_LABEL: &str = "com.docker.compose.oneoff";

/// One declared service with the labels Orca attaches to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub name: String,
    /// Service body as written in the definition.
    pub definition: Mapping,
    pub custom_labels: BTreeMap<String, String>,
}

/// A parsed, labeled service definition ready for an [`crate::Orchestrator`].
///
/// Rebuilt from the artifact bytes on every cycle; never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeProject {
    pub name: String,
    pub working_dir: PathBuf,
    pub compose_files: Vec<String>,
    pub services: Vec<Service>,
    /// Top-level keys other than `services` and `name`.
    extra: Mapping,
}

impl ComposeProject {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    /// Render the labeled definition as YAML for the engine.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let mut doc = Mapping::new();
        doc.insert(Value::from("name"), Value::from(self.name.as_str()));
        for (key, value) in &self.extra {
            doc.insert(key.clone(), value.clone());
        }

        let mut services = Mapping::new();
        for service in &self.services {
            let mut body = service.definition.clone();
            let mut labels = labels_as_mapping(body.get("labels"));
            for (key, value) in &service.custom_labels {
                labels.insert(Value::from(key.as_str()), Value::from(value.as_str()));
            }
            body.insert(Value::from("labels"), Value::Mapping(labels));
            services.insert(Value::from(service.name.as_str()), Value::Mapping(body));
        }
        doc.insert(Value::from("services"), Value::Mapping(services));

        serde_yaml::to_string(&Value::Mapping(doc))
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse `content` as the project `project_name` rooted at `working_dir`.
///
/// `project_name` always overrides any `name:` inside the definition. Syntax
/// problems surface as [`LoadError::Syntax`], structural ones as
/// [`LoadError::Invalid`].
pub fn load(
    working_dir: &Path,
    content: &[u8],
    project_name: &str,
) -> Result<ComposeProject, LoadError> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Err(LoadError::Empty);
    }

    let name = normalize_project_name(project_name)?;
    let root: Value = serde_yaml::from_slice(content)?;
    let Value::Mapping(mut root) = root else {
        return Err(LoadError::Invalid(
            "top level must be a mapping".to_string(),
        ));
    };

    let services = match root.remove("services") {
        Some(Value::Mapping(services)) => services,
        Some(Value::Null) | None => {
            return Err(LoadError::Invalid("no services declared".to_string()))
        }
        Some(_) => {
            return Err(LoadError::Invalid(
                "'services' must be a mapping".to_string(),
            ))
        }
    };
    if services.is_empty() {
        return Err(LoadError::Invalid("no services declared".to_string()));
    }
    root.remove("name");

    let compose_files = vec![working_dir.join(DEFAULT_COMPOSE_FILE).display().to_string()];
    let definition_version = root
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    let mut parsed = Vec::with_capacity(services.len());
    for (key, body) in services {
        let Some(service_name) = key.as_str().map(str::to_string) else {
            return Err(LoadError::Invalid(format!(
                "service key {key:?} is not a string"
            )));
        };
        let Value::Mapping(definition) = body else {
            return Err(LoadError::Invalid(format!(
                "service '{service_name}' must be a mapping"
            )));
        };
        if !definition.contains_key("image") && !definition.contains_key("build") {
            return Err(LoadError::Invalid(format!(
                "service '{service_name}' has neither 'image' nor 'build'"
            )));
        }
        if let Some(labels) = definition.get("labels") {
            validate_labels(&service_name, labels)?;
        }
        parsed.push(Service {
            name: service_name,
            definition,
            custom_labels: BTreeMap::new(),
        });
    }

    let mut project = ComposeProject {
        name,
        working_dir: working_dir.to_path_buf(),
        compose_files,
        services: parsed,
        extra: root,
    };
    decorate_labels(&mut project, &definition_version);
    Ok(project)
}

/// Read `path` and [`load`] it. I/O failures surface as [`LoadError::Io`].
pub fn load_file(
    working_dir: &Path,
    path: &Path,
    project_name: &str,
) -> Result<ComposeProject, LoadError> {
    let content = std::fs::read(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    load(working_dir, &content, project_name)
}

/// Attach the fixed label set to every service.
pub fn decorate_labels(project: &mut ComposeProject, definition_version: &str) {
    let config_files = project.compose_files.join(",");
    for service in &mut project.services {
        service.custom_labels = BTreeMap::from([
            (PROJECT_LABEL.to_string(), project.name.clone()),
            (SERVICE_LABEL.to_string(), service.name.clone()),
            (VERSION_LABEL.to_string(), definition_version.to_string()),
            (WORKING_DIR_LABEL.to_string(), "/".to_string()),
            (CONFIG_FILES_LABEL.to_string(), config_files.clone()),
            (ONEOFF_LABEL.to_string(), "False".to_string()),
        ]);
    }
}

/// Lowercase and drop characters compose does not accept in project names.
fn normalize_project_name(raw: &str) -> Result<String, LoadError> {
    let base = raw.rsplit('/').next().unwrap_or(raw);
    let normalized: String = base
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let normalized = normalized
        .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string();
    if normalized.is_empty() {
        return Err(LoadError::Invalid(format!(
            "project name '{raw}' has no usable characters"
        )));
    }
    Ok(normalized)
}

fn validate_labels(service: &str, labels: &Value) -> Result<(), LoadError> {
    match labels {
        Value::Mapping(_) | Value::Null => Ok(()),
        Value::Sequence(items) if items.iter().all(|i| i.as_str().is_some()) => Ok(()),
        _ => Err(LoadError::Invalid(format!(
            "service '{service}' labels must be a mapping or a list of strings"
        ))),
    }
}

/// Both compose label forms (`{k: v}` and `["k=v"]`) as a mapping.
fn labels_as_mapping(labels: Option<&Value>) -> Mapping {
    match labels {
        Some(Value::Mapping(map)) => map.clone(),
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| match item.split_once('=') {
                Some((k, v)) => (Value::from(k), Value::from(v)),
                None => (Value::from(item), Value::from("")),
            })
            .collect(),
        _ => Mapping::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const NGINX: &[u8] = b"services:\n  web:\n    image: nginx\n";

    fn wd() -> PathBuf {
        PathBuf::from("/srv/compose/web")
    }

    #[test]
    fn loads_minimal_definition() {
        let project = load(&wd(), NGINX, "web").unwrap();
        assert_eq!(project.name, "web");
        assert_eq!(project.service_names(), vec!["web"]);
        assert_eq!(project.working_dir, wd());
    }

    #[test]
    fn every_service_gets_the_label_set() {
        let content = b"services:\n  web:\n    image: nginx\n  db:\n    image: postgres\n";
        let project = load(&wd(), content, "shop").unwrap();
        for service in &project.services {
            let labels = &service.custom_labels;
            assert_eq!(labels[PROJECT_LABEL], "shop");
            assert_eq!(labels[SERVICE_LABEL], service.name);
            assert_eq!(labels[WORKING_DIR_LABEL], "/");
            assert_eq!(labels[ONEOFF_LABEL], "False");
            assert_eq!(
                labels[CONFIG_FILES_LABEL],
                "/srv/compose/web/docker-compose.yaml"
            );
        }
    }

    #[test]
    fn version_label_follows_definition_version() {
        let content = b"version: '3.8'\nservices:\n  web:\n    image: nginx\n";
        let project = load(&wd(), content, "web").unwrap();
        assert_eq!(project.services[0].custom_labels[VERSION_LABEL], "3.8");
    }

    #[test]
    fn project_name_override_wins() {
        let content = b"name: other\nservices:\n  web:\n    image: nginx\n";
        let project = load(&wd(), content, "My.Stack").unwrap();
        assert_eq!(project.name, "mystack");
        let yaml = project.to_yaml().unwrap();
        assert!(yaml.starts_with("name: mystack"));
    }

    #[test]
    fn syntax_error_is_distinct() {
        let err = load(&wd(), b"services: [unclosed", "web").unwrap_err();
        assert!(matches!(err, LoadError::Syntax(_)), "got: {err}");
        assert!(err.is_definition_error());
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(matches!(load(&wd(), b"", "web"), Err(LoadError::Empty)));
        assert!(matches!(load(&wd(), b"  \n", "web"), Err(LoadError::Empty)));
    }

    #[test]
    fn structural_problems_are_invalid() {
        for content in [
            &b"- a\n- b\n"[..],
            b"version: '3'\n",
            b"services: 3\n",
            b"services:\n  web: nginx\n",
            b"services:\n  web:\n    ports: ['80:80']\n",
        ] {
            let err = load(&wd(), content, "web").unwrap_err();
            assert!(matches!(err, LoadError::Invalid(_)), "got: {err}");
        }
    }

    #[test]
    fn list_labels_are_merged_into_mapping() {
        let content = b"services:\n  web:\n    image: nginx\n    labels:\n      - team=ops\n";
        let project = load(&wd(), content, "web").unwrap();
        let yaml = project.to_yaml().unwrap();
        let doc: Value = serde_yaml::from_str(&yaml).unwrap();
        let labels = &doc["services"]["web"]["labels"];
        assert_eq!(labels["team"], Value::from("ops"));
        assert_eq!(labels[PROJECT_LABEL], Value::from("web"));
    }

    #[test]
    fn extra_top_level_keys_survive() {
        let content = b"services:\n  web:\n    image: nginx\nvolumes:\n  data: {}\n";
        let project = load(&wd(), content, "web").unwrap();
        let doc: Value = serde_yaml::from_str(&project.to_yaml().unwrap()).unwrap();
        assert!(doc["volumes"]["data"].is_mapping());
    }

    #[test]
    fn load_file_reports_io_errors() {
        let err = load_file(&wd(), Path::new("/definitely/not/here.yaml"), "web").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(!err.is_definition_error());
    }

    #[rstest]
    #[case("web", "web")]
    #[case("My.Stack", "mystack")]
    #[case("/srv/compose/Shop_API", "shop_api")]
    #[case("--edge-01", "edge-01")]
    fn project_names_are_normalized(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_project_name(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("...")]
    #[case("/srv/compose/")]
    fn unusable_project_names_are_invalid(#[case] raw: &str) {
        assert!(matches!(
            normalize_project_name(raw),
            Err(LoadError::Invalid(_))
        ));
    }
}
