//! Layered Orca configuration.
//!
//! # Sources (later wins)
//!
//! ```text
//! 1. built-in defaults              (OrcaConfig::default)
//! 2. YAML file                      (--config, ./config.yml, <config_dir>/orca/config.yml)
//! 3. environment, prefix ORCA_      (ORCA_INTERVAL=60, ORCA_REPOS_WEB_URL=...,
//!                                    ORCA_BASICAUTH_ADMIN=...)
//! ```
//!
//! # API pattern
//!
//! [`OrcaConfig::load`] reads the real process environment. Tests use
//! [`OrcaConfig::load_from`] plus [`OrcaConfig::apply_env`] with an explicit
//! variable list and never touch `std::env`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, ConfigError};
use crate::types::{AutoSync, Credential, RepoConfig, StackId, StackName};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "ORCA_";

/// File name searched for when no explicit config path is given.
pub const CONFIG_FILE_NAME: &str = "config.yml";

// ---------------------------------------------------------------------------
// 1. Model
// ---------------------------------------------------------------------------

/// One entry under `repos:`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoEntry {
    pub url: String,
    pub user: Option<String>,
    pub secret: Option<String>,
}

impl fmt::Debug for RepoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoEntry")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Root of the Orca configuration document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrcaConfig {
    /// Deploy root: `targetpath/<stack-name>/<file>`.
    pub targetpath: PathBuf,
    /// Scratch root: `workdir/<stack-id>/<file>`.
    pub workdir: PathBuf,
    pub loglevel: String,
    /// Initial value of the shared auto-sync flag.
    pub autosync: AutoSync,
    /// Poll interval in seconds.
    pub interval: u64,
    /// Control surface credentials: user → password.
    pub basicauth: BTreeMap<String, String>,
    pub repos: BTreeMap<String, RepoEntry>,
    /// Control surface bind address.
    pub listen: String,
    /// Upper bound for one fetch exchange, in seconds.
    pub fetch_timeout: u64,
    /// Program and leading arguments of the orchestration CLI.
    pub compose_command: Vec<String>,
}

impl Default for OrcaConfig {
    fn default() -> Self {
        Self {
            targetpath: PathBuf::from("/tmp/ocd/opt/compose"),
            workdir: PathBuf::from("/tmp/ocd"),
            loglevel: "info".to_string(),
            autosync: AutoSync::On,
            interval: 300,
            basicauth: BTreeMap::new(),
            repos: BTreeMap::new(),
            listen: "0.0.0.0:6666".to_string(),
            fetch_timeout: 30,
            compose_command: vec!["docker".to_string(), "compose".to_string()],
        }
    }
}

impl fmt::Debug for OrcaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrcaConfig")
            .field("targetpath", &self.targetpath)
            .field("workdir", &self.workdir)
            .field("loglevel", &self.loglevel)
            .field("autosync", &self.autosync)
            .field("interval", &self.interval)
            .field("basicauth", &self.basicauth.keys().collect::<Vec<_>>())
            .field("repos", &self.repos)
            .field("listen", &self.listen)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("compose_command", &self.compose_command)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

impl OrcaConfig {
    /// Load defaults, the first config file found, and the process environment,
    /// then validate.
    ///
    /// An explicit `path` must exist. Without one, a missing file is not an
    /// error: defaults and environment still apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match default_config_paths().into_iter().find(|p| p.exists()) {
                Some(found) => Self::load_from(&found)?,
                None => {
                    tracing::warn!(
                        target: "orca",
                        "no {CONFIG_FILE_NAME} found; using defaults and environment"
                    );
                    Self::default()
                }
            },
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file on top of the built-in defaults. No validation.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Overlay `ORCA_*` variables from `vars`. Unknown keys are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let rest = rest.to_ascii_lowercase();
            match rest.as_str() {
                "targetpath" => self.targetpath = PathBuf::from(value),
                "workdir" => self.workdir = PathBuf::from(value),
                "loglevel" => self.loglevel = value,
                "autosync" => self.autosync = value.parse()?,
                "interval" => self.interval = parse_u64("interval", &value)?,
                "listen" => self.listen = value,
                "fetch_timeout" => self.fetch_timeout = parse_u64("fetch_timeout", &value)?,
                "compose_command" => {
                    self.compose_command = value.split_whitespace().map(str::to_string).collect()
                }
                other => {
                    if let Some(user) = other.strip_prefix("basicauth_") {
                        self.basicauth.insert(user.to_string(), value);
                    } else if let Some(repo) = other.strip_prefix("repos_") {
                        self.apply_repo_env(repo, value)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_repo_env(&mut self, key: &str, value: String) -> Result<(), ConfigError> {
        let Some((name, field)) = key.rsplit_once('_') else {
            return Err(invalid(format!("{ENV_PREFIX}REPOS_{key}"), value));
        };
        let entry = self.repos.entry(name.to_string()).or_default();
        match field {
            "url" => entry.url = value,
            "user" => entry.user = Some(value),
            "secret" => entry.secret = Some(value),
            other => {
                return Err(invalid(
                    format!("{ENV_PREFIX}REPOS_{}", key.to_ascii_uppercase()),
                    format!("unknown repo field '{other}'"),
                ))
            }
        }
        Ok(())
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == 0 {
            return Err(invalid("interval", "0 (must be at least 1 second)"));
        }
        if self.fetch_timeout == 0 {
            return Err(invalid("fetch_timeout", "0 (must be at least 1 second)"));
        }
        if self.compose_command.is_empty() {
            return Err(invalid("compose_command", "empty"));
        }
        for (name, repo) in &self.repos {
            if repo.url.trim().is_empty() {
                return Err(invalid(format!("repos.{name}.url"), "empty"));
            }
        }
        if self.repos.is_empty() {
            return Err(ConfigError::NoStacks);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // 3. Derived views
    // -----------------------------------------------------------------------

    /// Repository bindings, sorted by stack name.
    pub fn repo_configs(&self) -> Vec<RepoConfig> {
        self.repos
            .iter()
            .map(|(name, entry)| RepoConfig {
                name: StackName::from(name.as_str()),
                url: entry.url.clone(),
                credential: Credential::new(entry.user.clone(), entry.secret.clone()),
            })
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    /// `workdir/<id>/`: private scratch directory of one stack. Pure, no I/O.
    pub fn stack_workdir(&self, id: &StackId) -> PathBuf {
        self.workdir.join(id.as_str())
    }

    /// `targetpath/<name>/`: deployed directory of one stack. Pure, no I/O.
    pub fn stack_target(&self, name: &StackName) -> PathBuf {
        self.targetpath.join(&name.0)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("orca").join(CONFIG_FILE_NAME));
    }
    paths
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = OrcaConfig::default();
        assert_eq!(c.interval, 300);
        assert_eq!(c.autosync, AutoSync::On);
        assert_eq!(c.loglevel, "info");
        assert_eq!(c.workdir, PathBuf::from("/tmp/ocd"));
        assert!(c.basicauth.is_empty());
    }

    #[test]
    fn env_overrides_scalars() {
        let mut c = OrcaConfig::default();
        c.apply_env(vars(&[
            ("ORCA_INTERVAL", "15"),
            ("ORCA_AUTOSYNC", "off"),
            ("ORCA_WORKDIR", "/var/tmp/orca"),
            ("HOME", "/root"),
        ]))
        .unwrap();
        assert_eq!(c.interval, 15);
        assert_eq!(c.autosync, AutoSync::Off);
        assert_eq!(c.workdir, PathBuf::from("/var/tmp/orca"));
    }

    #[test]
    fn env_builds_repo_entries() {
        let mut c = OrcaConfig::default();
        c.apply_env(vars(&[
            ("ORCA_REPOS_WEB_URL", "https://example.com/compose.yaml"),
            ("ORCA_REPOS_WEB_SECRET", "tok"),
            ("ORCA_BASICAUTH_ADMIN", "pw"),
        ]))
        .unwrap();
        let web = c.repos.get("web").expect("web repo");
        assert_eq!(web.url, "https://example.com/compose.yaml");
        assert_eq!(web.secret.as_deref(), Some("tok"));
        assert_eq!(c.basicauth.get("admin").map(String::as_str), Some("pw"));
    }

    #[test]
    fn env_rejects_bad_numbers() {
        let mut c = OrcaConfig::default();
        let err = c.apply_env(vars(&[("ORCA_INTERVAL", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn validate_requires_repos() {
        let c = OrcaConfig::default();
        assert!(matches!(c.validate(), Err(ConfigError::NoStacks)));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut c = OrcaConfig::default();
        c.repos.insert(
            "web".into(),
            RepoEntry {
                url: "https://example.com/compose.yaml".into(),
                ..Default::default()
            },
        );
        c.interval = 0;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn debug_output_never_contains_secrets() {
        let mut c = OrcaConfig::default();
        c.basicauth.insert("admin".into(), "s3cret-pw".into());
        c.repos.insert(
            "web".into(),
            RepoEntry {
                url: "https://example.com/compose.yaml".into(),
                user: Some("bot".into()),
                secret: Some("s3cret-token".into()),
            },
        );
        let rendered = format!("{c:?}");
        assert!(!rendered.contains("s3cret-pw"));
        assert!(!rendered.contains("s3cret-token"));
        assert!(rendered.contains("admin"));
    }

    #[test]
    fn stack_paths_are_namespaced() {
        let c = OrcaConfig::default();
        let id = StackId::from_url("https://example.com/compose.yaml");
        assert_eq!(c.stack_workdir(&id), PathBuf::from("/tmp/ocd").join(id.as_str()));
        assert_eq!(
            c.stack_target(&StackName::from("web")),
            PathBuf::from("/tmp/ocd/opt/compose/web")
        );
    }
}
