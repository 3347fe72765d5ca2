//! Config file loading, error-message and stack identity integration tests.

use assert_fs::prelude::*;
use orca_core::{AutoSync, ConfigError, OrcaConfig, StackId, StackName};
use predicates::prelude::*;
use rstest::rstest;

// ---------------------------------------------------------------------------
// 1. File loading
// ---------------------------------------------------------------------------

#[test]
fn load_full_yaml_document() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yml");
    file.write_str(
        r#"
targetpath: /srv/compose
workdir: /var/tmp/orca
loglevel: warn
autosync: "off"
interval: 60
basicauth:
  admin: changeme
repos:
  web:
    url: https://raw.githubusercontent.com/acme/web/main/docker-compose.yaml
    secret: ghp_example
  api:
    url: https://git.example.com/api.yaml
    user: deploy
    secret: pw
"#,
    )
    .expect("write");

    let config = OrcaConfig::load_from(file.path()).expect("load");
    config.validate().expect("valid");

    assert_eq!(config.autosync, AutoSync::Off);
    assert_eq!(config.interval, 60);
    assert_eq!(config.loglevel, "warn");
    assert_eq!(config.basicauth.len(), 1);

    let repos = config.repo_configs();
    let names: Vec<_> = repos.iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec![StackName::from("api"), StackName::from("web")]);
    assert_eq!(repos[0].credential.basic(), Some(("deploy", "pw")));
    assert_eq!(repos[1].credential.basic(), None);
    assert_eq!(repos[1].credential.secret(), Some("ghp_example"));
}

#[test]
fn partial_yaml_keeps_defaults() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yml");
    file.write_str("interval: 10\n").expect("write");

    let config = OrcaConfig::load_from(file.path()).expect("load");
    assert_eq!(config.interval, 10);
    assert_eq!(config.listen, "0.0.0.0:6666");
    assert_eq!(config.compose_command, vec!["docker", "compose"]);
}

#[test]
fn empty_file_yields_defaults() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yml");
    file.touch().expect("touch");

    let config = OrcaConfig::load_from(file.path()).expect("load");
    assert_eq!(config, OrcaConfig::default());
}

// ---------------------------------------------------------------------------
// 2. Error messages
// ---------------------------------------------------------------------------

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = OrcaConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(predicate::str::contains("config.yml").eval(&err.to_string()));
}

#[test]
fn missing_explicit_file_is_io_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let err = OrcaConfig::load_from(&dir.path().join("nope.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
}

#[test]
fn invalid_autosync_value_is_rejected() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yml");
    file.write_str("autosync: sometimes\n").expect("write");

    let err = OrcaConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn no_repos_is_fatal() {
    let err = OrcaConfig::default().validate().unwrap_err();
    assert!(predicate::str::contains("no stacks").eval(&err.to_string()));
}

// ---------------------------------------------------------------------------
// 3. Stack identity
// ---------------------------------------------------------------------------

#[rstest]
#[case("https://example.com/compose.yaml", "http://example.com/compose.yaml")]
#[case("https://example.com/compose.yaml", "example.com/compose.yaml")]
#[case(
    "https://gitlab.example.com/api/v4/projects/7/repository/files/a%2Fdocker-compose.yaml/raw?ref=main",
    "ssh://gitlab.example.com/api/v4/projects/7/repository/files/a%2Fdocker-compose.yaml/raw?ref=main"
)]
fn stack_id_is_scheme_independent(#[case] a: &str, #[case] b: &str) {
    let left = StackId::from_url(a);
    let right = StackId::from_url(b);
    assert_eq!(left, right);
    assert_eq!(left.as_str().len(), 12);
    assert!(left.as_str().chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn stack_id_is_stable_across_calls() {
    let url = "https://example.com/stack/docker-compose.yml";
    assert_eq!(StackId::from_url(url), StackId::from_url(url));
}
