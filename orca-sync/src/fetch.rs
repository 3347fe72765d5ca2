//! Remote definition fetcher.
//!
//! One GET per call. The authentication strategy is chosen from the URL
//! shape by an ordered rule list; the first matching rule wins:
//!
//! | URL shape                               | Strategy                          |
//! |-----------------------------------------|-----------------------------------|
//! | contains `/api/v4/projects/` (GitLab)   | `PRIVATE-TOKEN: <secret>`         |
//! | host `raw.githubusercontent.com`        | `Authorization: token <secret>`   |
//! | anything else                           | HTTP basic when user and secret   |
//!
//! Only a `200` counts as success. The body lands atomically in the stack's
//! working directory under [`destination_file_name`].

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use orca_core::Credential;

use crate::error::FetchError;
use crate::store::TMP_SUFFIX;

const GITLAB_API_MARKER: &str = "/api/v4/projects/";
const GITHUB_RAW_HOST: &str = "raw.githubusercontent.com";
const ENCODED_SLASH: &str = "%2f";

// ---------------------------------------------------------------------------
// Authentication strategy
// ---------------------------------------------------------------------------

/// How a request is authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// GitLab file API: `PRIVATE-TOKEN` header.
    PrivateToken(String),
    /// GitHub raw content: `Authorization: token <secret>`.
    Token(String),
    /// HTTP basic authentication.
    Basic { user: String, secret: String },
    /// No authentication header.
    None,
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStrategy::PrivateToken(_) => f.write_str("PrivateToken(<redacted>)"),
            AuthStrategy::Token(_) => f.write_str("Token(<redacted>)"),
            AuthStrategy::Basic { user, .. } => write!(f, "Basic({user}, <redacted>)"),
            AuthStrategy::None => f.write_str("None"),
        }
    }
}

struct AuthRule {
    name: &'static str,
    matches: fn(&str) -> bool,
    build: fn(&Credential) -> AuthStrategy,
}

const AUTH_RULES: &[AuthRule] = &[
    AuthRule {
        name: "gitlab",
        matches: is_gitlab_file_api,
        build: private_token,
    },
    AuthRule {
        name: "github-raw",
        matches: is_github_raw,
        build: github_token,
    },
];

fn is_gitlab_file_api(url: &str) -> bool {
    url.contains(GITLAB_API_MARKER)
}

fn is_github_raw(url: &str) -> bool {
    host_of(url).is_some_and(|host| host.eq_ignore_ascii_case(GITHUB_RAW_HOST))
}

fn private_token(credential: &Credential) -> AuthStrategy {
    credential
        .secret()
        .map(|s| AuthStrategy::PrivateToken(s.to_string()))
        .unwrap_or(AuthStrategy::None)
}

fn github_token(credential: &Credential) -> AuthStrategy {
    credential
        .secret()
        .map(|s| AuthStrategy::Token(s.to_string()))
        .unwrap_or(AuthStrategy::None)
}

fn basic(credential: &Credential) -> AuthStrategy {
    credential
        .basic()
        .map(|(user, secret)| AuthStrategy::Basic {
            user: user.to_string(),
            secret: secret.to_string(),
        })
        .unwrap_or(AuthStrategy::None)
}

impl AuthStrategy {
    /// Pick the strategy for `url`. Pure.
    pub fn select(url: &str, credential: &Credential) -> Self {
        for rule in AUTH_RULES {
            if (rule.matches)(url) {
                tracing::trace!(target: "puller", rule = rule.name, "auth rule matched");
                return (rule.build)(credential);
            }
        }
        basic(credential)
    }

    /// The `(header, value)` pair this strategy adds, if any.
    pub fn header(&self) -> Option<(&'static str, String)> {
        match self {
            AuthStrategy::PrivateToken(token) => Some(("PRIVATE-TOKEN", token.clone())),
            AuthStrategy::Token(token) => Some(("Authorization", format!("token {token}"))),
            AuthStrategy::Basic { user, secret } => Some((
                "Authorization",
                format!("Basic {}", BASE64.encode(format!("{user}:{secret}"))),
            )),
            AuthStrategy::None => None,
        }
    }
}

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn host_of(url: &str) -> Option<&str> {
    let rest = strip_scheme(url);
    let authority = rest.split('/').next()?;
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host.split(':').next()?;
    (!host.is_empty()).then_some(host)
}

/// Name under which the fetched body is stored in the working directory.
///
/// For GitLab file-API URLs
/// (`.../repository/files/<url-encoded path>/raw?ref=...`) this is the part
/// of the encoded path after the last `%2F`. Otherwise it is the last path
/// segment of the URL. Query string and fragment are ignored.
pub fn destination_file_name(url: &str) -> Result<String, FetchError> {
    let invalid = |reason: &str| FetchError::InvalidRequest {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let path = strip_query(strip_scheme(url)).trim_end_matches('/');
    let name = if is_gitlab_file_api(url) {
        let encoded = path
            .strip_suffix("/raw")
            .and_then(|p| p.rsplit_once('/'))
            .map(|(_, segment)| segment)
            .ok_or_else(|| invalid("GitLab file URL must end in /raw"))?;
        match encoded.to_ascii_lowercase().rfind(ENCODED_SLASH) {
            Some(idx) => &encoded[idx + ENCODED_SLASH.len()..],
            None => encoded,
        }
    } else {
        match path.rsplit_once('/') {
            Some((_, last)) => last,
            None => return Err(invalid("URL has no file path")),
        }
    };

    if name.is_empty() || name == "." || name == ".." || name.ends_with(TMP_SUFFIX) {
        return Err(invalid("cannot derive a file name from the URL"));
    }
    Ok(name.to_string())
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP client for stack definitions. Cheap to clone; clones share the
/// connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    agent: ureq::Agent,
}

impl Fetcher {
    /// Every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("orca/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    /// Fetch `url` into `dest_dir`, returning the path written.
    ///
    /// `dest_dir` is created if missing. The previous copy is only replaced
    /// once the full body has been received.
    pub fn fetch(
        &self,
        url: &str,
        credential: &Credential,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let file_name = destination_file_name(url)?;
        let strategy = AuthStrategy::select(url, credential);
        tracing::debug!(target: "puller", url, file = %file_name, auth = ?strategy, "fetching");

        let mut request = self.agent.get(url);
        if let Some((name, value)) = strategy.header() {
            request = request.set(name, &value);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    code,
                    text: response.status_text().to_string(),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                let reason = transport.to_string();
                return Err(match transport.kind() {
                    ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                        FetchError::InvalidRequest {
                            url: url.to_string(),
                            reason,
                        }
                    }
                    _ => FetchError::Transport {
                        url: url.to_string(),
                        reason,
                    },
                });
            }
        };

        if response.status() != 200 {
            return Err(FetchError::Status {
                url: url.to_string(),
                code: response.status(),
                text: response.status_text().to_string(),
            });
        }

        std::fs::create_dir_all(dest_dir).map_err(|e| FetchError::Io {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;
        let dest = dest_dir.join(&file_name);
        let tmp = dest_dir.join(format!("{file_name}{TMP_SUFFIX}"));
        write_body(&mut response.into_reader(), &tmp, &dest)?;

        tracing::debug!(target: "puller", path = %dest.display(), "fetched");
        Ok(dest)
    }
}

fn write_body(body: &mut impl io::Read, tmp: &Path, dest: &Path) -> Result<(), FetchError> {
    let result = File::create(tmp)
        .and_then(|mut file| io::copy(body, &mut file).map(|_| ()))
        .and_then(|()| std::fs::rename(tmp, dest));
    if let Err(e) = result {
        let _ = std::fs::remove_file(tmp);
        return Err(FetchError::Io {
            path: dest.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}
