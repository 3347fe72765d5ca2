//! Domain types for Orca stacks.
//!
//! All types that cross crate boundaries live here. Filesystem paths are
//! always `PathBuf`; secrets never appear in `Debug` output.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{invalid, ConfigError};

/// Number of hex characters kept from the URL digest.
pub const STACK_ID_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Configured name of a stack (the key under `repos`).
///
/// Also names the deployed directory `targetpath/<name>/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackName(pub String);

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for StackName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StackName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Stable 12-character identifier derived from a source URL.
///
/// The scheme (everything up to and including the last `://`) is stripped,
/// the remainder is SHA-256 hashed and the first 12 hex characters are kept.
/// Two URLs that differ only in scheme therefore share an identifier, and the
/// identifier survives restarts so `workdir/<id>` can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackId(String);

impl StackId {
    pub fn from_url(url: &str) -> Self {
        let plain = match url.rfind("://") {
            Some(idx) => &url[idx + 3..],
            None => url,
        };
        let mut h = Sha256::new();
        h.update(plain.as_bytes());
        let digest = hex::encode(h.finalize());
        Self(digest[..STACK_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Credentials and repository binding
// ---------------------------------------------------------------------------

/// Optional credential attached to a remote source.
///
/// How it is presented on the wire depends on the URL shape; see the fetcher.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub user: Option<String>,
    pub secret: Option<String>,
}

impl Credential {
    pub fn new(user: Option<String>, secret: Option<String>) -> Self {
        Self {
            user: user.filter(|u| !u.is_empty()),
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// `(user, secret)` only when both halves are present.
    pub fn basic(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.secret) {
            (Some(user), Some(secret)) => Some((user.as_str(), secret.as_str())),
            _ => None,
        }
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One configured repository: where to fetch the service definition from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub name: StackName,
    pub url: String,
    pub credential: Credential,
}

// ---------------------------------------------------------------------------
// Auto-sync
// ---------------------------------------------------------------------------

/// Whether detected drift is applied to the orchestration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutoSync {
    #[default]
    On,
    Off,
}

impl fmt::Display for AutoSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoSync::On => write!(f, "on"),
            AutoSync::Off => write!(f, "off"),
        }
    }
}

impl FromStr for AutoSync {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(AutoSync::On),
            "off" => Ok(AutoSync::Off),
            other => Err(invalid("autosync", other)),
        }
    }
}

/// Process-wide auto-sync toggle shared by every stack loop and the control
/// surface.
///
/// Cloning shares the same cell. Reads and writes are relaxed: a loop may act
/// on a value that is one cycle stale, which only delays or skips an apply.
#[derive(Debug, Clone)]
pub struct AutoSyncFlag(Arc<AtomicBool>);

impl AutoSyncFlag {
    pub fn new(initial: AutoSync) -> Self {
        Self(Arc::new(AtomicBool::new(initial == AutoSync::On)))
    }

    pub fn get(&self) -> AutoSync {
        if self.0.load(Ordering::Relaxed) {
            AutoSync::On
        } else {
            AutoSync::Off
        }
    }

    pub fn set(&self, mode: AutoSync) {
        self.0.store(mode == AutoSync::On, Ordering::Relaxed);
    }

    pub fn is_on(&self) -> bool {
        self.get() == AutoSync::On
    }
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

/// Fit `s` into exactly `width` characters for the status line.
///
/// Longer strings keep their head and tail around a `...` marker; shorter
/// strings are padded on both sides (extra space goes to the right).
pub fn center_display(s: &str, width: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();

    if len > width {
        const MARK: &str = "...";
        if width <= MARK.len() {
            return chars[..width].iter().collect();
        }
        let keep = width - MARK.len();
        let head = keep.div_ceil(2);
        let tail = keep - head;
        let mut out: String = chars[..head].iter().collect();
        out.push_str(MARK);
        out.extend(chars[len - tail..].iter());
        return out;
    }

    let pad = width - len;
    let left = pad / 2;
    let right = pad - left;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(right))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
