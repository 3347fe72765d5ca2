//! Log setup and secret masking.
//!
//! Every formatted line passes through [`mask_secrets`] before it reaches
//! stderr, unless the configured level is `debug`.

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Keys whose values never reach a log sink.
pub const MASKED_KEYS: &[&str] = &["jwt", "token", "password", "pass", "passphrase", "secret"];

pub const REDACTED: &str = "<redacted>";

static PAIR_RE: OnceLock<Regex> = OnceLock::new();

fn pair_re() -> &'static Regex {
    PAIR_RE.get_or_init(|| Regex::new(r"([^&=?\s]+)=([^&?\s]*)").expect("valid masking pattern"))
}

/// Replace the value of every `key=value` pair whose key is one of
/// [`MASKED_KEYS`] with [`REDACTED`].
pub fn mask_secrets(line: &str) -> Cow<'_, str> {
    pair_re().replace_all(line, |caps: &Captures<'_>| {
        let key = &caps[1];
        if MASKED_KEYS.contains(&key) {
            format!("{key}={REDACTED}")
        } else {
            caps[0].to_string()
        }
    })
}

/// Map a configured `loglevel` to a filter directive. Unknown values fall
/// back to `debug`.
pub fn level_directive(loglevel: &str) -> &'static str {
    match loglevel.trim().to_ascii_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        _ => "debug",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `loglevel`.
pub fn init(loglevel: &str) {
    let directive = level_directive(loglevel);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let writer = MaskingWriter::new(io::stderr, directive != "debug");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init();
}

// ---------------------------------------------------------------------------
// MaskingWriter
// ---------------------------------------------------------------------------

/// [`MakeWriter`] that masks secrets in everything written through it.
#[derive(Debug, Clone)]
pub struct MaskingWriter<M> {
    inner: M,
    enabled: bool,
}

impl<M> MaskingWriter<M> {
    /// With `enabled == false` bytes pass through untouched.
    pub fn new(inner: M, enabled: bool) -> Self {
        Self { inner, enabled }
    }
}

impl<'a, M> MakeWriter<'a> for MaskingWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = Masked<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Masked {
            inner: self.inner.make_writer(),
            enabled: self.enabled,
        }
    }
}

/// Writer handed out by [`MaskingWriter`].
#[derive(Debug)]
pub struct Masked<W> {
    inner: W,
    enabled: bool,
}

impl<W: Write> Write for Masked<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.enabled {
            return self.inner.write(buf);
        }
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(mask_secrets(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
