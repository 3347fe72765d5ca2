//! HTTP control surface.
//!
//! - `GET /health` → `200 ok`
//! - `POST /sync/{on|off}` → `200 toggled`, behind HTTP basic auth against
//!   the configured `basicauth` map. An empty map rejects everyone.
//!
//! Every response is logged at `info` inside a span carrying the method and
//! URI, so request query strings pass through the masking writer.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use orca_core::{AutoSync, AutoSyncFlag};

use crate::error::{io_err, DaemonError};

const REALM: &str = "Basic realm=\"Authorization Required\"";

/// State shared by every handler.
#[derive(Clone)]
pub struct ControlState {
    autosync: AutoSyncFlag,
    credentials: Arc<BTreeMap<String, String>>,
}

impl ControlState {
    pub fn new(autosync: AutoSyncFlag, credentials: BTreeMap<String, String>) -> Self {
        Self {
            autosync,
            credentials: Arc::new(credentials),
        }
    }
}

/// Build the control router.
pub fn router(state: ControlState) -> Router {
    let toggles = Router::new()
        .route("/sync/{mode}", post(toggle_sync))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth));

    Router::new()
        .route("/health", get(health))
        .merge(toggles)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Serve [`router`] on `listener` until a shutdown is broadcast.
pub async fn serve(
    listener: TcpListener,
    state: ControlState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "control listener".to_string());
    tracing::info!(target: "control", %addr, "control surface listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| io_err(addr, e))
}

async fn health() -> &'static str {
    "ok"
}

async fn toggle_sync(State(state): State<ControlState>, Path(mode): Path<String>) -> Response {
    let mode = match mode.as_str() {
        "on" => AutoSync::On,
        "off" => AutoSync::Off,
        _ => {
            return (StatusCode::BAD_REQUEST, "mode must be one of 'on' or 'off'").into_response();
        }
    };
    state.autosync.set(mode);
    tracing::info!(target: "control", autosync = %mode, "auto-sync toggled");
    (StatusCode::OK, "toggled").into_response()
}

async fn basic_auth(State(state): State<ControlState>, req: Request, next: Next) -> Response {
    if authorized(&state.credentials, req.headers()) {
        return next.run(req).await;
    }
    tracing::warn!(target: "control", path = %req.uri().path(), "unauthorized request");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, REALM)],
    )
        .into_response()
}

fn authorized(credentials: &BTreeMap<String, String>, headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Some(decoded) = BASE64
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    else {
        return false;
    };
    let Some((user, password)) = decoded.split_once(':') else {
        return false;
    };
    credentials.get(user).is_some_and(|expected| expected == password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    fn creds() -> BTreeMap<String, String> {
        BTreeMap::from([("admin".to_string(), "changeme".to_string())])
    }

    #[test]
    fn accepts_matching_credentials() {
        // base64("admin:changeme")
        assert!(authorized(&creds(), &headers("Basic YWRtaW46Y2hhbmdlbWU=")));
    }

    #[test]
    fn rejects_wrong_password_and_unknown_user() {
        let wrong = format!("Basic {}", BASE64.encode("admin:nope"));
        let unknown = format!("Basic {}", BASE64.encode("root:changeme"));
        assert!(!authorized(&creds(), &headers(&wrong)));
        assert!(!authorized(&creds(), &headers(&unknown)));
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(!authorized(&creds(), &HeaderMap::new()));
        assert!(!authorized(&creds(), &headers("Bearer abc")));
        assert!(!authorized(&creds(), &headers("Basic !!!")));
        let no_colon = format!("Basic {}", BASE64.encode("adminchangeme"));
        assert!(!authorized(&creds(), &headers(&no_colon)));
    }

    #[test]
    fn empty_map_rejects_everyone() {
        let any = format!("Basic {}", BASE64.encode(":"));
        assert!(!authorized(&BTreeMap::new(), &headers(&any)));
    }
}
