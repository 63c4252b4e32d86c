//! # Operator HTTP Surface
//!
//! The axum host around the core's command dispatch. Three fixed routes
//! (`/metrics`, `/favicon.ico`, `/static/*`); every other path falls
//! through to the command surface, which resolves it per the path-shape
//! rules in [`chainwatch::commands`].
//!
//! The handler always renders: a failed command becomes a readable error
//! line with status 200, never a crash and never an opaque 500.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use chainwatch::commands::{self, Command, CommandEngine, CommandOutput};
use chainwatch::monitor::NetworkMonitor;

use crate::auth::{AuthState, AuthUser, DEFAULT_USER};
use crate::metrics::ServerMetrics;

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CommandEngine>,
    pub monitor: Arc<NetworkMonitor>,
    pub metrics: Arc<ServerMetrics>,
    /// Present when `--with-auth` is on; owns the credential map.
    pub auth: Option<Arc<AuthState>>,
}

/// Builds the router. The auth middleware, when enabled, is layered on
/// top by `main` so the router itself stays auth-agnostic.
pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route_service("/favicon.ico", ServeFile::new(static_dir.join("favicon.ico")))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(dispatch_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Every non-fixed path lands here and becomes a [`Command`].
///
/// Form pairs come from the query string on GET and from the urlencoded
/// body otherwise; a request without a usable form is treated as empty.
async fn dispatch_handler(
    State(state): State<AppState>,
    uri: Uri,
    user: Option<Extension<AuthUser>>,
    form: Option<Form<Vec<(String, String)>>>,
) -> Response {
    state.metrics.http_requests_total.inc();
    let pairs = form.map(|Form(pairs)| pairs).unwrap_or_default();

    let command = match commands::parse_request(uri.path(), &pairs) {
        Ok(command) => command,
        Err(err) => return render_error(&state, err),
    };

    // setpassword touches the credential map, which only this layer owns.
    if let Command::SetPassword { password } = command {
        return set_password(&state, user, &password);
    }

    match state.engine.execute(command).await {
        Ok(CommandOutput::Json(value)) => Json(value).into_response(),
        Ok(CommandOutput::Text(text)) => (StatusCode::OK, text + "\n").into_response(),
        Ok(CommandOutput::SetPassword { .. }) => render_error(
            &state,
            chainwatch::Error::InvalidArgument("setpassword must go through the http layer".into()),
        ),
        Err(err) => render_error(&state, err),
    }
}

fn set_password(state: &AppState, user: Option<Extension<AuthUser>>, password: &str) -> Response {
    match &state.auth {
        Some(auth) => {
            let user = user
                .map(|Extension(AuthUser(name))| name)
                .unwrap_or_else(|| DEFAULT_USER.to_string());
            auth.set_password(&user, password);
            (StatusCode::OK, format!("password updated for {user}\n")).into_response()
        }
        None => (
            StatusCode::OK,
            "authentication is disabled; password not changed\n",
        )
            .into_response(),
    }
}

fn render_error(state: &AppState, err: chainwatch::Error) -> Response {
    state.metrics.command_errors_total.inc();
    tracing::warn!("command failed: {err}");
    (StatusCode::OK, format!("error: {err}\n")).into_response()
}

/// `GET /metrics` — refreshes the model gauges, then renders the registry
/// in Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.metrics.refresh_from(&state.monitor);
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("failed to encode metrics: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::AUTHORIZATION;
    use axum::http::Request;
    use base64::Engine;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use chainwatch::mailer::MemoryMailer;
    use chainwatch::mock::MockTransport;
    use chainwatch::model::node::NetworkAddress;
    use chainwatch::monitor::{MonitorOptions, NetworkMonitor};
    use chainwatch::transport::{MemoryStore, SystemClock};
    use chainwatch::watchdog::Watchdog;

    fn rpc_result(value: serde_json::Value) -> String {
        json!({ "id": 0, "jsonrpc": "2.0", "result": value }).to_string()
    }

    /// A single self-contained Geth node behind the mock transport.
    fn single_node_fixtures(mock: &MockTransport) {
        mock.insert("10.0.0.1", "net_version", &rpc_result(json!("1337")));
        mock.insert(
            "10.0.0.1",
            "web3_clientVersion",
            &rpc_result(json!("Geth/miner1/v1.8.2-stable/linux-amd64/go1.10")),
        );
        mock.insert(
            "10.0.0.1",
            "admin_nodeInfo",
            &rpc_result(json!({
                "id": "aa11",
                "name": "Geth/miner1/v1.8.2-stable/linux-amd64/go1.10",
                "enode": "enode://aa11@10.0.0.1:30303"
            })),
        );
        mock.insert("10.0.0.1", "admin_peers", &rpc_result(json!([])));
        mock.insert(
            "10.0.0.1",
            "txpool_status",
            &rpc_result(json!({ "pending": "0x0", "queued": "0x0" })),
        );
        mock.insert("10.0.0.1", "eth_blockNumber", &rpc_result(json!("0x10")));
    }

    fn test_state(with_auth: bool) -> (AppState, Arc<MockTransport>) {
        let mock = Arc::new(MockTransport::new());
        single_node_fixtures(&mock);
        let clock: Arc<dyn chainwatch::transport::Clock> = Arc::new(SystemClock);
        let monitor = NetworkMonitor::new(
            Arc::clone(&mock) as Arc<dyn chainwatch::transport::Transport>,
            Arc::clone(&clock),
            MonitorOptions {
                default_access_address: NetworkAddress::new("10.0.0.1:8545"),
                ..MonitorOptions::default()
            },
        );
        let store = Arc::new(MemoryStore::new());
        let watchdog = Watchdog::new(
            Arc::clone(&monitor),
            Arc::new(MemoryMailer::new()),
            Arc::clone(&store) as Arc<dyn chainwatch::transport::ConfigStore>,
            clock,
            "127.0.0.1".to_string(),
        );
        let engine = Arc::new(CommandEngine::new(Arc::clone(&monitor), watchdog));
        let auth = with_auth.then(|| Arc::new(AuthState::load(store.as_ref())));
        (
            AppState {
                engine,
                monitor,
                metrics: Arc::new(ServerMetrics::new()),
                auth,
            },
            mock,
        )
    }

    async fn fetch(router: Router, path: &str, auth_header: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri(path);
        if let Some(value) = auth_header {
            request = request.header(AUTHORIZATION, value);
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[tokio::test]
    async fn discovernetwork_renders_json() {
        let (state, _mock) = test_state(false);
        let router = build_router(state, Path::new("static"));

        let (status, body) = fetch(router, "/discovernetwork", None).await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["report"]["network_id"], json!("1337"));
        assert_eq!(value["report"]["nodes"], json!(1));
    }

    #[tokio::test]
    async fn unknown_command_renders_an_error_line() {
        let (state, _mock) = test_state(false);
        let router = build_router(state.clone(), Path::new("static"));

        let (status, body) = fetch(router, "/frobnicate", None).await;
        assert_eq!(status, StatusCode::OK, "the surface always renders");
        assert!(body.starts_with("error: unknown command"), "{body}");
        assert_eq!(state.metrics.command_errors_total.get(), 1);
    }

    #[tokio::test]
    async fn rpc_shorthand_hits_the_default_node() {
        let (state, mock) = test_state(false);
        let router = build_router(state, Path::new("static"));

        let (status, body) = fetch(router, "/eth_blocknumber", None).await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["method"], json!("eth_blockNumber"));
        assert_eq!(value["result"]["number"], json!(16));
        assert_eq!(mock.call_count("10.0.0.1", "eth_blockNumber"), 1);
    }

    #[tokio::test]
    async fn metrics_expose_model_gauges() {
        let (state, _mock) = test_state(false);
        let router = build_router(state, Path::new("static"));
        let (_, _) = fetch(router.clone(), "/discovernetwork", None).await;

        let (status, body) = fetch(router, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("chainwatch_known_nodes 1"), "{body}");
        assert!(body.contains("chainwatch_http_requests_total"));
    }

    #[tokio::test]
    async fn auth_gates_the_command_surface() {
        let (state, _mock) = test_state(true);
        let auth = state.auth.clone().unwrap();
        let router = build_router(state, Path::new("static")).layer(
            axum::middleware::from_fn_with_state(Arc::clone(&auth), crate::auth::require_auth),
        );

        let (status, _) = fetch(router.clone(), "/heartbeat", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("sanlab:sanlab")
        );
        let (status, _) = fetch(router.clone(), "/heartbeat", Some(&header)).await;
        assert_eq!(status, StatusCode::OK);

        let bad = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("sanlab:wrong")
        );
        let (status, _) = fetch(router, "/heartbeat", Some(&bad)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn setpassword_updates_the_authenticated_user() {
        let (state, _mock) = test_state(true);
        let auth = state.auth.clone().unwrap();
        let router = build_router(state, Path::new("static")).layer(
            axum::middleware::from_fn_with_state(Arc::clone(&auth), crate::auth::require_auth),
        );

        let header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("sanlab:sanlab")
        );
        let (status, body) =
            fetch(router, "/setpassword?pass=newsecret", Some(&header)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("password updated for sanlab"), "{body}");
        assert!(auth.verify("sanlab", "newsecret"));
        assert!(!auth.verify("sanlab", "sanlab"));
    }
}
