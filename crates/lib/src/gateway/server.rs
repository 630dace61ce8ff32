//! Gateway HTTP + WebSocket server (single port).
//!
//! `/ws` is the digest-gated session upgrade; every other path goes through
//! endpoint-permission resolution and static file serving. Client addresses
//! key the per-address nonce store, so the router is served with connect
//! info.

use crate::auth::{
    self, challenge, AuthTable, EndpointAccess, NonceStore, PermissionLevel, OPAQUE_SIZE,
};
use crate::config::Config;
use crate::gateway::{session, statics};
use crate::hub::{Hub, HubHandle};
use crate::serial::SerialLink;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::Response,
    routing::get,
    Router,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Server identification carried on every response.
pub const SERVER_IDENT: &str = concat!("gateview/", env!("CARGO_PKG_VERSION"));

/// Shared state for the gateway (config, credentials, nonces, hub).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub auth_table: Arc<AuthTable>,
    pub nonces: Arc<NonceStore>,
    /// Process-lifetime random value shared by every challenge.
    pub opaque: Arc<String>,
    pub hub: HubHandle,
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Opens the serial link first — an unopenable port aborts startup. Blocks
/// until shutdown (Ctrl+C or SIGTERM).
pub async fn run_gateway(config: Config) -> Result<()> {
    let device = config
        .serial
        .device
        .as_deref()
        .context("no serial device configured (set serial.device or pass --device)")?;
    let link = SerialLink::open(device, config.serial.baud_rate)
        .with_context(|| format!("opening serial device {}", device))?;
    let (serial, incoming) = link.start();
    log::info!(
        "serial link up on {} at {} baud",
        device,
        config.serial.baud_rate
    );

    let table_path = config
        .auth
        .table_path
        .clone()
        .context("no auth table configured (set auth.tablePath or pass --auth-file)")?;
    let auth_table = auth::load_auth_table(&table_path)?;
    log::info!(
        "loaded {} credential(s) from {}",
        auth_table.len(),
        table_path.display()
    );

    let hub = Hub::new(serial);
    let hub_handle = hub.handle();
    tokio::spawn(hub.run(incoming));

    let state = GatewayState {
        config: Arc::new(config.clone()),
        auth_table: Arc::new(auth_table),
        nonces: Arc::new(NonceStore::new()),
        opaque: Arc::new(auth::generate_token(OPAQUE_SIZE)),
        hub: hub_handle,
    };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .fallback(http_handler)
        .with_state(state);

    let bind_addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or
/// SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// 401 response carrying a fresh challenge.
fn unauthorized(nonce: &str, opaque: &str, stale: bool) -> Response {
    let mut response = Response::new(Body::from("Unauthorized"));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&challenge(nonce, opaque, stale)) {
        headers.insert(header::WWW_AUTHENTICATE, value);
    }
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_IDENT));
    response
}

/// Run the full digest check for one request. Any failure rotates the
/// address's nonce and returns the 401 challenge; `stale=TRUE` is set only
/// when a well-formed header carried a nonce that no longer matches the one
/// on record. A `Blocked` credential verifying correctly is still a
/// failure.
async fn verify_digest(
    state: &GatewayState,
    ip: IpAddr,
    authorization: Option<&str>,
    method: &str,
) -> Result<PermissionLevel, Response> {
    let nonce = state.nonces.current(ip).await;
    let stale = authorization
        .and_then(auth::parse_digest_header)
        .is_some_and(|creds| creds.nonce != nonce);
    if !stale {
        if let Some(level) = auth::authenticate(
            authorization,
            method,
            &state.auth_table,
            &nonce,
            &state.opaque,
        ) {
            if level > PermissionLevel::Blocked {
                return Ok(level);
            }
        }
    }
    let fresh = state.nonces.rotate(ip).await;
    Err(unauthorized(&fresh, &state.opaque, stale))
}

/// GET /ws upgrades to a session after the digest check passes. The upgrade
/// response is decorated with the server identification.
async fn ws_handler(
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    match verify_digest(&state, addr.ip(), authorization, "GET").await {
        Ok(level) => {
            let hub = state.hub.clone();
            let mut response =
                ws.on_upgrade(move |socket| session::run_session(socket, hub, level));
            response
                .headers_mut()
                .insert(header::SERVER, HeaderValue::from_static(SERVER_IDENT));
            response
        }
        Err(challenge_response) => challenge_response,
    }
}

/// Fallback route: resolve the path's permission requirement, then serve
/// static content. Unresolvable paths are rejected rather than inheriting
/// the root's open access.
async fn http_handler(
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path();
    let Some(access) = auth::resolve_endpoint(path) else {
        return statics::not_found(path);
    };
    if let EndpointAccess::Required(required) = access {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        match verify_digest(&state, addr.ip(), authorization, method.as_str()).await {
            Ok(level) if level >= required => {}
            Ok(_) => {
                // verified, but below the endpoint's tier
                let fresh = state.nonces.rotate(addr.ip()).await;
                return unauthorized(&fresh, &state.opaque, false);
            }
            Err(challenge_response) => return challenge_response,
        }
    }
    statics::serve(&state.config.gateway.doc_root, &method, path).await
}
