//! Context memory service entry point.
//!
//! Loads configuration from the hierarchical candidate chain,
//! bootstraps [`AppState`], layers auth and tracing, and serves the tool
//! surface until `ctrl_c`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use ctx_api::{build_state, AppState, AuthMiddlewareState};
use ctx_core::{ApiKeyEntry, CtxConfig, Role};
use ctx_sync::{RandomJitter, SyncWorker};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const CONFIG_CANDIDATES: [&str; 2] = ["config/.ctxrc.yaml", ".ctxrc.yaml"];

/// Finds the first readable, parseable config on the candidate chain:
/// `env(CTX_CONFIG_PATH)` → `./config/.ctxrc.yaml` → `./.ctxrc.yaml`.
/// Invalid YAML is treated as "no config found" and the next candidate is
/// tried; exhausting the chain falls back to
/// [`CtxConfig::default_for_tests`].
fn load_config() -> CtxConfig {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(path) = std::env::var("CTX_CONFIG_PATH") {
        candidates.push(PathBuf::from(path));
    }
    candidates.extend(CONFIG_CANDIDATES.iter().map(PathBuf::from));

    for path in &candidates {
        if let Some(config) = try_load(path) {
            tracing::info!(path = %path.display(), "loaded configuration");
            return config;
        }
    }
    tracing::warn!("no configuration file found on any candidate path, using defaults");
    CtxConfig::default_for_tests()
}

fn try_load(path: &Path) -> Option<CtxConfig> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_yaml::from_str::<CtxConfig>(&raw) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "skipping unparseable config file");
            None
        }
    }
}

/// Overlays environment-supplied principals onto the file-loaded key set:
/// every `API_KEY_*` variable carries `key:principal_id:role:is_agent`, and
/// `SENTINEL_API_KEY` registers the monitoring principal as a guest.
/// `STRICT_EMBEDDINGS` flips the matching config flag.
fn overlay_env(config: &mut CtxConfig) {
    for (name, value) in std::env::vars() {
        if !name.starts_with("API_KEY_") {
            continue;
        }
        let parts: Vec<&str> = value.split(':').collect();
        match parts.as_slice() {
            [key, principal_id, role, is_agent] if role.parse::<Role>().is_ok() => {
                config.auth.api_keys.push(ApiKeyEntry {
                    key: key.to_string(),
                    principal_id: principal_id.to_string(),
                    role: role.parse().unwrap_or(Role::Guest),
                    is_agent: is_agent.eq_ignore_ascii_case("true"),
                });
            }
            _ => tracing::warn!(%name, "ignoring malformed API_KEY_* variable"),
        }
    }
    if let Ok(key) = std::env::var("SENTINEL_API_KEY") {
        config.auth.api_keys.push(ApiKeyEntry {
            key,
            principal_id: "sentinel".to_string(),
            role: Role::Guest,
            is_agent: false,
        });
    }
    if let Ok(strict) = std::env::var("STRICT_EMBEDDINGS") {
        config.strict_embeddings = strict.eq_ignore_ascii_case("true");
    }
}

/// Maps startup failures onto the exit code contract: `1` config error,
/// `2` backend unreachable, `3` embedding self-test failed under
/// `STRICT_EMBEDDINGS=true`.
fn exit_code_for(err: &ctx_core::CtxError) -> i32 {
    match err {
        ctx_core::CtxError::Config(_) => 1,
        ctx_core::CtxError::Embed(ctx_core::EmbedError::SelfTestFailed { .. }) => 3,
        ctx_core::CtxError::Storage(_) => 2,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut config = load_config();
    overlay_env(&mut config);
    if let Err(err) = config.validate() {
        tracing::error!(error = %err, "configuration failed validation");
        std::process::exit(exit_code_for(&err));
    }

    let state: AppState = match build_state(config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "failed to bootstrap application state");
            std::process::exit(exit_code_for(&err));
        }
    };

    let sync_worker = Arc::new(
        SyncWorker::new(
            state.event_log.clone(),
            state.graph.clone(),
            "default",
            Duration::from_secs(3600),
            Arc::new(RandomJitter::new(60_000)),
            chrono::Duration::days(30),
            Duration::from_secs(5),
        )
        .with_scratchpad_flush(state.kv.clone()),
    );
    let (sync_token, sync_handle) = sync_worker.spawn();

    let auth_required = std::env::var("AUTH_REQUIRED")
        .map(|v| !v.eq_ignore_ascii_case("false"))
        .unwrap_or(state.config.auth_required);
    let auth_state =
        AuthMiddlewareState::new(state.api_keys.clone()).with_required(auth_required);

    // Liveness stays unauthenticated so probes need no key; every tool
    // endpoint sits behind the auth layer.
    let app = ctx_api::routes::tools::router()
        .layer(from_fn_with_state(auth_state, ctx_api::auth_middleware))
        .merge(ctx_api::routes::health::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    let addr = std::env::var("CTX_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "failed to bind listener");
            std::process::exit(2);
        }
    };
    tracing::info!(%addr, "context memory service listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!(error = %err, "server exited with error");
        std::process::exit(1);
    }

    sync_token.cancel();
    let _ = sync_handle.await;
}
