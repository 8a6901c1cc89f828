use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tokio::net::UdpSocket;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;

use ticketd_core::events::TracingSink;
use ticketd_core::liveness::{LivenessMode, ProcessProbe};
use ticketd_core::table::LeaseTable;

use crate::config::ServeConfig;
use crate::handlers::*;
use crate::listener::{self, ServerState, SharedState};

const ADMIN_CONCURRENCY: usize = 32;

pub async fn run(config: ServeConfig) -> anyhow::Result<()> {
    if config.liveness == LivenessMode::None {
        tracing::warn!(
            "Liveness probing disabled; tickets of dead clients will never be reclaimed"
        );
    } else if !ProcessProbe::is_supported() {
        tracing::warn!("No process signals on this host; reclamation is disabled");
    }

    let state = ServerState::new(
        LeaseTable::new(config.table),
        config.reclaim_interval,
        config.liveness.probe(),
        Arc::new(TracingSink),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let socket = UdpSocket::bind(&addr)
        .await
        .with_context(|| format!("failed to bind UDP socket on {}", addr))?;

    tracing::info!(
        capacity = config.table.capacity,
        reclaim_secs = config.reclaim_interval.as_secs(),
        "License server listening on udp://{}",
        addr
    );

    let reclaimer = tokio::spawn(listener::reclaim_loop(state.clone()));

    let admin = match config.admin_port {
        Some(port) => {
            let admin_addr = format!("{}:{}", config.host, port);
            let tcp = tokio::net::TcpListener::bind(&admin_addr)
                .await
                .with_context(|| format!("failed to bind admin endpoint on {}", admin_addr))?;
            if config.api_key.is_some() {
                tracing::info!("API key authentication enabled for admin endpoint");
            } else {
                tracing::warn!("No API key set; admin endpoint is open");
            }
            tracing::info!("Admin endpoint on http://{}", admin_addr);
            let app = admin_router(state.clone(), config.api_key.clone());
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(tcp, app).await {
                    tracing::error!("Admin server error: {}", e);
                }
            }))
        }
        None => None,
    };

    tokio::select! {
        _ = listener::serve(&socket, &state) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            tracing::info!("Shutting down; outstanding tickets are dropped");
        }
    }

    reclaimer.abort();
    if let Some(admin) = admin {
        admin.abort();
    }

    Ok(())
}

/// Bearer token the admin endpoint checks, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct AdminAuth {
    key: Option<String>,
}

pub fn admin_router(state: SharedState, api_key: Option<String>) -> Router {
    let auth = AdminAuth { key: api_key };

    Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        .route("/tickets", get(list_tickets))
        .route("/reclaim", post(reclaim_now))
        .layer(middleware::from_fn_with_state(auth, auth_middleware))
        .layer(ConcurrencyLimitLayer::new(ADMIN_CONCURRENCY))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    State(auth): State<AdminAuth>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected_key) = auth.key.as_deref() else {
        return Ok(next.run(request).await);
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Unauthorized admin request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<SharedState>) -> Json<ApiResponse<HealthResponse>> {
    let snapshot = state.core.lock().await.table.snapshot();
    Json(ApiResponse::ok(HealthResponse::from_snapshot(&snapshot)))
}

async fn list_tickets(State(state): State<SharedState>) -> Json<ApiResponse<Vec<SlotInfo>>> {
    let snapshot = state.core.lock().await.table.snapshot();
    Json(ApiResponse::ok(SlotInfo::list(&snapshot)))
}

async fn reclaim_now(State(state): State<SharedState>) -> Json<ApiResponse<ReclaimResponse>> {
    let (reclaimed, outstanding) = state.sweep().await;
    tracing::info!(reclaimed = reclaimed.len(), "Manual reclaim sweep");
    Json(ApiResponse::ok(ReclaimResponse {
        reclaimed: reclaimed.iter().map(ToString::to_string).collect(),
        outstanding,
    }))
}
