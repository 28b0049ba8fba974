//! HTTP query API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/v1/geo.json` | Matching points as a GeoJSON `FeatureCollection` |
//! | `GET`  | `/api/v1/average.json` | Daily averages |
//! | `GET`  | `/api/v1/statistics.json` | Statistics per `interval` (default `day`) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! All `/api/v1` endpoints accept `country`, `geoframe`, `polygon`, `point`,
//! `distance`, `begin`, `end`, `limit` and `offset` (see [`QueryParams`]).
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "field": "begin", "message": "invalid date: 'x'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `conflict` (409), `unavailable` (503),
//! `internal` (500).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use emissions_core::cache::{DisabledCache, ResponseCache};
use emissions_core::models::{DailyAverage, FeatureCollection, StatisticsRow};
use emissions_core::service::QueryService;
use emissions_core::Error;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::params::{IntervalParam, QueryParams};
use crate::sqlite_cache::SqliteCache;
use crate::sqlite_store::SqliteStore;

/// The service as wired by the binary: SQLite points, and the SQLite cache
/// or none depending on `[cache].enabled`.
pub type AppService = QueryService<SqliteStore, Arc<dyn ResponseCache>>;

pub fn build_service(pool: SqlitePool, config: &Config) -> AppService {
    let cache: Arc<dyn ResponseCache> = if config.cache.enabled {
        Arc::new(SqliteCache::new(pool.clone()))
    } else {
        tracing::info!("response cache disabled");
        Arc::new(DisabledCache)
    };
    QueryService::new(SqliteStore::new(pool), cache)
}

#[derive(Clone)]
struct AppState {
    service: Arc<AppService>,
}

/// Builds the router with CORS and request tracing.
pub fn router(service: Arc<AppService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/geo.json", get(handle_geo))
        .route("/api/v1/average.json", get(handle_average))
        .route("/api/v1/statistics.json", get(handle_statistics))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { service })
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let service = Arc::new(build_service(pool.clone(), config));
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    field: Option<&'static str>,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                field: self.field,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidFilterParameter { field, message } => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                field: Some(field),
                message,
            },
            e @ Error::InvalidMeasurement { .. } => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                field: None,
                message: e.to_string(),
            },
            e @ Error::DuplicateImport(_) => AppError {
                status: StatusCode::CONFLICT,
                code: "conflict",
                field: None,
                message: e.to_string(),
            },
            // Details are already logged where the driver error was mapped
            Error::StorageUnavailable(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "unavailable",
                field: None,
                message: "storage temporarily unavailable, retry later".to_string(),
            },
            Error::CacheUnavailable(detail) => {
                tracing::error!(detail = %detail, "cache error reached the HTTP layer");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    field: None,
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

// ============ Handlers ============

async fn handle_geo(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<FeatureCollection>, AppError> {
    let filter = params.filter()?;
    let page = params.pagination()?;
    Ok(Json(state.service.points(&filter, &page).await?))
}

async fn handle_average(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<DailyAverage>>, AppError> {
    let filter = params.filter()?;
    let page = params.pagination()?;
    Ok(Json(state.service.daily_averages(&filter, &page).await?))
}

async fn handle_statistics(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
    Query(interval): Query<IntervalParam>,
) -> Result<Json<Vec<StatisticsRow>>, AppError> {
    let granularity = interval.granularity()?;
    let filter = params.filter()?;
    let page = params.pagination()?;
    Ok(Json(
        state
            .service
            .statistics(&filter, granularity, &page)
            .await?,
    ))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
