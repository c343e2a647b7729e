use crate::config::SourceConfig;
use crate::engine::{QueryResult, RuleSource};
use crate::error::{QueryError, SourceError};
use crate::service::{RuleService, Statistics};
use anyhow::{Context, Result};
use axum::{
    extract::{Json as AxumJson, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

/// Envelope shared by every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: i64,
}

impl<T> ApiResponse<T> {
    fn ok(message: &str, data: Option<T>) -> Json<Self> {
        Json(Self {
            code: StatusCode::OK.as_u16(),
            message: message.to_string(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body: ApiResponse<()> = ApiResponse {
            code: self.status.as_u16(),
            message: self.message,
            data: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

pub fn router(service: RuleService) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/query/domain", get(query_domain))
        .route("/api/query/domains", post(query_domains))
        .route(
            "/api/rules/sources",
            get(list_sources).post(add_source).delete(remove_source),
        )
        .route("/api/rules/refresh", post(trigger_refresh))
        .route("/api/rules/statistics", get(get_statistics))
        // Browser clients are served from a different origin
        .layer(CorsLayer::permissive())
        .with_state(service)
}

pub async fn start_api_server(service: RuleService, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    tracing::info!("API Server listening on http://{}", addr);

    axum::serve(listener, router(service))
        .await
        .context("API server terminated")
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Rule query service is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct DomainParams {
    domain: Option<String>,
}

async fn query_domain(
    State(service): State<RuleService>,
    Query(params): Query<DomainParams>,
) -> ApiResult<QueryResult> {
    let domain = params.domain.unwrap_or_default();
    let result = service.query_domain(&domain)?;
    Ok(ApiResponse::ok("Query succeeded", Some(result)))
}

#[derive(Debug, Deserialize)]
struct BulkQueryRequest {
    domains: Vec<String>,
}

async fn query_domains(
    State(service): State<RuleService>,
    AxumJson(payload): AxumJson<BulkQueryRequest>,
) -> ApiResult<Vec<QueryResult>> {
    let results = service.query_domains(&payload.domains)?;
    Ok(ApiResponse::ok("Batch query succeeded", Some(results)))
}

async fn list_sources(State(service): State<RuleService>) -> ApiResult<Vec<RuleSource>> {
    Ok(ApiResponse::ok("OK", Some(service.list_sources())))
}

async fn add_source(
    State(service): State<RuleService>,
    AxumJson(payload): AxumJson<SourceConfig>,
) -> ApiResult<RuleSource> {
    let source = service.add_source(payload)?;
    Ok(ApiResponse::ok("Source added", Some(source)))
}

#[derive(Debug, Deserialize)]
struct UrlParams {
    url: Option<String>,
}

async fn remove_source(
    State(service): State<RuleService>,
    Query(params): Query<UrlParams>,
) -> ApiResult<()> {
    let url = params.url.unwrap_or_default();
    service.remove_source(&url)?;
    Ok(ApiResponse::ok("Source removed", None))
}

async fn trigger_refresh(State(service): State<RuleService>) -> ApiResult<()> {
    if !service.refresh_now() {
        return Err(ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Refresh scheduler is not running".to_string(),
        });
    }
    Ok(ApiResponse::ok(
        "Refresh started, check source status for progress",
        None,
    ))
}

async fn get_statistics(State(service): State<RuleService>) -> ApiResult<Statistics> {
    Ok(ApiResponse::ok("OK", Some(service.statistics())))
}
