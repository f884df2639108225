//! HTTP surface of the API explorer: catalog browsing, the guarded test
//! console, and code-sample / summary generation.

pub mod catalog;
pub mod codegen;
pub mod config;
pub mod error;
pub mod generator;
pub mod rate_limit;

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, Query, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use forwarder_core::{Forwarder, ResponseEnvelope, SsrfValidator};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

use crate::catalog::{CatalogStore, StaticCatalog};
use crate::codegen::{CodegenRequest, SummarizeRequest};
use crate::config::Config;
use crate::error::ApiError;
use crate::generator::{GeminiClient, GenerationError, TextGenerator};
use crate::rate_limit::{PerClientRateLimiter, RateDecision};

const CODEGEN_FIELDS_REQUIRED: &str = "API name and endpoint are required";

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,
    pub forwarder: Arc<Forwarder>,
    pub limiter: Arc<PerClientRateLimiter>,
    pub generator: Option<Arc<dyn TextGenerator>>,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        forwarder: Arc<Forwarder>,
        limiter: Arc<PerClientRateLimiter>,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            catalog,
            forwarder,
            limiter,
            generator,
        }
    }

    /// Production wiring: seeded catalog, SSRF validation over the system
    /// resolver, Gemini when a key is configured.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        let forwarder = Forwarder::new(
            Arc::new(SsrfValidator::default()),
            config.executor(),
            config.request_timeout(),
        );
        let generator: Option<Arc<dyn TextGenerator>> = match config.gemini_api_key() {
            Some(key) => Some(Arc::new(GeminiClient::new(key, config.gemini_model.clone())?)),
            None => {
                info!("no generation API key configured; codegen and summarize are disabled");
                None
            }
        };
        Ok(Self::new(
            Arc::new(StaticCatalog::seeded()),
            Arc::new(forwarder),
            Arc::new(PerClientRateLimiter::new(config.rate_limiter())),
            generator,
        ))
    }
}

pub fn app(state: AppState) -> Router {
    let limited = Router::new()
        .route("/api/test", post(test_api))
        .route("/api/codegen", post(generate_code))
        .route("/api/summarize", post(summarize))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/list", get(list_apis))
        .route("/api/details/{id}", get(api_details))
        .route("/api/categories", get(list_categories))
        .merge(limited)
        .fallback(not_found)
        .with_state(state)
}

/// Serve until `shutdown` resolves. Client addresses reach the rate limiter
/// through [`ConnectInfo`].
pub async fn run<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    match state.limiter.check_and_consume(client) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited => ApiError::RateLimited.into_response(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Endpoint not found")
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    category: Option<String>,
}

async fn list_apis(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Value> {
    let apis = match query.category.as_deref() {
        Some(category) => state.catalog.lookup_by_category(category),
        None => state.catalog.list_all(),
    };
    Json(json!({
        "success": true,
        "count": apis.len(),
        "apis": apis,
    }))
}

async fn api_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: i64 = id.parse().map_err(|_| ApiError::NotFound("Endpoint not found"))?;
    let api = state
        .catalog
        .lookup_by_id(id)
        .ok_or(ApiError::NotFound("API not found"))?;
    Ok(Json(json!({ "success": true, "api": api })))
}

async fn list_categories(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "categories": state.catalog.categories(),
    }))
}

async fn test_api(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    let Json(body) = body
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e.body_text())))?;
    let envelope = state.forwarder.forward_json(&body).await?;
    Ok(Json(envelope))
}

async fn generate_code(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request: CodegenRequest = body
        .ok()
        .and_then(|Json(value)| serde_json::from_value(value).ok())
        .ok_or_else(|| ApiError::BadRequest(CODEGEN_FIELDS_REQUIRED.to_string()))?;
    let (Some(api_name), Some(endpoint)) =
        (request.api_name.as_deref(), request.endpoint.as_deref())
    else {
        return Err(ApiError::BadRequest(CODEGEN_FIELDS_REQUIRED.to_string()));
    };
    let generator = state.generator.as_ref().ok_or(ApiError::GenerationUnavailable)?;

    let prompt = codegen::codegen_prompt(
        api_name,
        endpoint,
        request.method.as_deref().unwrap_or("GET"),
        &request.params,
        &request.headers,
    );
    let answer = generator.generate(&prompt).await?;
    let code = codegen::parse_code_response(&answer);
    info!(api = %api_name, "generated code samples");
    Ok(Json(json!({ "success": true, "code": code })))
}

async fn summarize(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request: SummarizeRequest = body
        .ok()
        .and_then(|Json(value)| serde_json::from_value(value).ok())
        .filter(|r: &SummarizeRequest| !r.data.is_null())
        .ok_or_else(|| ApiError::BadRequest("Response data is required".to_string()))?;
    let generator = state.generator.as_ref().ok_or(ApiError::GenerationUnavailable)?;

    let prompt = codegen::summary_prompt(
        request.api_name.as_deref(),
        request.status_code,
        &request.data,
    );
    let summary = generator.generate(&prompt).await?;
    Ok(Json(json!({ "success": true, "summary": summary.trim() })))
}
