use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tower::limit::ConcurrencyLimitLayer;

use crate::config::ServiceConfig;
use crate::custom::CustomRuleRegistry;
use crate::data::{Catalog, Course, SectionKey};
use crate::error::{DataError, RuleError, ScheduleError};
use crate::evaluator::{Evaluator, Explanation};
use crate::expr::ExprNode;
use crate::solver::{AllSections, DestinationFilter, NoopObserver, SearchOutcome, Solver};
use crate::validate::parse_rule;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub registry: Arc<CustomRuleRegistry>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(CustomRuleRegistry::with_builtins()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RuleError> for ApiError {
    fn from(err: RuleError) -> Self {
        ApiError::Schedule(err.into())
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        ApiError::Schedule(err.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Schedule(e) => (StatusCode::BAD_REQUEST, e.kind()),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!("Request failed: {self}");
        } else {
            debug!("Rejected request: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: kind,
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub catalog: Vec<Course>,
    #[serde(default)]
    pub rules: Vec<JsonValue>,
    /// Restricts the search to sections with free seats for these codes.
    #[serde(default)]
    pub dest_codes: Option<Vec<String>>,
    #[serde(default)]
    pub max_solutions: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    pub catalog: Vec<Course>,
    pub rule: JsonValue,
    pub selection: Vec<SectionKey>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub rules: Vec<JsonValue>,
}

fn parse_rules(
    raw: &[JsonValue],
    registry: &CustomRuleRegistry,
) -> Result<Vec<ExprNode>, RuleError> {
    raw.iter().map(|rule| parse_rule(rule, registry)).collect()
}

fn effective_cap(requested: Option<usize>, configured: Option<usize>) -> Option<usize> {
    match (requested, configured) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let rules = parse_rules(&request.rules, &state.registry)?;
    let catalog = Catalog::try_from(request.catalog)?;
    let config = Arc::clone(&state.config);
    let registry = Arc::clone(&state.registry);

    let outcome = tokio::task::spawn_blocking(move || {
        let solver = Solver::new(&registry)
            .with_max_credit_load(config.max_credit_load)
            .with_max_solutions(effective_cap(request.max_solutions, config.max_solutions))
            .with_timeout(config.timeout());
        match request.dest_codes {
            Some(codes) => solver.generate(
                &catalog,
                &rules,
                &DestinationFilter::new(codes),
                &mut NoopObserver,
            ),
            None => solver.generate(&catalog, &rules, &AllSections, &mut NoopObserver),
        }
    })
    .await
    .map_err(|e| ApiError::Internal(format!("search task failed: {e}")))??;

    Ok(Json(outcome))
}

async fn explain_handler(
    State(state): State<AppState>,
    Json(request): Json<ExplainRequest>,
) -> Result<Json<Explanation>, ApiError> {
    let catalog = Catalog::try_from(request.catalog)?;
    catalog.validate()?;
    let rule = parse_rule(&request.rule, &state.registry)?;
    let selection = catalog.enrich_keys(&request.selection)?;
    let explanation = Evaluator::new(&state.registry).explain(&rule, &selection)?;
    Ok(Json(explanation))
}

async fn validate_handler(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let rules = parse_rules(&request.rules, &state.registry)?;
    Ok(Json(json!({ "valid": true, "rules": rules.len() })))
}

async fn health_handler() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// Builds the HTTP surface.
pub fn app(state: AppState) -> Router {
    let search_limit = state.config.max_concurrent_searches;
    Router::new()
        .route(
            "/v1/timetable/generate",
            post(generate_handler).layer(ConcurrencyLimitLayer::new(search_limit)),
        )
        .route("/v1/timetable/explain", post(explain_handler))
        .route("/v1/rules/validate", post(validate_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn run_server(config: ServiceConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app(AppState::new(config))).await
}
