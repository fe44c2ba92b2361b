// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! | Path | Method | Use case |
//! |------|--------|----------|
//! | `/policy/metadata` | POST | replace a schema's field policies (201) |
//! | `/policy/update-allowlist` | POST | grant / renew application access |
//! | `/policy/decide` | POST | access decision |
//! | `/policy/schema` | POST | register an annotated schema |
//! | `/health` | GET | liveness |
//!
//! Every `/policy/*` route is also served under `/api/v1`. Other methods on a
//! policy route get 405 from the method router. Bodies that fail to parse are
//! rejected with 400 before any use case runs.
//!
//! Error mapping: `InvalidArgument` → 400, `NotFound` → 500 (`not_found`),
//! `Internal` → 500 with a generic message.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::application::{
    DecideAccessUseCase, RegisterSchemaUseCase, ReplacePolicyMetadataUseCase, RequestContext,
    StandardDecideAccessUseCase, StandardRegisterSchemaUseCase, StandardReplacePolicyMetadataUseCase,
    StandardUpdateAllowListUseCase, UpdateAllowListUseCase,
};
use crate::domain::events::PolicyEvent;
use crate::domain::policy::PolicyError;
use crate::domain::repository::FieldPolicyRepository;
use crate::infrastructure::audit::AuditSink;
use crate::presentation::dto::{
    AllowListUpdateResponse, DecideAccessRequest, ErrorResponse, HealthResponse, PolicyMetadataResponse,
    RegisterSchemaRequest, ReplacePolicyMetadataRequest, UpdateAllowListRequest,
};

pub const TRACE_ID_HEADER: &str = "x-trace-id";

pub struct AppState {
    pub replace_metadata: Arc<dyn ReplacePolicyMetadataUseCase>,
    pub update_allow_list: Arc<dyn UpdateAllowListUseCase>,
    pub decide_access: Arc<dyn DecideAccessUseCase>,
    pub register_schema: Arc<dyn RegisterSchemaUseCase>,
    pub audit: Arc<dyn AuditSink>,
    pub started_at: Instant,
}

impl AppState {
    /// Wires the standard use cases over one repository and audit sink.
    pub fn new(repository: Arc<dyn FieldPolicyRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            replace_metadata: Arc::new(StandardReplacePolicyMetadataUseCase::new(repository.clone(), audit.clone())),
            update_allow_list: Arc::new(StandardUpdateAllowListUseCase::new(repository.clone(), audit.clone())),
            decide_access: Arc::new(StandardDecideAccessUseCase::new(repository.clone(), audit.clone())),
            register_schema: Arc::new(StandardRegisterSchemaUseCase::new(repository, audit.clone())),
            audit,
            started_at: Instant::now(),
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let policy = Router::new()
        .route("/policy/metadata", post(create_policy_metadata))
        .route("/policy/update-allowlist", post(update_allow_list))
        .route("/policy/decide", post(decide))
        .route("/policy/schema", post(register_schema));

    Router::new()
        .merge(policy.clone())
        .nest("/api/v1", policy)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    fn bad_body(rejection: &JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("invalid request body: {}", rejection.body_text()),
        )
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::InvalidArgument(msg) => Self::new(StatusCode::BAD_REQUEST, "invalid_argument", msg),
            PolicyError::NotFound(msg) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "not_found", msg),
            PolicyError::Internal(msg) => {
                error!(error = %msg, "Internal error while handling policy request");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    headers
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(RequestContext::new)
        .unwrap_or_else(RequestContext::generate)
}

fn respond<T: Serialize>(status: StatusCode, ctx: &RequestContext, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&ctx.trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
    }
    response
}

async fn create_policy_metadata(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ReplacePolicyMetadataRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let ctx = request_context(&headers);
    let Json(request) = payload.map_err(|e| {
        warn!(trace_id = %ctx.trace_id, error = %e, "Rejected policy metadata request body");
        ApiError::bad_body(&e)
    })?;

    let records = state.replace_metadata.replace(&ctx, request).await?;
    Ok(respond(StatusCode::CREATED, &ctx, PolicyMetadataResponse { records }))
}

async fn update_allow_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<UpdateAllowListRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let ctx = request_context(&headers);
    let Json(request) = payload.map_err(|e| {
        warn!(trace_id = %ctx.trace_id, error = %e, "Rejected allow-list request body");
        ApiError::bad_body(&e)
    })?;

    let records = state.update_allow_list.grant(&ctx, request).await?;
    Ok(respond(StatusCode::OK, &ctx, AllowListUpdateResponse { records }))
}

async fn decide(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DecideAccessRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let ctx = request_context(&headers);
    let Json(request) = match payload {
        Ok(body) => body,
        Err(e) => {
            warn!(trace_id = %ctx.trace_id, error = %e, "Rejected policy decision request body");
            metrics::counter!("pdp_decision_failures_total", "reason" => "invalid_argument").increment(1);
            state.audit.emit(PolicyEvent::DecisionFailed {
                trace_id: ctx.trace_id.clone(),
                application_id: String::new(),
                requested_fields: vec![],
                reason: "invalid_argument".to_string(),
                message: e.body_text(),
                failed_at: Utc::now(),
            });
            return Err(ApiError::bad_body(&e));
        }
    };

    let decision = state.decide_access.decide(&ctx, request).await?;
    Ok(respond(StatusCode::OK, &ctx, decision))
}

async fn register_schema(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterSchemaRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let ctx = request_context(&headers);
    let Json(request) = payload.map_err(|e| {
        warn!(trace_id = %ctx.trace_id, error = %e, "Rejected schema registration body");
        ApiError::bad_body(&e)
    })?;

    let registered = state.register_schema.register(&ctx, request).await?;
    Ok(respond(StatusCode::CREATED, &ctx, registered))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
