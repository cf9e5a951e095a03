//! HTTP request handlers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::agent::AssistantError;
use crate::learning::{FeedbackAnalyzer, StoreError};
use crate::server::ServerState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    #[serde(alias = "interaction_index")]
    pub interaction_index: i64,
    pub feedback: String,
}

#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub original: String,
    pub corrected: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    #[serde(default = "default_ai_insights")]
    pub ai_insights: bool,
}

fn default_ai_insights() -> bool {
    true
}

fn success(data: serde_json::Value) -> Response {
    (StatusCode::OK, Json(json!({ "status": "success", "data": data }))).into_response()
}

/// `{"status": "success"}` merged with the given top-level fields
fn success_with(fields: serde_json::Value) -> Response {
    let mut body = json!({ "status": "success" });
    if let (Some(map), serde_json::Value::Object(fields)) = (body.as_object_mut(), fields) {
        map.extend(fields);
    }
    (StatusCode::OK, Json(body)).into_response()
}

fn invalid(detail: impl std::fmt::Display) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "status": "error", "detail": detail.to_string() })),
    )
        .into_response()
}

fn store_failure(e: StoreError) -> Response {
    error!("Learning store failure: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "detail": "Failed to persist learning data",
            "error": e.to_string()
        })),
    )
        .into_response()
}

pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "message": "SQL Assistant",
        "version": crate::VERSION,
        "status": "running"
    }))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "name": crate::NAME,
        "version": crate::VERSION
    }))
}

pub async fn ready_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let interactions = state.assistant.store().read().await.get_interactions(None).len();
    Json(json!({ "status": "ready", "interactions": interactions }))
}

/// Translate a query and record the interaction
pub async fn process_query_handler(
    State(state): State<ServerState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return invalid(rejection.body_text()),
    };

    match state.assistant.process_query(&req.query).await {
        Ok(answer) => success(json!(answer)),
        Err(AssistantError::EmptyQuery) => invalid(AssistantError::EmptyQuery),
        Err(AssistantError::Store(e)) => store_failure(e),
    }
}

/// Attach feedback to an interaction by index
pub async fn feedback_handler(
    State(state): State<ServerState>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return invalid(rejection.body_text()),
    };

    // Negative indices are out of range, same as past-the-end ones.
    let applied = match usize::try_from(req.interaction_index) {
        Ok(index) => {
            let mut store = state.assistant.store().write().await;
            match store.add_feedback_to_interaction(index, &req.feedback) {
                Ok(applied) => applied,
                Err(e) => return store_failure(e),
            }
        }
        Err(_) => false,
    };

    let message = if applied {
        format!("Feedback added to interaction {}", req.interaction_index)
    } else {
        format!("No interaction at index {}; feedback ignored", req.interaction_index)
    };
    success_with(json!({ "message": message, "applied": applied }))
}

/// Recent interactions, oldest first
pub async fn history_handler(
    State(state): State<ServerState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let store = state.assistant.store().read().await;
    success_with(json!({ "history": store.get_interactions(params.limit) }))
}

/// Feedback analysis plus suggestions
pub async fn analysis_handler(State(state): State<ServerState>) -> Response {
    let store = state.assistant.store().read().await;
    let analyzer = FeedbackAnalyzer::new(&store);
    let analysis = analyzer.analyze_feedback_patterns();
    let suggestions = analyzer.generate_improvement_suggestions(Some(&analysis));
    success_with(json!({ "analysis": analysis, "suggestions": suggestions }))
}

pub async fn correction_handler(
    State(state): State<ServerState>,
    payload: Result<Json<CorrectionRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return invalid(rejection.body_text()),
    };
    if req.original.trim().is_empty() || req.corrected.trim().is_empty() {
        return invalid("original and corrected must not be empty");
    }

    let mut store = state.assistant.store().write().await;
    match store.record_correction(&req.original, &req.corrected) {
        Ok(()) => success_with(json!({
            "message": "Correction recorded",
            "corrections": store.corrections().len()
        })),
        Err(e) => store_failure(e),
    }
}

/// Full report; AI insights unless `ai_insights=false`
pub async fn report_handler(
    State(state): State<ServerState>,
    Query(params): Query<ReportParams>,
) -> Response {
    // Snapshot under the lock, then release it before the insight call.
    let (analysis, suggestions) = {
        let store = state.assistant.store().read().await;
        let analyzer = FeedbackAnalyzer::new(&store);
        let analysis = analyzer.analyze_feedback_patterns();
        let suggestions = analyzer.generate_improvement_suggestions(Some(&analysis));
        (analysis, suggestions)
    };

    let report = state
        .insights
        .build_report(analysis, suggestions, params.ai_insights)
        .await;
    success_with(json!({ "report": report }))
}
