use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::analysis::{
    render_blocks, render_html, AnalysisError, AnalysisResult, ClinicalContext, DisplayBlock,
};
use crate::api::error::ErrorKind;
use crate::api::handler_utils::{error_response, into_json, map_analysis_error, ApiObject};
use crate::api::server::AppState;

#[derive(Debug, Clone, Serialize)]
struct AnalysisResponse {
    ok: bool,
    result: AnalysisResult,
    blocks: Vec<DisplayBlock>,
    html: String,
}

impl AnalysisResponse {
    fn new(result: AnalysisResult) -> Self {
        Self {
            ok: true,
            blocks: render_blocks(result.text.as_str()),
            html: render_html(result.text.as_str()),
            result,
        }
    }
}

pub async fn run_analysis_handler(
    State(state): State<AppState>,
    Json(context): Json<ClinicalContext>,
) -> ApiObject<Value> {
    let selection = state.selection.current();
    if selection.is_empty() {
        return map_analysis_error(&AnalysisError::Validation);
    }

    state.clear_latest_result();
    match state.analysis.run(selection.files(), &context).await {
        Ok(result) => {
            if !state.store_latest_result_for(selection.revision(), result.clone()) {
                info!(
                    analysis_id = result.analysis_id.as_str(),
                    "selection changed while analysis was pending; result not kept"
                );
            }
            (StatusCode::OK, into_json(AnalysisResponse::new(result)))
        }
        Err(error) => map_analysis_error(&error),
    }
}

pub async fn latest_analysis_handler(State(state): State<AppState>) -> ApiObject<Value> {
    match state.latest_result() {
        Some(result) => (StatusCode::OK, into_json(AnalysisResponse::new(result))),
        None => error_response(
            StatusCode::NOT_FOUND,
            ErrorKind::Validation,
            "not_found",
            "Chưa có kết quả phân tích.",
        ),
    }
}
