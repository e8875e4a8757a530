use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::analysis::AnalysisError;
use crate::api::error::ErrorKind;
use crate::ingest::NormalizeError;

pub type ApiObject<T> = (StatusCode, Json<T>);

#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiObject<Value> {
    (
        status,
        into_json(ErrorResponse {
            ok: false,
            error: message.into(),
            error_kind: Some(kind),
            error_code: Some(code.into()),
        }),
    )
}

pub fn map_analysis_error(error: &AnalysisError) -> ApiObject<Value> {
    let message = error.user_message();
    match error {
        AnalysisError::Validation => error_response(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "validation_error",
            message,
        ),
        AnalysisError::Busy => error_response(
            StatusCode::CONFLICT,
            ErrorKind::Policy,
            "analysis_pending",
            message,
        ),
        AnalysisError::Decode(NormalizeError::Unsupported { .. }) => error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorKind::Validation,
            "unsupported_media_type",
            message,
        ),
        AnalysisError::Decode(source) => {
            warn!(error = %source, "analysis batch rejected during normalization");
            error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Validation,
                "decode_error",
                message,
            )
        }
        AnalysisError::Provider(_) => error_response(
            StatusCode::BAD_GATEWAY,
            ErrorKind::Provider,
            "provider_error",
            message,
        ),
        AnalysisError::Task(detail) => internal_error(detail.as_str()),
    }
}

pub fn internal_error(message: impl Into<String>) -> ApiObject<Value> {
    let detail = message.into();
    error!(detail = %detail, "internal api error");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Infra,
        "internal_error",
        "Internal server error",
    )
}

pub fn into_json(payload: impl Serialize) -> Json<Value> {
    Json(serde_json::to_value(payload).unwrap_or_else(|e| {
        error!(error = %e, "api payload failed to serialize");
        Value::Null
    }))
}
