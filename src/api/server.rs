use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::analysis::{AnalysisResult, AnalysisService, GeminiClient, SharedGenerateContentOps};
use crate::config::AppConfig;
use crate::ingest::SelectionManager;

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub selection: Arc<SelectionManager>,
    pub analysis: AnalysisService,
    latest_result: Arc<Mutex<Option<AnalysisResult>>>,
}

impl AppState {
    pub fn new(analysis: AnalysisService) -> Self {
        Self {
            service_name: "pathology-assist",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            selection: Arc::new(SelectionManager::new()),
            analysis,
            latest_result: Arc::new(Mutex::new(None)),
        }
    }

    pub fn latest_result(&self) -> Option<AnalysisResult> {
        self.latest_result
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Keeps `result` only while the selection it was computed from is
    /// still current. Returns whether it was stored.
    pub fn store_latest_result_for(&self, revision: u64, result: AnalysisResult) -> bool {
        let mut slot = self
            .latest_result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Selection handlers bump the revision before clearing this slot.
        if self.selection.current().revision() != revision {
            return false;
        }
        *slot = Some(result);
        true
    }

    pub fn clear_latest_result(&self) {
        let mut slot = self
            .latest_result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }
}

pub fn build_router(config: &AppConfig) -> Router {
    let provider: SharedGenerateContentOps = Arc::new(GeminiClient::from_config(config));
    build_router_with_provider(provider, config.model.as_str(), config.max_upload_bytes)
}

pub fn build_router_with_provider(
    provider: SharedGenerateContentOps,
    model: &str,
    max_upload_bytes: usize,
) -> Router {
    let state = AppState::new(AnalysisService::new(provider, model));
    build_router_with_state(state, max_upload_bytes)
}

pub fn build_router_with_state(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/selection",
            get(crate::api::selection::get_selection_handler)
                .post(crate::api::selection::upload_selection_handler)
                .delete(crate::api::selection::clear_selection_handler),
        )
        .route(
            "/api/analysis",
            post(crate::api::analysis::run_analysis_handler),
        )
        .route(
            "/api/analysis/latest",
            get(crate::api::analysis::latest_analysis_handler),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: &AppConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let app = build_router(config);
    info!(
        bind = %config.bind,
        model = config.model.as_str(),
        "starting pathology-assist HTTP surface"
    );
    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
            "model": state.analysis.model(),
            "analysis_pending": state.analysis.is_pending(),
            "selection_revision": state.selection.current().revision(),
        })),
    )
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{GenerateContentOps, GenerateContentRequest, ProviderError};

    struct NoopProvider;

    impl GenerateContentOps for NoopProvider {
        fn generate(&self, _request: &GenerateContentRequest) -> Result<String, ProviderError> {
            Ok(String::from("ok"))
        }
    }

    fn result(id: &str) -> AnalysisResult {
        AnalysisResult {
            analysis_id: id.to_string(),
            text: String::from("## H"),
            image_count: 1,
            model: String::from("m"),
            completed_at: String::from("2026-01-01T00:00:00Z"),
        }
    }

    #[test]
    fn latest_result_slot_stores_and_clears() {
        let state = AppState::new(AnalysisService::new(Arc::new(NoopProvider), "m"));
        assert_eq!(state.latest_result(), None);

        let revision = state.selection.current().revision();
        assert!(state.store_latest_result_for(revision, result("a")));
        let cloned = state.clone();
        assert_eq!(cloned.latest_result().map(|r| r.analysis_id), Some(String::from("a")));

        cloned.clear_latest_result();
        assert_eq!(state.latest_result(), None);
    }

    #[test]
    fn result_for_a_superseded_selection_is_not_kept() {
        let state = AppState::new(AnalysisService::new(Arc::new(NoopProvider), "m"));
        let submitted_at = state.selection.current().revision();
        state.selection.clear();

        assert!(!state.store_latest_result_for(submitted_at, result("stale")));
        assert_eq!(state.latest_result(), None);
    }
}
