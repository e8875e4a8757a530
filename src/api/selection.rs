use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{error_response, into_json, ApiObject};
use crate::api::server::AppState;
use crate::ingest::{Preview, Selection, UploadedFile};

#[derive(Debug, Clone, Serialize)]
struct SelectedFileView {
    name: String,
    content_type: String,
    size_bytes: usize,
    is_tiff: bool,
    preview: Preview,
}

#[derive(Debug, Clone, Serialize)]
struct SelectionView {
    revision: u64,
    count: usize,
    files: Vec<SelectedFileView>,
    rejected: Vec<String>,
}

impl From<&Selection> for SelectionView {
    fn from(selection: &Selection) -> Self {
        let files = selection
            .entries()
            .iter()
            .map(|entry| SelectedFileView {
                name: entry.file.name().to_string(),
                content_type: entry.file.content_type().to_string(),
                size_bytes: entry.file.bytes().len(),
                is_tiff: entry.file.is_tiff(),
                preview: entry.preview.clone(),
            })
            .collect::<Vec<_>>();
        Self {
            revision: selection.revision(),
            count: files.len(),
            files,
            rejected: selection.rejected().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SelectionResponse {
    ok: bool,
    selection: SelectionView,
}

fn selection_response(selection: &Selection) -> ApiObject<Value> {
    (
        StatusCode::OK,
        into_json(SelectionResponse {
            ok: true,
            selection: SelectionView::from(selection),
        }),
    )
}

pub async fn get_selection_handler(State(state): State<AppState>) -> ApiObject<Value> {
    selection_response(&state.selection.current())
}

/// Replaces the selection with the uploaded files. Fields without a file
/// name are ignored.
pub async fn upload_selection_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiObject<Value> {
    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => {
                return error_response(
                    error.status(),
                    ErrorKind::Validation,
                    "invalid_multipart",
                    error.body_text(),
                )
            }
        };
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => files.push(UploadedFile::new(name, content_type, bytes.to_vec())),
            Err(error) => {
                return error_response(
                    error.status(),
                    ErrorKind::Validation,
                    "invalid_multipart",
                    error.body_text(),
                )
            }
        }
    }

    let selection = state.selection.select_files(files);
    state.clear_latest_result();
    selection_response(&selection)
}

pub async fn clear_selection_handler(State(state): State<AppState>) -> ApiObject<Value> {
    let selection = state.selection.clear();
    state.clear_latest_result();
    selection_response(&selection)
}
