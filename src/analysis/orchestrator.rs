use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use crate::analysis::context::ClinicalContext;
use crate::analysis::prompt::build_instruction;
use crate::analysis::provider::{
    ContentPart, GenerateContentRequest, InlineData, ProviderError, SharedGenerateContentOps,
};
use crate::ingest::{normalize_batch, NormalizeError, NormalizedImage, UploadedFile};

pub const NO_IMAGES_MESSAGE: &str = "Vui lòng chọn ít nhất một tệp hình ảnh để phân tích.";
pub const ANALYSIS_FAILED_MESSAGE: &str =
    "Đã xảy ra lỗi trong quá trình phân tích. Vui lòng thử lại.";
pub const ANALYSIS_PENDING_MESSAGE: &str =
    "Một phân tích khác đang được xử lý. Vui lòng chờ kết quả.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no images selected for analysis")]
    Validation,
    #[error("another analysis is already pending")]
    Busy,
    #[error(transparent)]
    Decode(#[from] NormalizeError),
    #[error("provider call failed: {0}")]
    Provider(#[source] ProviderError),
    #[error("analysis task failed: {0}")]
    Task(String),
}

impl AnalysisError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation => String::from(NO_IMAGES_MESSAGE),
            Self::Busy => String::from(ANALYSIS_PENDING_MESSAGE),
            Self::Decode(source) => source.user_message(),
            Self::Provider(_) | Self::Task(_) => String::from(ANALYSIS_FAILED_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub text: String,
    pub image_count: usize,
    pub model: String,
    pub completed_at: String,
}

/// Composes the multimodal request and owns the single in-flight permit.
#[derive(Clone)]
pub struct AnalysisService {
    provider: SharedGenerateContentOps,
    model: String,
    in_flight: Arc<Semaphore>,
}

impl AnalysisService {
    pub fn new(provider: SharedGenerateContentOps, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            in_flight: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_str()
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    /// Images go first as inline parts, the instruction last, all in one
    /// request so the provider reads them as a single case.
    pub fn build_request(
        &self,
        images: &[NormalizedImage],
        clinical_context: &str,
    ) -> GenerateContentRequest {
        let mut parts = images
            .iter()
            .map(|image| ContentPart::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.as_str().to_string(),
                    data: image.base64_payload.clone(),
                },
            })
            .collect::<Vec<_>>();
        parts.push(ContentPart::Text {
            text: build_instruction(clinical_context),
        });
        GenerateContentRequest {
            model: self.model.clone(),
            parts,
        }
    }

    /// Blocking: issues exactly one provider call.
    pub fn analyze(
        &self,
        images: &[NormalizedImage],
        clinical_context: &str,
    ) -> Result<String, AnalysisError> {
        if images.is_empty() {
            return Err(AnalysisError::Validation);
        }
        let request = self.build_request(images, clinical_context);
        self.provider.generate(&request).map_err(|source| {
            error!(error = %source, model = self.model.as_str(), "error calling provider");
            AnalysisError::Provider(source)
        })
    }

    pub async fn run(
        &self,
        files: Vec<UploadedFile>,
        context: &ClinicalContext,
    ) -> Result<AnalysisResult, AnalysisError> {
        if files.is_empty() {
            return Err(AnalysisError::Validation);
        }
        let permit = self
            .in_flight
            .clone()
            .try_acquire_owned()
            .map_err(|_| AnalysisError::Busy)?;

        let analysis_id = Uuid::new_v4().to_string();
        let image_count = files.len();
        info!(
            analysis_id = analysis_id.as_str(),
            image_count,
            model = self.model.as_str(),
            "analysis started"
        );

        let images = normalize_batch(files).await?;
        let clinical_context = context.render();
        let service = self.clone();
        // The permit travels with the provider call so it is only released
        // once the call has finished, even if the caller stops waiting.
        let text = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            service.analyze(images.as_slice(), clinical_context.as_str())
        })
        .await
        .map_err(|e| AnalysisError::Task(e.to_string()))??;

        info!(
            analysis_id = analysis_id.as_str(),
            response_chars = text.chars().count(),
            "analysis completed"
        );
        Ok(AnalysisResult {
            analysis_id,
            text,
            image_count,
            model: self.model.clone(),
            completed_at: now_iso(),
        })
    }
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::provider::GenerateContentOps;
    use crate::ingest::ImageMime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProvider {
        calls: AtomicUsize,
        seen: Mutex<Vec<GenerateContentRequest>>,
        fail: bool,
    }

    impl GenerateContentOps for RecordingProvider {
        fn generate(&self, request: &GenerateContentRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().expect("lock").push(request.clone());
            if self.fail {
                return Err(ProviderError::Transport(String::from("connection reset")));
            }
            Ok(String::from("## Chẩn đoán phân biệt\n* A"))
        }
    }

    fn service(provider: Arc<RecordingProvider>) -> AnalysisService {
        AnalysisService::new(provider, "gemini-test")
    }

    #[test]
    fn request_places_images_before_the_instruction() {
        let svc = service(Arc::new(RecordingProvider::default()));
        let images = vec![
            NormalizedImage {
                base64_payload: String::from("AAA"),
                mime_type: ImageMime::Png,
            },
            NormalizedImage {
                base64_payload: String::from("BBB"),
                mime_type: ImageMime::Jpeg,
            },
        ];
        let request = svc.build_request(images.as_slice(), "- Tuổi: 50");
        assert_eq!(request.model, "gemini-test");
        assert_eq!(request.parts.len(), 3);
        assert_eq!(
            request.parts[1],
            ContentPart::InlineData {
                inline_data: InlineData {
                    mime_type: String::from("image/jpeg"),
                    data: String::from("BBB"),
                }
            }
        );
        match &request.parts[2] {
            ContentPart::Text { text } => assert!(text.contains("- Tuổi: 50")),
            other => panic!("expected trailing text part, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_images_is_a_validation_error_without_provider_call() {
        let provider = Arc::new(RecordingProvider::default());
        let err = service(provider.clone())
            .run(Vec::new(), &ClinicalContext::default())
            .await
            .expect_err("empty batch should fail");
        assert!(matches!(err, AnalysisError::Validation));
        assert_eq!(err.user_message(), NO_IMAGES_MESSAGE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_run_issues_exactly_one_call() {
        let provider = Arc::new(RecordingProvider::default());
        let svc = service(provider.clone());
        let files = vec![
            UploadedFile::new("a.png", "image/png", vec![1u8]),
            UploadedFile::new("b.webp", "image/webp", vec![2u8]),
        ];
        let result = svc
            .run(files, &ClinicalContext::default())
            .await
            .expect("analysis should succeed");
        assert_eq!(result.text, "## Chẩn đoán phân biệt\n* A");
        assert_eq!(result.image_count, 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!svc.is_pending());
    }

    #[tokio::test]
    async fn decode_failure_aborts_before_provider_call() {
        let provider = Arc::new(RecordingProvider::default());
        let files = vec![
            UploadedFile::new("a.png", "image/png", vec![1u8]),
            UploadedFile::new("broken.tif", "image/tiff", b"garbage".to_vec()),
        ];
        let err = service(provider.clone())
            .run(files, &ClinicalContext::default())
            .await
            .expect_err("corrupt tiff should fail the batch");
        assert!(matches!(err, AnalysisError::Decode(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_failure_maps_to_generic_message() {
        let provider = Arc::new(RecordingProvider {
            fail: true,
            ..RecordingProvider::default()
        });
        let err = service(provider.clone())
            .run(
                vec![UploadedFile::new("a.png", "image/png", vec![1u8])],
                &ClinicalContext::default(),
            )
            .await
            .expect_err("provider failure should surface");
        assert!(matches!(err, AnalysisError::Provider(_)));
        assert_eq!(err.user_message(), ANALYSIS_FAILED_MESSAGE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_submission_while_pending_is_busy() {
        let svc = service(Arc::new(RecordingProvider::default()));
        let held = svc
            .in_flight
            .clone()
            .try_acquire_owned()
            .expect("permit should be free");
        assert!(svc.is_pending());

        let err = svc
            .run(
                vec![UploadedFile::new("a.png", "image/png", vec![1u8])],
                &ClinicalContext::default(),
            )
            .await
            .expect_err("second run should be rejected");
        assert!(matches!(err, AnalysisError::Busy));

        drop(held);
        assert!(!svc.is_pending());
    }
}
