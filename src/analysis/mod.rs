pub mod context;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod render;

pub use context::ClinicalContext;
pub use orchestrator::{AnalysisError, AnalysisResult, AnalysisService};
pub use provider::{
    ContentPart, GeminiClient, GenerateContentOps, GenerateContentRequest, ProviderError,
    SharedGenerateContentOps,
};
pub use render::{render_blocks, render_html, DisplayBlock};
