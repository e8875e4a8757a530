use std::path::PathBuf;
use std::sync::Arc;

use pathology_assist::analysis::render::render_terminal;
use pathology_assist::analysis::{
    render_html, AnalysisError, AnalysisService, ClinicalContext, GeminiClient,
};
use pathology_assist::api::server::serve;
use pathology_assist::config::{default_app_root, AppConfig};
use pathology_assist::ingest::{SelectionManager, UploadedFile};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let wants_help = cli_args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"));

    match cli_args.first().map(String::as_str) {
        Some("analyze") => {
            if wants_help {
                print_analyze_usage();
                return Ok(());
            }
            let parsed = parse_analyze_cli_args(&cli_args[1..])?;
            let config = load_config_or_exit()?;
            run_analyze_cli(&config, parsed).await
        }
        None | Some("serve") => {
            if wants_help {
                print_serve_usage();
                return Ok(());
            }
            let config = load_config_or_exit()?;
            serve(&config).await?;
            Ok(())
        }
        Some(unknown) => Err(std::io::Error::other(format!(
            "Unknown command: {unknown}\n\nUse --help for usage."
        ))
        .into()),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

fn load_config_or_exit() -> Result<AppConfig, Box<dyn std::error::Error>> {
    match AppConfig::load(default_app_root().as_path()) {
        Ok(config) => Ok(config),
        Err(err) => {
            error!(error = %err, "configuration error; refusing to start");
            Err(err.into())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct AnalyzeCliArgs {
    images: Vec<PathBuf>,
    context: ClinicalContext,
    html: bool,
}

fn parse_analyze_cli_args(args: &[String]) -> Result<AnalyzeCliArgs, Box<dyn std::error::Error>> {
    let mut parsed = AnalyzeCliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--image" => {
                parsed.images.push(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--gender" => {
                parsed.context.gender = Some(needs_value(i)?);
                i += 2;
            }
            "--age" => {
                parsed.context.age = Some(needs_value(i)?);
                i += 2;
            }
            "--location" => {
                parsed.context.sample_location = Some(needs_value(i)?);
                i += 2;
            }
            "--diagnosis" => {
                parsed.context.clinical_diagnosis = Some(needs_value(i)?);
                i += 2;
            }
            "--notes" => {
                parsed.context.additional_notes = Some(needs_value(i)?);
                i += 2;
            }
            "--html" => {
                parsed.html = true;
                i += 1;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    if parsed.images.is_empty() {
        return Err(std::io::Error::other("Missing required --image").into());
    }
    Ok(parsed)
}

async fn run_analyze_cli(
    config: &AppConfig,
    args: AnalyzeCliArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut uploads = Vec::with_capacity(args.images.len());
    for path in args.images.iter() {
        let file = UploadedFile::from_path(path.as_path()).map_err(|e| {
            std::io::Error::other(format!("cannot read '{}': {e}", path.display()))
        })?;
        uploads.push(file);
    }

    let selection = SelectionManager::new().select_files(uploads);
    if selection.is_empty() {
        return Err(std::io::Error::other(AnalysisError::Validation.user_message()).into());
    }
    info!(
        accepted = selection.entries().len(),
        rejected = selection.rejected().len(),
        "images selected"
    );

    let service = AnalysisService::new(
        Arc::new(GeminiClient::from_config(config)),
        config.model.as_str(),
    );
    let result = service
        .run(selection.files(), &args.context)
        .await
        .map_err(|err| std::io::Error::other(err.user_message()))?;

    if args.html {
        println!("{}", render_html(result.text.as_str()));
    } else {
        println!("{}", render_terminal(result.text.as_str()));
    }
    Ok(())
}

fn print_serve_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  pathology-assist [serve]\n\n",
        "Environment:\n",
        "  API_KEY (or GEMINI_API_KEY) is required; .env in the working directory is honoured\n",
        "  PATHOLOGY_ASSIST_BIND, PATHOLOGY_ASSIST_MODEL, PATHOLOGY_ASSIST_API_BASE_URL,\n",
        "  PATHOLOGY_ASSIST_TIMEOUT_SECS, PATHOLOGY_ASSIST_MAX_UPLOAD_MB, PATHOLOGY_ASSIST_SETTINGS\n"
    ));
}

fn print_analyze_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  pathology-assist analyze --image PATH [--image PATH ...] ",
        "[--gender G] [--age A] [--location L] [--diagnosis D] [--notes N] [--html]\n\n",
        "Accepted images: PNG, JPEG, WEBP, TIF/TIFF (first page only)\n"
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parse_analyze_requires_an_image() {
        let err = parse_analyze_cli_args(&[]).expect_err("image should be required");
        assert!(err.to_string().contains("--image"));
    }

    #[test]
    fn parse_analyze_collects_images_and_context() {
        let parsed = parse_analyze_cli_args(&args(&[
            "--image",
            "a.tif",
            "--image",
            "b.png",
            "--gender",
            "Nam",
            "--age",
            "50",
            "--location",
            "Phổi",
            "--html",
        ]))
        .expect("parse should succeed");
        assert_eq!(
            parsed.images,
            vec![PathBuf::from("a.tif"), PathBuf::from("b.png")]
        );
        assert_eq!(parsed.context.gender.as_deref(), Some("Nam"));
        assert_eq!(parsed.context.age.as_deref(), Some("50"));
        assert_eq!(parsed.context.sample_location.as_deref(), Some("Phổi"));
        assert_eq!(parsed.context.clinical_diagnosis, None);
        assert!(parsed.html);
    }

    #[test]
    fn parse_analyze_rejects_unknown_and_dangling_flags() {
        let err = parse_analyze_cli_args(&args(&["--image", "a.png", "--bogus"]))
            .expect_err("unknown flag should fail");
        assert!(err.to_string().contains("Unknown argument: --bogus"));

        let err = parse_analyze_cli_args(&args(&["--image"])).expect_err("value required");
        assert!(err.to_string().contains("Missing value for --image"));
    }
}
