//! Document Translator CLI - translate a TXT, DOCX or PDF file into a PDF.

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use doc_translator_core::{
    AppConfig, ExtractedContent, JobRecord, Pipeline, Provider, ReconcileMode, RenderEngine,
    TranslationRequest,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderOption {
    Google,
    Openai,
}

impl From<ProviderOption> for Provider {
    fn from(opt: ProviderOption) -> Self {
        match opt {
            ProviderOption::Google => Self::Google,
            ProviderOption::Openai => Self::OpenAi,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RendererOption {
    Auto,
    Chromium,
    Builtin,
}

impl From<RendererOption> for RenderEngine {
    fn from(opt: RendererOption) -> Self {
        match opt {
            RendererOption::Auto => Self::Auto,
            RendererOption::Chromium => Self::Chromium,
            RendererOption::Builtin => Self::Builtin,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReconcileOption {
    LineAligned,
    Positional,
}

impl From<ReconcileOption> for ReconcileMode {
    fn from(opt: ReconcileOption) -> Self {
        match opt {
            ReconcileOption::LineAligned => Self::LineAligned,
            ReconcileOption::Positional => Self::Positional,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "doc-translate")]
#[command(author, version, about = "Translate TXT, DOCX and PDF documents", long_about = None)]
struct Args {
    /// Input document (.txt, .docx or .pdf)
    #[arg(required = true)]
    input: PathBuf,

    /// Output PDF file (default: translated_<input>.pdf next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Source language code (default from config, "auto" to detect)
    #[arg(short = 's', long)]
    source: Option<String>,

    /// Target language code (default from config)
    #[arg(short = 't', long)]
    target: Option<String>,

    /// Translation provider
    #[arg(long, value_enum)]
    provider: Option<ProviderOption>,

    /// OpenAI API base URL
    #[arg(long, env = "OPENAI_API_BASE")]
    api_base: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: Option<String>,

    /// Model name for OpenAI-compatible API
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// PDF renderer
    #[arg(long, value_enum)]
    renderer: Option<RendererOption>,

    /// How translated lines are matched back to the document structure
    #[arg(long, value_enum)]
    reconcile: Option<ReconcileOption>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable the persistent disk cache
    #[arg(long)]
    no_cache: bool,

    /// Clear the persistent translation cache before translating
    #[arg(long)]
    clear_cache: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(source) = &self.source {
            config.source_lang = source.as_str().into();
        }
        if let Some(target) = &self.target {
            config.target_lang = target.as_str().into();
        }

        if let Some(provider) = self.provider {
            config.translator.provider = provider.into();
        }
        if let Some(api_base) = &self.api_base {
            config.translator.api_base.clone_from(api_base);
        }
        if self.api_key.is_some() {
            config.translator.api_key.clone_from(&self.api_key);
        }
        if let Some(model) = &self.model {
            config.translator.model.clone_from(model);
        }
        if let Some(renderer) = self.renderer {
            config.render.engine = renderer.into();
        }
        if let Some(reconcile) = self.reconcile {
            config.pipeline.reconcile = reconcile.into();
        }
        if self.no_cache {
            config.cache.disk_enabled = false;
        }
    }

    fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = self
                .input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document");
            self.input.with_file_name(format!("translated_{stem}.pdf"))
        })
    }
}

/// Languages come from `config`, which already carries any `-s`/`-t` override.
fn translation_request(
    content: ExtractedContent,
    config: &AppConfig,
    file_name: &str,
) -> TranslationRequest {
    TranslationRequest {
        text: content.text,
        html: Some(content.html),
        structure: Some(content.structure),
        target_language: config.target_lang.as_str().to_string(),
        source_language: Some(config.source_lang.as_str().to_string()),
        file_name: Some(file_name.to_string()),
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

fn show(pb: &ProgressBar, record: &JobRecord) {
    pb.set_position(u64::from(record.progress));
    match (record.completed_chunks, record.total_chunks) {
        (Some(done), Some(total)) => pb.set_message(format!("{} ({done}/{total})", record.step)),
        _ => pb.set_message(record.step.clone()),
    }
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|s| s.to_str())
        .context("Input path has no usable file name")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    if args.clear_cache {
        let count = doc_translator_core::clear_translation_cache()
            .map_err(anyhow::Error::msg)
            .context("Failed to clear cache")?;
        info!("Cleared {} cached translations", count);
    }

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load().context("Failed to load config")?
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let pipeline = Pipeline::new(config).context("Failed to initialize pipeline")?;

    let name = file_name(&args.input)?;
    info!("Loading document: {}", args.input.display());
    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read input: {}", args.input.display()))?;

    let upload = pipeline
        .upload(bytes, name)
        .await
        .with_context(|| format!("Failed to load document: {}", args.input.display()))?;

    let content = match (upload.extracted_content, upload.extraction_id) {
        (Some(content), _) => content,
        (None, Some(extraction_id)) => {
            let pb = progress_bar();
            let record = pipeline
                .wait(&extraction_id, POLL_INTERVAL, |record| show(&pb, record))
                .await?;
            pb.finish_and_clear();
            if record.failed {
                bail!(
                    "Extraction failed: {}",
                    record.error.as_deref().unwrap_or("unknown error")
                );
            }
            record
                .extracted_content
                .clone()
                .context("Extraction finished without content")?
        }
        (None, None) => bail!("Upload produced neither content nor an extraction job"),
    };
    info!(
        "Extracted {} words via {}",
        content.metadata.words, content.extraction_method
    );

    let request = translation_request(content, pipeline.config(), name);
    let translation_id = pipeline
        .start_translation(request)
        .await
        .context("Failed to start translation")?;

    let pb = progress_bar();
    let record = pipeline
        .wait(&translation_id, POLL_INTERVAL, |record| show(&pb, record))
        .await?;
    if record.failed {
        pb.abandon_with_message("Translation failed");
        bail!(
            "Translation failed: {}",
            record.error.as_deref().unwrap_or("unknown error")
        );
    }
    pb.finish_with_message("Translation complete");

    if let Some(output) = &record.output {
        if output.cache_hits > 0 || output.fallback_chunks > 0 {
            pb.println(format!(
                "{} chunks from cache, {} left untranslated after errors",
                output.cache_hits, output.fallback_chunks
            ));
        }
    }

    let pdf = pipeline.pdf(&translation_id).await?;
    let output_path = args.output_path();
    tokio::fs::write(&output_path, &pdf.bytes)
        .await
        .with_context(|| format!("Failed to write output: {}", output_path.display()))?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("Translated PDF saved to: {}", output_path.display());
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let args = Args::try_parse_from(["doc-translate", "docs/report.docx"]).unwrap();
        assert_eq!(args.output_path(), PathBuf::from("docs/translated_report.pdf"));

        let args =
            Args::try_parse_from(["doc-translate", "a.txt", "-o", "out/b.pdf"]).unwrap();
        assert_eq!(args.output_path(), PathBuf::from("out/b.pdf"));
    }

    #[test]
    fn test_overrides_applied_to_config() {
        let args = Args::try_parse_from([
            "doc-translate",
            "a.pdf",
            "-t",
            "de",
            "-s",
            "fr",
            "--provider",
            "openai",
            "--renderer",
            "builtin",
            "--reconcile",
            "positional",
            "--no-cache",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        config.cache.disk_enabled = true;
        args.apply(&mut config);

        assert_eq!(config.target_lang.as_str(), "de");
        assert_eq!(config.source_lang.as_str(), "fr");
        assert_eq!(config.translator.provider, Provider::OpenAi);
        assert_eq!(config.render.engine, RenderEngine::Builtin);
        assert_eq!(config.pipeline.reconcile, ReconcileMode::Positional);
        assert!(!config.cache.disk_enabled);
    }

    #[test]
    fn test_languages_default_to_config() {
        let args = Args::try_parse_from(["doc-translate", "a.txt"]).unwrap();
        let mut config = AppConfig::default();
        config.target_lang = "pt".into();
        let before = config.source_lang.clone();
        args.apply(&mut config);
        assert_eq!(config.source_lang, before);
        assert_eq!(config.target_lang.as_str(), "pt");
    }

    #[test]
    fn test_request_targets_configured_language_without_flag() {
        let content = ExtractedContent::from_text("Hello.".to_string(), "text", Default::default());
        let mut config = AppConfig::default();
        config.target_lang = "it".into();

        let args = Args::try_parse_from(["doc-translate", "a.txt"]).unwrap();
        args.apply(&mut config);
        let request = translation_request(content.clone(), &config, "a.txt");
        assert_eq!(request.target_language, "it");
        assert_eq!(request.source_language.as_deref(), Some(config.source_lang.as_str()));

        let args = Args::try_parse_from(["doc-translate", "a.txt", "-t", "ja", "-s", "de"]).unwrap();
        args.apply(&mut config);
        let request = translation_request(content, &config, "a.txt");
        assert_eq!(request.target_language, "ja");
        assert_eq!(request.source_language.as_deref(), Some("de"));
        assert_eq!(request.file_name.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_rejects_unknown_renderer() {
        assert!(Args::try_parse_from(["doc-translate", "a.txt", "--renderer", "gpu"]).is_err());
    }
}
