//! CLI for StockMeta - stock metadata generation.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stockmeta::{
    build_provider, AssetContent, BatchOutcome, BatchRunner, BatchSubmission, CredentialStore,
    EnvCredentialStore, MetadataProviderExt, PipelineConfig, PromptContext, ProviderKind,
    ValidationReport,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stockmeta")]
#[command(about = "Generate stock submission metadata via AI APIs (OpenAI, Gemini, Groq, Grok, Llama, Cohere, DeepSeek)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "STOCKMETA_CONFIG")]
    config: Option<PathBuf>,

    /// File holding a system prompt that replaces the built-in one
    #[arg(long, global = true, env = "STOCKMETA_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze image, video or text files
    Analyze(AnalyzeArgs),

    /// Run a JSON batch submission
    Batch(BatchArgs),

    /// List providers and whether a key is configured
    Providers,

    /// Check configured API keys against each provider
    Validate(ValidateArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Files to analyze (.txt/.md are treated as text, video by extension, the rest as images)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Provider to use; repeat for several. Defaults to every configured provider
    #[arg(short, long = "provider")]
    providers: Vec<ProviderKind>,

    /// Extra context appended to the prompt
    #[arg(short, long)]
    context: Option<String>,

    /// Frames sampled per video when the provider has no native video input
    #[arg(long)]
    frames: Option<usize>,

    /// Concurrent analyses (1-5)
    #[arg(short, long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct BatchArgs {
    /// Submission file: {"assets": [...], "services": [...], "custom_prompt": "..."}
    submission: PathBuf,
}

#[derive(Args)]
struct ValidateArgs {
    /// Provider to check; repeat for several. Defaults to every configured provider
    #[arg(short, long = "provider")]
    providers: Vec<ProviderKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stockmeta=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;
    let credentials = EnvCredentialStore::from_env();
    let prompt = load_prompt(cli.system_prompt.as_deref())?;

    match cli.command {
        Commands::Analyze(args) => {
            analyze(args, config, credentials, prompt, cli.json).await?;
        }
        Commands::Batch(args) => {
            run_batch(&args.submission, config, credentials, prompt, cli.json).await?;
        }
        Commands::Providers => {
            list_providers(&credentials, cli.json)?;
        }
        Commands::Validate(args) => {
            validate(args, &config, &credentials, cli.json).await?;
        }
    }

    Ok(())
}

fn load_prompt(path: Option<&Path>) -> anyhow::Result<PromptContext> {
    let prompt = PromptContext::new();
    let Some(path) = path else {
        return Ok(prompt);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("system prompt file {} is empty", path.display());
    }
    Ok(prompt.with_system_prompt(text))
}

fn read_asset(path: &Path) -> anyhow::Result<AssetContent> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let content = match ext.as_str() {
        "txt" | "md" => AssetContent::Text(
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        ),
        "mp4" | "mov" | "m4v" | "avi" | "mkv" | "webm" => AssetContent::Video(
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        ),
        _ => AssetContent::Image(
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        ),
    };
    Ok(content)
}

fn selected_providers(
    requested: Vec<ProviderKind>,
    credentials: &EnvCredentialStore,
) -> anyhow::Result<Vec<ProviderKind>> {
    if !requested.is_empty() {
        return Ok(requested);
    }
    let configured = credentials.configured();
    if configured.is_empty() {
        anyhow::bail!(
            "No provider API keys configured (set e.g. OPENAI_API_KEY or GEMINI_API_KEY)"
        );
    }
    Ok(configured)
}

async fn analyze(
    args: AnalyzeArgs,
    mut config: PipelineConfig,
    credentials: EnvCredentialStore,
    prompt: PromptContext,
    json_output: bool,
) -> anyhow::Result<()> {
    if let Some(frames) = args.frames {
        config.video.frame_count = frames;
    }
    if let Some(workers) = args.workers {
        config.batch.workers = workers;
    }

    let services = selected_providers(args.providers, &credentials)?;

    let mut assets = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        assets.push((filename, read_asset(path)?));
    }

    let runner = BatchRunner::new(Arc::new(credentials), config).with_prompt(prompt);
    let outcome = runner
        .run_contents(assets, services, args.context.as_deref().unwrap_or_default())
        .await?;

    print_outcome(&outcome, json_output)
}

async fn run_batch(
    path: &Path,
    config: PipelineConfig,
    credentials: EnvCredentialStore,
    prompt: PromptContext,
    json_output: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let submission = BatchSubmission::from_json(&text)?;

    let runner = BatchRunner::new(Arc::new(credentials), config).with_prompt(prompt);
    let outcome = runner.run(submission).await?;

    print_outcome(&outcome, json_output)
}

fn print_outcome(outcome: &BatchOutcome, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    for (filename, results) in &outcome.results {
        println!("{filename}");
        for task in results {
            let result = &task.result;
            if result.success {
                println!("  ✓ [{}] {}", task.service, result.title);
                println!("    Keywords: {}", result.keywords.join(", "));
                println!(
                    "    Category: {} ({}) | Releases: {}",
                    result.category,
                    result.category.code(),
                    result.releases
                );
                if let Some(video) = &result.video {
                    println!(
                        "    Frames: {}/{} analyzed",
                        video.frames_analyzed, video.frames_total
                    );
                    if let Some(note) = &video.note {
                        println!("    Note: {note}");
                    }
                }
            } else {
                println!("  ✗ [{}] {}", task.service, result.error);
            }
        }
    }
    println!(
        "\n{} of {} analyses succeeded across {} assets",
        outcome.succeeded(),
        outcome.total_analyses,
        outcome.total_assets
    );

    Ok(())
}

fn list_providers(credentials: &EnvCredentialStore, json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct ProviderInfo {
        name: &'static str,
        kind: &'static str,
        default_model: &'static str,
        env_vars: &'static [&'static str],
        images: bool,
        native_video: bool,
        configured: bool,
        masked_key: Option<String>,
    }

    let providers: Vec<ProviderInfo> = ProviderKind::ALL
        .into_iter()
        .map(|kind| {
            let credential = credentials.credential(kind);
            ProviderInfo {
                name: kind.display_name(),
                kind: kind.as_str(),
                default_model: kind.default_model(),
                env_vars: kind.api_key_env_vars(),
                images: kind.supports_images(),
                native_video: kind.supports_native_video(),
                configured: credential.is_some(),
                masked_key: credential.map(|c| c.masked_key()),
            }
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&providers)?);
    } else {
        println!("Available providers:\n");
        for p in &providers {
            let status = if p.configured { "✓" } else { "✗" };
            let video = if p.native_video {
                "native video"
            } else if p.images {
                "video via frames"
            } else {
                "text only"
            };
            println!("  {} {} ({}) - {}", status, p.name, p.kind, video);
            println!("    Model: {}", p.default_model);
            match &p.masked_key {
                Some(key) => println!("    API key: {key}"),
                None => println!("    API key: {}", p.env_vars.join(" or ")),
            }
        }
    }

    Ok(())
}

async fn validate(
    args: ValidateArgs,
    config: &PipelineConfig,
    credentials: &EnvCredentialStore,
    json_output: bool,
) -> anyhow::Result<()> {
    let services = selected_providers(args.providers, credentials)?;

    let mut reports = Vec::with_capacity(services.len());
    for kind in services {
        let report = match credentials.credential(kind) {
            None => ValidationReport::from_health(kind, Err(stockmeta::StockMetaError::NotConfigured(kind))),
            Some(credential) => match build_provider(&credential, config) {
                Ok(provider) => provider.validate().await,
                Err(e) => ValidationReport::from_health(kind, Err(e)),
            },
        };
        reports.push(report);
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            let status = if report.valid { "✓" } else { "✗" };
            println!("  {} {}: {}", status, report.service.display_name(), report.message);
        }
    }

    Ok(())
}
