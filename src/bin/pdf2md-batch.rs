//! CLI binary for pdf2md-batch.
//!
//! A thin shim over the library crate: maps flags to `BatchConfig` /
//! `ProxyConfig`, draws progress, and prints the batch summary.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2md_batch::config::DEFAULT_API_URL;
use pdf2md_batch::pipeline::api::check_connection;
use pdf2md_batch::prompts::{DOCUMENT_TO_MARKDOWN_PROMPT, OCR_PAGE_PROMPT};
use pdf2md_batch::proxy::{DEFAULT_PROXY_ADDR, DEFAULT_PROXY_MODEL, DEFAULT_PROXY_PROVIDER};
use pdf2md_batch::{
    extract_embedded_images, process_folder, Backend, BackendKind, BatchConfig,
    BatchProgressCallback, BatchSummary, ImageMode, NoopProgressCallback, OutputLayout,
    PageSelection, PageSeparator, ProviderBackend, ProxyConfig, ProxyHandle, ProxyServer,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the whole folder, one log line per document.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            bar,
            failed: AtomicUsize::new(0),
        }
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total as u64);
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total} PDF files"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_document_skipped(&self, index: usize, total: usize, name: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            dim("-"),
            index,
            total,
            name,
            dim("already converted")
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, index: usize, total: usize, name: &str, preview: &str) {
        let first_line = preview.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(first_line)
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, name: &str, error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or(error);
        let msg: String = if first_line.chars().count() > 80 {
            let mut s: String = first_line.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Text layer only, no API key needed
  pdf2md-batch convert --input ./input --output ./output

  # Page images through Gemini (or any edgequake-llm provider)
  pdf2md-batch convert --backend vlm --provider gemini --model gemini-2.0-flash

  # A local model served by LM Studio
  pdf2md-batch convert --backend api --model internvl3-9b

  # Gemini behind the built-in OpenAI-compatible shim
  pdf2md-batch convert --via-proxy --output ./output/Gemini

  # Run the shim on its own
  pdf2md-batch proxy --bind 127.0.0.1:4000

  # Split inline base64 pictures out of an existing markdown file
  pdf2md-batch extract-images output/paper/paper.md

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key (required by --via-proxy)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter, overrides --verbose / --quiet

A .env file in the working directory is loaded on startup.
"#;

/// Batch-convert folders of PDFs to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md-batch",
    version,
    about = "Batch-convert folders of PDFs to Markdown",
    long_about = "Convert every PDF in a folder to Markdown, using the PDF text layer, a Vision \
LLM provider (OpenAI, Anthropic, Gemini, Ollama, ...), or any OpenAI-compatible server. \
Documents that were already converted are skipped.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2MD_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert every PDF in a folder.
    Convert(ConvertArgs),
    /// Run the OpenAI-compatible shim until Ctrl-C.
    Proxy(ProxyArgs),
    /// Check that an OpenAI-compatible server answers.
    Check(CheckArgs),
    /// Save inline base64 images of a markdown file to images/.
    ExtractImages(ExtractImagesArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Folder holding the PDFs.
    #[arg(short, long, env = "PDF2MD_INPUT", default_value = "./input")]
    input: PathBuf,

    /// Folder the markdown is written to.
    #[arg(short, long, env = "PDF2MD_OUTPUT", default_value = "./output")]
    output: PathBuf,

    /// Conversion backend.
    #[arg(long, env = "PDF2MD_BACKEND", value_enum, default_value = "text")]
    backend: BackendArg,

    /// Output layout. Default: per-document (flat with --via-proxy).
    #[arg(long, env = "PDF2MD_LAYOUT", value_enum)]
    layout: Option<LayoutArg>,

    /// How pictures end up in the markdown.
    #[arg(long, env = "PDF2MD_IMAGES", value_enum, default_value = "embedded")]
    images: ImageArg,

    /// Convert documents even if their markdown already exists.
    #[arg(long, env = "PDF2MD_FORCE")]
    force: bool,

    /// Also look for PDFs in sub-folders.
    #[arg(short, long, env = "PDF2MD_RECURSIVE")]
    recursive: bool,

    /// LLM provider for the vlm backend: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Model ID. Default depends on the backend.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Chat-completions URL for the api backend.
    #[arg(long, env = "PDF2MD_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Bearer token for the api backend.
    #[arg(long, env = "PDF2MD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// User prompt sent with every page image.
    #[arg(long, env = "PDF2MD_PROMPT")]
    prompt: Option<String>,

    /// Path to a text file containing a custom system prompt (vlm backend).
    #[arg(long, env = "PDF2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Page render scale. Default: 0.5 for the api backend, 1.0 otherwise.
    #[arg(long, env = "PDF2MD_SCALE")]
    scale: Option<f32>,

    /// Concurrent page calls per document.
    #[arg(short, long, env = "PDF2MD_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDF2MD_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "PDF2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PDF2MD_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2MD_PAGES", default_value = "all")]
    pages: String,

    /// Page separator: none, hr, comment, or custom string.
    #[arg(long, env = "PDF2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// Sequential mode: pass previous page as context for format continuity.
    #[arg(long, env = "PDF2MD_MAINTAIN_FORMAT")]
    maintain_format: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2MD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Start the shim in-process and route the api backend through it.
    #[arg(long)]
    via_proxy: bool,

    /// Address the in-process shim binds to.
    #[arg(long, default_value = DEFAULT_PROXY_ADDR)]
    proxy_bind: SocketAddr,

    /// Print the batch summary as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2MD_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ProxyArgs {
    /// Address to listen on.
    #[arg(long, env = "PDF2MD_PROXY_BIND", default_value = DEFAULT_PROXY_ADDR)]
    bind: SocketAddr,

    /// edgequake-llm provider requests are forwarded to.
    #[arg(long, env = "PDF2MD_PROXY_PROVIDER", default_value = DEFAULT_PROXY_PROVIDER)]
    provider: String,

    /// Model used when a request names none.
    #[arg(long, env = "PDF2MD_PROXY_MODEL", default_value = DEFAULT_PROXY_MODEL)]
    default_model: String,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Chat-completions URL (or server base URL) to check.
    #[arg(long, env = "PDF2MD_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Warn unless this model is listed.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args, Debug)]
struct ExtractImagesArgs {
    /// Markdown file with inline data:image/...;base64 references.
    markdown: PathBuf,

    /// Write the rewritten markdown here instead of in place.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Text,
    Vlm,
    Api,
}

impl From<BackendArg> for BackendKind {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Text => BackendKind::Text,
            BackendArg::Vlm => BackendKind::Vlm,
            BackendArg::Api => BackendKind::Api,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    PerDocument,
    Flat,
}

impl From<LayoutArg> for OutputLayout {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::PerDocument => OutputLayout::PerDocument,
            LayoutArg::Flat => OutputLayout::Flat,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ImageArg {
    Embedded,
    Referenced,
    Placeholder,
}

impl From<ImageArg> for ImageMode {
    fn from(v: ImageArg) -> Self {
        match v {
            ImageArg::Embedded => ImageMode::Embedded,
            ImageArg::Referenced => ImageMode::Referenced,
            ImageArg::Placeholder => ImageMode::Placeholder,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while it is visible.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Convert(ref args) => run_convert(&cli, args, show_progress).await,
        Command::Proxy(ref args) => run_proxy(args).await,
        Command::Check(ref args) => run_check(args).await,
        Command::ExtractImages(ref args) => run_extract_images(&cli, args).await,
    }
}

// ── convert ──────────────────────────────────────────────────────────────

async fn run_convert(cli: &Cli, args: &ConvertArgs, show_progress: bool) -> Result<()> {
    let proxy = if args.via_proxy {
        Some(start_inprocess_proxy(args).await?)
    } else {
        None
    };

    let outcome = convert_folder(cli, args, proxy.as_ref(), show_progress).await;

    if let Some(handle) = proxy {
        handle.stop().await;
    }
    let summary = outcome?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary);
    }

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn start_inprocess_proxy(args: &ConvertArgs) -> Result<ProxyHandle> {
    if std::env::var("GEMINI_API_KEY").map_or(true, |k| k.trim().is_empty()) {
        bail!("--via-proxy needs GEMINI_API_KEY (set it in the environment or a .env file)");
    }
    let config = ProxyConfig {
        bind: args.proxy_bind,
        ..ProxyConfig::default()
    };
    let handle = ProxyServer::start(config, ProviderBackend::new(DEFAULT_PROXY_PROVIDER))
        .await
        .context("Failed to start the proxy")?;
    info!("Proxy listening on {}", handle.base_url());
    Ok(handle)
}

async fn convert_folder(
    cli: &Cli,
    args: &ConvertArgs,
    proxy: Option<&ProxyHandle>,
    show_progress: bool,
) -> Result<BatchSummary> {
    let config = build_config(args, proxy).await?;
    let backend = Backend::from_config(&config)
        .await
        .context("Backend is not ready")?;

    if !cli.quiet && !args.json {
        eprintln!(
            "{} {}  {} → {}",
            cyan("◆"),
            bold(&backend.describe()),
            config.input_dir.display(),
            config.output_dir.display()
        );
    }

    let summary = if show_progress {
        let cb = CliProgressCallback::new();
        process_folder(&config, &backend, &cb).await
    } else {
        process_folder(&config, &backend, &NoopProgressCallback).await
    };
    summary.context("Batch failed")
}

/// Map CLI args to `BatchConfig`.
async fn build_config(args: &ConvertArgs, proxy: Option<&ProxyHandle>) -> Result<BatchConfig> {
    let system_prompt = if let Some(ref path) = args.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let backend: BackendKind = if proxy.is_some() {
        BackendKind::Api
    } else {
        args.backend.into()
    };
    let layout = match (args.layout, proxy) {
        (Some(l), _) => l.into(),
        (None, Some(_)) => OutputLayout::Flat,
        (None, None) => OutputLayout::PerDocument,
    };
    let scale = args
        .scale
        .unwrap_or(if backend == BackendKind::Api { 0.5 } else { 1.0 });

    let mut builder = BatchConfig::builder()
        .input_dir(&args.input)
        .output_dir(&args.output)
        .recursive(args.recursive)
        .force(args.force)
        .backend(backend)
        .layout(layout)
        .image_mode(args.images.into())
        .scale(scale)
        .concurrency(args.concurrency)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .maintain_format(args.maintain_format)
        .pages(parse_pages(&args.pages)?)
        .page_separator(parse_separator(&args.separator));

    match proxy {
        Some(handle) => {
            builder = builder
                .api_url(handle.completions_url())
                .model(args.model.as_deref().unwrap_or(DEFAULT_PROXY_MODEL))
                .prompt(args.prompt.as_deref().unwrap_or(DOCUMENT_TO_MARKDOWN_PROMPT));
        }
        None => {
            builder = builder.api_url(&args.api_url);
            if let Some(ref m) = args.model {
                builder = builder.model(m);
            }
            match (&args.prompt, backend) {
                (Some(p), _) => builder = builder.prompt(p),
                (None, BackendKind::Api) => builder = builder.prompt(OCR_PAGE_PROMPT),
                (None, _) => {}
            }
        }
    }
    if let Some(ref p) = args.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref k) = args.api_key {
        builder = builder.api_key(k);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd);
    }
    if let Some(sp) = system_prompt {
        builder = builder.system_prompt(sp);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &BatchSummary) {
    let total = summary.found;
    if summary.failed.is_empty() {
        eprintln!(
            "{} converted {}/{}  {}  {}",
            green("✔"),
            bold(&summary.converted.to_string()),
            total,
            dim(&format!("{} skipped", summary.skipped)),
            dim(&format!("{:.1}s", summary.duration_ms as f64 / 1000.0)),
        );
    } else {
        eprintln!(
            "{} converted {}/{}  {}  ({} failed)",
            if summary.converted == 0 {
                red("✘")
            } else {
                cyan("⚠")
            },
            bold(&summary.converted.to_string()),
            total,
            dim(&format!("{} skipped", summary.skipped)),
            red(&summary.failed.len().to_string()),
        );
        for f in &summary.failed {
            eprintln!("   {} {}", red("✗"), f.path.display());
        }
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if pages.contains(&0) {
            bail!("Pages are 1-indexed, minimum is 1 (got 0)");
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

// ── proxy ────────────────────────────────────────────────────────────────

async fn run_proxy(args: &ProxyArgs) -> Result<()> {
    let config = ProxyConfig {
        bind: args.bind,
        provider: args.provider.clone(),
        default_model: args.default_model.clone(),
        ..ProxyConfig::default()
    };
    let handle = ProxyServer::start(config, ProviderBackend::new(args.provider.clone()))
        .await
        .context("Failed to start the proxy")?;

    eprintln!(
        "{} Proxy on {}  {}",
        cyan("◆"),
        bold(&handle.completions_url()),
        dim(&format!("{} / {}", args.provider, args.default_model))
    );
    eprintln!("{}", dim("Press Ctrl-C to stop."));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down proxy");
    handle.stop().await;
    Ok(())
}

// ── check ────────────────────────────────────────────────────────────────

async fn run_check(args: &CheckArgs) -> Result<()> {
    let config = BatchConfig::builder()
        .backend(BackendKind::Api)
        .api_url(&args.api_url)
        .build()
        .context("Invalid API URL")?;
    let base = config.api_base_url();

    let models = check_connection(&base)
        .await
        .with_context(|| format!("No OpenAI-compatible server at {base}"))?;

    println!("{} {}  {} models", green("✔"), bold(&base), models.len());
    for m in &models {
        println!("   {m}");
    }
    if let Some(ref wanted) = args.model {
        if !models.iter().any(|m| m == wanted) {
            eprintln!("{} model '{}' is not loaded", cyan("⚠"), wanted);
            std::process::exit(1);
        }
    }
    Ok(())
}

// ── extract-images ───────────────────────────────────────────────────────

async fn run_extract_images(cli: &Cli, args: &ExtractImagesArgs) -> Result<()> {
    let markdown = tokio::fs::read_to_string(&args.markdown)
        .await
        .with_context(|| format!("Failed to read {}", args.markdown.display()))?;

    let target = args.output.clone().unwrap_or_else(|| args.markdown.clone());
    let doc_dir = target
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let extracted = tokio::task::spawn_blocking(move || extract_embedded_images(&markdown, &doc_dir))
        .await
        .context("Image extraction task panicked")??;

    pdf2md_batch::output::write_atomic(&target, extracted.markdown.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} {} images saved  {}",
            green("✔"),
            bold(&extracted.images.len().to_string()),
            dim(&target.display().to_string())
        );
        if extracted.failed > 0 {
            eprintln!("{} {} images left inline", cyan("⚠"), extracted.failed);
        }
    }
    Ok(())
}
