//! Configuration types for batch PDF-to-Markdown conversion.
//!
//! Every knob lives in [`BatchConfig`], built via [`BatchConfigBuilder`].
//! One struct is easy to clone into concurrent page tasks and easy to log
//! when two runs over the same folder produce different results.

use crate::error::Pdf2MdError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model for the provider backend when none is configured.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// Default model name sent to an OpenAI-compatible server (LM Studio etc.).
pub const DEFAULT_API_MODEL: &str = "internvl3-9b";

/// Default chat-completions endpoint of a local LM Studio server.
pub const DEFAULT_API_URL: &str = "http://localhost:1234/v1/chat/completions";

/// Upper bound on `max_retries`; past this the doubling backoff runs to hours.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Configuration for a batch conversion run.
///
/// # Example
/// ```rust
/// use pdf2md_batch::{BackendKind, BatchConfig, OutputLayout};
///
/// let config = BatchConfig::builder()
///     .input_dir("./input")
///     .output_dir("./output/Gemini")
///     .backend(BackendKind::Api)
///     .layout(OutputLayout::Flat)
///     .model("gemini-2.5-flash-preview-05-20")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Folder scanned for `*.pdf` files. Default: `./input`.
    pub input_dir: PathBuf,

    /// Root folder for all outputs. Default: `./output`.
    pub output_dir: PathBuf,

    /// Also scan subdirectories of `input_dir`. Default: false.
    pub recursive: bool,

    /// Re-convert documents whose markdown already exists. Default: false.
    pub force: bool,

    /// Which conversion backend to run. Default: [`BackendKind::Text`].
    pub backend: BackendKind,

    /// Where each document's outputs go. Default: [`OutputLayout::PerDocument`].
    pub layout: OutputLayout,

    /// How the text backend emits embedded pictures. Default: [`ImageMode::Embedded`].
    pub image_mode: ImageMode,

    /// Page rasterisation scale relative to PDF points (1.0 = 72 DPI). Default: 1.0.
    ///
    /// Local models on LM Studio are usually happier at 0.5; hosted models
    /// read small print better at 1.0–2.0.
    pub scale: f32,

    /// Cap on either rendered dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Number of concurrent VLM calls per document. Default: 10.
    pub concurrency: usize,

    /// Model identifier. If None, the backend default is used.
    pub model: Option<String>,

    /// Provider name for the provider backend (e.g. "gemini", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Chat-completions URL used by the API backend. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// Bearer token sent by the API backend, if the server wants one.
    pub api_key: Option<String>,

    /// User prompt sent with every page image. If None, the backend default is used.
    pub prompt: Option<String>,

    /// System prompt for the provider backend. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 8192.
    pub max_tokens: usize,

    /// Retries per page on a VLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-page VLM call timeout in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Pass the previous page's markdown as context (forces sequential pages). Default: false.
    pub maintain_format: bool,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Separator between pages in the assembled markdown. Default: blank line.
    pub page_separator: PageSeparator,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Number of characters shown in the per-document preview. Default: 200.
    pub preview_chars: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./input"),
            output_dir: PathBuf::from("./output"),
            recursive: false,
            force: false,
            backend: BackendKind::default(),
            layout: OutputLayout::default(),
            image_mode: ImageMode::default(),
            scale: 1.0,
            max_rendered_pixels: 2000,
            concurrency: 10,
            model: None,
            provider_name: None,
            provider: None,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            prompt: None,
            system_prompt: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 300,
            maintain_format: false,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            password: None,
            preview_chars: 200,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("recursive", &self.recursive)
            .field("force", &self.force)
            .field("backend", &self.backend)
            .field("layout", &self.layout)
            .field("image_mode", &self.image_mode)
            .field("scale", &self.scale)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("maintain_format", &self.maintain_format)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model name the active backend will request.
    pub fn effective_model(&self) -> &str {
        match (&self.model, self.backend) {
            (Some(m), _) => m,
            (None, BackendKind::Api) => DEFAULT_API_MODEL,
            (None, _) => DEFAULT_PROVIDER_MODEL,
        }
    }

    /// Root URL of the API server (`http://host:port`), derived from `api_url`.
    pub fn api_base_url(&self) -> String {
        match self.api_url.find("/v1/") {
            Some(idx) => self.api_url[..idx].to_string(),
            None => self.api_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn recursive(mut self, v: bool) -> Self {
        self.config.recursive = v;
        self
    }

    pub fn force(mut self, v: bool) -> Self {
        self.config.force = v;
        self
    }

    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn image_mode(mut self, mode: ImageMode) -> Self {
        self.config.image_mode = mode;
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale.clamp(0.25, 4.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn maintain_format(mut self, v: bool) -> Self {
        self.config.maintain_format = v;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn preview_chars(mut self, n: usize) -> Self {
        self.config.preview_chars = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, Pdf2MdError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Pdf2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2MdError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.max_retries > MAX_RETRIES_LIMIT {
            return Err(Pdf2MdError::InvalidConfig(format!(
                "max_retries must be ≤ {}, got {}",
                MAX_RETRIES_LIMIT, c.max_retries
            )));
        }
        if c.input_dir.as_os_str().is_empty() || c.output_dir.as_os_str().is_empty() {
            return Err(Pdf2MdError::InvalidConfig(
                "input and output folders must be set".into(),
            ));
        }
        if c.backend == BackendKind::Api
            && !(c.api_url.starts_with("http://") || c.api_url.starts_with("https://"))
        {
            return Err(Pdf2MdError::InvalidConfig(format!(
                "API URL must be http(s), got '{}'",
                c.api_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Conversion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// PDFium text layer plus embedded pictures. No network, no API key.
    #[default]
    Text,
    /// Page images sent to an `edgequake_llm` provider (OpenAI, Gemini, …).
    Vlm,
    /// Page images POSTed to an OpenAI-compatible chat-completions URL.
    Api,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Text => "text",
            BackendKind::Vlm => "vlm",
            BackendKind::Api => "api",
        }
    }
}

/// Where a document's outputs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// `<out>/<stem>/<stem>.md` with `images/` and JSON sidecars next to it.
    #[default]
    PerDocument,
    /// `<out>/<stem>_content.md`, markdown only.
    Flat,
}

/// How pictures found in the PDF end up in the markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    /// Inline `data:image/png;base64,…` URIs, split out to files on write.
    #[default]
    Embedded,
    /// Named image files referenced by file name, relinked on write.
    Referenced,
    /// Pictures are dropped.
    Placeholder,
}

/// Specifies which pages of each PDF to convert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Like [`to_indices`](Self::to_indices), but a selection that matches no
    /// page is an error rather than an empty document.
    pub fn select(&self, total_pages: usize) -> Result<Vec<usize>, Pdf2MdError> {
        let indices = self.to_indices(total_pages);
        if indices.is_empty() {
            let page = match self {
                PageSelection::All => 0,
                PageSelection::Single(p) | PageSelection::Range(p, _) => *p,
                PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
            };
            return Err(Pdf2MdError::PageOutOfRange {
                page,
                total: total_pages,
            });
        }
        Ok(indices)
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
