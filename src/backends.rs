//! Conversion backends: one PDF in, one [`RenderedDocument`] out.
//!
//! | Backend | Needs | Produces |
//! |---------|-------|----------|
//! | [`Backend::Text`] | PDFium only | text layer + embedded pictures |
//! | [`Backend::Vlm`]  | an `edgequake_llm` provider and API key | VLM markdown per page |
//! | [`Backend::Api`]  | an OpenAI-compatible server (LM Studio, the proxy) | VLM markdown per page |
//!
//! Nothing here touches the output folder; [`crate::output::write_document`]
//! does that once a backend has returned.

use crate::config::{BackendKind, BatchConfig, ImageMode, DEFAULT_PROVIDER_MODEL};
use crate::error::Pdf2MdError;
use crate::images::{data_uri_reference, NamedImage};
use crate::output::{
    BlockType, ContentBlock, ConversionStats, PageResult, RenderedDocument,
};
use crate::pipeline::api::{self, ApiClient};
use crate::pipeline::{encode, extract, llm, postprocess, render};
use crate::prompts::OCR_PAGE_PROMPT;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A ready-to-use conversion backend.
pub enum Backend {
    Text,
    Vlm {
        provider: Arc<dyn LLMProvider>,
        label: String,
    },
    Api { client: ApiClient },
}

impl Backend {
    /// Build the backend selected by `config.backend`.
    ///
    /// The API backend checks that its server answers `GET /v1/models`
    /// before any document is touched.
    pub async fn from_config(config: &BatchConfig) -> Result<Self, Pdf2MdError> {
        match config.backend {
            BackendKind::Text => Ok(Backend::Text),
            BackendKind::Vlm => Ok(Backend::Vlm {
                provider: resolve_provider(config)?,
                label: format!(
                    "{} / {}",
                    config.provider_name.as_deref().unwrap_or("auto"),
                    config.model.as_deref().unwrap_or("default model")
                ),
            }),
            BackendKind::Api => {
                let models = api::check_connection(&config.api_base_url()).await?;
                let client = ApiClient::new(config)?;
                if !models.is_empty() && !models.iter().any(|m| m == client.model()) {
                    warn!(
                        "Model '{}' is not listed by the server (available: {})",
                        client.model(),
                        models.join(", ")
                    );
                }
                Ok(Backend::Api { client })
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Text => BackendKind::Text,
            Backend::Vlm { .. } => BackendKind::Vlm,
            Backend::Api { .. } => BackendKind::Api,
        }
    }

    /// One-line description for logs and the CLI banner.
    pub fn describe(&self) -> String {
        match self {
            Backend::Text => "text layer (PDFium)".to_string(),
            Backend::Vlm { label, .. } => label.clone(),
            Backend::Api { client } => format!("{} @ {}", client.model(), client.url()),
        }
    }

    /// Convert one PDF.
    pub async fn convert(
        &self,
        pdf_path: &Path,
        config: &BatchConfig,
    ) -> Result<RenderedDocument, Pdf2MdError> {
        match self {
            Backend::Text => convert_text(pdf_path, config).await,
            Backend::Vlm { provider, .. } => {
                convert_with_vlm(pdf_path, config, PageSink::Provider(provider)).await
            }
            Backend::Api { client } => {
                convert_with_vlm(pdf_path, config, PageSink::Api(client)).await
            }
        }
    }
}

// ── Text layer ───────────────────────────────────────────────────────────

async fn convert_text(
    pdf_path: &Path,
    config: &BatchConfig,
) -> Result<RenderedDocument, Pdf2MdError> {
    let start = Instant::now();
    let with_images = config.image_mode != ImageMode::Placeholder;
    let doc = extract::extract_document(pdf_path, config, with_images).await?;

    let mut content_list = Vec::new();
    let mut named = Vec::new();
    let mut parts: Vec<String> = Vec::with_capacity(doc.pages.len());
    let mut embedded_count = 0usize;

    for page in &doc.pages {
        let text = extract::text_to_markdown(&page.text);
        let mut page_md = String::new();
        if !text.is_empty() {
            page_md.push_str(&text);
            content_list.push(ContentBlock {
                block_type: BlockType::Text,
                text: Some(text),
                img_path: None,
                page_idx: page.index,
            });
        }

        for (n, img) in page.images.iter().enumerate() {
            let reference = match config.image_mode {
                ImageMode::Embedded => match encode::png_bytes(img) {
                    Ok(png) => {
                        embedded_count += 1;
                        Some((
                            data_uri_reference("Image", &png),
                            format!("image_{}.png", embedded_count),
                        ))
                    }
                    Err(e) => {
                        warn!("Page {}: cannot encode image {}: {}", page.index + 1, n + 1, e);
                        None
                    }
                },
                ImageMode::Referenced => {
                    let name = format!("_page_{}_Picture_{}.png", page.index, n + 1);
                    named.push(NamedImage {
                        name: name.clone(),
                        image: img.clone(),
                    });
                    Some((format!("![]({})", name), name))
                }
                ImageMode::Placeholder => None,
            };

            if let Some((md, file)) = reference {
                if !page_md.is_empty() {
                    page_md.push_str("\n\n");
                }
                page_md.push_str(&md);
                content_list.push(ContentBlock {
                    block_type: BlockType::Image,
                    text: None,
                    img_path: Some(file),
                    page_idx: page.index,
                });
            }
        }

        parts.push(page_md);
    }

    if content_list.is_empty() {
        warn!(
            "{}: no text layer found (scanned PDF?); try a VLM backend",
            pdf_path.display()
        );
    }

    let markdown = postprocess::clean_text_layer(&join_pages(
        doc.pages.iter().map(|p| p.index + 1).zip(parts.iter().map(String::as_str)),
        config,
    ));

    let stats = ConversionStats {
        backend: BackendKind::Text.as_str().to_string(),
        total_pages: doc.metadata.page_count,
        processed_pages: doc.pages.len(),
        total_duration_ms: start.elapsed().as_millis() as u64,
        ..Default::default()
    };
    debug!(
        "{}: {} pages, {} blocks, {} named images",
        pdf_path.display(),
        stats.processed_pages,
        content_list.len(),
        named.len()
    );

    Ok(RenderedDocument {
        markdown,
        images: named,
        content_list,
        metadata: doc.metadata,
        pages: Vec::new(),
        stats,
    })
}

// ── VLM (provider or HTTP API) ───────────────────────────────────────────

#[derive(Clone, Copy)]
enum PageSink<'a> {
    Provider(&'a Arc<dyn LLMProvider>),
    Api(&'a ApiClient),
}

impl PageSink<'_> {
    async fn process(
        self,
        idx: usize,
        image: &image::DynamicImage,
        prior: Option<&str>,
        config: &BatchConfig,
    ) -> PageResult {
        let page_num = idx + 1;
        match self {
            PageSink::Provider(provider) => match encode::encode_page(image) {
                Ok(data) => llm::process_page(provider, page_num, data, prior, config).await,
                Err(e) => encode_failure(page_num, e),
            },
            PageSink::Api(client) => match encode::png_data_url(image) {
                Ok(url) => {
                    let prompt = config.prompt.as_deref().unwrap_or(OCR_PAGE_PROMPT);
                    api::process_page(client, page_num, &url, prompt, config).await
                }
                Err(e) => encode_failure(page_num, e),
            },
        }
    }

    fn supports_prior_page(self) -> bool {
        matches!(self, PageSink::Provider(_))
    }
}

fn encode_failure(page_num: usize, e: image::ImageError) -> PageResult {
    PageResult::failed(
        page_num,
        0,
        0,
        crate::error::PageError::RenderFailed {
            page: page_num,
            detail: format!("Image encoding failed: {}", e),
        },
    )
}

async fn convert_with_vlm(
    pdf_path: &Path,
    config: &BatchConfig,
    sink: PageSink<'_>,
) -> Result<RenderedDocument, Pdf2MdError> {
    let total_start = Instant::now();

    let metadata = render::extract_metadata(pdf_path, config.password.as_deref()).await?;
    let total_pages = metadata.page_count;
    let page_indices = config.pages.select(total_pages)?;

    let render_start = Instant::now();
    let rendered = render::render_pages(pdf_path, config, &page_indices).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} pages in {}ms",
        rendered.len(),
        render_duration_ms
    );

    let llm_start = Instant::now();
    let results = if config.maintain_format && sink.supports_prior_page() {
        process_sequential(sink, &rendered, config).await
    } else {
        process_concurrent(sink, &rendered, config).await
    };
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let mut pages: Vec<PageResult> = results
        .into_iter()
        .map(|mut pr| {
            if pr.error.is_none() {
                pr.markdown = postprocess::clean_markdown(&pr.markdown);
            }
            pr
        })
        .collect();
    pages.sort_by_key(|p| p.page_num);

    let processed = pages.iter().filter(|p| p.error.is_none()).count();
    let failed = pages.len() - processed;
    if processed == 0 {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(Pdf2MdError::AllPagesFailed {
            total: pages.len(),
            retries: config.max_retries,
            first_error,
        });
    }
    if failed > 0 {
        warn!(
            "{}: {} of {} pages failed and are left out",
            pdf_path.display(),
            failed,
            pages.len()
        );
    }

    let good: Vec<&PageResult> = pages.iter().filter(|p| p.error.is_none()).collect();
    let markdown = join_pages(
        good.iter().map(|p| (p.page_num, p.markdown.as_str())),
        config,
    );
    let content_list = good
        .iter()
        .map(|p| ContentBlock {
            block_type: BlockType::Text,
            text: Some(p.markdown.trim_end().to_string()),
            img_path: None,
            page_idx: p.page_num - 1,
        })
        .collect();

    let stats = ConversionStats {
        backend: match sink {
            PageSink::Provider(_) => BackendKind::Vlm.as_str().to_string(),
            PageSink::Api(_) => BackendKind::Api.as_str().to_string(),
        },
        total_pages,
        processed_pages: processed,
        failed_pages: failed,
        total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms,
        llm_duration_ms,
    };
    info!(
        "{}: {}/{} pages, {} output tokens, {}ms",
        pdf_path.display(),
        processed,
        pages.len(),
        stats.total_output_tokens,
        stats.total_duration_ms
    );

    Ok(RenderedDocument {
        markdown,
        images: Vec::new(),
        content_list,
        metadata,
        pages,
        stats,
    })
}

async fn process_concurrent(
    sink: PageSink<'_>,
    pages: &[(usize, image::DynamicImage)],
    config: &BatchConfig,
) -> Vec<PageResult> {
    stream::iter(
        pages
            .iter()
            .map(|(idx, img)| sink.process(*idx, img, None, config)),
    )
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await
}

/// Pages in order, each seeing the previous page's markdown.
async fn process_sequential(
    sink: PageSink<'_>,
    pages: &[(usize, image::DynamicImage)],
    config: &BatchConfig,
) -> Vec<PageResult> {
    let mut results = Vec::with_capacity(pages.len());
    let mut prior: Option<String> = None;

    for (idx, img) in pages {
        let result = sink.process(*idx, img, prior.as_deref(), config).await;
        if result.error.is_none() {
            prior = Some(result.markdown.clone());
        }
        results.push(result);
    }

    results
}

/// Join page markdown with the configured separator.
fn join_pages<'a>(
    pages: impl Iterator<Item = (usize, &'a str)>,
    config: &BatchConfig,
) -> String {
    let mut out = String::new();
    for (i, (page_num, md)) in pages.filter(|(_, md)| !md.trim().is_empty()).enumerate() {
        if i > 0 {
            out.push_str(&config.page_separator.render(page_num));
        }
        out.push_str(md.trim_end());
    }
    out.push('\n');
    out
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2MdError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2MdError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the provider, from most to least specific:
///
/// 1. a pre-built `config.provider`
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. `GEMINI_API_KEY` (the batch scripts were written against Gemini)
/// 5. whatever `ProviderFactory::from_env` detects
pub fn resolve_provider(config: &BatchConfig) -> Result<Arc<dyn LLMProvider>, Pdf2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config
            .model
            .as_deref()
            .unwrap_or(crate::proxy::DEFAULT_PROXY_MODEL);
        return create_vision_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2MdError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be detected from the environment.\n\
                 Set GEMINI_API_KEY or OPENAI_API_KEY, or pass --provider.\n\
                 Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSeparator;

    #[test]
    fn join_pages_skips_empty_and_uses_separator() {
        let config = BatchConfig::builder()
            .page_separator(PageSeparator::Comment)
            .build()
            .unwrap();
        let pages = vec![(1, "# One\n"), (2, "  \n"), (3, "Three")];
        let out = join_pages(pages.into_iter(), &config);
        assert_eq!(out, "# One\n\n<!-- page 3 -->\n\nThree\n");
    }

    #[test]
    fn join_pages_of_nothing_is_a_bare_newline() {
        let out = join_pages(std::iter::empty(), &BatchConfig::default());
        assert_eq!(out, "\n");
    }

    #[test]
    fn join_pages_default_separator() {
        let config = BatchConfig::default();
        let out = join_pages(vec![(1, "a"), (2, "b")].into_iter(), &config);
        assert_eq!(out, "a\n\nb\n");
    }

    #[tokio::test]
    async fn text_backend_needs_no_setup() {
        let backend = Backend::from_config(&BatchConfig::default()).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Text);
        assert_eq!(backend.describe(), "text layer (PDFium)");
    }

    #[tokio::test]
    async fn api_backend_fails_fast_when_server_is_down() {
        let config = BatchConfig::builder()
            .backend(BackendKind::Api)
            .api_url("http://127.0.0.1:9/v1/chat/completions")
            .build()
            .unwrap();
        let err = Backend::from_config(&config).await.err().unwrap();
        assert!(matches!(err, Pdf2MdError::ServerUnreachable { .. }));
    }
}
