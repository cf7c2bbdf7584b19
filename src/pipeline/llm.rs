//! VLM interaction through an `edgequake_llm` provider.
//!
//! Prompt wording lives in [`crate::prompts`]; this module only builds the
//! messages and drives retries.
//!
//! ## Retry Strategy
//!
//! 429 / 503 responses are frequent under concurrent load. The delay doubles
//! per attempt (`retry_backoff_ms * 2^(attempt-1)`): with 500 ms and 3
//! retries that is 500 ms → 1 s → 2 s. The delay saturates instead of
//! overflowing when a config skips the builder's retry cap.

use crate::config::BatchConfig;
use crate::error::PageError;
use crate::output::PageResult;
use crate::prompts::{maintain_format_context, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Convert a single rasterised page into Markdown via the provider.
///
/// Messages, in order: the system prompt, the previous page as format
/// context (`maintain_format` only), then the page image with the optional
/// user prompt.
///
/// Never returns an error: a page that fails every attempt comes back with
/// `error` set so one bad page does not sink the document.
pub async fn process_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    image_data: ImageData,
    prior_page: Option<&str>,
    config: &BatchConfig,
) -> PageResult {
    let start = Instant::now();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let mut messages = vec![ChatMessage::system(system_prompt)];

    if config.maintain_format {
        if let Some(prior) = prior_page.filter(|p| !p.is_empty()) {
            messages.push(ChatMessage::system(maintain_format_context(prior)));
        }
    }

    messages.push(ChatMessage::user_with_images(
        config.prompt.as_deref().unwrap_or(""),
        vec![image_data],
    ));

    let options = build_options(config);
    let limit = Duration::from_secs(config.api_timeout_secs.max(1));
    let mut last_err = PageError::EmptyResponse { page: page_num };

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(limit, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) if response.content.trim().is_empty() => {
                warn!("Page {}: attempt {} returned no text", page_num, attempt + 1);
                last_err = PageError::EmptyResponse { page: page_num };
            }
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {:?}",
                    page_num, response.prompt_tokens, response.completion_tokens, duration
                );

                return PageResult {
                    page_num,
                    markdown: response.content,
                    input_tokens: response.prompt_tokens,
                    output_tokens: response.completion_tokens,
                    duration_ms: duration.as_millis() as u64,
                    retries: retry_count(attempt),
                    error: None,
                };
            }
            Ok(Err(e)) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = PageError::LlmFailed {
                    page: page_num,
                    retries: retry_count(attempt),
                    detail: e.to_string(),
                };
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page_num,
                    attempt + 1,
                    limit.as_secs()
                );
                last_err = PageError::Timeout {
                    page: page_num,
                    secs: limit.as_secs(),
                };
            }
        }
    }

    PageResult::failed(
        page_num,
        start.elapsed().as_millis() as u64,
        retry_count(config.max_retries),
        last_err,
    )
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
pub(crate) fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

/// Retry count as stored on a [`PageResult`].
pub(crate) fn retry_count(attempts: u32) -> u8 {
    u8::try_from(attempts).unwrap_or(u8::MAX)
}

fn build_options(config: &BatchConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
