//! VLM interaction through an OpenAI-compatible chat-completions endpoint.
//!
//! Used for LM Studio, vLLM, and the in-process proxy. Each page is sent as
//! one user message with a text part (the prompt) and an `image_url` part
//! holding the page as a `data:` URL.

use crate::config::BatchConfig;
use crate::error::{PageError, Pdf2MdError};
use crate::output::PageResult;
use crate::pipeline::llm::{backoff_ms, retry_count};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// HTTP client bound to one chat-completions URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(config: &BatchConfig) -> Result<Self, Pdf2MdError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs.max(1)))
            .build()
            .map_err(|e| Pdf2MdError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.api_url.clone(),
            model: config.effective_model().to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str, image_url: &str, config: &BatchConfig) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        })
    }

    async fn send_once(
        &self,
        body: &serde_json::Value,
        page_num: usize,
        timeout_secs: u64,
    ) -> Result<(String, Usage), PageError> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| classify(e, page_num, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PageError::LlmFailed {
                page: page_num,
                retries: 0,
                detail: format!("HTTP {}: {}", status.as_u16(), truncate(&text, 300)),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| classify(e, page_num, timeout_secs))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(PageError::EmptyResponse { page: page_num })?;

        Ok((content, parsed.usage.unwrap_or_default()))
    }
}

fn classify(e: reqwest::Error, page: usize, secs: u64) -> PageError {
    if e.is_timeout() {
        PageError::Timeout { page, secs }
    } else {
        PageError::LlmFailed {
            page,
            retries: 0,
            detail: e.to_string(),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Convert one page image (already a `data:` URL) into Markdown.
///
/// Same contract as [`crate::pipeline::llm::process_page`]: failures end up
/// in the returned `PageResult`, never as an `Err`.
pub async fn process_page(
    client: &ApiClient,
    page_num: usize,
    image_url: &str,
    prompt: &str,
    config: &BatchConfig,
) -> PageResult {
    let start = Instant::now();
    let body = client.request_body(prompt, image_url, config);
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

        match client.send_once(&body, page_num, config.api_timeout_secs).await {
            Ok((markdown, usage)) => {
                let duration = start.elapsed();
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {:?}",
                    page_num, usage.prompt_tokens, usage.completion_tokens, duration
                );
                return PageResult {
                    page_num,
                    markdown,
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                    duration_ms: duration.as_millis() as u64,
                    retries: retry_count(attempt),
                    error: None,
                };
            }
            Err(e) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = match e {
                    PageError::LlmFailed { page, detail, .. } => PageError::LlmFailed {
                        page,
                        retries: retry_count(attempt),
                        detail,
                    },
                    other => other,
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

/// `GET <base_url>/v1/models`, returning the model ids the server offers.
///
/// Fails fast with [`Pdf2MdError::ServerUnreachable`] so a batch does not
/// spend five minutes per page timing out against a server that is down.
pub async fn check_connection(base_url: &str) -> Result<Vec<String>, Pdf2MdError> {
    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));
    let client = Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| Pdf2MdError::Internal(format!("HTTP client: {}", e)))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Pdf2MdError::ServerUnreachable {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(Pdf2MdError::ServerStatus {
            url,
            status: response.status().as_u16(),
        });
    }

    let models: ModelList = response.json().await.unwrap_or(ModelList { data: Vec::new() });
    let ids: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
    info!("Connected to {} ({} models available)", url, ids.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let config = BatchConfig::builder()
            .backend(crate::config::BackendKind::Api)
            .max_tokens(1024)
            .build()
            .unwrap();
        let client = ApiClient::new(&config).unwrap();
        let body = client.request_body("OCR the full page to markdown.", "data:image/png;base64,AAAA", &config);

        assert_eq!(body["model"], "internvl3-9b");
        assert_eq!(body["max_tokens"], 1024);
        let content = &body["messages"][0]["content"];
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn completion_response_tolerates_missing_usage() {
        let parsed: CompletionResponse =
            serde_json::from_str(r##"{"choices":[{"message":{"role":"assistant","content":"# Hi"}}]}"##)
                .unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("# Hi"));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[tokio::test]
    async fn check_connection_reports_unreachable_server() {
        // Port 9 (discard) is closed on test machines.
        let err = check_connection("http://127.0.0.1:9").await.unwrap_err();
        assert!(matches!(err, Pdf2MdError::ServerUnreachable { .. }));
    }
}
