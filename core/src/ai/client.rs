use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};

use super::cache::ResponseCache;
use super::retry::RetryPolicy;
use super::stream::{provider_error_message, ChatStream};
use super::types::{ChatMessage, ChatRequest, ModelInfo};
use crate::config::AiConfig;
use crate::error::AiServiceError;

const BODY_PREVIEW_LIMIT: usize = 500;

/// Chat completion provider. Implemented by [`AiServiceClient`]; tests and
/// offline runs substitute scripted providers.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<String, AiServiceError>;

    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, AiServiceError>;
}

/// OpenAI-compatible chat completion client (OpenRouter by default).
pub struct AiServiceClient {
    http: Client,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: Map<String, Value>,
    timeout: Duration,
    site_url: Option<String>,
    app_name: Option<String>,
    retry: RetryPolicy,
    cache: Option<ResponseCache>,
}

impl AiServiceClient {
    pub fn from_config(cfg: &AiConfig) -> Result<Self, AiServiceError> {
        // No overall client timeout: it would also cut long streams.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(AiServiceError::from_reqwest)?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            default_model: cfg.model.clone(),
            default_params: cfg.params.clone(),
            timeout: cfg.timeout(),
            site_url: cfg.site_url.clone(),
            app_name: cfg.app_name.clone(),
            retry: RetryPolicy::from_config(&cfg.retry),
            cache: ResponseCache::from_config(&cfg.cache),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Blocking completion: returns the full response text.
    pub async fn call_chat_completion(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &Map<String, Value>,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String, AiServiceError> {
        let request = self.request_for(prompt, model, params, system_prompt, history);
        self.complete(&request).await
    }

    /// Streaming completion: returns the chunk stream once the provider has
    /// accepted the request.
    pub async fn stream_chat_completion(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &Map<String, Value>,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<ChatStream, AiServiceError> {
        let request = self.request_for(prompt, model, params, system_prompt, history);
        self.stream(&request).await
    }

    /// Request params are layered over the configured defaults.
    fn request_for(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &Map<String, Value>,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> ChatRequest {
        let mut merged = self.default_params.clone();
        for (k, v) in params {
            merged.insert(k.clone(), v.clone());
        }
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str());
        ChatRequest::build(model, prompt, system_prompt, history, merged)
    }

    /// `GET {base_url}/models`
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, AiServiceError> {
        let url = format!("{}/models", self.base_url);
        let value: Value = self
            .retry
            .run("list_models", || async {
                let resp = self
                    .authorized(self.http.get(&url))?
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(AiServiceError::from_reqwest)?;
                let resp = check_status(resp).await?;
                resp.json::<Value>()
                    .await
                    .map_err(AiServiceError::from_reqwest)
            })
            .await?;

        let models = value
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| AiServiceError::provider(None, "models response has no data array"))?
            .iter()
            .filter_map(|m| serde_json::from_value::<ModelInfo>(m.clone()).ok())
            .collect();
        Ok(models)
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, AiServiceError> {
        if self.api_key.trim().is_empty() {
            return Err(AiServiceError::Auth(
                "no API key configured (set OPENROUTER_API_KEY)".to_string(),
            ));
        }
        let mut req = req.bearer_auth(&self.api_key);
        if let Some(site) = &self.site_url {
            req = req.header("HTTP-Referer", site);
        }
        if let Some(app) = &self.app_name {
            req = req.header("X-Title", app);
        }
        Ok(req)
    }

    async fn send_chat(&self, payload: &Value, stream: bool) -> Result<Response, AiServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.authorized(self.http.post(&url))?.json(payload);
        if !stream {
            req = req.timeout(self.timeout);
        }
        let resp = req.send().await.map_err(AiServiceError::from_reqwest)?;
        check_status(resp).await
    }
}

#[async_trait]
impl ChatCompletion for AiServiceClient {
    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, AiServiceError> {
        let payload = request.to_payload(false);

        let cache_key = self.cache.as_ref().map(|_| ResponseCache::key_for(&payload));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(hit) = cache.get(key) {
                tracing::debug!(model = %request.model, "AI response served from cache");
                return Ok(hit);
            }
        }

        tracing::debug!(model = %request.model, messages = request.messages.len(), "chat completion");
        let text = self
            .retry
            .run("chat_completion", || async {
                let resp = self.send_chat(&payload, false).await?;
                let value: Value = resp.json().await.map_err(AiServiceError::from_reqwest)?;
                extract_completion_text(&value)
            })
            .await?;

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.insert(key, text.clone());
        }
        Ok(text)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, AiServiceError> {
        let payload = request.to_payload(true);
        tracing::debug!(model = %request.model, messages = request.messages.len(), "streaming chat completion");

        // Only establishing the stream is retried; a stream is never resumed.
        let resp = self
            .retry
            .run("chat_stream", || self.send_chat(&payload, true))
            .await?;
        Ok(ChatStream::from_response(resp))
    }
}

/// Map a non-2xx response onto the error taxonomy.
async fn check_status(resp: Response) -> Result<Response, AiServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = parse_retry_after(resp.headers());
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| provider_error_message(&v))
        .unwrap_or_else(|| preview_body(&body));

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AiServiceError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => AiServiceError::RateLimit {
            retry_after,
            message,
        },
        _ => AiServiceError::provider(Some(status.as_u16()), message),
    })
}

/// `Retry-After` as delta-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        // Out-of-range hints are treated as "very long"; the retry policy caps them.
        return (secs >= 0.0).then(|| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX));
    }
    let at = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let wait = at.signed_duration_since(chrono::Utc::now());
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

fn extract_completion_text(value: &Value) -> Result<String, AiServiceError> {
    if let Some(message) = provider_error_message(value) {
        return Err(AiServiceError::provider(None, message));
    }
    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AiServiceError::provider(
                None,
                format!(
                    "provider returned no completion content (response: {})",
                    preview_body(&value.to_string())
                ),
            )
        })
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    if trimmed.chars().count() <= BODY_PREVIEW_LIMIT {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiConfig;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Instant;

    fn client_for(server: &Server) -> AiServiceClient {
        let cfg = AiConfig {
            base_url: server.url(),
            api_key: "test-key".to_string(),
            model: "test/model".to_string(),
            ..AiConfig::default()
        };
        AiServiceClient::from_config(&cfg).unwrap()
    }

    fn completion_body(text: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]}).to_string()
    }

    #[tokio::test]
    async fn test_blocking_completion_sends_messages() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_header("x-title", "AIWhisperer")
            .match_body(Matcher::PartialJson(json!({
                "model": "test/model",
                "stream": false,
                "temperature": 0.3,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "earlier"},
                    {"role": "assistant", "content": "reply"},
                    {"role": "user", "content": "now"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("done"))
            .create_async()
            .await;

        let client = client_for(&server);
        let mut params = Map::new();
        params.insert("temperature".into(), json!(0.3));
        let history = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];
        let text = client
            .call_chat_completion("now", None, &params, Some("sys"), &history)
            .await
            .unwrap();

        assert_eq!(text, "done");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let mut server = Server::new_async().await;
        let limited = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "2")
            .with_body(r#"{"error":{"message":"slow down"}}"#)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion_body("second time lucky"))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let started = Instant::now();
        let text = client
            .call_chat_completion("hi", None, &Map::new(), None, &[])
            .await
            .unwrap();

        assert_eq!(text, "second time lucky");
        assert!(started.elapsed() >= Duration::from_millis(1900));
        limited.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"invalid key"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server)
            .call_chat_completion("hi", None, &Map::new(), None, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, AiServiceError::Auth(ref msg) if msg == "invalid key"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_provider_error_surfaces_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body("bad request")
            .create_async()
            .await;

        let err = client_for(&server)
            .call_chat_completion("hi", None, &Map::new(), None, &[])
            .await
            .unwrap_err();
        match err {
            AiServiceError::ProviderApi { status, message } => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "bad request");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let server = Server::new_async().await;
        let cfg = AiConfig {
            base_url: server.url(),
            ..AiConfig::default()
        };
        let err = AiServiceClient::from_config(&cfg)
            .unwrap()
            .call_chat_completion("hi", None, &Map::new(), None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AiServiceError::Auth(_)));
    }

    #[tokio::test]
    async fn test_streaming_assembles_text() {
        let mut server = Server::new_async().await;
        let body = [
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "",
            "data: [DONE]",
            "",
            "",
        ]
        .join("\n");
        let _m = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let stream = client_for(&server)
            .stream_chat_completion("hi", None, &Map::new(), None, &[])
            .await
            .unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_cache_serves_repeated_requests() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion_body("cached"))
            .expect(1)
            .create_async()
            .await;

        let mut cfg = AiConfig {
            base_url: server.url(),
            api_key: "k".into(),
            ..AiConfig::default()
        };
        cfg.cache.enabled = true;
        let client = AiServiceClient::from_config(&cfg).unwrap();

        for _ in 0..2 {
            let text = client
                .call_chat_completion("same", None, &Map::new(), None, &[])
                .await
                .unwrap();
            assert_eq!(text, "cached");
        }
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"a/b","name":"A B"},{"id":"c/d"}]}"#)
            .create_async()
            .await;

        let models = client_for(&server).list_models().await.unwrap();
        assert_eq!(
            models,
            vec![
                ModelInfo {
                    id: "a/b".into(),
                    name: Some("A B".into())
                },
                ModelInfo {
                    id: "c/d".into(),
                    name: None
                },
            ]
        );
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "2".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_parse_retry_after_oversized_and_date() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "99999999999999999999999".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::MAX));
        headers.insert(RETRY_AFTER, "-3".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        let at = chrono::Utc::now() + chrono::Duration::seconds(30);
        headers.insert(RETRY_AFTER, at.to_rfc2822().parse().unwrap());
        let wait = parse_retry_after(&headers).unwrap();
        assert!(wait > Duration::from_secs(25) && wait <= Duration::from_secs(30));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_oversized_retry_after_is_capped() {
        let mut server = Server::new_async().await;
        let limited = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "99999999999999999999999")
            .with_body(r#"{"error":{"message":"slow down"}}"#)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion_body("recovered"))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server).with_retry_policy(RetryPolicy {
            max_attempts: 2,
            max_retry_after: Duration::from_millis(20),
            ..RetryPolicy::default()
        });
        let text = client
            .call_chat_completion("hi", None, &Map::new(), None, &[])
            .await
            .unwrap();

        assert_eq!(text, "recovered");
        limited.assert_async().await;
        ok.assert_async().await;
    }
}
