use crate::config::LocalSettings;
use crate::llm::error::ProviderError;
use crate::llm::{GenerationRequest, ProviderAdapter, ProviderReply};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER_NAME: &str = "local";
const GENERATE_PATH: &str = "/api/generate";
const MODELS_PATH: &str = "/api/tags";

/// Self-hosted inference server (Ollama-compatible API). No credential.
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    http: reqwest::Client,
    base_url: String,
    model: String,
    options: SamplingOptions,
    timeout: Duration,
}

impl LocalAdapter {
    pub fn from_settings(settings: &LocalSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build local LLM http client")?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            options: SamplingOptions {
                temperature: settings.temperature,
                top_p: settings.top_p,
                top_k: settings.top_k,
            },
            timeout: settings.timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.options,
        };

        let res = self
            .http
            .post(self.url(GENERATE_PATH))
            .json(&req)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let status = res.status();
        let text = res.text().await.map_err(ProviderError::transport)?;
        if !status.is_success() {
            return Err(ProviderError::Http { status, body: text });
        }

        let parsed = serde_json::from_str::<GenerateResponse>(&text)
            .map_err(|e| ProviderError::Decode(format!("{e}: {text}")))?;
        if parsed.response.trim().is_empty() {
            return Err(ProviderError::Decode("empty response field".to_string()));
        }
        Ok(parsed.response)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for LocalAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn is_available(&self) -> bool {
        match self.http.get(self.url(MODELS_PATH)).send().await {
            Ok(res) => res.status().is_success(),
            Err(err) => {
                tracing::debug!(base_url = %self.base_url, error = %err, "local LLM not reachable");
                false
            }
        }
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<ProviderReply, ProviderError> {
        tracing::info!(
            customer = %request.context.customer.code,
            model = %self.model,
            "requesting local LLM generation"
        );
        let text = self.generate_text(request.prompt).await?;
        Ok(ProviderReply::Text(text))
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct SamplingOptions {
    temperature: f64,
    top_p: f64,
    top_k: u32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::tests::context;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn adapter(base_url: String) -> LocalAdapter {
        LocalAdapter::from_settings(&LocalSettings {
            base_url,
            model: "llama-test".to_string(),
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn available_when_models_listing_succeeds() {
        let router = Router::new().route("/api/tags", get(|| async { Json(json!({"models": []})) }));
        assert!(adapter(serve(router).await).is_available().await);
    }

    #[tokio::test]
    async fn unavailable_when_models_listing_fails() {
        let router = Router::new().route(
            "/api/tags",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        assert!(!adapter(serve(router).await).is_available().await);
    }

    #[tokio::test]
    async fn unavailable_when_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(!adapter(format!("http://{addr}")).is_available().await);
    }

    #[tokio::test]
    async fn generate_sends_non_streaming_request_with_sampling_options() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "llama-test");
                assert_eq!(body["stream"], false);
                assert_eq!(body["options"]["top_k"], 40);
                assert_eq!(body["options"]["top_p"], 0.9);
                assert_eq!(body["prompt"], "price this");
                Json(json!({"model": "llama-test", "response": "```json\n{}\n```", "done": true}))
            }),
        );
        let a = adapter(serve(router).await);
        let ctx = context(1.0, 0.0);
        let reply = a
            .generate(GenerationRequest {
                context: &ctx,
                prompt: "price this",
            })
            .await
            .unwrap();
        assert!(matches!(reply, ProviderReply::Text(t) if t.contains("```json")));
    }

    #[tokio::test]
    async fn missing_response_field_is_decode_error() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { Json(json!({"done": true})) }),
        );
        let a = adapter(serve(router).await);
        let ctx = context(1.0, 0.0);
        let err = a
            .generate(GenerationRequest {
                context: &ctx,
                prompt: "p",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
