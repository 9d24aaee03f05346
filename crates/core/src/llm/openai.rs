use crate::config::OpenAiSettings;
use crate::llm::error::ProviderError;
use crate::llm::{GenerationRequest, ProviderAdapter, ProviderReply};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER_NAME: &str = "openai";

/// Hosted chat-completion adapter. Available whenever a credential is configured.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiAdapter {
    pub fn from_settings(settings: &OpenAiSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build OpenAI http client")?;

        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: settings.timeout,
        })
    }

    async fn chat_completion(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ProviderError::Unavailable)?;

        let req = ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&req)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let status = res.status();
        let text = res.text().await.map_err(ProviderError::transport)?;
        if !status.is_success() {
            return Err(ProviderError::Http { status, body: text });
        }

        let parsed = serde_json::from_str::<ChatCompletionResponse>(&text)
            .map_err(|e| ProviderError::Decode(format!("{e}: {text}")))?;
        Self::first_choice_text(parsed)
    }

    fn first_choice_text(res: ChatCompletionResponse) -> Result<String, ProviderError> {
        res.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ProviderError::Decode("response has no choice content".to_string()))
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiAdapter {
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
        self.api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<ProviderReply, ProviderError> {
        tracing::info!(
            customer = %request.context.customer.code,
            model = %self.model,
            "requesting OpenAI chat completion"
        );
        let text = self.chat_completion(request.prompt).await?;
        Ok(ProviderReply::Text(text))
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::tests::context;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn adapter(base_url: String, api_key: Option<&str>) -> OpenAiAdapter {
        OpenAiAdapter::from_settings(&OpenAiSettings {
            api_key: api_key.map(str::to_string),
            base_url,
            model: "gpt-test".to_string(),
            temperature: 0.3,
            max_tokens: 256,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn first_choice_text_reads_message_content() {
        let res: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}]
        }))
        .unwrap();
        assert_eq!(OpenAiAdapter::first_choice_text(res).unwrap(), "hello");
    }

    #[test]
    fn empty_choices_is_a_decode_error() {
        let res: ChatCompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            OpenAiAdapter::first_choice_text(res),
            Err(ProviderError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn unavailable_without_credential() {
        let a = adapter("http://127.0.0.1:9".to_string(), Some("  "));
        assert!(!a.is_available().await);
        let ctx = context(1.0, 0.0);
        let err = a
            .generate(GenerationRequest {
                context: &ctx,
                prompt: "p",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable));
    }

    #[tokio::test]
    async fn posts_prompt_with_bearer_credential() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer sk-test")
                );
                assert_eq!(body["model"], "gpt-test");
                assert_eq!(body["max_tokens"], 256);
                assert_eq!(body["messages"][0]["role"], "user");
                assert_eq!(body["messages"][0]["content"], "price this");
                Json(json!({
                    "choices": [{"message": {"content": "{\"recommendedSpread\": 0.2}"}}]
                }))
            }),
        );
        let a = adapter(serve(router).await, Some("sk-test"));
        let ctx = context(1.0, 0.0);

        let reply = a
            .generate(GenerationRequest {
                context: &ctx,
                prompt: "price this",
            })
            .await
            .unwrap();
        match reply {
            ProviderReply::Text(t) => assert_eq!(t, "{\"recommendedSpread\": 0.2}"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let a = adapter(serve(router).await, Some("sk-test"));
        let ctx = context(1.0, 0.0);

        let err = a
            .generate(GenerationRequest {
                context: &ctx,
                prompt: "p",
            })
            .await
            .unwrap_err();
        match err {
            ProviderError::Http { status, body } => {
                assert_eq!(status.as_u16(), 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
