use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

const COMPLETIONS_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<String, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestCompletionClient {
    client: Client,
}

#[derive(Debug, serde::Serialize)]
struct ChatMessagePayload<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct ChatCompletionPayload<'a> {
    model: &'a str,
    messages: Vec<ChatMessagePayload<'a>>,
    temperature: f32,
}

#[derive(Debug, serde::Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, serde::Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, serde::Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ReqwestCompletionClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn completion_http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("completion api error: http {}", status.as_u16())
        } else {
            format!(
                "completion api error: http {}; body={body}",
                status.as_u16()
            )
        };
        InfraError::Completion(message)
    }
}

#[async_trait]
impl CompletionClient for ReqwestCompletionClient {
    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<String, InfraError> {
        if api_key.trim().is_empty() {
            return Err(InfraError::Completion(
                "api key must not be empty".to_string(),
            ));
        }
        if request.model.trim().is_empty() {
            return Err(InfraError::Completion("model must not be empty".to_string()));
        }

        let payload = ChatCompletionPayload {
            model: &request.model,
            messages: vec![
                ChatMessagePayload {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessagePayload {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(COMPLETIONS_ENDPOINT)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                InfraError::Completion(format!("network error while requesting completion: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Completion(format!("failed reading completion response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::completion_http_error(status, &body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Completion(format!("invalid completion payload: {error}; body={body}"))
        })?;

        parsed
            .choices
            .unwrap_or_default()
            .into_iter()
            .filter_map(|choice| choice.message.and_then(|message| message.content))
            .find(|content| !content.trim().is_empty())
            .ok_or_else(|| InfraError::Completion("completion response was empty".to_string()))
    }
}
