use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

const EMAIL_API_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send(&self, api_key: &str, message: &EmailMessage) -> Result<String, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestEmailClient {
    client: Client,
}

#[derive(Debug, serde::Serialize)]
struct SendEmailPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

impl ReqwestEmailClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl EmailClient for ReqwestEmailClient {
    async fn send(&self, api_key: &str, message: &EmailMessage) -> Result<String, InfraError> {
        if api_key.trim().is_empty() {
            return Err(InfraError::Email("api key must not be empty".to_string()));
        }
        if message.to.trim().is_empty() {
            return Err(InfraError::Email(
                "recipient address must not be empty".to_string(),
            ));
        }

        let payload = SendEmailPayload {
            from: &message.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
        };

        let response = self
            .client
            .post(EMAIL_API_ENDPOINT)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                InfraError::Email(format!("network error while sending email: {error}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Email(format!("failed reading email response: {error}")))?;

        if !status.is_success() {
            let message = if body.trim().is_empty() {
                format!("email api error: http {}", status.as_u16())
            } else {
                format!("email api error: http {}; body={body}", status.as_u16())
            };
            return Err(InfraError::Email(message));
        }

        let parsed: SendEmailResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Email(format!("invalid email payload: {error}; body={body}"))
        })?;
        parsed
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| InfraError::Email("email response did not include id".to_string()))
    }
}
