use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

const BILLING_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingCustomer {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscription {
    pub tier: String,
    pub current_period_end: Option<String>,
}

#[async_trait]
pub trait BillingClient: Send + Sync {
    async fn find_customer_by_email(
        &self,
        api_key: &str,
        email: &str,
    ) -> Result<Option<BillingCustomer>, InfraError>;

    async fn find_active_subscription(
        &self,
        api_key: &str,
        customer_id: &str,
    ) -> Result<Option<ActiveSubscription>, InfraError>;

    async fn create_portal_session(
        &self,
        api_key: &str,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestBillingClient {
    client: Client,
}

#[derive(Debug, serde::Deserialize)]
struct CustomerListPayload {
    data: Option<Vec<CustomerPayload>>,
}

#[derive(Debug, serde::Deserialize)]
struct CustomerPayload {
    id: String,
    email: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct SubscriptionListPayload {
    data: Option<Vec<SubscriptionPayload>>,
}

#[derive(Debug, serde::Deserialize)]
struct SubscriptionPayload {
    current_period_end: Option<i64>,
    plan: Option<PlanPayload>,
}

#[derive(Debug, serde::Deserialize)]
struct PlanPayload {
    nickname: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct PortalSessionPayload {
    url: Option<String>,
}

impl ReqwestBillingClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn billing_http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("billing api error: http {}", status.as_u16())
        } else {
            format!("billing api error: http {}; body={body}", status.as_u16())
        };
        InfraError::Billing(message)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        api_key: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, InfraError> {
        let response = self
            .client
            .get(format!("{BILLING_API_BASE}/{path}"))
            .query(query)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|error| {
                InfraError::Billing(format!("network error while calling billing api: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Billing(format!("failed reading billing response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::billing_http_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|error| {
            InfraError::Billing(format!("invalid billing payload: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl BillingClient for ReqwestBillingClient {
    async fn find_customer_by_email(
        &self,
        api_key: &str,
        email: &str,
    ) -> Result<Option<BillingCustomer>, InfraError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(InfraError::Billing("email must not be empty".to_string()));
        }

        let parsed: CustomerListPayload = self
            .get_json(api_key, "customers", &[("email", email), ("limit", "1")])
            .await?;
        Ok(parsed
            .data
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|customer| BillingCustomer {
                id: customer.id,
                email: customer.email,
            }))
    }

    async fn find_active_subscription(
        &self,
        api_key: &str,
        customer_id: &str,
    ) -> Result<Option<ActiveSubscription>, InfraError> {
        let customer_id = customer_id.trim();
        if customer_id.is_empty() {
            return Err(InfraError::Billing(
                "customer id must not be empty".to_string(),
            ));
        }

        let parsed: SubscriptionListPayload = self
            .get_json(
                api_key,
                "subscriptions",
                &[
                    ("customer", customer_id),
                    ("status", "active"),
                    ("limit", "1"),
                ],
            )
            .await?;
        Ok(parsed
            .data
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|subscription| ActiveSubscription {
                tier: subscription
                    .plan
                    .and_then(|plan| plan.nickname)
                    .map(|nickname| nickname.trim().to_string())
                    .filter(|nickname| !nickname.is_empty())
                    .unwrap_or_else(|| "premium".to_string()),
                current_period_end: subscription
                    .current_period_end
                    .and_then(|seconds| chrono::DateTime::from_timestamp(seconds, 0))
                    .map(|end| end.to_rfc3339()),
            }))
    }

    async fn create_portal_session(
        &self,
        api_key: &str,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, InfraError> {
        let customer_id = customer_id.trim();
        if customer_id.is_empty() {
            return Err(InfraError::Billing(
                "customer id must not be empty".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{BILLING_API_BASE}/billing_portal/sessions"))
            .bearer_auth(api_key)
            .form(&[("customer", customer_id), ("return_url", return_url)])
            .send()
            .await
            .map_err(|error| {
                InfraError::Billing(format!("network error while creating portal session: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Billing(format!("failed reading portal session response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::billing_http_error(status, &body));
        }

        let parsed: PortalSessionPayload = serde_json::from_str(&body).map_err(|error| {
            InfraError::Billing(format!("invalid portal session payload: {error}; body={body}"))
        })?;
        parsed
            .url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                InfraError::Billing("portal session response did not include url".to_string())
            })
    }
}
