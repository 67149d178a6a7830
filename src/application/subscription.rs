use crate::domain::models::SubscriptionInfo;
use crate::infrastructure::billing_client::BillingClient;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::trial_repository::{TrialRecord, TrialRepository};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

const TRIAL_DAYS: i64 = 5;
const DEFAULT_OVERRIDE_TIER: &str = "premium";

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct SubscriptionService<T, B>
where
    T: TrialRepository,
    B: BillingClient,
{
    trial_repository: Arc<T>,
    billing_client: Arc<B>,
    now_provider: NowProvider,
}

impl<T, B> SubscriptionService<T, B>
where
    T: TrialRepository,
    B: BillingClient,
{
    pub fn new(trial_repository: Arc<T>, billing_client: Arc<B>) -> Self {
        Self {
            trial_repository,
            billing_client,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    // Loads or creates the 5-day trial record for the user, then layers a
    // stored manual override and finally the live billing state on top.
    // Creation is idempotent: the second call reads the window the first one
    // wrote.
    pub async fn check(
        &self,
        billing_api_key: Option<&str>,
        user_id: &str,
        email: &str,
    ) -> Result<SubscriptionInfo, InfraError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(InfraError::InvalidConfig(
                "user_id must not be empty".to_string(),
            ));
        }

        let now = (self.now_provider)();
        let email = email.trim();
        let candidate = TrialRecord {
            user_id: user_id.to_string(),
            email: (!email.is_empty()).then(|| email.to_string()),
            trial_start: now,
            trial_end: now + Duration::days(TRIAL_DAYS),
            override_subscribed: false,
            override_tier: None,
            override_end: None,
            billing_customer_id: None,
        };
        let stored = self.trial_repository.create_if_missing(&candidate)?;

        let trial_active = now < stored.trial_end;
        let trial_end = Some(stored.trial_end.to_rfc3339());

        if stored.override_subscribed {
            return Ok(SubscriptionInfo::derive(
                true,
                Some(
                    stored
                        .override_tier
                        .unwrap_or_else(|| DEFAULT_OVERRIDE_TIER.to_string()),
                ),
                stored.override_end,
                trial_active,
                trial_end,
            ));
        }

        let (subscribed, tier, end) = match billing_api_key {
            Some(api_key) if !email.is_empty() => {
                self.billing_state(api_key, user_id, email).await?
            }
            _ => (false, None, None),
        };

        Ok(SubscriptionInfo::derive(
            subscribed,
            tier,
            end,
            trial_active,
            trial_end,
        ))
    }

    async fn billing_state(
        &self,
        api_key: &str,
        user_id: &str,
        email: &str,
    ) -> Result<(bool, Option<String>, Option<String>), InfraError> {
        let Some(customer) = self
            .billing_client
            .find_customer_by_email(api_key, email)
            .await?
        else {
            return Ok((false, None, None));
        };
        let _ = self
            .trial_repository
            .save_billing_customer_id(user_id, &customer.id);

        let Some(subscription) = self
            .billing_client
            .find_active_subscription(api_key, &customer.id)
            .await?
        else {
            return Ok((false, None, None));
        };
        Ok((
            true,
            Some(subscription.tier),
            subscription.current_period_end,
        ))
    }

    // Resolves the billing customer from the stored id, falling back to an
    // email lookup, and opens a billing-portal session. Synthetic ids written
    // by manual grants never reach the billing provider.
    pub async fn create_portal_session(
        &self,
        billing_api_key: &str,
        user_id: &str,
        email: &str,
        return_url: &str,
    ) -> Result<String, InfraError> {
        let stored_customer_id = self
            .trial_repository
            .load(user_id.trim())?
            .and_then(|record| record.billing_customer_id);

        let customer_id = match stored_customer_id {
            Some(customer_id) if is_synthetic_customer_id(&customer_id) => {
                return Err(InfraError::Billing(format!(
                    "no billing portal is available for manually granted subscriptions (id: {customer_id})"
                )));
            }
            Some(customer_id) => customer_id,
            None => self
                .billing_client
                .find_customer_by_email(billing_api_key, email.trim())
                .await?
                .map(|customer| customer.id)
                .ok_or_else(|| {
                    InfraError::Billing(format!("no billing customer found for {email}"))
                })?,
        };

        self.billing_client
            .create_portal_session(billing_api_key, &customer_id, return_url)
            .await
    }
}

fn is_synthetic_customer_id(customer_id: &str) -> bool {
    let normalized = customer_id.trim().to_ascii_lowercase();
    normalized.starts_with("manual_") || normalized.starts_with("test_")
}
