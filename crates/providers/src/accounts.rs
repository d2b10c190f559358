//! Account state mutations via the Supabase PostgREST API.
//!
//! Rows live in the `users` table keyed by `whop_user_id`.

use async_trait::async_trait;
use reelsmith_core::subscription::SubscriptionStatus;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ensure_success, parse_response, request_error, ProviderError};

const PROVIDER: &str = "Supabase";

const USERS_TABLE: &str = "users";

/// Column matching the membership platform's user identifier.
const USER_KEY_COLUMN: &str = "whop_user_id";

/// Reads and updates subscriber accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Set the subscription status and plan of every account with `user_id`.
    async fn set_subscription(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        plan: Option<&str>,
    ) -> Result<(), ProviderError>;

    /// Current credit balance, or `None` when no account exists.
    async fn credits(&self, user_id: &str) -> Result<Option<i64>, ProviderError>;

    /// Overwrite the credit balance.
    async fn set_credits(&self, user_id: &str, credits: i64) -> Result<(), ProviderError>;
}

#[derive(Debug, Deserialize)]
struct CreditsRow {
    #[serde(default)]
    credits: Option<i64>,
}

/// [`AccountStore`] backed by a Supabase project's REST endpoint.
#[derive(Debug, Clone)]
pub struct SupabaseAccountStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl SupabaseAccountStore {
    /// * `base_url` - Project URL, e.g. `https://abc.supabase.co`.
    pub fn new(client: reqwest::Client, base_url: String, service_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        }
    }

    fn users_request(&self, method: reqwest::Method, user_id: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{USERS_TABLE}", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .query(&[(USER_KEY_COLUMN, format!("eq.{user_id}"))])
    }

    async fn update(&self, user_id: &str, patch: serde_json::Value) -> Result<(), ProviderError> {
        let response = self
            .users_request(reqwest::Method::PATCH, user_id)
            .header("Prefer", "return=minimal")
            .json(&patch)
            .send()
            .await
            .map_err(request_error(PROVIDER))?;

        ensure_success(PROVIDER, response).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for SupabaseAccountStore {
    async fn set_subscription(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        plan: Option<&str>,
    ) -> Result<(), ProviderError> {
        self.update(
            user_id,
            json!({
                "subscription_status": status.as_str(),
                "subscription_plan": plan,
            }),
        )
        .await
    }

    async fn credits(&self, user_id: &str) -> Result<Option<i64>, ProviderError> {
        let response = self
            .users_request(reqwest::Method::GET, user_id)
            .query(&[("select", "credits")])
            .send()
            .await
            .map_err(request_error(PROVIDER))?;

        let rows: Vec<CreditsRow> = parse_response(PROVIDER, response).await?;
        Ok(rows.into_iter().next().map(|row| row.credits.unwrap_or(0)))
    }

    async fn set_credits(&self, user_id: &str, credits: i64) -> Result<(), ProviderError> {
        self.update(user_id, json!({ "credits": credits })).await
    }
}
