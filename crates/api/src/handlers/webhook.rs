//! Handler for membership platform webhooks.
//!
//! Deliveries are not deduplicated: a replayed payment grants credits again.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use reelsmith_core::subscription::{self, SubscriptionEffect};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    pub action: Option<String>,
    pub user_id: String,
}

/// POST /whop-webhook
pub async fn handle_webhook(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Json<WebhookResponse>> {
    let Json(payload) = body?;
    let accounts = state.accounts()?;

    let event = subscription::classify(&payload)?;
    tracing::info!(action = ?event.action, user_id = %event.user_id, "Received webhook");

    match event.effect {
        SubscriptionEffect::SetStatus { status, plan } => {
            accounts
                .set_subscription(&event.user_id, status, plan.as_deref())
                .await
                .map_err(AppError::Store)?;
            tracing::info!(
                user_id = %event.user_id,
                status = status.as_str(),
                "Updated subscription"
            );
        }
        SubscriptionEffect::GrantCredits(amount) => {
            // A failed lookup is treated like a missing account.
            let current = accounts
                .credits(&event.user_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(user_id = %event.user_id, error = %e, "Failed to fetch account");
                    None
                });
            match current {
                Some(credits) => {
                    accounts
                        .set_credits(&event.user_id, credits + amount)
                        .await
                        .map_err(AppError::Store)?;
                    tracing::info!(user_id = %event.user_id, amount, "Added credits");
                }
                None => {
                    tracing::info!(user_id = %event.user_id, "Account not found, skipping credit grant");
                }
            }
        }
        SubscriptionEffect::Ignore => {
            tracing::info!(action = ?event.action, "Unhandled webhook action");
        }
    }

    Ok(Json(WebhookResponse {
        success: true,
        action: event.action,
        user_id: event.user_id,
    }))
}
