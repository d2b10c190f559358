//! Subscription webhook classification.
//!
//! Membership events arrive in two shapes: a flat object, or an envelope with
//! the event under `data`. [`classify`] normalizes both into a
//! [`WebhookEvent`] that names the account change to apply. Applying it is
//! the caller's job.

use serde_json::Value;

use crate::error::CoreError;

/// Credits granted for each successful payment.
pub const CREDITS_PER_PAYMENT: i64 = 100;

/// Stored subscription state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// The account change a webhook asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEffect {
    /// Set the subscription status and plan.
    SetStatus {
        status: SubscriptionStatus,
        plan: Option<String>,
    },
    /// Add credits to an existing account.
    GrantCredits(i64),
    /// Unrecognized action; acknowledged without changes.
    Ignore,
}

/// A normalized webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// The action name as sent, if any.
    pub action: Option<String>,
    pub user_id: String,
    pub effect: SubscriptionEffect,
}

/// Classify a raw webhook payload.
pub fn classify(payload: &Value) -> Result<WebhookEvent, CoreError> {
    let action = text_at(payload, &["action"]).or_else(|| text_at(payload, &["type"]));
    let data = payload
        .get("data")
        .filter(|d| is_truthy(d))
        .unwrap_or(payload);

    let user_id = text_at(data, &["user_id"])
        .or_else(|| text_at(data, &["user", "id"]))
        .or_else(|| text_at(data, &["membership", "user_id"]))
        .ok_or_else(|| CoreError::Validation("Missing user_id".into()))?;

    let effect = match action.as_deref() {
        Some("membership_activated" | "membership.activated" | "membership.went_valid") => {
            SubscriptionEffect::SetStatus {
                status: SubscriptionStatus::Active,
                plan: text_at(data, &["plan_id"])
                    .or_else(|| text_at(data, &["membership", "plan_id"])),
            }
        }
        Some("membership_deactivated" | "membership.deactivated" | "membership.went_invalid") => {
            SubscriptionEffect::SetStatus {
                status: SubscriptionStatus::Inactive,
                plan: None,
            }
        }
        Some("payment_succeeded" | "payment.succeeded") => {
            SubscriptionEffect::GrantCredits(CREDITS_PER_PAYMENT)
        }
        _ => SubscriptionEffect::Ignore,
    };

    Ok(WebhookEvent {
        action,
        user_id,
        effect,
    })
}

/// Non-empty string or number found at `path`, rendered as text.
fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    let found = path.iter().try_fold(value, |v, key| v.get(key))?;
    match found {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
