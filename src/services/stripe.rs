//! Stripe payment-processor client.
//!
//! Implements the PaymentIntents API for payment initiation and the
//! `Stripe-Signature` scheme for webhook verification. Intent creation is
//! retry-safe: the idempotency key is derived solely from the order id, so
//! a retried call for the same order is deduplicated processor-side.

use crate::config::StripeConfig;
use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Webhook timestamps older than this are rejected to limit replay.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum StripeError {
    /// The processor rejected the request (4xx). The message is safe to
    /// surface to the caller.
    #[error("{0}")]
    Api(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected Stripe response: {0}")]
    Unexpected(String),
}

/// Stripe client for the marketplace payment flow.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

/// Payment intent as returned by Stripe.
#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    /// Processor-assigned intent ID (`pi_...`).
    pub id: String,
    /// Client-side completion secret, handed to the checkout UI.
    pub client_secret: Option<String>,
    /// Amount in minor currency units.
    pub amount: u64,
    pub currency: String,
    /// Intent lifecycle status (e.g. "requires_payment_method").
    pub status: String,
}

/// Stripe API error envelope.
#[derive(Debug, Deserialize)]
struct StripeApiError {
    error: StripeApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeApiErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

/// Stripe webhook event envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: IntentObject,
}

/// The payment-intent object embedded in a webhook event.
#[derive(Debug, Deserialize)]
pub struct IntentObject {
    pub id: String,
    pub amount: u64,
    pub currency: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Deterministic idempotency key for an order's payment intent.
///
/// Derived solely from the order id so that every retried
/// intent-creation call for the same order carries the same key.
pub fn intent_idempotency_key(order_id: &Uuid) -> String {
    let digest = Sha256::digest(format!("payment-intent:{order_id}").as_bytes());
    hex::encode(digest)
}

/// Cap on a single Stripe round trip; a hung intent-creation call must
/// not pin the request handler indefinitely.
const REQUEST_TIMEOUT_SECS: u64 = 15;

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config })
    }

    /// Check if Stripe is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
            && !self.config.webhook_secret.expose_secret().is_empty()
    }

    /// Create a payment intent for an order.
    ///
    /// # Arguments
    /// * `amount` - Amount in minor currency units (cents for USD)
    /// * `currency` - Currency code (e.g. "usd")
    /// * `order_id` / `buyer_id` - Attached as intent metadata for
    ///   webhook-side correlation
    /// * `idempotency_key` - Stable per-order key, see [`intent_idempotency_key`]
    pub async fn create_payment_intent(
        &self,
        amount: u64,
        currency: &str,
        order_id: &Uuid,
        buyer_id: &str,
        description: &str,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, StripeError> {
        if !self.is_configured() {
            return Err(StripeError::Unexpected(
                "Stripe credentials not configured".to_string(),
            ));
        }

        // Stripe takes form-encoded bodies with bracketed keys for maps.
        let params: Vec<(&str, String)> = vec![
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
            ("description", description.to_string()),
            ("metadata[order_id]", order_id.to_string()),
            ("metadata[buyer_id]", buyer_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let url = format!("{}/payment_intents", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(self.config.secret_key.expose_secret(), None::<&str>)
            .header("Idempotency-Key", idempotency_key)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Stripe create_payment_intent response");

        if status.is_success() {
            let intent: PaymentIntent = serde_json::from_str(&body)
                .map_err(|e| StripeError::Unexpected(e.to_string()))?;
            tracing::info!(
                intent_id = %intent.id,
                amount = intent.amount,
                currency = %intent.currency,
                "Stripe payment intent created"
            );
            Ok(intent)
        } else if status.is_client_error() {
            let message = serde_json::from_str::<StripeApiError>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| "Payment could not be processed".to_string());
            tracing::error!(status = %status, message = %message, "Stripe rejected intent creation");
            Err(StripeError::Api(message))
        } else {
            tracing::error!(status = %status, body = %body, "Stripe intent creation failed");
            Err(StripeError::Unexpected(format!(
                "Stripe returned status {status}"
            )))
        }
    }

    /// Verify a webhook signature header.
    ///
    /// The header carries `t=<unix>,v1=<hex>` where the signature is
    /// `HMAC-SHA256("{t}.{raw_body}", webhook_secret)` over the raw,
    /// unparsed request body. Stale timestamps are rejected.
    pub fn verify_webhook_signature(&self, body: &str, signature_header: &str) -> Result<bool> {
        let mut timestamp: Option<&str> = None;
        let mut signature: Option<&str> = None;

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signature = Some(value),
                _ => {}
            }
        }

        let (timestamp, signature) = match (timestamp, signature) {
            (Some(t), Some(s)) => (t, s),
            _ => {
                tracing::warn!("Malformed webhook signature header");
                return Ok(false);
            }
        };

        let timestamp_secs: i64 = match timestamp.parse() {
            Ok(t) => t,
            Err(_) => {
                tracing::warn!("Non-numeric webhook signature timestamp");
                return Ok(false);
            }
        };

        let age = chrono::Utc::now().timestamp() - timestamp_secs;
        if age.abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(age_secs = age, "Webhook signature timestamp outside tolerance");
            return Ok(false);
        }

        let signed_payload = format!("{timestamp}.{body}");
        let expected = self.compute_signature(
            &signed_payload,
            self.config.webhook_secret.expose_secret(),
        )?;

        let is_valid = expected == signature;
        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }

        Ok(is_valid)
    }

    /// Parse a webhook event from the raw request body.
    pub fn parse_webhook_event(&self, body: &str) -> Result<WebhookEvent> {
        let event: WebhookEvent = serde_json::from_str(body)?;
        Ok(event)
    }

    /// Compute HMAC-SHA256 signature.
    fn compute_signature(&self, payload: &str, secret: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| anyhow!("Invalid key length"))?;
        mac.update(payload.as_bytes());
        let result = mac.finalize();
        Ok(hex::encode(result.into_bytes()))
    }
}
