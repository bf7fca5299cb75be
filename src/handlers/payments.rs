//! Payment intent bridge handlers.
//!
//! Bridges an order to exactly one processor-side payment intent and
//! reconciles webhook settlement events back onto the payment/order pair.
//! The client's own "payment succeeded" signal is untrusted; only the
//! signature-verified webhook path settles state.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use mongodb::bson::DateTime;
use serde_json::json;
use uuid::Uuid;

use crate::{
    dtos::{CreateIntentRequest, CreateIntentResponse},
    error::AppError,
    middleware::ActorContext,
    models::{OrderPaymentStatus, Payment, PaymentStatus},
    services::{
        metrics,
        repository::{SettlementOutcome, SettlementResult},
        stripe::{self, StripeError},
    },
    AppState,
};

/// All intents are charged in USD.
const CURRENCY: &str = "usd";

/// Create a payment intent for an order.
///
/// Retry-safe end to end: the idempotency key is stable per order so the
/// processor deduplicates retried calls, and the payment mirror is
/// upserted by order id so no duplicate rows appear locally.
pub async fn create_intent(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<CreateIntentResponse>), AppError> {
    let order = state
        .repository
        .get_order(payload.order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    if !actor.is_staff() && order.buyer_id != actor.user_id {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Order belongs to another buyer"
        )));
    }

    if order.payment_status == OrderPaymentStatus::Paid {
        return Err(AppError::Conflict(anyhow::anyhow!("Order already paid")));
    }

    // Processor amounts are integer minor-currency units.
    let amount = (order.total * 100.0).round() as u64;
    let idempotency_key = stripe::intent_idempotency_key(&order.id);
    let description = format!("Marketplace order {}", order.id);

    tracing::info!(
        order_id = %order.id,
        buyer_id = %order.buyer_id,
        amount_minor = amount,
        "Creating payment intent"
    );

    let intent = state
        .stripe
        .create_payment_intent(
            amount,
            CURRENCY,
            &order.id,
            &order.buyer_id,
            &description,
            &idempotency_key,
        )
        .await
        .map_err(|e| match e {
            StripeError::Api(message) => AppError::PaymentProcessor(message),
            other => {
                tracing::error!(error = %other, "Payment intent creation failed");
                AppError::InternalError(anyhow::Error::new(other))
            }
        })?;

    let client_secret = intent.client_secret.clone().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!("Stripe response missing client_secret"))
    })?;

    // A retry for a still-unpaid order refreshes the existing mirror row.
    let existing = state.repository.find_payment_by_order(order.id).await?;
    let payment_id = existing.map(|p| p.id).unwrap_or_else(Uuid::new_v4);

    let now = DateTime::now();
    let payment = Payment {
        id: payment_id,
        order_id: order.id,
        user_id: order.buyer_id.clone(),
        amount: order.total,
        currency: CURRENCY.to_string(),
        status: PaymentStatus::Pending,
        intent_id: intent.id.clone(),
        method: "card".to_string(),
        created_at: now,
        updated_at: now,
    };

    // Single transaction, guarded against the order having been paid
    // since the check above (a webhook can land in between).
    let recorded = state.repository.record_intent(&payment).await?;
    if !recorded {
        return Err(AppError::Conflict(anyhow::anyhow!("Order already paid")));
    }

    metrics::record_intent_created(CURRENCY, amount);

    tracing::info!(
        order_id = %order.id,
        payment_id = %payment_id,
        intent_id = %intent.id,
        "Payment intent created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateIntentResponse {
            payment_id,
            order_id: order.id,
            client_secret,
            publishable_key: state.config.stripe.publishable_key.clone(),
            amount,
            currency: CURRENCY.to_string(),
        }),
    ))
}

/// Processor webhook endpoint.
///
/// Raw-body route: the signature covers the unparsed bytes, so the body
/// must not go through JSON extraction first. Unverifiable requests are
/// rejected with 400 and change no state.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing Stripe-Signature header");
            AppError::SignatureVerification
        })?;

    let is_valid = state
        .stripe
        .verify_webhook_signature(&body, signature)
        .map_err(|e| {
            tracing::error!(error = %e, "Webhook signature verification error");
            AppError::InternalError(e)
        })?;

    if !is_valid {
        return Err(AppError::SignatureVerification);
    }

    let event = state.stripe.parse_webhook_event(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse webhook event");
        AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload"))
    })?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        intent_id = %event.data.object.id,
        "Processing webhook event"
    );
    metrics::record_webhook_event(&event.event_type);

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            settle(&state, &event.data.object.id, SettlementOutcome::Succeeded).await?;
        }
        "payment_intent.payment_failed" => {
            settle(&state, &event.data.object.id, SettlementOutcome::Failed).await?;
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Ignoring webhook event type");
        }
    }

    // Acknowledge receipt; the processor retries on anything else.
    Ok(Json(json!({ "received": true })))
}

async fn settle(
    state: &AppState,
    intent_id: &str,
    outcome: SettlementOutcome,
) -> Result<(), AppError> {
    match state.repository.settle_intent(intent_id, outcome).await {
        Ok(SettlementResult::Applied) => {
            tracing::info!(intent_id = %intent_id, outcome = ?outcome, "Settlement applied");
            Ok(())
        }
        Ok(SettlementResult::AlreadySettled) => {
            // Redelivery after the pair left the settleable states
            // (settled earlier or refunded); nothing to change.
            tracing::info!(intent_id = %intent_id, "Webhook for already-settled intent");
            Ok(())
        }
        Ok(SettlementResult::UnknownIntent) => {
            // No mirror for this intent; acknowledge so the processor
            // stops redelivering an event we can never apply.
            tracing::warn!(intent_id = %intent_id, "Webhook for unknown intent");
            Ok(())
        }
        Err(e) => {
            // 500 here makes the processor redeliver; replay is safe.
            tracing::error!(intent_id = %intent_id, error = %e, "Settlement failed");
            Err(AppError::InternalError(e))
        }
    }
}
