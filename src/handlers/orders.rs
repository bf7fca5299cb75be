//! Order ledger handlers.
//!
//! Orders are created by buyers and advanced through fulfillment by staff.
//! Payment status is never writable here; it only changes through webhook
//! reconciliation and the admin refund flow.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::DateTime;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CreateOrderRequest, ListOrdersQuery, OrderListResponse, OrderResponse,
        UpdateOrderStatusRequest,
    },
    error::AppError,
    middleware::ActorContext,
    models::{Order, OrderPaymentStatus, OrderStatus},
    services::metrics,
    AppState,
};

/// Allowed drift between the client-supplied total and the sum of line
/// subtotals. The client total is a display hint, not authoritative.
const TOTAL_TOLERANCE: f64 = 0.01;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Create a new order for the authenticated buyer.
pub async fn create_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    payload.validate()?;
    payload.shipping_address.validate()?;
    for item in &payload.items {
        item.validate()?;
        item.variant.validate()?;
    }

    let computed_total: f64 = payload.items.iter().map(|item| item.sub_total).sum();
    if (computed_total - payload.total).abs() > TOTAL_TOLERANCE {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Total {:.2} does not match sum of line subtotals {:.2}",
            payload.total,
            computed_total
        )));
    }

    let order = Order {
        id: Uuid::new_v4(),
        buyer_id: actor.user_id.clone(),
        items: payload.items.into_iter().map(Into::into).collect(),
        total: payload.total,
        status: OrderStatus::Pending,
        payment_status: OrderPaymentStatus::Pending,
        shipping_address: payload.shipping_address.into(),
        payment_intent_id: None,
        created_at: DateTime::now(),
        paid_at: None,
    };

    tracing::info!(
        order_id = %order.id,
        buyer_id = %order.buyer_id,
        total = order.total,
        items = order.items.len(),
        "Creating order"
    );

    state.repository.create_order(order.clone()).await?;
    metrics::record_order_created();

    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

/// Get an order by ID. Buyers may only read their own orders.
pub async fn get_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .repository
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    if !actor.is_staff() && order.buyer_id != actor.user_id {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Order belongs to another buyer"
        )));
    }

    Ok(Json(OrderResponse::from(order)))
}

/// List orders. Buyers see their own; staff see all, optionally filtered
/// by fulfillment status.
pub async fn list_orders(
    State(state): State<AppState>,
    actor: ActorContext,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100);
    let offset = query.offset.unwrap_or(0);

    let (orders, total_count) = if actor.is_staff() {
        state
            .repository
            .list_orders(query.status, limit, offset)
            .await?
    } else {
        state
            .repository
            .list_orders_for_buyer(&actor.user_id, limit, offset)
            .await?
    };

    Ok(Json(OrderListResponse {
        orders: orders.into_iter().map(OrderResponse::from).collect(),
        total_count,
        limit,
        offset,
    }))
}

/// Advance an order's fulfillment status. Staff only, and only along the
/// transition table; shipping additionally requires the order to be paid.
pub async fn update_order_status(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<StatusCode, AppError> {
    if !actor.is_staff() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Fulfillment status is managed by sellers and admins"
        )));
    }

    let order = state
        .repository
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    if !order.status.can_transition_to(payload.status) {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Invalid fulfillment transition {:?} -> {:?}",
            order.status,
            payload.status
        )));
    }

    if payload.status == OrderStatus::Shipped
        && order.payment_status != OrderPaymentStatus::Paid
    {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Order cannot ship before it is paid"
        )));
    }

    tracing::info!(
        order_id = %order_id,
        from = ?order.status,
        to = ?payload.status,
        actor = %actor.user_id,
        "Updating fulfillment status"
    );

    state
        .repository
        .update_fulfillment_status(order_id, payload.status)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Admin refund flow: flips a paid order and its payment mirror to
/// refunded in one transaction. Money movement happens processor-side.
pub async fn refund_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Refunds are admin-only"
        )));
    }

    let order = state
        .repository
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    if order.payment_status != OrderPaymentStatus::Paid {
        return Err(AppError::Conflict(anyhow::anyhow!("Order is not paid")));
    }

    let refunded = state.repository.refund_order(order_id).await?;
    if !refunded {
        // Lost a race with another refund; the pair is no longer paid.
        return Err(AppError::Conflict(anyhow::anyhow!("Order is not paid")));
    }

    tracing::info!(order_id = %order_id, actor = %actor.user_id, "Order refunded");

    Ok(StatusCode::NO_CONTENT)
}
