use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Order, OrderItem, OrderPaymentStatus, OrderStatus, ShippingAddress, Variant,
};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<OrderItemDto>,
    /// Client-computed total; validated against the sum of line subtotals.
    #[validate(range(min = 0.01))]
    pub total: f64,
    pub shipping_address: ShippingAddressDto,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OrderItemDto {
    #[validate(length(min = 1))]
    pub product_id: String,
    pub variant: VariantDto,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(range(min = 0.01))]
    pub sub_total: f64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct VariantDto {
    #[validate(length(min = 1))]
    pub sku: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ShippingAddressDto {
    #[validate(length(min = 1))]
    pub address_line: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub postal_code: String,
}

impl From<OrderItemDto> for OrderItem {
    fn from(dto: OrderItemDto) -> Self {
        Self {
            product_id: dto.product_id,
            variant: Variant {
                sku: dto.variant.sku,
                attributes: dto.variant.attributes,
            },
            quantity: dto.quantity,
            sub_total: dto.sub_total,
        }
    }
}

impl From<ShippingAddressDto> for ShippingAddress {
    fn from(dto: ShippingAddressDto) -> Self {
        Self {
            address_line: dto.address_line,
            city: dto.city,
            state: dto.state,
            postal_code: dto.postal_code,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub buyer_id: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub shipping_address: ShippingAddress,
    pub payment_intent_id: Option<String>,
    pub created_at: String,
    pub paid_at: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            buyer_id: order.buyer_id,
            items: order.items,
            total: order.total,
            status: order.status,
            payment_status: order.payment_status,
            shipping_address: order.shipping_address,
            payment_intent_id: order.payment_intent_id,
            created_at: order.created_at.to_string(),
            paid_at: order.paid_at.map(|dt| dt.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub limit: Option<i64>,
    pub offset: Option<u64>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    /// Internal payment mirror ID.
    pub payment_id: Uuid,
    pub order_id: Uuid,
    /// Processor-issued secret the checkout client completes payment with.
    pub client_secret: String,
    /// Publishable key for client-side processor initialization.
    pub publishable_key: String,
    pub amount: u64,
    pub currency: String,
}
