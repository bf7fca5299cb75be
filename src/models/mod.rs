//! Persistent domain records for orders and their payment mirrors.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// UUIDs persist in their hyphenated string form, matching the string
/// filters the repository builds with `Uuid::to_string`.
mod uuid_as_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&uuid.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uuid::parse_str(&s).map_err(Error::custom)
    }
}

/// A buyer's confirmed request to purchase a set of product variants
/// at recorded prices.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    #[serde(rename = "_id", with = "uuid_as_string")]
    pub id: Uuid,
    pub buyer_id: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    /// Fulfillment state, driven by seller/admin action.
    pub status: OrderStatus,
    /// Payment state, driven by webhook reconciliation only.
    pub payment_status: OrderPaymentStatus,
    pub shipping_address: ShippingAddress,
    /// Cross-reference to the processor-side payment intent, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderItem {
    pub product_id: String,
    pub variant: Variant,
    pub quantity: u32,
    pub sub_total: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Variant {
    pub sku: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Shipping address snapshot embedded at order-creation time, not a live
/// reference to the buyer's address book.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShippingAddress {
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Fulfillment transition table. Cancellation is allowed until the
    /// order ships; delivered and cancelled are terminal.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// Local mirror of a processor-side payment intent, 1:1 with an order.
///
/// Append/update-only audit state: created when the intent is created,
/// mutated only by the verified webhook path and the admin refund flow.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    #[serde(rename = "_id", with = "uuid_as_string")]
    pub id: Uuid,
    /// Backed by a unique index; at most one active payment per order.
    #[serde(with = "uuid_as_string")]
    pub order_id: Uuid,
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Opaque intent identifier assigned by the processor.
    pub intent_id: String,
    pub method: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfillment_happy_path_is_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn cancellation_allowed_until_shipped() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
    }

    #[test]
    fn backwards_transitions_are_rejected() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
    }
}
