#![allow(dead_code)]

use hmac::{Hmac, Mac};
use marketplace_service::config::{Config, DatabaseConfig, ServerConfig, StripeConfig};
use marketplace_service::Application;
use secrecy::Secret;
use serde_json::{json, Value};
use sha2::Sha256;

pub const BUYER_ID: &str = "buyer-1";
pub const OTHER_BUYER_ID: &str = "buyer-2";
pub const SELLER_ID: &str = "seller-1";
pub const ADMIN_ID: &str = "admin-1";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub db: mongodb::Database,
    pub db_name: String,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn with no processor behind it; fine for tests that never
    /// create an intent.
    pub async fn spawn() -> Self {
        Self::spawn_with_stripe("http://127.0.0.1:9".to_string()).await
    }

    /// Spawn with the Stripe API base pointed at a mock server.
    pub async fn spawn_with_stripe(api_base_url: String) -> Self {
        let db_name = format!("marketplace_test_{}", uuid::Uuid::new_v4());

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            database: DatabaseConfig {
                url: Secret::new(
                    std::env::var("TEST_MONGODB_URI")
                        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
                ),
                db_name: db_name.clone(),
            },
            stripe: StripeConfig {
                secret_key: Secret::new("sk_test_key".to_string()),
                publishable_key: "pk_test_key".to_string(),
                webhook_secret: Secret::new(TEST_WEBHOOK_SECRET.to_string()),
                api_base_url,
            },
            service_name: "marketplace-service-test".to_string(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);
        let db = app.db().clone();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        TestApp {
            address,
            port,
            db,
            db_name,
            client: reqwest::Client::new(),
        }
    }

    pub async fn cleanup(&self) {
        self.db
            .drop(None)
            .await
            .expect("Failed to drop test database");
    }

    pub async fn post_order(&self, user_id: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}/orders", self.address))
            .header("X-User-ID", user_id)
            .header("X-User-Role", "buyer")
            .json(body)
            .send()
            .await
            .expect("Failed to send create-order request")
    }

    pub async fn get_order(&self, user_id: &str, role: &str, order_id: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/orders/{}", self.address, order_id))
            .header("X-User-ID", user_id)
            .header("X-User-Role", role)
            .send()
            .await
            .expect("Failed to send get-order request")
    }

    pub async fn patch_status(
        &self,
        user_id: &str,
        role: &str,
        order_id: &str,
        status: &str,
    ) -> reqwest::Response {
        self.client
            .patch(format!("{}/orders/{}/status", self.address, order_id))
            .header("X-User-ID", user_id)
            .header("X-User-Role", role)
            .json(&json!({ "status": status }))
            .send()
            .await
            .expect("Failed to send status update request")
    }

    pub async fn post_refund(&self, user_id: &str, role: &str, order_id: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/orders/{}/refund", self.address, order_id))
            .header("X-User-ID", user_id)
            .header("X-User-Role", role)
            .send()
            .await
            .expect("Failed to send refund request")
    }

    pub async fn post_intent(&self, user_id: &str, order_id: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/payments/intent", self.address))
            .header("X-User-ID", user_id)
            .header("X-User-Role", "buyer")
            .json(&json!({ "order_id": order_id }))
            .send()
            .await
            .expect("Failed to send intent request")
    }

    pub async fn post_webhook(&self, body: &str, signature: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/payments/webhook", self.address))
            .header("Stripe-Signature", signature)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Failed to send webhook request")
    }

    /// Create an order for `user_id` and return its id.
    pub async fn create_sample_order(&self, user_id: &str) -> String {
        let response = self.post_order(user_id, &sample_order_body()).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.expect("Invalid order response");
        body["id"].as_str().expect("Order id missing").to_string()
    }
}

/// The canonical checkout fixture: two units of P1/S1 at 20.00 each.
pub fn sample_order_body() -> Value {
    json!({
        "items": [
            {
                "product_id": "P1",
                "variant": { "sku": "S1", "attributes": { "size": "M" } },
                "quantity": 2,
                "sub_total": 40.0
            }
        ],
        "total": 40.0,
        "shipping_address": {
            "address_line": "1 Market St",
            "city": "Springfield",
            "state": "IL",
            "postal_code": "62701"
        }
    })
}

/// Compute a `Stripe-Signature` header over `body`.
pub fn stripe_signature(body: &str, secret: &str, timestamp: i64) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{timestamp}.{body}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Signed webhook header with a current timestamp.
pub fn signed_header(body: &str) -> String {
    stripe_signature(body, TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp())
}

/// Build a payment-intent webhook event body.
pub fn intent_event(event_type: &str, intent_id: &str) -> String {
    json!({
        "id": "evt_test_1",
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "data": {
            "object": {
                "id": intent_id,
                "amount": 4000,
                "currency": "usd",
                "status": "succeeded",
                "metadata": {}
            }
        }
    })
    .to_string()
}
