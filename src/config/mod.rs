use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub stripe: StripeConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StripeConfig {
    /// Secret API key, sent as the basic-auth username on every call.
    pub secret_key: Secret<String>,
    /// Publishable key handed to the checkout client.
    pub publishable_key: String,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("MARKETPLACE_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("MARKETPLACE_SERVICE_PORT")
            .unwrap_or_else(|_| "3005".to_string())
            .parse()?;

        let db_url =
            env::var("MARKETPLACE_DATABASE_URL").expect("MARKETPLACE_DATABASE_URL must be set");
        let db_name = env::var("MARKETPLACE_DATABASE_NAME")
            .unwrap_or_else(|_| "marketplace_db".to_string());

        let secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_default();
        let publishable_key = env::var("STRIPE_PUBLISHABLE_KEY").unwrap_or_default();
        let webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();
        let api_base_url = env::var("STRIPE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            stripe: StripeConfig {
                secret_key: Secret::new(secret_key),
                publishable_key,
                webhook_secret: Secret::new(webhook_secret),
                api_base_url,
            },
            service_name: "marketplace-service".to_string(),
        })
    }
}
