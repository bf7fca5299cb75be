pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, patch, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::Config;
use middleware::{metrics_middleware, request_id_middleware};
use services::{MarketplaceRepository, StripeClient};

#[derive(Clone)]
pub struct AppState {
    pub db: mongodb::Database,
    pub config: Config,
    pub repository: MarketplaceRepository,
    pub stripe: StripeClient,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    db: mongodb::Database,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        services::init_metrics();

        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let repository = MarketplaceRepository::new(&client, &db);
        repository.init_indexes().await?;

        let stripe = StripeClient::new(config.stripe.clone())?;
        if stripe.is_configured() {
            tracing::info!("Stripe client initialized");
        } else {
            tracing::warn!("Stripe credentials not configured - payment features will be limited");
        }

        let state = AppState {
            db: db.clone(),
            config: config.clone(),
            repository,
            stripe,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics))
            .route(
                "/orders",
                post(handlers::orders::create_order).get(handlers::orders::list_orders),
            )
            .route("/orders/:id", get(handlers::orders::get_order))
            .route("/orders/:id/status", patch(handlers::orders::update_order_status))
            .route("/orders/:id/refund", post(handlers::orders::refund_order))
            .route("/payments/intent", post(handlers::payments::create_intent))
            // Raw-body route; the webhook signature covers the unparsed bytes.
            .route("/payments/webhook", post(handlers::payments::webhook))
            .layer(from_fn(metrics_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        user_id = tracing::field::Empty,
                    )
                }),
            )
            // Outside the trace layer so the id it stamps is visible when
            // the span is created.
            .layer(from_fn(request_id_middleware))
            // The checkout SPA calls this API from another origin.
            .layer(CorsLayer::permissive())
            .with_state(state);

        // Port 0 binds a random port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
            db,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> &mongodb::Database {
        &self.db
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
