pub mod metrics;
pub mod repository;
pub mod stripe;

pub use metrics::{init_metrics, render_metrics};
pub use repository::MarketplaceRepository;
pub use stripe::StripeClient;
