//! Actor context extractor.
//!
//! The upstream auth gateway authenticates the session and forwards the
//! actor's identity and role as headers. This service never sees
//! credentials or tokens.
//!
//! Security: headers are only trusted because the service is deployed
//! behind the gateway; the webhook route is the single unauthenticated
//! entry point and is signature-verified instead.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActorRole {
    Buyer,
    Seller,
    Admin,
}

/// Authenticated actor extracted from request headers.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub user_id: String,
    pub role: ActorRole,
}

impl ActorContext {
    /// Seller and admin actors may drive fulfillment and see all orders.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, ActorRole::Seller | ActorRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!(
                    "Missing X-User-ID header (required from auth gateway)"
                ))
            })?;

        let role = match parts
            .headers
            .get("X-User-Role")
            .and_then(|v| v.to_str().ok())
        {
            Some("admin") => ActorRole::Admin,
            Some("seller") => ActorRole::Seller,
            Some("buyer") | None => ActorRole::Buyer,
            Some(other) => {
                return Err(AppError::AuthError(anyhow::anyhow!(
                    "Unknown actor role: {other}"
                )))
            }
        };

        let span = tracing::Span::current();
        span.record("user_id", user_id);

        Ok(ActorContext {
            user_id: user_id.to_string(),
            role,
        })
    }
}
