//! Request extractors
//!
//! - [`CurrentUser`]: validates the bearer token and resolves the caller
//! - [`ServiceAuth`]: shared-secret guard for machine endpoints (sweeps,
//!   payment confirmation)

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::error::{AppError, ErrorCode};

use crate::auth::{CurrentUser, JwtError, JwtService};
use crate::core::ServerState;

impl FromRequestParts<ServerState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        // Check if already extracted (from middleware)
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let token = match auth_header {
            Some(header) => JwtService::extract_from_header(header)
                .ok_or_else(|| AppError::invalid_token("Invalid authorization header"))?,
            None => {
                tracing::warn!(target: "security", uri = %parts.uri, "Missing authorization header");
                return Err(AppError::unauthorized());
            }
        };

        // Validate token
        match state.jwt_service.validate_token(token) {
            Ok(claims) => {
                let user = CurrentUser::try_from(claims)
                    .map_err(|e| AppError::invalid_token(format!("Malformed JWT claims: {}", e)))?;

                // Store in extensions for potential reuse
                parts.extensions.insert(user.clone());

                Ok(user)
            }
            Err(e) => {
                tracing::warn!(target: "security", error = %e, uri = %parts.uri, "Token validation failed");

                match e {
                    JwtError::ExpiredToken => Err(AppError::token_expired()),
                    _ => Err(AppError::invalid_token("Invalid token")),
                }
            }
        }
    }
}

/// Marker extracted when the caller presented the service credential.
///
/// Sweep triggers and the payment confirmation callback are invoked by
/// machines, not users; they authenticate with `X-Service-Secret` against the
/// configured shared secret.
#[derive(Debug, Clone, Copy)]
pub struct ServiceAuth;

impl FromRequestParts<ServerState> for ServiceAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get("x-service-secret")
            .and_then(|h| h.to_str().ok());

        match presented {
            Some(secret) if !state.config.sweep_secret.is_empty()
                && secret == state.config.sweep_secret =>
            {
                Ok(ServiceAuth)
            }
            _ => {
                tracing::warn!(target: "security", uri = %parts.uri, "Rejected service call without valid credential");
                Err(AppError::new(ErrorCode::ServiceCredentialInvalid))
            }
        }
    }
}
