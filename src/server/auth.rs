//! Bearer-token check for the participant-facing routes.
//!
//! Tokens are validated by asking the identity provider's `userinfo`
//! endpoint. With no provider configured, every request is let through.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::server::state::SharedState;

#[derive(Debug, Clone)]
pub enum TokenValidator {
    Disabled,
    Remote { client: Client, userinfo_url: String },
}

impl TokenValidator {
    pub fn from_config(config: &Config) -> Self {
        match config.userinfo_url() {
            Some(userinfo_url) => TokenValidator::Remote {
                client: Client::new(),
                userinfo_url,
            },
            None => {
                warn!("AUTH_DOMAIN not set; bearer tokens are not checked");
                TokenValidator::Disabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TokenValidator::Remote { .. })
    }

    /// Accept or reject a bearer token.
    pub async fn validate(&self, token: &str) -> Result<(), AppError> {
        let TokenValidator::Remote { client, userinfo_url } = self else {
            return Ok(());
        };

        let resp = client
            .get(userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("Token validation request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            debug!(%status, "Token rejected by provider");
            Err(AppError::unauthorized("Invalid or expired token."))
        } else {
            Err(AppError::upstream(format!("Token provider responded with status {status}.")))
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware guarding authenticated routes.
pub async fn require_auth(State(state): State<SharedState>, request: Request, next: Next) -> Result<Response, AppError> {
    if state.auth.is_enabled() {
        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| AppError::unauthorized("Missing bearer token."))?;
        state.auth.validate(token).await?;
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer   xyz "), Some("xyz"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("token"), None);
    }

    #[tokio::test]
    async fn disabled_validator_accepts_anything() {
        assert!(TokenValidator::Disabled.validate("whatever").await.is_ok());
        assert!(!TokenValidator::Disabled.is_enabled());
    }
}
