use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing;
use uuid::Uuid;

use crate::response::failure;
use crate::state::ApiState;

/// JWT claims; `sub` carries the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: Uuid,
}

fn extract_token(auth_header: Option<&str>) -> Option<String> {
    auth_header?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}

pub fn generate_token(user: Uuid, secret: &str, expires_in_days: u64) -> Result<String, StatusCode> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .as_secs() as usize;

    let claims = Claims {
        sub: user.to_string(),
        exp: now + (expires_in_days * 24 * 60 * 60) as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
        .map_err(|e| {
            tracing::error!("Failed to generate JWT token: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Verifies an HS256 token and returns the user id it was issued for.
pub fn verify_token(token: &str, secret: &str) -> Result<Uuid, StatusCode> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());

    let claims = match decode::<Claims>(token, &decoding_key, &Validation::default()) {
        Ok(token_data) => token_data.claims,
        Err(e) => {
            tracing::debug!("JWT verification failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    claims.sub.parse().map_err(|_| {
        tracing::debug!("JWT subject is not a user id: {}", claims.sub);
        StatusCode::UNAUTHORIZED
    })
}

pub async fn auth_middleware(mut req: Request, next: axum::middleware::Next) -> Response {
    // Health and the WebSocket upgrade (token in the query) skip header auth.
    let path = req.uri().path();
    if path == "/health" || path.starts_with("/ws") {
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(token) = extract_token(auth_header) else {
        tracing::debug!("Missing Authorization header");
        return failure(StatusCode::UNAUTHORIZED, "Authentication required");
    };

    let Some(state) = req.extensions().get::<ApiState>() else {
        tracing::error!("API state missing from request extensions");
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    };

    let id = match verify_token(&token, &state.jwt_secret) {
        Ok(id) => id,
        Err(status) => return failure(status, "Invalid or expired token"),
    };

    req.extensions_mut().insert(AuthenticatedUser { id });
    tracing::debug!("Authenticated user: {}", id);

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_user_id() {
        let user = Uuid::new_v4();
        let token = generate_token(user, "secret", 1).unwrap();
        assert_eq!(verify_token(&token, "secret").unwrap(), user);
        assert_eq!(verify_token(&token, "other").unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_token(Some("Bearer abc ")), Some("abc".to_string()));
        assert_eq!(extract_token(Some("abc")), None);
        assert_eq!(extract_token(None), None);
    }
}
