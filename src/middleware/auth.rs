use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};
use crate::models::user::User;
use crate::state::AppState;

const TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60; // 7 days

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn generate_token(user_id: ObjectId, secret: &str) -> Result<String> {
    let claims = Claims {
        sub: user_id.to_hex(),
        exp: (Utc::now().timestamp() + TOKEN_TTL_SECS) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))
}

/// Authenticated caller, resolved from the bearer token to a live user
/// document. Handlers that allow anonymous access take
/// `Option<CurrentUser>` instead, which swallows missing or bad tokens.
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> ObjectId {
        self.0.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::authentication("Authentication required. Please provide a valid token.")
            })?;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                AppError::authentication("Token expired. Please login again.")
            }
            _ => AppError::authentication("Invalid token. Please login again."),
        })?;

        let user_id = ObjectId::parse_str(&token_data.claims.sub)
            .map_err(|_| AppError::authentication("Invalid token. Please login again."))?;

        let user = state
            .db
            .collection::<User>("users")
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or_else(|| AppError::authentication("User not found. Please login again."))?;

        Ok(CurrentUser(user))
    }
}
