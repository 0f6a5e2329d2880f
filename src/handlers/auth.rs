use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;
use serde_json::json;

use crate::errors::{AppError, Result};
use crate::handlers::ratings::rating_summaries;
use crate::middleware::auth::{generate_token, CurrentUser};
use crate::models::user::{
    filter_skill_levels, filter_sports, LoginRequest, RegisterRequest, User, UserView,
};
use crate::state::AppState;

const PASSWORD_MIN: usize = 6;
const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;

/// Same shape check the web client applies: one `@`, no whitespace, and a
/// dot somewhere in the domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let email = payload.email.as_deref().map(str::trim).unwrap_or("");
    let password = payload.password.as_deref().unwrap_or("");
    let name = payload.name.as_deref().map(str::trim).unwrap_or("");

    if email.is_empty() || password.is_empty() || name.is_empty() {
        return Err(AppError::validation(
            "Email, password, and name are required",
        ));
    }
    if !is_valid_email(email) {
        return Err(AppError::validation("Invalid email format"));
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err(AppError::validation(
            "Password must be at least 6 characters",
        ));
    }
    if !(NAME_MIN..=NAME_MAX).contains(&name.chars().count()) {
        return Err(AppError::validation(
            "Name must be between 2 and 50 characters",
        ));
    }

    let email = email.to_lowercase();
    let users: Collection<User> = state.db.collection("users");

    if users.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::conflict("Email already registered"));
    }

    let password_hash = hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))?;

    let now = Utc::now();
    let user = User {
        id: ObjectId::new(),
        email,
        password: password_hash,
        name: name.to_string(),
        bio: payload
            .bio
            .as_deref()
            .map(|b| b.trim().to_string())
            .unwrap_or_default(),
        sports: payload
            .sports
            .as_deref()
            .map(filter_sports)
            .unwrap_or_default(),
        skill_levels: payload
            .skill_levels
            .as_ref()
            .map(filter_skill_levels)
            .unwrap_or_default(),
        avatar_url: String::new(),
        created_at: now,
        updated_at: now,
    };

    users
        .insert_one(&user)
        .await
        .map_err(|e| AppError::on_duplicate_key(e, "Email already registered"))?;

    let token = generate_token(user.id, &state.jwt_secret)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registration successful",
            "data": { "user": UserView::from_user(&user), "token": token },
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let email = payload.email.as_deref().map(str::trim).unwrap_or("");
    let password = payload.password.as_deref().unwrap_or("");

    if email.is_empty() || password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let users: Collection<User> = state.db.collection("users");
    let user = users
        .find_one(doc! { "email": email.to_lowercase() })
        .await?
        .ok_or_else(|| AppError::authentication("Invalid email or password"))?;

    let valid = verify(password, &user.password)
        .map_err(|e| AppError::Internal(format!("failed to verify password: {e}")))?;
    if !valid {
        return Err(AppError::authentication("Invalid email or password"));
    }

    let token = generate_token(user.id, &state.jwt_secret)?;

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "data": { "user": UserView::from_user(&user), "token": token },
    })))
}

/// Profile of the authenticated user plus activity stats.
pub async fn me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse> {
    let user_id = current.id();
    let games: Collection<mongodb::bson::Document> = state.db.collection("games");

    let games_hosted = games.count_documents(doc! { "hostId": user_id }).await?;
    let games_played = games
        .count_documents(doc! { "players": user_id, "status": "completed" })
        .await?;

    let summary = rating_summaries(&state.db, &[user_id])
        .await?
        .remove(&user_id)
        .unwrap_or_default();

    Ok(Json(json!({
        "success": true,
        "data": {
            "user": UserView::from_user(&current.0).with_rating(summary),
            "stats": {
                "gamesHosted": games_hosted,
                "gamesPlayed": games_played,
                "avgRating": summary.avg_rating,
                "totalRatings": summary.total_ratings,
            },
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check_matches_client_rule() {
        assert!(is_valid_email("alex@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.co"));
        assert!(!is_valid_email("alex@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alex@"));
        assert!(!is_valid_email("alex example@mail.com"));
        assert!(!is_valid_email("alex"));
    }
}
