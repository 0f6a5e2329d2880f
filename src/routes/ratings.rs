use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::ratings;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(ratings::submit_rating))
        .route("/pending", get(ratings::pending_ratings))
        .route("/game/:game_id", get(ratings::game_ratings))
}
