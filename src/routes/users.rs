use axum::{routing::get, Router};

use crate::handlers::users;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::list_users))
        .route("/:id", get(users::get_user).put(users::update_user))
        .route("/:id/games", get(users::user_games))
        .route("/:id/ratings", get(users::user_ratings))
}
