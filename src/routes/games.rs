use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::games;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(games::list_games).post(games::create_game))
        .route(
            "/:id",
            get(games::get_game)
                .put(games::update_game)
                .delete(games::cancel_game),
        )
        .route("/:id/complete", put(games::complete_game))
        .route("/:id/join", post(games::join_game))
        .route("/:id/leave", post(games::leave_game))
        .route("/:id/roster", get(games::get_roster))
}
