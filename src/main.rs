use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::{response::Json, routing::get, Router};
use mongodb::bson::doc;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod database;
mod engine;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod state;

use config::AppConfig;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env()?;

    let db = database::connection::connect(&config.mongodb_uri).await?;
    let app_state = AppState::new(db, config.jwt_secret.clone());

    let app = build_router(app_state, &config);
    start_server(app, &config).await
}

fn build_router(app_state: AppState, config: &AppConfig) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.cors_origins.is_empty() {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/auth", routes::auth::routes())
        .nest("/api/games", routes::games::routes())
        .nest("/api/users", routes::users::routes())
        .nest("/api/ratings", routes::ratings::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state.db.run_command(doc! { "ping": 1 }).await.is_ok();
    Json(json!({
        "success": true,
        "status": "ok",
        "database": if db_ok { "connected" } else { "unreachable" },
        "timestamp": chrono::Utc::now(),
    }))
}

async fn start_server(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Server starting on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
