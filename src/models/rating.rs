use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::models::game::{Game, Sport};

/// Rating document in the `ratings` collection. Immutable once written;
/// uniqueness of (fromUserId, toUserId, gameId) is enforced by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub game_id: ObjectId,
    pub from_user_id: ObjectId,
    pub to_user_id: ObjectId,
    pub score: i32,
    #[serde(default)]
    pub comment: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingRequest {
    pub game_id: Option<String>,
    pub to_user_id: Option<String>,
    /// Accepted as a float so a fractional score fails with the engine's
    /// message rather than a type error.
    pub score: Option<f64>,
    pub comment: Option<String>,
}

/// Live-aggregated rating stats for one user (`$avg` / `$sum` on read).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub avg_rating: f64,
    pub total_ratings: i64,
}

/// Rating as returned from POST /api/ratings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingView {
    pub id: String,
    pub game_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub score: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl RatingView {
    pub fn from_rating(rating: &Rating) -> Self {
        RatingView {
            id: rating.id.to_hex(),
            game_id: rating.game_id.to_hex(),
            from_user_id: rating.from_user_id.to_hex(),
            to_user_id: rating.to_user_id.to_hex(),
            score: rating.score,
            comment: rating.comment.clone(),
            created_at: rating.created_at,
        }
    }
}

/// Minimal user reference embedded in rating listings.
#[derive(Debug, Clone, Serialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

/// Minimal game reference embedded in rating listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    pub id: String,
    pub title: String,
    pub sport: Sport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl GameRef {
    pub fn from_game(game: &Game, with_date: bool) -> Self {
        GameRef {
            id: game.id.to_hex(),
            title: game.title.clone(),
            sport: game.sport,
            date: with_date.then_some(game.date),
        }
    }
}

/// One rating with its rater (and optionally its game) resolved.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingListEntry {
    pub id: String,
    pub score: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub from_user: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameRef>,
}
