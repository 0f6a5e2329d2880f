use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};
use serde::Deserialize;
use serde_json::json;

use crate::engine::eligibility::{participants, unrated_participants, validate_submission};
use crate::errors::{AppError, Result};
use crate::handlers::parse_object_id;
use crate::handlers::users::{user_refs, user_views};
use crate::middleware::auth::CurrentUser;
use crate::models::game::Game;
use crate::models::rating::{Rating, RatingListEntry, RatingSummary, RatingView, SubmitRatingRequest};
use crate::state::AppState;

const PENDING_GAMES_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RatingAggRow {
    #[serde(rename = "_id")]
    user_id: ObjectId,
    avg_rating: f64,
    total_ratings: i64,
}

/// Live `$group` aggregation of received ratings for a set of users. Users
/// with no ratings are simply absent from the map.
pub(crate) async fn rating_summaries(
    db: &Database,
    user_ids: &[ObjectId],
) -> Result<HashMap<ObjectId, RatingSummary>> {
    use futures_util::TryStreamExt;

    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let pipeline = vec![
        doc! { "$match": { "toUserId": { "$in": user_ids.to_vec() } } },
        doc! { "$group": {
            "_id": "$toUserId",
            "avgRating": { "$avg": "$score" },
            "totalRatings": { "$sum": 1 },
        }},
    ];

    let ratings: Collection<Rating> = db.collection("ratings");
    let rows: Vec<Document> = ratings.aggregate(pipeline).await?.try_collect().await?;

    let mut summaries = HashMap::with_capacity(rows.len());
    for row in rows {
        let row: RatingAggRow = mongodb::bson::from_document(row)?;
        summaries.insert(
            row.user_id,
            RatingSummary {
                avg_rating: (row.avg_rating * 10.0).round() / 10.0,
                total_ratings: row.total_ratings,
            },
        );
    }
    Ok(summaries)
}

/// POST /api/ratings
pub async fn submit_rating(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<SubmitRatingRequest>,
) -> Result<impl IntoResponse> {
    let game_id = payload
        .game_id
        .as_deref()
        .and_then(|id| ObjectId::parse_str(id).ok())
        .ok_or_else(|| AppError::validation("Valid game ID is required"))?;
    let to_user_id = payload
        .to_user_id
        .as_deref()
        .and_then(|id| ObjectId::parse_str(id).ok())
        .ok_or_else(|| AppError::validation("Valid user ID to rate is required"))?;

    let games: Collection<Game> = state.db.collection("games");
    let game = games
        .find_one(doc! { "_id": game_id })
        .await?
        .ok_or_else(|| AppError::not_found("Game not found"))?;

    let comment = payload
        .comment
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .to_string();

    let ratings: Collection<Rating> = state.db.collection("ratings");
    let rated: HashSet<ObjectId> = {
        use futures_util::TryStreamExt;
        ratings
            .find(doc! { "fromUserId": current.id(), "gameId": game_id })
            .await?
            .try_collect::<Vec<Rating>>()
            .await?
            .into_iter()
            .map(|r| r.to_user_id)
            .collect()
    };

    let score = validate_submission(
        &game,
        current.id(),
        to_user_id,
        payload.score,
        &comment,
        &rated,
    )?;

    let rating = Rating {
        id: ObjectId::new(),
        game_id,
        from_user_id: current.id(),
        to_user_id,
        score,
        comment,
        created_at: Utc::now(),
    };
    ratings.insert_one(&rating).await.map_err(|e| {
        AppError::on_duplicate_key(e, "You have already rated this player for this game")
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Rating submitted successfully",
            "data": { "rating": RatingView::from_rating(&rating) },
        })),
    ))
}

/// GET /api/ratings/pending
///
/// Recently completed games the caller took part in, with the
/// co-participants they have not rated yet.
pub async fn pending_ratings(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse> {
    use futures_util::TryStreamExt;

    let viewer = current.id();
    let games: Collection<Game> = state.db.collection("games");
    let completed: Vec<Game> = games
        .find(doc! {
            "status": "completed",
            "$or": [ { "hostId": viewer }, { "players": viewer } ],
        })
        .sort(doc! { "date": -1 })
        .limit(PENDING_GAMES_LIMIT)
        .await?
        .try_collect()
        .await?;

    let game_ids: Vec<ObjectId> = completed.iter().map(|g| g.id).collect();
    let ratings: Collection<Rating> = state.db.collection("ratings");
    let given: Vec<Rating> = if game_ids.is_empty() {
        Vec::new()
    } else {
        ratings
            .find(doc! { "fromUserId": viewer, "gameId": { "$in": game_ids } })
            .await?
            .try_collect()
            .await?
    };

    let mut rated_by_game: HashMap<ObjectId, HashSet<ObjectId>> = HashMap::new();
    for rating in &given {
        rated_by_game
            .entry(rating.game_id)
            .or_default()
            .insert(rating.to_user_id);
    }

    let empty = HashSet::new();
    let mut pending: Vec<(&Game, Vec<ObjectId>)> = Vec::new();
    for game in &completed {
        if !game.is_participant(viewer) {
            continue;
        }
        let rated = rated_by_game.get(&game.id).unwrap_or(&empty);
        let unrated = unrated_participants(game, viewer, rated);
        if !unrated.is_empty() {
            pending.push((game, unrated));
        }
    }

    let mut unrated_ids: Vec<ObjectId> = pending.iter().flat_map(|(_, u)| u.clone()).collect();
    unrated_ids.sort_unstable();
    unrated_ids.dedup();
    let users = user_views(&state.db, &unrated_ids).await?;

    let entries: Vec<_> = pending
        .iter()
        .map(|(game, unrated)| {
            let total = participants(game).len();
            let unrated_players: Vec<_> = unrated
                .iter()
                .filter_map(|id| users.get(id).cloned())
                .collect();
            json!({
                "game": {
                    "id": game.id.to_hex(),
                    "title": game.title,
                    "sport": game.sport,
                    "date": game.date,
                    "location": game.location,
                },
                "unratedPlayers": unrated_players,
                "ratedCount": total - 1 - unrated.len(),
                "totalParticipants": total,
            })
        })
        .collect();

    let total_games = entries.len();
    Ok(Json(json!({
        "success": true,
        "data": {
            "pendingRatings": entries,
            "totalGamesWithPending": total_games,
        },
    })))
}

/// GET /api/ratings/game/:game_id
pub async fn game_ratings(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<impl IntoResponse> {
    use futures_util::TryStreamExt;

    let game_id = parse_object_id(&game_id, "game ID")?;
    let games: Collection<Game> = state.db.collection("games");
    let game = games
        .find_one(doc! { "_id": game_id })
        .await?
        .ok_or_else(|| AppError::not_found("Game not found"))?;

    let ratings: Collection<Rating> = state.db.collection("ratings");
    let found: Vec<Rating> = ratings
        .find(doc! { "gameId": game_id })
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;

    let mut user_ids: Vec<ObjectId> = found
        .iter()
        .flat_map(|r| [r.from_user_id, r.to_user_id])
        .collect();
    user_ids.sort_unstable();
    user_ids.dedup();
    let refs = user_refs(&state.db, &user_ids).await?;

    let entries: Vec<RatingListEntry> = found
        .iter()
        .map(|rating| RatingListEntry {
            id: rating.id.to_hex(),
            score: rating.score,
            comment: rating.comment.clone(),
            created_at: rating.created_at,
            from_user: refs.get(&rating.from_user_id).cloned(),
            to_user: refs.get(&rating.to_user_id).cloned(),
            game: None,
        })
        .collect();

    let total = entries.len();
    Ok(Json(json!({
        "success": true,
        "data": {
            "game": {
                "id": game.id.to_hex(),
                "title": game.title,
                "sport": game.sport,
                "date": game.date,
            },
            "ratings": entries,
            "totalRatings": total,
        },
    })))
}
