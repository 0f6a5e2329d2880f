use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use serde::Deserialize;
use serde_json::json;

use crate::errors::{AppError, Result};
use crate::handlers::ratings::rating_summaries;
use crate::handlers::{page_params, parse_object_id, regex_escape};
use crate::middleware::auth::CurrentUser;
use crate::models::game::{Game, GameStatus, GameSummaryView, Sport};
use crate::models::rating::{GameRef, Rating, RatingListEntry, RatingSummary, UserRef};
use crate::models::user::{
    filter_skill_levels, filter_sports, UpdateProfileRequest, User, UserListQuery, UserView,
};
use crate::models::Pagination;
use crate::state::AppState;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const BIO_MAX: usize = 500;
const RECENT_RATINGS_LIMIT: i64 = 10;

async fn find_users(db: &Database, ids: &[ObjectId]) -> Result<Vec<User>> {
    use futures_util::TryStreamExt;

    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let users: Collection<User> = db.collection("users");
    Ok(users
        .find(doc! { "_id": { "$in": ids.to_vec() } })
        .await?
        .try_collect()
        .await?)
}

/// Public views for a set of users, keyed by id.
pub(crate) async fn user_views(
    db: &Database,
    ids: &[ObjectId],
) -> Result<HashMap<ObjectId, UserView>> {
    Ok(find_users(db, ids)
        .await?
        .iter()
        .map(|u| (u.id, UserView::from_user(u)))
        .collect())
}

/// Same as [`user_views`] but with live rating summaries attached.
pub(crate) async fn user_views_rated(
    db: &Database,
    ids: &[ObjectId],
) -> Result<HashMap<ObjectId, UserView>> {
    let mut views = user_views(db, ids).await?;
    let summaries = rating_summaries(db, ids).await?;
    for (id, summary) in summaries {
        if let Some(view) = views.remove(&id) {
            views.insert(id, view.with_rating(summary));
        }
    }
    Ok(views)
}

/// Name-only references for embedding in rating listings.
pub(crate) async fn user_refs(
    db: &Database,
    ids: &[ObjectId],
) -> Result<HashMap<ObjectId, UserRef>> {
    Ok(find_users(db, ids)
        .await?
        .into_iter()
        .map(|u| {
            (
                u.id,
                UserRef {
                    id: u.id.to_hex(),
                    name: u.name,
                },
            )
        })
        .collect())
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse> {
    use futures_util::TryStreamExt;

    let mut filter = Document::new();
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        filter.insert(
            "name",
            doc! { "$regex": regex_escape(search), "$options": "i" },
        );
    }
    if let Some(sport) = query.sport.as_deref().filter(|s| !s.is_empty()) {
        let sport = Sport::parse(sport).ok_or_else(|| {
            AppError::validation(format!(
                "Invalid sport. Must be one of: {}",
                Sport::allowed_list()
            ))
        })?;
        filter.insert("sports", sport.as_str());
    }

    let (page, limit, skip) = page_params(query.page, query.limit);
    let users: Collection<User> = state.db.collection("users");
    let total = users.count_documents(filter.clone()).await?;
    let found: Vec<User> = users
        .find(filter)
        .sort(doc! { "name": 1 })
        .skip(skip)
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let ids: Vec<ObjectId> = found.iter().map(|u| u.id).collect();
    let summaries = rating_summaries(&state.db, &ids).await?;

    let views: Vec<UserView> = found
        .iter()
        .map(|user| {
            let summary = summaries.get(&user.id).copied().unwrap_or_default();
            UserView::from_user(user).with_rating(summary)
        })
        .filter(|view| match (query.min_rating, &view.rating) {
            (Some(min), Some(rating)) => {
                rating.total_ratings == 0 || rating.avg_rating >= min
            }
            _ => true,
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "users": views,
            "pagination": Pagination::new(page, limit, total),
        },
    })))
}

fn user_stats(
    summary: RatingSummary,
    distribution: HashMap<String, i64>,
    games_hosted: u64,
    games_played: u64,
) -> serde_json::Value {
    json!({
        "avgRating": summary.avg_rating,
        "totalRatings": summary.total_ratings,
        "ratingDistribution": distribution,
        "gamesHosted": games_hosted,
        "gamesPlayed": games_played,
    })
}

async fn load_user(state: &AppState, id: &str) -> Result<User> {
    let id = parse_object_id(id, "user ID")?;
    state
        .db
        .collection::<User>("users")
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    use futures_util::TryStreamExt;

    let user = load_user(&state, &id).await?;

    let summary = rating_summaries(&state.db, &[user.id])
        .await?
        .remove(&user.id)
        .unwrap_or_default();

    // Per-score breakdown of received ratings.
    let ratings: Collection<Rating> = state.db.collection("ratings");
    let rows: Vec<Document> = ratings
        .aggregate(vec![
            doc! { "$match": { "toUserId": user.id } },
            doc! { "$group": { "_id": "$score", "count": { "$sum": 1 } } },
        ])
        .await?
        .try_collect()
        .await?;
    let mut distribution: HashMap<String, i64> =
        (1..=5).map(|s| (s.to_string(), 0)).collect();
    for row in rows {
        let score = row.get_i32("_id").unwrap_or(0);
        let count = row.get_i32("count").map(i64::from).unwrap_or(0);
        if (1..=5).contains(&score) {
            distribution.insert(score.to_string(), count);
        }
    }

    let games: Collection<Game> = state.db.collection("games");
    let games_hosted = games.count_documents(doc! { "hostId": user.id }).await?;
    let games_played = games
        .count_documents(doc! { "players": user.id, "status": "completed" })
        .await?;

    let recent: Vec<Rating> = ratings
        .find(doc! { "toUserId": user.id })
        .sort(doc! { "createdAt": -1 })
        .limit(RECENT_RATINGS_LIMIT)
        .await?
        .try_collect()
        .await?;

    let mut rater_ids: Vec<ObjectId> = recent.iter().map(|r| r.from_user_id).collect();
    rater_ids.sort_unstable();
    rater_ids.dedup();
    let raters = user_refs(&state.db, &rater_ids).await?;

    let mut game_ids: Vec<ObjectId> = recent.iter().map(|r| r.game_id).collect();
    game_ids.sort_unstable();
    game_ids.dedup();
    let rated_games: HashMap<ObjectId, Game> = if game_ids.is_empty() {
        HashMap::new()
    } else {
        games
            .find(doc! { "_id": { "$in": game_ids } })
            .await?
            .try_collect::<Vec<Game>>()
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect()
    };

    let recent_ratings: Vec<RatingListEntry> = recent
        .iter()
        .map(|rating| RatingListEntry {
            id: rating.id.to_hex(),
            score: rating.score,
            comment: rating.comment.clone(),
            created_at: rating.created_at,
            from_user: raters.get(&rating.from_user_id).cloned(),
            to_user: None,
            game: rated_games
                .get(&rating.game_id)
                .map(|g| GameRef::from_game(g, true)),
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "user": UserView::from_user(&user).with_rating(summary),
            "stats": user_stats(summary, distribution, games_hosted, games_played),
            "recentRatings": recent_ratings,
        },
    })))
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse> {
    let user_id = parse_object_id(&id, "user ID")?;
    if user_id != current.id() {
        return Err(AppError::authorization(
            "You can only update your own profile",
        ));
    }

    let mut set = doc! { "updatedAt": BsonDateTime::from_chrono(Utc::now()) };

    if let Some(name) = payload.name.as_deref() {
        let name = name.trim();
        if !(NAME_MIN..=NAME_MAX).contains(&name.chars().count()) {
            return Err(AppError::validation(
                "Name must be between 2 and 50 characters",
            ));
        }
        set.insert("name", name);
    }

    if let Some(bio) = payload.bio.as_deref() {
        let bio = bio.trim();
        if bio.chars().count() > BIO_MAX {
            return Err(AppError::validation("Bio must be 500 characters or less"));
        }
        set.insert("bio", bio);
    }

    if let Some(sports) = payload.sports.as_deref() {
        set.insert("sports", mongodb::bson::to_bson(&filter_sports(sports))?);
    }

    if let Some(levels) = payload.skill_levels.as_ref() {
        set.insert(
            "skillLevels",
            mongodb::bson::to_bson(&filter_skill_levels(levels))?,
        );
    }

    if let Some(avatar_url) = payload.avatar_url.as_deref() {
        set.insert("avatarUrl", avatar_url.trim());
    }

    let users: Collection<User> = state.db.collection("users");
    let updated = users
        .find_one_and_update(doc! { "_id": user_id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Profile updated successfully",
        "data": { "user": UserView::from_user(&updated) },
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGamesQuery {
    pub role: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/users/:id/games
pub async fn user_games(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserGamesQuery>,
) -> Result<impl IntoResponse> {
    use futures_util::TryStreamExt;

    let user = load_user(&state, &id).await?;

    let mut filter = match query.role.as_deref() {
        Some("host") => doc! { "hostId": user.id },
        Some("player") => doc! { "players": user.id },
        _ => doc! { "$or": [ { "hostId": user.id }, { "players": user.id } ] },
    };
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status = GameStatus::parse(status)
            .ok_or_else(|| AppError::validation("Invalid status"))?;
        filter.insert("status", status.as_str());
    }

    let (page, limit, skip) = page_params(query.page, query.limit);
    let games: Collection<Game> = state.db.collection("games");
    let total = games.count_documents(filter.clone()).await?;
    let found: Vec<Game> = games
        .find(filter)
        .sort(doc! { "date": -1 })
        .skip(skip)
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let mut host_ids: Vec<ObjectId> = found.iter().map(|g| g.host_id).collect();
    host_ids.sort_unstable();
    host_ids.dedup();
    let hosts = user_views(&state.db, &host_ids).await?;

    let views = found
        .iter()
        .map(|game| {
            let view =
                GameSummaryView::from_game(game, hosts.get(&game.host_id).cloned(), None);
            let role = if game.host_id == user.id { "host" } else { "player" };
            let mut value = serde_json::to_value(view)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("role".to_string(), json!(role));
            }
            Ok(value)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "games": views,
            "pagination": Pagination::new(page, limit, total),
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct UserRatingsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/users/:id/ratings
pub async fn user_ratings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserRatingsQuery>,
) -> Result<impl IntoResponse> {
    use futures_util::TryStreamExt;

    let user = load_user(&state, &id).await?;

    let (page, limit, skip) = page_params(query.page, query.limit);
    let ratings: Collection<Rating> = state.db.collection("ratings");
    let filter = doc! { "toUserId": user.id };
    let total = ratings.count_documents(filter.clone()).await?;
    let found: Vec<Rating> = ratings
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .skip(skip)
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let mut rater_ids: Vec<ObjectId> = found.iter().map(|r| r.from_user_id).collect();
    rater_ids.sort_unstable();
    rater_ids.dedup();
    let raters = user_refs(&state.db, &rater_ids).await?;

    let mut game_ids: Vec<ObjectId> = found.iter().map(|r| r.game_id).collect();
    game_ids.sort_unstable();
    game_ids.dedup();
    let games: Collection<Game> = state.db.collection("games");
    let rated_games: HashMap<ObjectId, Game> = if game_ids.is_empty() {
        HashMap::new()
    } else {
        games
            .find(doc! { "_id": { "$in": game_ids } })
            .await?
            .try_collect::<Vec<Game>>()
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect()
    };

    let entries: Vec<RatingListEntry> = found
        .iter()
        .map(|rating| RatingListEntry {
            id: rating.id.to_hex(),
            score: rating.score,
            comment: rating.comment.clone(),
            created_at: rating.created_at,
            from_user: raters.get(&rating.from_user_id).cloned(),
            to_user: None,
            game: rated_games
                .get(&rating.game_id)
                .map(|g| GameRef::from_game(g, true)),
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "ratings": entries,
            "pagination": Pagination::new(page, limit, total),
        },
    })))
}
