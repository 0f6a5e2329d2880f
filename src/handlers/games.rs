use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use mongodb::Collection;
use serde::Serialize;
use serde_json::json;

use crate::engine::lifecycle::{
    self, ensure_cancellable, ensure_completable, ensure_host, plan_join, plan_leave, JoinOutcome,
    LeaveOutcome, RosterUpdate,
};
use crate::errors::{AppError, Result};
use crate::handlers::users::{user_views, user_views_rated};
use crate::handlers::{page_params, parse_object_id, regex_escape};
use crate::middleware::auth::CurrentUser;
use crate::models::game::{
    CreateGameRequest, Game, GameDetailView, GameListQuery, GameStatus, GameSummaryView, Sport,
    UpdateGameRequest,
};
use crate::models::user::UserView;
use crate::models::Pagination;
use crate::state::AppState;

const SORT_FIELDS: [&str; 4] = ["date", "createdAt", "sport", "title"];

fn games_collection(state: &AppState) -> Collection<Game> {
    state.db.collection("games")
}

fn parse_query_date(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| AppError::validation("Invalid date format"))
}

fn build_list_filter(query: &GameListQuery) -> Result<Document> {
    let mut filter = Document::new();

    if let Some(sport) = query.sport.as_deref().filter(|s| !s.is_empty()) {
        let sports = sport
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Sport::parse(s).map(|sport| Bson::from(sport.as_str())).ok_or_else(|| {
                    AppError::validation(format!(
                        "Invalid sport. Must be one of: {}",
                        Sport::allowed_list()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        match sports.as_slice() {
            [] => {}
            [one] => {
                filter.insert("sport", one.clone());
            }
            many => {
                filter.insert("sport", doc! { "$in": many.to_vec() });
            }
        }
    }

    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status = GameStatus::parse(status)
            .ok_or_else(|| AppError::validation("Invalid status"))?;
        filter.insert("status", status.as_str());
    }

    if let Some(city) = query.city.as_deref().filter(|c| !c.is_empty()) {
        filter.insert(
            "location.city",
            doc! { "$regex": regex_escape(city), "$options": "i" },
        );
    }

    let mut date_range = Document::new();
    if let Some(start) = query.start_date.as_deref().filter(|d| !d.is_empty()) {
        date_range.insert("$gte", BsonDateTime::from_chrono(parse_query_date(start)?));
    }
    if let Some(end) = query.end_date.as_deref().filter(|d| !d.is_empty()) {
        date_range.insert("$lte", BsonDateTime::from_chrono(parse_query_date(end)?));
    }
    if !date_range.is_empty() {
        filter.insert("date", date_range);
    }

    if let Some(host_id) = query.host_id.as_deref().filter(|h| !h.is_empty()) {
        filter.insert("hostId", parse_object_id(host_id, "host ID")?);
    }

    if let Some(player_id) = query.player_id.as_deref().filter(|p| !p.is_empty()) {
        filter.insert("players", parse_object_id(player_id, "player ID")?);
    }

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = doc! { "$regex": regex_escape(search), "$options": "i" };
        filter.insert(
            "$or",
            vec![
                doc! { "title": pattern.clone() },
                doc! { "description": pattern.clone() },
                doc! { "location.name": pattern },
            ],
        );
    }

    Ok(filter)
}

fn build_sort(sort_by: Option<&str>, sort_order: Option<&str>) -> Document {
    let field = sort_by
        .filter(|f| SORT_FIELDS.contains(f))
        .unwrap_or("date");
    let direction: i32 = if sort_order == Some("desc") { -1 } else { 1 };
    let mut sort = Document::new();
    sort.insert(field, direction);
    sort
}

/// GET /api/games
pub async fn list_games(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
    Query(query): Query<GameListQuery>,
) -> Result<impl IntoResponse> {
    use futures_util::TryStreamExt;

    let filter = build_list_filter(&query)?;
    let sort = build_sort(query.sort_by.as_deref(), query.sort_order.as_deref());
    let (page, limit, skip) = page_params(query.page, query.limit);

    let games = games_collection(&state);
    let total = games.count_documents(filter.clone()).await?;
    let results: Vec<Game> = games
        .find(filter)
        .sort(sort)
        .skip(skip)
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let mut host_ids: Vec<ObjectId> = results.iter().map(|g| g.host_id).collect();
    host_ids.sort_unstable();
    host_ids.dedup();
    let hosts = user_views(&state.db, &host_ids).await?;

    let viewer = current.map(|c| c.id());
    let views: Vec<GameSummaryView> = results
        .iter()
        .map(|game| GameSummaryView::from_game(game, hosts.get(&game.host_id).cloned(), viewer))
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "games": views,
            "pagination": Pagination::new(page, limit, total),
        },
    })))
}

async fn load_game(state: &AppState, id: &str) -> Result<Game> {
    let id = parse_object_id(id, "game ID")?;
    games_collection(state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Game not found"))
}

/// GET /api/games/:id
pub async fn get_game(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let game = load_game(&state, &id).await?;

    let mut ids = vec![game.host_id];
    ids.extend(game.players.iter().copied());
    ids.extend(game.waitlist.iter().copied());
    ids.sort_unstable();
    ids.dedup();
    let users = user_views_rated(&state.db, &ids).await?;

    let resolve = |id: &ObjectId| users.get(id).cloned();
    let players: Vec<UserView> = game.players.iter().filter_map(resolve).collect();
    let waitlist: Vec<UserView> = game.waitlist.iter().filter_map(resolve).collect();
    let host = users.get(&game.host_id).cloned();

    let viewer = current.map(|c| c.id());
    let view = GameDetailView::from_game(&game, host, players, waitlist, viewer);

    Ok(Json(json!({ "success": true, "data": { "game": view } })))
}

/// POST /api/games
pub async fn create_game(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CreateGameRequest>,
) -> Result<impl IntoResponse> {
    let game = lifecycle::validate_new_game(&payload, current.id(), Utc::now())?;
    games_collection(&state).insert_one(&game).await?;

    let host = UserView::from_user(&current.0);
    let view = GameSummaryView::from_game(&game, Some(host), Some(current.id()));

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Game created successfully",
            "data": { "game": view },
        })),
    ))
}

/// PUT /api/games/:id
pub async fn update_game(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateGameRequest>,
) -> Result<impl IntoResponse> {
    let game = load_game(&state, &id).await?;
    let changes = lifecycle::validate_update(&game, &payload, current.id(), Utc::now())?;

    let mut set = doc! { "updatedAt": BsonDateTime::from_chrono(Utc::now()) };
    if let Some(sport) = changes.sport {
        set.insert("sport", sport.as_str());
    }
    if let Some(title) = changes.title {
        set.insert("title", title);
    }
    if let Some(description) = changes.description {
        set.insert("description", description);
    }
    if let Some(location) = changes.location {
        set.insert("location", mongodb::bson::to_bson(&location)?);
    }
    if let Some(date) = changes.date {
        set.insert("date", BsonDateTime::from_chrono(date));
    }
    if let Some(max) = changes.max_players {
        set.insert("maxPlayers", max);
    }
    if let Some(min) = changes.min_players {
        set.insert("minPlayers", min);
    }
    if let Some(skill) = changes.skill_level {
        set.insert("skillLevel", skill.as_str());
    }

    let updated = games_collection(&state)
        .find_one_and_update(doc! { "_id": game.id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Game not found"))?;

    let host = UserView::from_user(&current.0);
    let view = GameSummaryView::from_game(&updated, Some(host), Some(current.id()));

    Ok(Json(json!({
        "success": true,
        "message": "Game updated successfully",
        "data": { "game": view },
    })))
}

/// DELETE /api/games/:id (soft cancel)
pub async fn cancel_game(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let game = load_game(&state, &id).await?;
    ensure_host(&game, current.id(), "cancel")?;
    ensure_cancellable(&game)?;

    set_status(&state, &game, GameStatus::Cancelled).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Game cancelled successfully",
    })))
}

/// PUT /api/games/:id/complete
pub async fn complete_game(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let game = load_game(&state, &id).await?;
    ensure_host(&game, current.id(), "complete")?;
    ensure_completable(&game)?;

    set_status(&state, &game, GameStatus::Completed).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Game marked as completed. Players can now rate each other!",
    })))
}

/// Moves an upcoming game to a terminal status. The filter pins the prior
/// status so a concurrent transition loses cleanly.
async fn set_status(state: &AppState, game: &Game, status: GameStatus) -> Result<()> {
    let result = games_collection(state)
        .update_one(
            doc! { "_id": game.id, "status": GameStatus::Upcoming.as_str() },
            doc! { "$set": {
                "status": status.as_str(),
                "updatedAt": BsonDateTime::from_chrono(Utc::now()),
            }},
        )
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::conflict(
            "Game was updated concurrently. Please try again.",
        ));
    }
    Ok(())
}

/// Writes new roster and waitlist snapshots, guarded by the snapshots the
/// plan was computed from. A miss means a concurrent join or leave won.
async fn apply_roster_update(state: &AppState, game: &Game, update: &RosterUpdate) -> Result<()> {
    let result = games_collection(state)
        .update_one(
            doc! {
                "_id": game.id,
                "status": GameStatus::Upcoming.as_str(),
                "players": mongodb::bson::to_bson(&game.players)?,
                "waitlist": mongodb::bson::to_bson(&game.waitlist)?,
            },
            doc! { "$set": {
                "players": mongodb::bson::to_bson(&update.players)?,
                "waitlist": mongodb::bson::to_bson(&update.waitlist)?,
                "updatedAt": BsonDateTime::from_chrono(Utc::now()),
            }},
        )
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::conflict(
            "Game was updated concurrently. Please try again.",
        ));
    }
    Ok(())
}

fn join_response(outcome: JoinOutcome) -> serde_json::Value {
    match outcome {
        JoinOutcome::Joined => json!({
            "success": true,
            "message": "Successfully joined the game",
            "data": { "status": "joined" },
        }),
        JoinOutcome::Waitlisted { position } => json!({
            "success": true,
            "message": format!("Added to waitlist (position #{position})"),
            "data": { "status": "waitlisted", "position": position },
        }),
    }
}

fn leave_response(outcome: LeaveOutcome) -> serde_json::Value {
    match outcome {
        LeaveOutcome::LeftWaitlist => json!({
            "success": true,
            "message": "Successfully removed from waitlist",
        }),
        LeaveOutcome::LeftRoster { promoted } => json!({
            "success": true,
            "message": "Successfully left the game",
            "data": {
                "promotedFromWaitlist": promoted.is_some(),
                "promotedUserId": promoted.map(|id| id.to_hex()),
            },
        }),
    }
}

/// POST /api/games/:id/join
pub async fn join_game(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let game = load_game(&state, &id).await?;
    let (update, outcome) = plan_join(&game, current.id(), Utc::now())?;
    apply_roster_update(&state, &game, &update).await?;

    Ok(Json(join_response(outcome)))
}

/// POST /api/games/:id/leave
pub async fn leave_game(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let game = load_game(&state, &id).await?;
    let (update, outcome) = plan_leave(&game, current.id())?;
    apply_roster_update(&state, &game, &update).await?;

    Ok(Json(leave_response(outcome)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WaitlistEntry {
    #[serde(flatten)]
    user: UserView,
    position: usize,
}

/// GET /api/games/:id/roster
pub async fn get_roster(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let game = load_game(&state, &id).await?;

    let mut ids = vec![game.host_id];
    ids.extend(game.players.iter().copied());
    ids.extend(game.waitlist.iter().copied());
    ids.sort_unstable();
    ids.dedup();
    let users = user_views(&state.db, &ids).await?;

    let host = users.get(&game.host_id).cloned();
    let players: Vec<UserView> = game
        .players
        .iter()
        .filter_map(|id| users.get(id).cloned())
        .collect();
    let waitlist: Vec<WaitlistEntry> = game
        .waitlist
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            users.get(id).cloned().map(|user| WaitlistEntry {
                user,
                position: i + 1,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "host": host,
            "players": players,
            "waitlist": waitlist,
            "playerCount": game.player_count(),
            "waitlistCount": game.waitlist.len(),
            "maxPlayers": game.max_players,
            "spotsAvailable": game.spots_available(),
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_defaults_to_date_ascending_and_whitelists_fields() {
        assert_eq!(build_sort(None, None), doc! { "date": 1 });
        assert_eq!(build_sort(Some("title"), Some("desc")), doc! { "title": -1 });
        assert_eq!(build_sort(Some("hostId"), None), doc! { "date": 1 });
        assert_eq!(build_sort(Some("createdAt"), Some("asc")), doc! { "createdAt": 1 });
    }

    #[test]
    fn list_filter_validates_inputs() {
        let query = GameListQuery {
            sport: Some("Soccer, Tennis".to_string()),
            status: Some("upcoming".to_string()),
            city: None,
            start_date: None,
            end_date: None,
            host_id: None,
            player_id: None,
            search: None,
            page: None,
            limit: None,
            sort_by: None,
            sort_order: None,
        };
        let filter = build_list_filter(&query).unwrap();
        assert_eq!(filter.get_str("status").unwrap(), "upcoming");
        assert!(filter.get_document("sport").unwrap().contains_key("$in"));

        let bad_sport = GameListQuery {
            sport: Some("Hockey".to_string()),
            ..query_defaults()
        };
        assert!(matches!(
            build_list_filter(&bad_sport),
            Err(AppError::Validation(_))
        ));

        let bad_date = GameListQuery {
            start_date: Some("tomorrow".to_string()),
            ..query_defaults()
        };
        assert!(matches!(
            build_list_filter(&bad_date),
            Err(AppError::Validation(_))
        ));

        let bad_host = GameListQuery {
            host_id: Some("xyz".to_string()),
            ..query_defaults()
        };
        assert!(matches!(
            build_list_filter(&bad_host),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn leave_response_reports_promotion_as_a_flag() {
        let promoted = ObjectId::new();
        let body = leave_response(LeaveOutcome::LeftRoster {
            promoted: Some(promoted),
        });
        assert_eq!(body["data"]["promotedFromWaitlist"], json!(true));
        assert_eq!(body["data"]["promotedUserId"], json!(promoted.to_hex()));

        let body = leave_response(LeaveOutcome::LeftRoster { promoted: None });
        assert_eq!(body["data"]["promotedFromWaitlist"], json!(false));
        assert!(body["data"]["promotedUserId"].is_null());

        let body = leave_response(LeaveOutcome::LeftWaitlist);
        assert_eq!(body["message"], json!("Successfully removed from waitlist"));
    }

    #[test]
    fn join_response_carries_the_waitlist_position() {
        let body = join_response(JoinOutcome::Waitlisted { position: 3 });
        assert_eq!(body["data"]["status"], json!("waitlisted"));
        assert_eq!(body["data"]["position"], json!(3));
        assert_eq!(body["message"], json!("Added to waitlist (position #3)"));

        let body = join_response(JoinOutcome::Joined);
        assert_eq!(body["data"]["status"], json!("joined"));
    }

    fn query_defaults() -> GameListQuery {
        GameListQuery {
            sport: None,
            status: None,
            city: None,
            start_date: None,
            end_date: None,
            host_id: None,
            player_id: None,
            search: None,
            page: None,
            limit: None,
            sort_by: None,
            sort_order: None,
        }
    }

}
