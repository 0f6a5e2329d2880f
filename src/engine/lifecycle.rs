//! Game lifecycle engine: create/update validation, host and status guards,
//! and join/leave planning over the roster and waitlist.
//!
//! States are upcoming -> completed | cancelled, both terminal. Roster and
//! waitlist only mutate while upcoming. Planning functions return new
//! snapshots of both arrays; the caller writes them back with a
//! compare-and-swap so concurrent joins/leaves cannot lose updates.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};
use crate::models::game::{
    CreateGameRequest, Game, GameStatus, Location, LocationInput, SkillLevel, Sport,
    UpdateGameRequest,
};

use super::roster::OrderedIds;

const TITLE_MIN: usize = 3;
const TITLE_MAX: usize = 100;
const MAX_PLAYERS_MIN: i32 = 2;
const MAX_PLAYERS_MAX: i32 = 50;
const DEFAULT_MAX_PLAYERS: i32 = 10;
const DEFAULT_MIN_PLAYERS: i32 = 2;

fn parse_sport(s: &str) -> Result<Sport> {
    Sport::parse(s).ok_or_else(|| {
        AppError::validation(format!(
            "Invalid sport. Must be one of: {}",
            Sport::allowed_list()
        ))
    })
}

fn parse_skill_level(s: &str) -> Result<SkillLevel> {
    SkillLevel::parse(s).ok_or_else(|| {
        AppError::validation(format!(
            "Invalid skill level. Must be one of: {}",
            SkillLevel::allowed_list()
        ))
    })
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| AppError::validation("Invalid date format"))
}

fn parse_future_date(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let date = parse_date(s)?;
    if date <= now {
        return Err(AppError::validation("Game date must be in the future"));
    }
    Ok(date)
}

fn validate_title(title: &str) -> Result<String> {
    let len = title.chars().count();
    if !(TITLE_MIN..=TITLE_MAX).contains(&len) {
        return Err(AppError::validation(
            "Title must be between 3 and 100 characters",
        ));
    }
    Ok(title.trim().to_string())
}

fn validate_max_players(max: i32) -> Result<i32> {
    if !(MAX_PLAYERS_MIN..=MAX_PLAYERS_MAX).contains(&max) {
        return Err(AppError::validation(
            "Max players must be between 2 and 50",
        ));
    }
    Ok(max)
}

fn validate_min_players(min: i32, max: i32) -> Result<i32> {
    if min < 1 || min > max {
        return Err(AppError::validation(
            "Min players must be at least 1 and not exceed max",
        ));
    }
    Ok(min)
}

/// Resolves a location payload, falling back to `prev` for the optional
/// fields on update.
fn validate_location(input: &LocationInput, prev: Option<&Location>) -> Result<Location> {
    let name = input.name.as_deref().map(str::trim).unwrap_or("");
    let city = input.city.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() || city.is_empty() {
        return Err(AppError::validation("Location name and city are required"));
    }
    Ok(Location {
        name: name.to_string(),
        address: input
            .address
            .as_deref()
            .map(|a| a.trim().to_string())
            .or_else(|| prev.map(|p| p.address.clone()))
            .unwrap_or_default(),
        city: city.to_string(),
        coordinates: input
            .coordinates
            .or_else(|| prev.and_then(|p| p.coordinates)),
    })
}

/// Validates a creation request and builds the initial upcoming game with an
/// empty roster and waitlist.
pub fn validate_new_game(
    req: &CreateGameRequest,
    host_id: ObjectId,
    now: DateTime<Utc>,
) -> Result<Game> {
    let sport = parse_sport(req.sport.as_deref().unwrap_or(""))?;
    let title = validate_title(req.title.as_deref().unwrap_or(""))?;

    let location = req
        .location
        .as_ref()
        .ok_or_else(|| AppError::validation("Location name and city are required"))?;
    let location = validate_location(location, None)?;

    let date = req
        .date
        .as_deref()
        .ok_or_else(|| AppError::validation("Date is required"))?;
    let date = parse_future_date(date, now)?;

    let max_players = validate_max_players(req.max_players.unwrap_or(DEFAULT_MAX_PLAYERS))?;
    let min_players =
        validate_min_players(req.min_players.unwrap_or(DEFAULT_MIN_PLAYERS), max_players)?;

    let skill_level = match req.skill_level.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => parse_skill_level(s)?,
        None => SkillLevel::AllLevels,
    };

    Ok(Game {
        id: ObjectId::new(),
        host_id,
        sport,
        title,
        description: req
            .description
            .as_deref()
            .map(|d| d.trim().to_string())
            .unwrap_or_default(),
        location,
        date,
        max_players,
        min_players,
        players: OrderedIds::new(),
        waitlist: OrderedIds::new(),
        status: GameStatus::Upcoming,
        skill_level,
        created_at: now,
        updated_at: now,
    })
}

/// Validated patch produced by [`validate_update`].
#[derive(Debug, Default, PartialEq)]
pub struct GameChanges {
    pub sport: Option<Sport>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<Location>,
    pub date: Option<DateTime<Utc>>,
    pub max_players: Option<i32>,
    pub min_players: Option<i32>,
    pub skill_level: Option<SkillLevel>,
}

/// Validates a partial update by the host of an upcoming game. maxPlayers
/// can never drop below the current roster size.
pub fn validate_update(
    game: &Game,
    req: &UpdateGameRequest,
    actor: ObjectId,
    now: DateTime<Utc>,
) -> Result<GameChanges> {
    ensure_host(game, actor, "edit")?;
    if game.status != GameStatus::Upcoming {
        return Err(AppError::invalid_state(
            "Cannot edit a completed or cancelled game",
        ));
    }

    let mut changes = GameChanges::default();

    if let Some(sport) = req.sport.as_deref().filter(|s| !s.is_empty()) {
        changes.sport = Some(parse_sport(sport)?);
    }

    if let Some(title) = req.title.as_deref().filter(|t| !t.is_empty()) {
        changes.title = Some(validate_title(title)?);
    }

    if let Some(description) = req.description.as_deref() {
        changes.description = Some(description.trim().to_string());
    }

    if let Some(location) = &req.location {
        changes.location = Some(validate_location(location, Some(&game.location))?);
    }

    if let Some(date) = req.date.as_deref().filter(|d| !d.is_empty()) {
        changes.date = Some(parse_future_date(date, now)?);
    }

    if let Some(max) = req.max_players {
        let max = validate_max_players(max)?;
        if (max as usize) < game.players.len() {
            return Err(AppError::conflict(format!(
                "Cannot set max players below current player count ({})",
                game.players.len()
            )));
        }
        changes.max_players = Some(max);
    }

    if let Some(min) = req.min_players {
        let max = changes.max_players.unwrap_or(game.max_players);
        changes.min_players = Some(validate_min_players(min, max)?);
    }

    if let Some(skill) = req.skill_level.as_deref().filter(|s| !s.is_empty()) {
        changes.skill_level = Some(parse_skill_level(skill)?);
    }

    Ok(changes)
}

pub fn ensure_host(game: &Game, actor: ObjectId, action: &str) -> Result<()> {
    if game.host_id != actor {
        return Err(AppError::authorization(format!(
            "Only the host can {action} this game"
        )));
    }
    Ok(())
}

/// Guard for cancellation: terminal states stay terminal, with distinct
/// messages for each.
pub fn ensure_cancellable(game: &Game) -> Result<()> {
    match game.status {
        GameStatus::Cancelled => Err(AppError::invalid_state("Game is already cancelled")),
        GameStatus::Completed => Err(AppError::invalid_state("Cannot cancel a completed game")),
        GameStatus::Upcoming => Ok(()),
    }
}

pub fn ensure_completable(game: &Game) -> Result<()> {
    if game.status != GameStatus::Upcoming {
        return Err(AppError::invalid_state(
            "Game is already completed or cancelled",
        ));
    }
    Ok(())
}

/// New roster + waitlist snapshots to write back in one update.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterUpdate {
    pub players: OrderedIds,
    pub waitlist: OrderedIds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// Roster was full; `position` is 1-based.
    Waitlisted { position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Left the roster; if a waitlist head existed it was promoted.
    LeftRoster { promoted: Option<ObjectId> },
    /// Left the waitlist; nobody is promoted.
    LeftWaitlist,
}

/// Plans a join: roster if there is room, otherwise the waitlist tail.
/// The host is a participant by definition and never enters either array.
pub fn plan_join(
    game: &Game,
    user_id: ObjectId,
    now: DateTime<Utc>,
) -> Result<(RosterUpdate, JoinOutcome)> {
    if game.status != GameStatus::Upcoming {
        return Err(AppError::invalid_state(
            "Cannot join a completed or cancelled game",
        ));
    }
    if game.date <= now {
        return Err(AppError::invalid_state(
            "Cannot join a game that has already started",
        ));
    }
    if game.host_id == user_id {
        return Err(AppError::conflict("You are the host of this game"));
    }
    if game.players.contains(user_id) {
        return Err(AppError::conflict("You have already joined this game"));
    }
    if game.waitlist.contains(user_id) {
        return Err(AppError::conflict("You are already on the waitlist"));
    }

    if game.is_full() {
        let waitlist = game
            .waitlist
            .with_appended(user_id)
            .ok_or_else(|| AppError::conflict("You are already on the waitlist"))?;
        let position = waitlist.len();
        Ok((
            RosterUpdate {
                players: game.players.clone(),
                waitlist,
            },
            JoinOutcome::Waitlisted { position },
        ))
    } else {
        let players = game
            .players
            .with_appended(user_id)
            .ok_or_else(|| AppError::conflict("You have already joined this game"))?;
        Ok((
            RosterUpdate {
                players,
                waitlist: game.waitlist.clone(),
            },
            JoinOutcome::Joined,
        ))
    }
}

/// Plans a leave. A rostered player's departure promotes the earliest
/// waitlisted user in the same snapshot, keeping the roster full and the
/// promotion FIFO-fair; a waitlisted user just drops out of the queue.
pub fn plan_leave(game: &Game, user_id: ObjectId) -> Result<(RosterUpdate, LeaveOutcome)> {
    if game.status != GameStatus::Upcoming {
        return Err(AppError::invalid_state(
            "Cannot leave a completed or cancelled game",
        ));
    }

    if let Some(waitlist) = game.waitlist.without(user_id) {
        return Ok((
            RosterUpdate {
                players: game.players.clone(),
                waitlist,
            },
            LeaveOutcome::LeftWaitlist,
        ));
    }

    let players = game
        .players
        .without(user_id)
        .ok_or_else(|| AppError::conflict("You are not part of this game"))?;

    match game.waitlist.split_first() {
        Some((head, rest)) => {
            let players = players.with_appended(head).ok_or_else(|| {
                AppError::Internal("game roster and waitlist overlap".to_string())
            })?;
            Ok((
                RosterUpdate {
                    players,
                    waitlist: rest,
                },
                LeaveOutcome::LeftRoster {
                    promoted: Some(head),
                },
            ))
        }
        None => Ok((
            RosterUpdate {
                players,
                waitlist: OrderedIds::new(),
            },
            LeaveOutcome::LeftRoster { promoted: None },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn host() -> ObjectId {
        ObjectId::new()
    }

    fn upcoming_game(host_id: ObjectId, max_players: i32) -> Game {
        let now = Utc::now();
        Game {
            id: ObjectId::new(),
            host_id,
            sport: Sport::Basketball,
            title: "Saturday run".to_string(),
            description: String::new(),
            location: Location {
                name: "Main St Court".to_string(),
                address: String::new(),
                city: "Boston".to_string(),
                coordinates: None,
            },
            date: now + Duration::days(2),
            max_players,
            min_players: 2,
            players: OrderedIds::new(),
            waitlist: OrderedIds::new(),
            status: GameStatus::Upcoming,
            skill_level: SkillLevel::AllLevels,
            created_at: now,
            updated_at: now,
        }
    }

    fn create_request() -> CreateGameRequest {
        CreateGameRequest {
            sport: Some("Soccer".to_string()),
            title: Some("Evening kickabout".to_string()),
            description: Some("  Casual game  ".to_string()),
            location: Some(LocationInput {
                name: Some("Riverside Park".to_string()),
                address: Some("1 Park Way".to_string()),
                city: Some("Cambridge".to_string()),
                coordinates: None,
            }),
            date: Some((Utc::now() + Duration::days(1)).to_rfc3339()),
            max_players: Some(10),
            min_players: Some(4),
            skill_level: Some("Intermediate".to_string()),
        }
    }

    fn assert_validation(result: Result<Game>, needle: &str) {
        match result {
            Err(AppError::Validation(msg)) => assert!(
                msg.contains(needle),
                "expected message containing {needle:?}, got {msg:?}"
            ),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn create_builds_an_empty_upcoming_game() {
        let host_id = host();
        let game = validate_new_game(&create_request(), host_id, Utc::now()).unwrap();

        assert_eq!(game.status, GameStatus::Upcoming);
        assert_eq!(game.host_id, host_id);
        assert_eq!(game.description, "Casual game");
        assert!(game.players.is_empty());
        assert!(game.waitlist.is_empty());
    }

    #[test]
    fn create_rejects_bad_fields() {
        let now = Utc::now();
        let host_id = host();

        let mut req = create_request();
        req.sport = Some("Hockey".to_string());
        assert_validation(validate_new_game(&req, host_id, now), "Invalid sport");

        let mut req = create_request();
        req.title = Some("ab".to_string());
        assert_validation(
            validate_new_game(&req, host_id, now),
            "between 3 and 100",
        );

        let mut req = create_request();
        req.location = Some(LocationInput {
            name: Some("Court".to_string()),
            ..Default::default()
        });
        assert_validation(
            validate_new_game(&req, host_id, now),
            "Location name and city",
        );

        let mut req = create_request();
        req.date = Some("not-a-date".to_string());
        assert_validation(validate_new_game(&req, host_id, now), "Invalid date");

        let mut req = create_request();
        req.date = Some((now - Duration::hours(1)).to_rfc3339());
        assert_validation(validate_new_game(&req, host_id, now), "in the future");

        let mut req = create_request();
        req.max_players = Some(51);
        assert_validation(validate_new_game(&req, host_id, now), "between 2 and 50");

        let mut req = create_request();
        req.min_players = Some(11);
        assert_validation(validate_new_game(&req, host_id, now), "Min players");
    }

    #[test]
    fn update_requires_host_and_upcoming_status() {
        let host_id = host();
        let game = upcoming_game(host_id, 10);
        let req = UpdateGameRequest {
            title: Some("New title".to_string()),
            ..Default::default()
        };

        let err = validate_update(&game, &req, ObjectId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let mut completed = upcoming_game(host_id, 10);
        completed.status = GameStatus::Completed;
        let err = validate_update(&completed, &req, host_id, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let mut cancelled = upcoming_game(host_id, 10);
        cancelled.status = GameStatus::Cancelled;
        let err = validate_update(&cancelled, &req, host_id, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn update_cannot_shrink_max_players_below_roster() {
        let host_id = host();
        let mut game = upcoming_game(host_id, 10);
        game.players = vec![ObjectId::new(), ObjectId::new(), ObjectId::new()].into();

        let req = UpdateGameRequest {
            max_players: Some(2),
            ..Default::default()
        };
        let err = validate_update(&game, &req, host_id, Utc::now()).unwrap_err();
        match err {
            AppError::Conflict(msg) => assert!(msg.contains("(3)")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn update_min_players_checks_against_new_max() {
        let host_id = host();
        let game = upcoming_game(host_id, 10);

        let req = UpdateGameRequest {
            max_players: Some(4),
            min_players: Some(5),
            ..Default::default()
        };
        let err = validate_update(&game, &req, host_id, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let req = UpdateGameRequest {
            max_players: Some(6),
            min_players: Some(5),
            ..Default::default()
        };
        let changes = validate_update(&game, &req, host_id, Utc::now()).unwrap();
        assert_eq!(changes.min_players, Some(5));
    }

    #[test]
    fn join_fills_roster_then_waitlists() {
        let game = upcoming_game(host(), 2);
        let now = Utc::now();
        let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

        let mut game = game;
        let (update, outcome) = plan_join(&game, a, now).unwrap();
        assert_eq!(outcome, JoinOutcome::Joined);
        game.players = update.players;
        game.waitlist = update.waitlist;

        let (update, outcome) = plan_join(&game, b, now).unwrap();
        assert_eq!(outcome, JoinOutcome::Joined);
        game.players = update.players;
        game.waitlist = update.waitlist;
        assert!(game.is_full());

        let (update, outcome) = plan_join(&game, c, now).unwrap();
        assert_eq!(outcome, JoinOutcome::Waitlisted { position: 1 });
        assert_eq!(update.players.as_slice(), &[a, b]);
        assert_eq!(update.waitlist.as_slice(), &[c]);
        assert!(update.players.len() <= game.max_players as usize);
    }

    #[test]
    fn join_rejects_duplicates_and_stale_games() {
        let now = Utc::now();
        let a = ObjectId::new();

        let mut game = upcoming_game(host(), 2);
        game.players = vec![a].into();
        let err = plan_join(&game, a, now).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let mut game = upcoming_game(host(), 1);
        game.players = vec![ObjectId::new()].into();
        game.waitlist = vec![a].into();
        let err = plan_join(&game, a, now).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let mut game = upcoming_game(host(), 2);
        game.status = GameStatus::Cancelled;
        let err = plan_join(&game, a, now).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let mut game = upcoming_game(host(), 2);
        game.date = now - Duration::minutes(5);
        let err = plan_join(&game, a, now).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn join_rejects_the_host() {
        let host_id = host();
        let game = upcoming_game(host_id, 4);

        let err = plan_join(&game, host_id, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        // the roster can never come to contain the host id
        assert!(!game.players.contains(host_id));
        assert!(!game.waitlist.contains(host_id));
    }

    #[test]
    fn leave_promotes_the_earliest_waitlisted_player() {
        let (a, b, c, d) = (
            ObjectId::new(),
            ObjectId::new(),
            ObjectId::new(),
            ObjectId::new(),
        );
        let mut game = upcoming_game(host(), 2);
        game.players = vec![a, b].into();
        game.waitlist = vec![c, d].into();

        let (update, outcome) = plan_leave(&game, a).unwrap();
        assert_eq!(outcome, LeaveOutcome::LeftRoster { promoted: Some(c) });
        assert_eq!(update.players.as_slice(), &[b, c]);
        assert_eq!(update.waitlist.as_slice(), &[d]);
        // roster size unchanged, waitlist shrank by one
        assert_eq!(update.players.len(), game.players.len());
        assert_eq!(update.waitlist.len(), game.waitlist.len() - 1);
    }

    #[test]
    fn leave_without_waitlist_just_shrinks_the_roster() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let mut game = upcoming_game(host(), 4);
        game.players = vec![a, b].into();

        let (update, outcome) = plan_leave(&game, b).unwrap();
        assert_eq!(outcome, LeaveOutcome::LeftRoster { promoted: None });
        assert_eq!(update.players.as_slice(), &[a]);
        assert!(update.waitlist.is_empty());
    }

    #[test]
    fn leave_from_waitlist_triggers_no_promotion() {
        let (a, c, d) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
        let mut game = upcoming_game(host(), 1);
        game.players = vec![a].into();
        game.waitlist = vec![c, d].into();

        let (update, outcome) = plan_leave(&game, c).unwrap();
        assert_eq!(outcome, LeaveOutcome::LeftWaitlist);
        assert_eq!(update.players.as_slice(), &[a]);
        assert_eq!(update.waitlist.as_slice(), &[d]);
    }

    #[test]
    fn leave_rejects_non_participants_and_terminal_games() {
        let game = upcoming_game(host(), 2);
        let err = plan_leave(&game, ObjectId::new()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let mut game = upcoming_game(host(), 2);
        game.status = GameStatus::Completed;
        let err = plan_leave(&game, ObjectId::new()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn full_join_leave_scenario() {
        // maxPlayers=2: A joins, B joins (full), C waitlists, A leaves,
        // C is promoted and the waitlist empties.
        let now = Utc::now();
        let mut game = upcoming_game(host(), 2);
        let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

        for (user, expected) in [
            (a, JoinOutcome::Joined),
            (b, JoinOutcome::Joined),
            (c, JoinOutcome::Waitlisted { position: 1 }),
        ] {
            let (update, outcome) = plan_join(&game, user, now).unwrap();
            assert_eq!(outcome, expected);
            game.players = update.players;
            game.waitlist = update.waitlist;
        }

        let (update, outcome) = plan_leave(&game, a).unwrap();
        assert_eq!(outcome, LeaveOutcome::LeftRoster { promoted: Some(c) });
        assert_eq!(update.players.as_slice(), &[b, c]);
        assert!(update.waitlist.is_empty());
    }

    #[test]
    fn cancel_and_complete_guards() {
        let game = upcoming_game(host(), 2);
        assert!(ensure_cancellable(&game).is_ok());
        assert!(ensure_completable(&game).is_ok());

        let mut cancelled = upcoming_game(host(), 2);
        cancelled.status = GameStatus::Cancelled;
        assert!(matches!(
            ensure_cancellable(&cancelled),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            ensure_completable(&cancelled),
            Err(AppError::InvalidState(_))
        ));

        let mut completed = upcoming_game(host(), 2);
        completed.status = GameStatus::Completed;
        assert!(matches!(
            ensure_cancellable(&completed),
            Err(AppError::InvalidState(_))
        ));
    }
}
