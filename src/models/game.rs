use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::engine::roster::OrderedIds;
use crate::models::user::UserView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sport {
    Basketball,
    Soccer,
    Tennis,
    Volleyball,
    Baseball,
    Cricket,
    Badminton,
    Running,
    Other,
}

impl Sport {
    pub const ALL: [Sport; 9] = [
        Sport::Basketball,
        Sport::Soccer,
        Sport::Tennis,
        Sport::Volleyball,
        Sport::Baseball,
        Sport::Cricket,
        Sport::Badminton,
        Sport::Running,
        Sport::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Basketball => "Basketball",
            Sport::Soccer => "Soccer",
            Sport::Tennis => "Tennis",
            Sport::Volleyball => "Volleyball",
            Sport::Baseball => "Baseball",
            Sport::Cricket => "Cricket",
            Sport::Badminton => "Badminton",
            Sport::Running => "Running",
            Sport::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Sport> {
        Sport::ALL.iter().find(|sport| sport.as_str() == s).copied()
    }

    /// Comma-separated list of valid names, for validation messages.
    pub fn allowed_list() -> String {
        Sport::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    #[serde(rename = "All Levels")]
    AllLevels,
}

impl SkillLevel {
    pub const ALL: [SkillLevel; 4] = [
        SkillLevel::Beginner,
        SkillLevel::Intermediate,
        SkillLevel::Advanced,
        SkillLevel::AllLevels,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "Beginner",
            SkillLevel::Intermediate => "Intermediate",
            SkillLevel::Advanced => "Advanced",
            SkillLevel::AllLevels => "All Levels",
        }
    }

    pub fn parse(s: &str) -> Option<SkillLevel> {
        SkillLevel::ALL.iter().find(|l| l.as_str() == s).copied()
    }

    pub fn allowed_list() -> String {
        SkillLevel::ALL
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Upcoming,
    Completed,
    Cancelled,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Upcoming => "upcoming",
            GameStatus::Completed => "completed",
            GameStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<GameStatus> {
        match s {
            "upcoming" => Some(GameStatus::Upcoming),
            "completed" => Some(GameStatus::Completed),
            "cancelled" => Some(GameStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub city: String,
    pub coordinates: Option<Coordinates>,
}

/// Game document as stored in the `games` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub host_id: ObjectId,
    pub sport: Sport,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: Location,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date: DateTime<Utc>,
    pub max_players: i32,
    pub min_players: i32,
    #[serde(default)]
    pub players: OrderedIds,
    #[serde(default)]
    pub waitlist: OrderedIds,
    pub status: GameStatus,
    pub skill_level: SkillLevel,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn spots_available(&self) -> i64 {
        self.max_players as i64 - self.players.len() as i64
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    /// Host and roster members. Waitlisted users are not participants.
    pub fn is_participant(&self, user_id: ObjectId) -> bool {
        self.host_id == user_id || self.players.contains(user_id)
    }

    pub fn viewer_flags(&self, viewer: ObjectId) -> ViewerFlags {
        let waitlist_position = self.waitlist.position(viewer).map(|i| i + 1);
        ViewerFlags {
            is_host: self.host_id == viewer,
            is_player: self.players.contains(viewer),
            is_waitlisted: waitlist_position.is_some(),
            waitlist_position,
        }
    }
}

/// Per-viewer derived fields, omitted entirely for anonymous requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerFlags {
    pub is_host: bool,
    pub is_player: bool,
    pub is_waitlisted: bool,
    pub waitlist_position: Option<usize>,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// Fields are optional so missing values produce the engine's validation
/// messages instead of a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub sport: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<LocationInput>,
    pub date: Option<String>,
    pub max_players: Option<i32>,
    pub min_players: Option<i32>,
    pub skill_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGameRequest {
    pub sport: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<LocationInput>,
    pub date: Option<String>,
    pub max_players: Option<i32>,
    pub min_players: Option<i32>,
    pub skill_level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameListQuery {
    pub sport: Option<String>,
    pub status: Option<String>,
    pub city: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub host_id: Option<String>,
    pub player_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

// ---------------------------------------------------------------------------
// Views (JSON output; ObjectIds as hex strings)
// ---------------------------------------------------------------------------

/// List-shaped game view: roster and waitlist as id strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummaryView {
    pub id: String,
    pub host_id: String,
    pub sport: Sport,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub date: DateTime<Utc>,
    pub max_players: i32,
    pub min_players: i32,
    pub players: Vec<String>,
    pub waitlist: Vec<String>,
    pub status: GameStatus,
    pub skill_level: SkillLevel,
    pub created_at: DateTime<Utc>,
    pub player_count: usize,
    pub waitlist_count: usize,
    pub spots_available: i64,
    pub is_full: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<UserView>,
    #[serde(flatten)]
    pub viewer: Option<ViewerFlags>,
}

impl GameSummaryView {
    pub fn from_game(game: &Game, host: Option<UserView>, viewer: Option<ObjectId>) -> Self {
        GameSummaryView {
            id: game.id.to_hex(),
            host_id: game.host_id.to_hex(),
            sport: game.sport,
            title: game.title.clone(),
            description: game.description.clone(),
            location: game.location.clone(),
            date: game.date,
            max_players: game.max_players,
            min_players: game.min_players,
            players: game.players.iter().map(|id| id.to_hex()).collect(),
            waitlist: game.waitlist.iter().map(|id| id.to_hex()).collect(),
            status: game.status,
            skill_level: game.skill_level,
            created_at: game.created_at,
            player_count: game.player_count(),
            waitlist_count: game.waitlist.len(),
            spots_available: game.spots_available(),
            is_full: game.is_full(),
            host,
            viewer: viewer.map(|v| game.viewer_flags(v)),
        }
    }
}

/// Detail-shaped game view: host, roster and waitlist expanded to users.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDetailView {
    pub id: String,
    pub host_id: String,
    pub sport: Sport,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub date: DateTime<Utc>,
    pub max_players: i32,
    pub min_players: i32,
    pub players: Vec<UserView>,
    pub waitlist: Vec<UserView>,
    pub status: GameStatus,
    pub skill_level: SkillLevel,
    pub created_at: DateTime<Utc>,
    pub player_count: usize,
    pub waitlist_count: usize,
    pub spots_available: i64,
    pub is_full: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<UserView>,
    #[serde(flatten)]
    pub viewer: Option<ViewerFlags>,
}

impl GameDetailView {
    pub fn from_game(
        game: &Game,
        host: Option<UserView>,
        players: Vec<UserView>,
        waitlist: Vec<UserView>,
        viewer: Option<ObjectId>,
    ) -> Self {
        GameDetailView {
            id: game.id.to_hex(),
            host_id: game.host_id.to_hex(),
            sport: game.sport,
            title: game.title.clone(),
            description: game.description.clone(),
            location: game.location.clone(),
            date: game.date,
            max_players: game.max_players,
            min_players: game.min_players,
            players,
            waitlist,
            status: game.status,
            skill_level: game.skill_level,
            created_at: game.created_at,
            player_count: game.player_count(),
            waitlist_count: game.waitlist.len(),
            spots_available: game.spots_available(),
            is_full: game.is_full(),
            host,
            viewer: viewer.map(|v| game.viewer_flags(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_with(players: Vec<ObjectId>, waitlist: Vec<ObjectId>, max: i32) -> Game {
        Game {
            id: ObjectId::new(),
            host_id: ObjectId::new(),
            sport: Sport::Basketball,
            title: "Pickup run".to_string(),
            description: String::new(),
            location: Location {
                name: "Court".to_string(),
                address: String::new(),
                city: "Boston".to_string(),
                coordinates: None,
            },
            date: Utc::now(),
            max_players: max,
            min_players: 2,
            players: players.into(),
            waitlist: waitlist.into(),
            status: GameStatus::Upcoming,
            skill_level: SkillLevel::AllLevels,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn derived_fields_track_roster() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let game = game_with(vec![a, b], vec![], 2);

        assert_eq!(game.player_count(), 2);
        assert_eq!(game.spots_available(), 0);
        assert!(game.is_full());
    }

    #[test]
    fn viewer_flags_report_waitlist_position() {
        let player = ObjectId::new();
        let first = ObjectId::new();
        let second = ObjectId::new();
        let game = game_with(vec![player], vec![first, second], 1);

        let flags = game.viewer_flags(second);
        assert!(!flags.is_host);
        assert!(!flags.is_player);
        assert!(flags.is_waitlisted);
        assert_eq!(flags.waitlist_position, Some(2));

        let flags = game.viewer_flags(player);
        assert!(flags.is_player);
        assert_eq!(flags.waitlist_position, None);
    }

    #[test]
    fn waitlisted_users_are_not_participants() {
        let player = ObjectId::new();
        let waitlisted = ObjectId::new();
        let game = game_with(vec![player], vec![waitlisted], 1);

        assert!(game.is_participant(game.host_id));
        assert!(game.is_participant(player));
        assert!(!game.is_participant(waitlisted));
    }

    #[test]
    fn sport_and_skill_parse_canonical_names() {
        assert_eq!(Sport::parse("Soccer"), Some(Sport::Soccer));
        assert_eq!(Sport::parse("soccer"), None);
        assert_eq!(SkillLevel::parse("All Levels"), Some(SkillLevel::AllLevels));
        assert_eq!(GameStatus::parse("cancelled"), Some(GameStatus::Cancelled));
    }
}
