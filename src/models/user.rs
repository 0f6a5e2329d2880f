use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::models::game::{SkillLevel, Sport};
use crate::models::rating::RatingSummary;

/// User document as stored in the `users` collection. The bcrypt hash never
/// leaves the API; every outbound shape goes through [`UserView`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub sports: Vec<Sport>,
    #[serde(default)]
    pub skill_levels: BTreeMap<Sport, SkillLevel>,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub sports: Option<Vec<String>>,
    pub skill_levels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub sports: Option<Vec<String>>,
    pub skill_levels: Option<BTreeMap<String, String>>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub search: Option<String>,
    pub sport: Option<String>,
    pub min_rating: Option<f64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Public user shape for JSON responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub bio: String,
    pub sports: Vec<Sport>,
    pub skill_levels: BTreeMap<Sport, SkillLevel>,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<RatingSummary>,
}

impl UserView {
    pub fn from_user(user: &User) -> Self {
        UserView {
            id: user.id.to_hex(),
            email: user.email.clone(),
            name: user.name.clone(),
            bio: user.bio.clone(),
            sports: user.sports.clone(),
            skill_levels: user.skill_levels.clone(),
            avatar_url: user.avatar_url.clone(),
            created_at: user.created_at,
            rating: None,
        }
    }

    pub fn with_rating(mut self, rating: RatingSummary) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Filters a raw sports list down to recognized sports, silently dropping
/// anything else.
pub fn filter_sports(raw: &[String]) -> Vec<Sport> {
    raw.iter().filter_map(|s| Sport::parse(s)).collect()
}

/// Filters a raw per-sport skill map to recognized sports with concrete
/// levels ("All Levels" is a game setting, not a personal skill).
pub fn filter_skill_levels(raw: &BTreeMap<String, String>) -> BTreeMap<Sport, SkillLevel> {
    raw.iter()
        .filter_map(|(sport, level)| {
            let sport = Sport::parse(sport)?;
            let level = SkillLevel::parse(level)?;
            if level == SkillLevel::AllLevels {
                return None;
            }
            Some((sport, level))
        })
        .collect()
}
