//! Rating eligibility engine: who may rate whom once a game completes.
//!
//! The participant set is the host plus everyone on the final roster;
//! waitlisted users never become ratable or able to rate. One rating per
//! (rater, target, game): the submission check takes the rater's existing
//! targets for the game, and a unique index backstops concurrent writes.

use std::collections::HashSet;

use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};
use crate::models::game::{Game, GameStatus};

pub const MAX_COMMENT_LEN: usize = 500;

/// Host plus roster, in host-first join order.
pub fn participants(game: &Game) -> Vec<ObjectId> {
    let mut all = Vec::with_capacity(game.players.len() + 1);
    all.push(game.host_id);
    all.extend(game.players.iter().copied());
    all
}

/// Checks every precondition for a rating submission and returns the score
/// as an integer. Each failure is a distinct, user-facing error. `rated` is
/// the set of users `from` has already rated for this game; a repeat target
/// is a conflict (the unique index backstops concurrent submissions).
pub fn validate_submission(
    game: &Game,
    from: ObjectId,
    to: ObjectId,
    score: Option<f64>,
    comment: &str,
    rated: &HashSet<ObjectId>,
) -> Result<i32> {
    let score = score.unwrap_or(0.0);
    if score.fract() != 0.0 || !(1.0..=5.0).contains(&score) {
        return Err(AppError::validation(
            "Score must be an integer between 1 and 5",
        ));
    }

    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::validation(
            "Comment must be 500 characters or less",
        ));
    }

    if from == to {
        return Err(AppError::validation("You cannot rate yourself"));
    }

    if game.status != GameStatus::Completed {
        return Err(AppError::invalid_state(
            "Can only rate players from completed games",
        ));
    }

    if !game.is_participant(from) {
        return Err(AppError::authorization(
            "You must have participated in this game to rate",
        ));
    }

    if !game.is_participant(to) {
        return Err(AppError::validation(
            "The user you are rating must have participated in this game",
        ));
    }

    if rated.contains(&to) {
        return Err(AppError::conflict(
            "You have already rated this player for this game",
        ));
    }

    Ok(score as i32)
}

/// Co-participants of `viewer` that `viewer` has not yet rated for this
/// game. Empty means the game has no pending ratings for them.
pub fn unrated_participants(
    game: &Game,
    viewer: ObjectId,
    rated: &HashSet<ObjectId>,
) -> Vec<ObjectId> {
    participants(game)
        .into_iter()
        .filter(|p| *p != viewer && !rated.contains(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game::{Location, SkillLevel, Sport};
    use chrono::Utc;

    fn completed_game(host: ObjectId, players: Vec<ObjectId>) -> Game {
        let now = Utc::now();
        Game {
            id: ObjectId::new(),
            host_id: host,
            sport: Sport::Volleyball,
            title: "Beach sixes".to_string(),
            description: String::new(),
            location: Location {
                name: "South Beach".to_string(),
                address: String::new(),
                city: "Boston".to_string(),
                coordinates: None,
            },
            date: now,
            max_players: 6,
            min_players: 2,
            players: players.into(),
            waitlist: Vec::new().into(),
            status: GameStatus::Completed,
            skill_level: SkillLevel::AllLevels,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn accepts_a_valid_submission() {
        let host = ObjectId::new();
        let a = ObjectId::new();
        let game = completed_game(host, vec![a]);

        let score = validate_submission(&game, a, host, Some(5.0), "great host", &HashSet::new()).unwrap();
        assert_eq!(score, 5);
    }

    #[test]
    fn rejects_out_of_range_or_fractional_scores() {
        let host = ObjectId::new();
        let a = ObjectId::new();
        let game = completed_game(host, vec![a]);

        for score in [None, Some(0.0), Some(6.0), Some(4.5)] {
            let err = validate_submission(&game, a, host, score, "", &HashSet::new()).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "score {score:?}");
        }
    }

    #[test]
    fn rejects_oversized_comments_and_self_ratings() {
        let host = ObjectId::new();
        let a = ObjectId::new();
        let game = completed_game(host, vec![a]);

        let long = "x".repeat(MAX_COMMENT_LEN + 1);
        let err = validate_submission(&game, a, host, Some(3.0), &long, &HashSet::new()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = validate_submission(&game, a, a, Some(3.0), "", &HashSet::new()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_non_completed_games() {
        let host = ObjectId::new();
        let a = ObjectId::new();
        let mut game = completed_game(host, vec![a]);
        game.status = GameStatus::Upcoming;

        let err = validate_submission(&game, a, host, Some(4.0), "", &HashSet::new()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        game.status = GameStatus::Cancelled;
        let err = validate_submission(&game, a, host, Some(4.0), "", &HashSet::new()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn rejects_non_participants_on_either_side() {
        let host = ObjectId::new();
        let a = ObjectId::new();
        let outsider = ObjectId::new();
        let game = completed_game(host, vec![a]);

        let err = validate_submission(&game, outsider, a, Some(4.0), "", &HashSet::new()).unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let err = validate_submission(&game, a, outsider, Some(4.0), "", &HashSet::new()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_a_repeat_rating_of_the_same_player() {
        let host = ObjectId::new();
        let a = ObjectId::new();
        let b = ObjectId::new();
        let game = completed_game(host, vec![a, b]);

        let mut rated = HashSet::new();
        rated.insert(host);

        // a already rated the host for this game; b is still fine
        let err = validate_submission(&game, a, host, Some(4.0), "", &rated).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(validate_submission(&game, a, b, Some(4.0), "", &rated).is_ok());
    }

    #[test]
    fn pending_set_shrinks_as_ratings_land() {
        // Host completes a game with {host, a, b}; a sees [host, b], rates
        // the host, then sees [b] only.
        let host = ObjectId::new();
        let a = ObjectId::new();
        let b = ObjectId::new();
        let game = completed_game(host, vec![a, b]);

        let mut rated = HashSet::new();
        assert_eq!(unrated_participants(&game, a, &rated), vec![host, b]);

        rated.insert(host);
        assert_eq!(unrated_participants(&game, a, &rated), vec![b]);

        rated.insert(b);
        assert!(unrated_participants(&game, a, &rated).is_empty());
    }
}
