pub mod auth;
pub mod games;
pub mod ratings;
pub mod users;

use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Parses a path or query id, naming the field in the error message.
pub fn parse_object_id(id: &str, what: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| AppError::validation(format!("Invalid {what}")))
}

/// Normalizes pagination params to (page, limit, skip). Page is 1-based,
/// limit is clamped to 1..=100.
pub fn page_params(page: Option<i64>, limit: Option<i64>) -> (i64, i64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let skip = ((page - 1) * limit) as u64;
    (page, limit, skip)
}

/// Escapes a user-supplied fragment for use inside a `$regex` filter.
pub fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if ".^$*+?()[]{}|\\".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_clamp_out_of_range_values() {
        assert_eq!(page_params(None, None), (1, 20, 0));
        assert_eq!(page_params(Some(0), Some(1000)), (1, 100, 0));
        assert_eq!(page_params(Some(3), Some(10)), (3, 10, 20));
        assert_eq!(page_params(Some(-2), Some(-5)), (1, 1, 0));
    }

    #[test]
    fn regex_escape_neutralizes_metacharacters() {
        assert_eq!(regex_escape("New York"), "New York");
        assert_eq!(regex_escape("a.b*c"), "a\\.b\\*c");
    }

    #[test]
    fn parse_object_id_names_the_field() {
        let err = parse_object_id("nope", "game ID").unwrap_err();
        match err {
            AppError::Validation(msg) => assert_eq!(msg, "Invalid game ID"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
