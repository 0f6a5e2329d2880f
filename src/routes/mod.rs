pub mod auth;
pub mod games;
pub mod ratings;
pub mod users;
