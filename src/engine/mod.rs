//! Pure domain logic: the game lifecycle state machine and the rating
//! eligibility rules. Nothing in here touches the database; handlers feed
//! these functions the current document and apply the returned plan with a
//! single atomic write.

pub mod eligibility;
pub mod lifecycle;
pub mod roster;
