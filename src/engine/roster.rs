use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Insertion-ordered, duplicate-free list of user ids. Game rosters and
/// waitlists are stored as this type; order is join order and is never
/// rearranged except by promotion. Mutating operations return a new
/// snapshot so callers can write the whole array back in one
/// compare-and-swap against the stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedIds(Vec<ObjectId>);

impl OrderedIds {
    pub fn new() -> Self {
        OrderedIds(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.0.contains(&id)
    }

    /// Zero-based index of `id`, if present.
    pub fn position(&self, id: ObjectId) -> Option<usize> {
        self.0.iter().position(|p| *p == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ObjectId] {
        &self.0
    }

    /// Snapshot with `id` appended at the tail. Returns `None` if `id` is
    /// already present.
    pub fn with_appended(&self, id: ObjectId) -> Option<Self> {
        if self.contains(id) {
            return None;
        }
        let mut ids = self.0.clone();
        ids.push(id);
        Some(OrderedIds(ids))
    }

    /// Snapshot with the first occurrence of `id` removed. Returns `None`
    /// if `id` is not present.
    pub fn without(&self, id: ObjectId) -> Option<Self> {
        let idx = self.position(id)?;
        let mut ids = self.0.clone();
        ids.remove(idx);
        Some(OrderedIds(ids))
    }

    /// Splits off the head (the earliest-joined id), keeping the rest in
    /// order. Returns `None` when empty.
    pub fn split_first(&self) -> Option<(ObjectId, Self)> {
        let (head, rest) = self.0.split_first()?;
        Some((*head, OrderedIds(rest.to_vec())))
    }
}

impl From<Vec<ObjectId>> for OrderedIds {
    fn from(ids: Vec<ObjectId>) -> Self {
        OrderedIds(ids)
    }
}
