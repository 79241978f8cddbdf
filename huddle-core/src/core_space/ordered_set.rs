//! Insertion-ordered sets used for member, admin and channel lists
//!
//! Membership lists must never hold duplicates, yet their order matters:
//! admin backfill picks the most recently added member. `OrderedSet` keeps
//! both properties and serializes as a plain JSON array.

use hashlink::LinkedHashSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::Hash;

use super::types::UserId;

/// Ordered list of user ids without duplicates
pub type MemberSet = OrderedSet<UserId>;

#[derive(Clone)]
pub struct OrderedSet<T: Hash + Eq>(LinkedHashSet<T>);

impl<T: Hash + Eq> OrderedSet<T> {
    pub fn new() -> Self {
        OrderedSet(LinkedHashSet::new())
    }

    /// Append `value` at the end. Returns false if it was already present,
    /// in which case its position is unchanged.
    pub fn insert(&mut self, value: T) -> bool {
        if self.0.contains(&value) {
            return false;
        }
        self.0.insert(value)
    }

    /// Remove `value`. Returns false if it was not present.
    pub fn remove(&mut self, value: &T) -> bool {
        self.0.remove(value)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.0.contains(value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.0.front()
    }

    /// Most recently inserted value
    pub fn last(&self) -> Option<&T> {
        self.0.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }
}

impl<T: Hash + Eq + Clone> OrderedSet<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.0.iter().cloned().collect()
    }
}

impl<T: Hash + Eq> Default for OrderedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq + fmt::Debug> fmt::Debug for OrderedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Equality respects order: two sets with the same members in a different
/// order are different lists.
impl<T: Hash + Eq> PartialEq for OrderedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Hash + Eq> Eq for OrderedSet<T> {}

impl<T: Hash + Eq> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = OrderedSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<T: Hash + Eq + Serialize> Serialize for OrderedSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de, T: Hash + Eq + DeserializeOwned> Deserialize<'de> for OrderedSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<T>::deserialize(deserializer)?;
        Ok(values.into_iter().collect())
    }
}
