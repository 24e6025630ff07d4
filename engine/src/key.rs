//! Record keys.
//!
//! Every entity type picks its own key scheme: a scalar string id, a scalar
//! 64-bit integer id, or a [`CompositeKey`] made of two sub-identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Bound shared by every key type the reconciler can work with.
pub trait RecordKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> RecordKey for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// A key made of two sub-identifiers, e.g. `(template_id, exercise_id)`.
///
/// Equality and hashing work on the fields themselves, so a sub-identifier
/// containing any separator character can never collide with another pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> CompositeKey<A, B> {
    pub fn new(first: impl Into<A>, second: impl Into<B>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }
}

impl<A: fmt::Display, B: fmt::Display> fmt::Display for CompositeKey<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

impl<A, B> From<(A, B)> for CompositeKey<A, B> {
    fn from((first, second): (A, B)) -> Self {
        Self { first, second }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn separator_in_sub_identifier_does_not_collide() {
        // Joined with '_' both of these would read "a_b_c".
        let left: CompositeKey<String, String> = CompositeKey::new("a_b", "c");
        let right: CompositeKey<String, String> = CompositeKey::new("a", "b_c");
        assert_ne!(left, right);

        let set: HashSet<_> = [left, right].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn display_and_from_tuple() {
        let key: CompositeKey<String, i64> = ("template-1".to_string(), 7).into();
        assert_eq!(key.to_string(), "(template-1, 7)");
    }

    #[test]
    fn serialization_is_structured() {
        let key: CompositeKey<String, String> = CompositeKey::new("t1", "e1");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"first":"t1","second":"e1"}"#);

        let parsed: CompositeKey<String, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }
}
