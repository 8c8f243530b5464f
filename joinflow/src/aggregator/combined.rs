//! Merged upstream values handed to a dependent stage.

use crate::errors::TransformError;
use crate::stages::StageId;
use std::collections::BTreeMap;

/// Upstream values keyed by the stage that produced them.
///
/// Keys are stage identities, so the merge does not depend on the order in
/// which upstream outcomes arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedInput<T> {
    values: BTreeMap<StageId, T>,
}

impl<T> Default for CombinedInput<T> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<T> CombinedInput<T> {
    /// Creates an empty combined input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an upstream value, returning any previous value for that stage.
    pub fn insert(&mut self, stage_id: impl Into<StageId>, value: T) -> Option<T> {
        self.values.insert(stage_id.into(), value)
    }

    /// Returns the value produced by `stage_id`.
    #[must_use]
    pub fn get(&self, stage_id: &str) -> Option<&T> {
        self.values.get(stage_id)
    }

    /// Returns the value produced by `stage_id`, or a transform error naming
    /// the missing upstream.
    pub fn value(&self, stage_id: &str) -> Result<&T, TransformError> {
        self.get(stage_id)
            .ok_or_else(|| TransformError::new(format!("missing upstream value '{stage_id}'")))
    }

    /// Removes and returns the value produced by `stage_id`.
    pub fn take(&mut self, stage_id: &str) -> Option<T> {
        self.values.remove(stage_id)
    }

    /// Returns true if `stage_id` contributed a value.
    #[must_use]
    pub fn contains(&self, stage_id: &str) -> bool {
        self.values.contains_key(stage_id)
    }

    /// Returns the number of upstream values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no upstream values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates values in stage-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&StageId, &T)> {
        self.values.iter()
    }

    /// Iterates upstream stage ids in order.
    pub fn stage_ids(&self) -> impl Iterator<Item = &StageId> {
        self.values.keys()
    }

    /// Consumes the input, returning the underlying map.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<StageId, T> {
        self.values
    }
}

impl<T, K: Into<StageId>> FromIterator<(K, T)> for CombinedInput<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<T> IntoIterator for CombinedInput<T> {
    type Item = (StageId, T);
    type IntoIter = std::collections::btree_map::IntoIter<StageId, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_keyed_by_identity() {
        let forward: CombinedInput<i32> = [("A", 2), ("B", 4)].into_iter().collect();
        let reverse: CombinedInput<i32> = [("B", 4), ("A", 2)].into_iter().collect();

        assert_eq!(forward, reverse);
        let ids: Vec<_> = forward.stage_ids().map(StageId::as_str).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_value_lookup() {
        let mut combined = CombinedInput::new();
        assert!(combined.is_empty());
        assert_eq!(combined.insert("A", 2), None);
        assert_eq!(combined.insert("A", 3), Some(2));

        assert_eq!(combined.get("A"), Some(&3));
        assert_eq!(combined.value("A"), Ok(&3));
        assert!(combined.contains("A"));
        assert_eq!(
            combined.value("B"),
            Err(TransformError::new("missing upstream value 'B'"))
        );

        assert_eq!(combined.take("A"), Some(3));
        assert_eq!(combined.len(), 0);
    }
}
