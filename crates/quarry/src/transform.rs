//! Per-request compilation bookkeeping. One `GroupingTransform` is produced
//! alongside the compiled groupings and consumed once by the result builder:
//! it remembers what every tag was declared to mean (label, page size) and
//! which pagination positions the caller carried in via continuations.

use crate::{
    continuation::{OffsetContinuation, ResultId},
    error::GroupingError,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// GroupingTransform
///

#[derive(Clone, Debug)]
pub struct GroupingTransform {
    root_id: ResultId,
    labels: BTreeMap<i32, String>,
    maxes: BTreeMap<i32, u64>,
    tag_offsets: BTreeMap<i32, u64>,
    id_offsets: BTreeMap<ResultId, u64>,
    sibling_labels: BTreeMap<i32, BTreeSet<String>>,
    estimator_targets: BTreeMap<i32, i32>,
    unstable: BTreeSet<ResultId>,
}

impl GroupingTransform {
    /// Create the transform for the request rooted at `root_id`.
    #[must_use]
    pub const fn new(root_id: ResultId) -> Self {
        Self {
            root_id,
            labels: BTreeMap::new(),
            maxes: BTreeMap::new(),
            tag_offsets: BTreeMap::new(),
            id_offsets: BTreeMap::new(),
            sibling_labels: BTreeMap::new(),
            estimator_targets: BTreeMap::new(),
            unstable: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn root_id(&self) -> &ResultId {
        &self.root_id
    }

    /// Record the output label for a tag. Tags are assigned once by the
    /// builder, so a second registration is a compiler defect.
    pub fn set_label(&mut self, tag: i32, label: impl Into<String>) -> Result<(), GroupingError> {
        if self.labels.insert(tag, label.into()).is_some() {
            return Err(GroupingError::transform_invariant(format!(
                "label for tag {tag} registered twice"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn label(&self, tag: i32) -> Option<&str> {
        self.labels.get(&tag).map(String::as_str)
    }

    /// Record the declared page size for a tag; same single-registration
    /// rule as labels.
    pub fn set_max(&mut self, tag: i32, max: u64) -> Result<(), GroupingError> {
        if self.maxes.insert(tag, max).is_some() {
            return Err(GroupingError::transform_invariant(format!(
                "max for tag {tag} registered twice"
            )));
        }
        Ok(())
    }

    /// Declared page size for a tag; absent means the whole range.
    #[must_use]
    pub fn max(&self, tag: i32) -> Option<u64> {
        self.maxes.get(&tag).copied()
    }

    /// Link a group-count estimator to the list tag whose size it estimates,
    /// so the result builder corrects it against that list and no other.
    pub fn set_estimator_target(
        &mut self,
        estimator_tag: i32,
        list_tag: i32,
    ) -> Result<(), GroupingError> {
        if self
            .estimator_targets
            .insert(estimator_tag, list_tag)
            .is_some()
        {
            return Err(GroupingError::transform_invariant(format!(
                "estimator target for tag {estimator_tag} registered twice"
            )));
        }
        Ok(())
    }

    /// The list tag an estimator was compiled against.
    #[must_use]
    pub fn estimator_target(&self, estimator_tag: i32) -> Option<i32> {
        self.estimator_targets.get(&estimator_tag).copied()
    }

    /// Guard against two sibling lists under one parent sharing an explicit
    /// label: the result tree could not tell them apart.
    pub fn register_sibling_label(
        &mut self,
        parent_tag: i32,
        label: &str,
    ) -> Result<(), GroupingError> {
        let siblings = self.sibling_labels.entry(parent_tag).or_default();
        if !siblings.insert(label.to_string()) {
            return Err(GroupingError::unsupported_request(format!(
                "duplicate sibling label '{label}'"
            )));
        }
        Ok(())
    }

    /// Fold one caller-supplied continuation position into the transform.
    /// Positions addressing other requests are ignored; unstable positions
    /// mark their node so its window is treated as non-authoritative.
    pub fn add_continuation(&mut self, continuation: &OffsetContinuation) {
        if !continuation.result_id().starts_with(&self.root_id) {
            return;
        }

        let offset = u64::try_from(continuation.offset()).unwrap_or(0);
        self.tag_offsets.insert(continuation.tag(), offset);
        self.id_offsets
            .insert(continuation.result_id().clone(), offset);

        if continuation.is_unstable() {
            self.unstable.insert(continuation.result_id().clone());
        }
    }

    /// Carried-in offset for a tag, used to widen the backend fetch window.
    #[must_use]
    pub fn offset_for_tag(&self, tag: i32) -> u64 {
        self.tag_offsets.get(&tag).copied().unwrap_or(0)
    }

    /// Carried-in offset for a result node, used as the page's first entry.
    #[must_use]
    pub fn offset_for_id(&self, result_id: &ResultId) -> u64 {
        self.id_offsets.get(result_id).copied().unwrap_or(0)
    }

    /// A position is stable unless a carried-in continuation flagged it.
    #[must_use]
    pub fn is_stable(&self, result_id: &ResultId) -> bool {
        !self.unstable.contains(result_id)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::GroupingTransform;
    use crate::{
        continuation::{FLAG_UNSTABLE, OffsetContinuation, ResultId},
        error::ErrorClass,
    };

    fn transform() -> GroupingTransform {
        GroupingTransform::new(ResultId::root().child(0))
    }

    #[test]
    fn registering_a_tag_twice_is_an_invariant_violation() {
        let mut t = transform();
        t.set_label(3, "by_a").expect("first registration");
        let err = t.set_label(3, "by_b").expect_err("second registration");
        assert_eq!(err.class, ErrorClass::InvariantViolation);

        t.set_max(3, 10).expect("first registration");
        let err = t.set_max(3, 20).expect_err("second registration");
        assert_eq!(err.class, ErrorClass::InvariantViolation);

        t.set_estimator_target(4, 3).expect("first registration");
        let err = t.set_estimator_target(4, 7).expect_err("second registration");
        assert_eq!(err.class, ErrorClass::InvariantViolation);
        assert_eq!(t.estimator_target(4), Some(3));
        assert_eq!(t.estimator_target(3), None);
    }

    #[test]
    fn duplicate_sibling_labels_are_unsupported() {
        let mut t = transform();
        t.register_sibling_label(1, "x").expect("first sibling");
        t.register_sibling_label(2, "x")
            .expect("same label under another parent is fine");

        let err = t
            .register_sibling_label(1, "x")
            .expect_err("duplicate under one parent");
        assert_eq!(err.class, ErrorClass::Unsupported);
        assert!(err.message.contains("'x'"), "message names the label");
    }

    #[test]
    fn continuations_for_other_requests_are_ignored() {
        let mut t = transform();
        let foreign = OffsetContinuation::new(ResultId::root().child(1).child(0), 4, 25, 0);
        t.add_continuation(&foreign);

        assert_eq!(t.offset_for_tag(4), 0);
        assert_eq!(t.offset_for_id(foreign.result_id()), 0);
    }

    #[test]
    fn unstable_continuations_mark_their_node() {
        let mut t = transform();
        let id = ResultId::root().child(0).child(2);
        t.add_continuation(&OffsetContinuation::new(id.clone(), 4, 10, FLAG_UNSTABLE));

        assert_eq!(t.offset_for_tag(4), 10);
        assert_eq!(t.offset_for_id(&id), 10);
        assert!(!t.is_stable(&id));
        assert!(t.is_stable(&ResultId::root().child(0)));
    }

    #[test]
    fn negative_offsets_clamp_to_zero() {
        let mut t = transform();
        let id = ResultId::root().child(0);
        t.add_continuation(&OffsetContinuation::new(id.clone(), 2, -5, 0));
        assert_eq!(t.offset_for_id(&id), 0);
    }
}
