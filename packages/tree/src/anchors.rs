//! # Anchors
//!
//! Stable places and ranges, and their resolution against a view.
//!
//! An anchor never points into a view. It names a position semantically
//! ("after node X", "end of trait T of node P") and is resolved against
//! whichever view the edit is being applied to. Sibling anchors follow the
//! sibling to wherever it currently lives; index anchors clamp into the
//! current trait length.
//!
//! ## Design
//!
//! Resolution never panics and never returns an error type: failures are
//! ordinary outcomes of concurrent editing, reported as
//! [`PlaceValidationResult`] / [`RangeValidationResult`] so the transaction
//! engine can classify the offending change.

use crate::view::TreeView;
use arbor_common::{NodeId, TraitLabel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trait of a specific parent node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitLocation<Id = NodeId> {
    pub parent: Id,
    pub label: TraitLabel,
}

impl<Id> TraitLocation<Id> {
    pub fn new(parent: Id, label: impl Into<TraitLabel>) -> Self {
        Self {
            parent,
            label: label.into(),
        }
    }
}

impl<Id: fmt::Display> fmt::Display for TraitLocation<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.parent, self.label)
    }
}

/// Insertion point anchored semantically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StablePlace<Id = NodeId> {
    Before(Id),
    After(Id),
    StartOf(TraitLocation<Id>),
    EndOf(TraitLocation<Id>),
    #[serde(rename_all = "camelCase")]
    AtIndex {
        trait_location: TraitLocation<Id>,
        index: usize,
    },
}

impl<Id: Copy> StablePlace<Id> {
    pub fn before(node: Id) -> Self {
        StablePlace::Before(node)
    }

    pub fn after(node: Id) -> Self {
        StablePlace::After(node)
    }

    pub fn at_start_of(trait_location: TraitLocation<Id>) -> Self {
        StablePlace::StartOf(trait_location)
    }

    pub fn at_end_of(trait_location: TraitLocation<Id>) -> Self {
        StablePlace::EndOf(trait_location)
    }

    pub fn at_index(trait_location: TraitLocation<Id>, index: usize) -> Self {
        StablePlace::AtIndex {
            trait_location,
            index,
        }
    }

    /// Sibling this place is anchored to, if any.
    pub fn sibling(&self) -> Option<Id> {
        match self {
            StablePlace::Before(id) | StablePlace::After(id) => Some(*id),
            _ => None,
        }
    }

    pub fn trait_location(&self) -> Option<&TraitLocation<Id>> {
        match self {
            StablePlace::StartOf(t) | StablePlace::EndOf(t) => Some(t),
            StablePlace::AtIndex { trait_location, .. } => Some(trait_location),
            _ => None,
        }
    }

    pub fn try_map_node_ids<U, E>(
        &self,
        f: &mut impl FnMut(Id) -> Result<U, E>,
    ) -> Result<StablePlace<U>, E> {
        Ok(match self {
            StablePlace::Before(id) => StablePlace::Before(f(*id)?),
            StablePlace::After(id) => StablePlace::After(f(*id)?),
            StablePlace::StartOf(t) => StablePlace::StartOf(map_trait_location(t, f)?),
            StablePlace::EndOf(t) => StablePlace::EndOf(map_trait_location(t, f)?),
            StablePlace::AtIndex {
                trait_location,
                index,
            } => StablePlace::AtIndex {
                trait_location: map_trait_location(trait_location, f)?,
                index: *index,
            },
        })
    }
}

fn map_trait_location<Id: Copy, U, E>(
    t: &TraitLocation<Id>,
    f: &mut impl FnMut(Id) -> Result<U, E>,
) -> Result<TraitLocation<U>, E> {
    Ok(TraitLocation {
        parent: f(t.parent)?,
        label: t.label.clone(),
    })
}

/// Inclusive span of siblings, bounded by two places in the same trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StableRange<Id = NodeId> {
    pub start: StablePlace<Id>,
    pub end: StablePlace<Id>,
}

impl<Id: Copy> StableRange<Id> {
    /// Exactly `node`.
    pub fn only(node: Id) -> Self {
        Self {
            start: StablePlace::Before(node),
            end: StablePlace::After(node),
        }
    }

    /// Every child of a trait.
    pub fn all(trait_location: TraitLocation<Id>) -> Self {
        Self {
            start: StablePlace::StartOf(trait_location.clone()),
            end: StablePlace::EndOf(trait_location),
        }
    }

    pub fn from(start: StablePlace<Id>) -> RangeBuilder<Id> {
        RangeBuilder { start }
    }

    pub fn try_map_node_ids<U, E>(
        &self,
        f: &mut impl FnMut(Id) -> Result<U, E>,
    ) -> Result<StableRange<U>, E> {
        Ok(StableRange {
            start: self.start.try_map_node_ids(f)?,
            end: self.end.try_map_node_ids(f)?,
        })
    }
}

/// Second half of `StableRange::from(a).to(b)`.
pub struct RangeBuilder<Id = NodeId> {
    start: StablePlace<Id>,
}

impl<Id> RangeBuilder<Id> {
    pub fn to(self, end: StablePlace<Id>) -> StableRange<Id> {
        StableRange {
            start: self.start,
            end,
        }
    }
}

/// A place resolved against a specific view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeViewPlace {
    pub trait_location: TraitLocation,
    pub index: usize,
}

/// A range resolved against a specific view: `start..end` of one trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeViewRange {
    pub trait_location: TraitLocation,
    pub start: usize,
    pub end: usize,
}

impl TreeViewRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaceValidationResult {
    Valid,
    Malformed,
    SiblingIsRootOrDetached,
    MissingSibling,
    MissingParent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RangeValidationResult {
    Valid,
    Inverted,
    PlacesInDifferentTraits,
    BadPlace(PlaceValidationResult),
}

impl RangeValidationResult {
    pub fn is_malformed(&self) -> bool {
        matches!(self, RangeValidationResult::BadPlace(PlaceValidationResult::Malformed))
    }
}

/// Check a place against a view without resolving it.
pub fn validate_stable_place<V: TreeView + ?Sized>(view: &V, place: &StablePlace) -> PlaceValidationResult {
    match place {
        StablePlace::Before(sibling) | StablePlace::After(sibling) => {
            if !view.has_node(*sibling) {
                PlaceValidationResult::MissingSibling
            } else if view.parent_of(*sibling).is_none() {
                PlaceValidationResult::SiblingIsRootOrDetached
            } else {
                PlaceValidationResult::Valid
            }
        }
        StablePlace::StartOf(t) | StablePlace::EndOf(t) | StablePlace::AtIndex { trait_location: t, .. } => {
            if t.label.as_str().is_empty() {
                PlaceValidationResult::Malformed
            } else if !view.has_node(t.parent) {
                PlaceValidationResult::MissingParent
            } else {
                PlaceValidationResult::Valid
            }
        }
    }
}

/// Resolve a place to a concrete trait position.
pub fn resolve_place<V: TreeView + ?Sized>(
    view: &V,
    place: &StablePlace,
) -> Result<TreeViewPlace, PlaceValidationResult> {
    match validate_stable_place(view, place) {
        PlaceValidationResult::Valid => {}
        bad => return Err(bad),
    }
    let sibling_place = |sibling: NodeId, offset: usize| -> Result<TreeViewPlace, PlaceValidationResult> {
        let trait_location = view
            .parent_of(sibling)
            .ok_or(PlaceValidationResult::SiblingIsRootOrDetached)?;
        let index = view
            .index_in_trait(sibling)
            .ok_or(PlaceValidationResult::SiblingIsRootOrDetached)?;
        Ok(TreeViewPlace {
            trait_location,
            index: index + offset,
        })
    };
    match place {
        StablePlace::Before(sibling) => sibling_place(*sibling, 0),
        StablePlace::After(sibling) => sibling_place(*sibling, 1),
        StablePlace::StartOf(t) => Ok(TreeViewPlace {
            trait_location: t.clone(),
            index: 0,
        }),
        StablePlace::EndOf(t) => Ok(TreeViewPlace {
            trait_location: t.clone(),
            index: view.trait_children(t).len(),
        }),
        StablePlace::AtIndex {
            trait_location,
            index,
        } => Ok(TreeViewPlace {
            trait_location: trait_location.clone(),
            index: (*index).min(view.trait_children(trait_location).len()),
        }),
    }
}

/// Check a range against a view without resolving it.
pub fn validate_stable_range<V: TreeView + ?Sized>(view: &V, range: &StableRange) -> RangeValidationResult {
    match resolve_range(view, range) {
        Ok(_) => RangeValidationResult::Valid,
        Err(result) => result,
    }
}

/// Resolve both ends of a range into one trait.
pub fn resolve_range<V: TreeView + ?Sized>(
    view: &V,
    range: &StableRange,
) -> Result<TreeViewRange, RangeValidationResult> {
    let start = resolve_place(view, &range.start).map_err(RangeValidationResult::BadPlace)?;
    let end = resolve_place(view, &range.end).map_err(RangeValidationResult::BadPlace)?;
    if start.trait_location != end.trait_location {
        return Err(RangeValidationResult::PlacesInDifferentTraits);
    }
    if start.index > end.index {
        return Err(RangeValidationResult::Inverted);
    }
    Ok(TreeViewRange {
        trait_location: start.trait_location,
        start: start.index,
        end: end.index,
    })
}

/// Place that puts nodes back where `range` starts in `view`, anchored to
/// the sibling just before it when there is one.
pub fn place_before_range<V: TreeView + ?Sized>(view: &V, range: &TreeViewRange) -> StablePlace {
    let children = view.trait_children(&range.trait_location);
    match range.start.checked_sub(1).and_then(|i| children.get(i)) {
        Some(prev) => StablePlace::After(*prev),
        None => match children.get(range.end) {
            Some(next) => StablePlace::Before(*next),
            None => StablePlace::StartOf(range.trait_location.clone()),
        },
    }
}
