// Copyright 2026 Trialign Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tag selector — boolean tag-membership filtering for dataset resolution.
//!
//! A [`TagExpression`] is a disjunction of conjunctions (OR of AND-groups)
//! over integer tag ids: an entity matches when it holds *all* tags of at
//! least one group. The expression is validated once at construction and
//! evaluated many times; evaluation never fails.
//!
//! An expression with zero groups matches nothing. That is a documented
//! decision, not a bug: absence of criteria must not silently select an
//! entire project's worth of data.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Integer tag identifier as issued by the persistence layer.
pub type TagId = i64;

/// Entity identifier (data item primary key) as issued by the persistence
/// layer.
pub type EntityId = i64;

/// Validated OR-of-ANDs predicate over tag ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<TagId>>", into = "Vec<Vec<TagId>>")]
pub struct TagExpression {
    groups: Vec<Vec<TagId>>,
}

impl TagExpression {
    /// Build an expression from AND-groups. Fails with
    /// [`Error::InvalidExpression`] on negative ids or an empty AND-group;
    /// ids that merely don't exist in the system are accepted (existence
    /// is the caller's concern, and a nonexistent id simply never
    /// matches).
    pub fn new(groups: Vec<Vec<TagId>>) -> Result<Self> {
        for group in &groups {
            if group.is_empty() {
                return Err(Error::InvalidExpression(
                    "AND-group must name at least one tag".into(),
                ));
            }
            if let Some(&bad) = group.iter().find(|&&id| id < 0) {
                return Err(Error::InvalidExpression(format!(
                    "negative tag id {bad}"
                )));
            }
        }
        Ok(Self { groups })
    }

    /// The expression that matches nothing.
    pub fn empty() -> Self {
        Self { groups: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// True iff at least one AND-group is a subset of `tags`. Always false
    /// for the empty expression, including against the empty tag set.
    pub fn matches(&self, tags: &HashSet<TagId>) -> bool {
        self.groups
            .iter()
            .any(|group| group.iter().all(|id| tags.contains(id)))
    }

    /// Filter `(id, tags)` pairs down to the matching ids, preserving
    /// input order. No deduplication — callers pass already-unique
    /// collections.
    pub fn filter(&self, entities: &[(EntityId, HashSet<TagId>)]) -> Vec<EntityId> {
        entities
            .iter()
            .filter(|(_, tags)| self.matches(tags))
            .map(|(id, _)| *id)
            .collect()
    }
}

impl TryFrom<Vec<Vec<TagId>>> for TagExpression {
    type Error = Error;

    fn try_from(groups: Vec<Vec<TagId>>) -> Result<Self> {
        Self::new(groups)
    }
}

impl From<TagExpression> for Vec<Vec<TagId>> {
    fn from(expr: TagExpression) -> Self {
        expr.groups
    }
}
