// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Tag Set
//!
//! An ordered, de-duplicated sequence of short tags attached to a record.
//! Insertion order is preserved (unlike a `HashSet`) because tags are
//! frequently displayed in the order a caller supplied them.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `[A-Za-z0-9_.-]+`, checked by hand rather than compiling a `regex::Regex`
/// per tag (tags are on the hot producer path).
fn is_valid_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn validate_tag(tag: &str) -> Result<(), PipelineError> {
    if tag.is_empty() {
        return Err(PipelineError::invalid_config("tag must not be empty"));
    }
    if tag.contains('\n') || tag.contains('\r') {
        return Err(PipelineError::invalid_config(format!(
            "tag '{tag}' must not contain a line break"
        )));
    }
    if !tag.chars().all(is_valid_tag_char) {
        return Err(PipelineError::invalid_config(format!(
            "tag '{tag}' contains a character outside [A-Za-z0-9_.-]"
        )));
    }
    Ok(())
}

/// A single interned tag string.
pub type Tag = Arc<str>;

/// An ordered, de-duplicated set of tags.
///
/// Equality and hashing are by content, not by the identity of the backing
/// `Arc`s, so two tag sets built independently from the same strings compare
/// equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    /// The distinguished empty tag set. Cheap to clone (no allocation).
    pub fn empty() -> TagSet {
        TagSet { tags: Vec::new() }
    }

    /// Builds a tag set from raw strings, validating and de-duplicating
    /// while preserving first-seen order.
    pub fn new<I, S>(tags: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<Tag> = Vec::new();
        for raw in tags {
            let raw = raw.as_ref();
            validate_tag(raw)?;
            if !out.iter().any(|t| t.as_ref() == raw) {
                out.push(Arc::from(raw));
            }
        }
        Ok(Self { tags: out })
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.as_ref() == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.as_ref())
    }

    /// The set union, preserving `self`'s order then any new tags from
    /// `other` in `other`'s order.
    pub fn union(&self, other: &TagSet) -> TagSet {
        let mut out = self.tags.clone();
        for t in &other.tags {
            if !out.iter().any(|x| x == t) {
                out.push(t.clone());
            }
        }
        TagSet { tags: out }
    }

    /// Tags present in `self` but not in `other`, preserving `self`'s order.
    pub fn difference(&self, other: &TagSet) -> TagSet {
        let out = self
            .tags
            .iter()
            .filter(|t| !other.tags.iter().any(|o| o == *t))
            .cloned()
            .collect();
        TagSet { tags: out }
    }
}

impl PartialEq for TagSet {
    fn eq(&self, other: &Self) -> bool {
        self.tags.len() == other.tags.len()
            && self.tags.iter().all(|t| other.contains(t.as_ref()))
    }
}
impl Eq for TagSet {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_newline_and_invalid_chars() {
        assert!(TagSet::new(["ok-tag_1.2"]).is_ok());
        assert!(TagSet::new(["bad\ntag"]).is_err());
        assert!(TagSet::new(["bad tag"]).is_err());
    }

    #[test]
    fn deduplicates_preserving_first_order() {
        let ts = TagSet::new(["b", "a", "b", "c"]).unwrap();
        let collected: Vec<_> = ts.iter().collect();
        assert_eq!(collected, vec!["b", "a", "c"]);
    }

    #[test]
    fn union_and_difference() {
        let a = TagSet::new(["x", "y"]).unwrap();
        let b = TagSet::new(["y", "z"]).unwrap();
        let u = a.union(&b);
        assert_eq!(u.len(), 3);
        let d = a.difference(&b);
        assert_eq!(d.iter().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn empty_set_is_equal_regardless_of_construction() {
        let e1 = TagSet::empty();
        let e2 = TagSet::new(Vec::<String>::new()).unwrap();
        assert_eq!(e1, e2);
    }

    #[test]
    fn equality_ignores_order() {
        let a = TagSet::new(["a", "b"]).unwrap();
        let b = TagSet::new(["b", "a"]).unwrap();
        assert_eq!(a, b);
    }
}
