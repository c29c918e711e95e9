//! Element capabilities: identity, content equality, sections.
//!
//! Reconciliation needs two independent facts about every element:
//!
//! | Trait | Question | Drives |
//! |-------|----------|--------|
//! | [`Identifiable`] | Is this the same logical element? | Matching, moves |
//! | [`ContentEq`] | Did its payload change? | Replace ops |
//!
//! Sections add a third: they carry an ordered list of items ([`Sectionable`]).
//! Sections and items implement the traits independently, so a section can
//! be keyed by name while its rows are keyed by database id.

use std::fmt;
use std::hash::Hash;

use compact_str::CompactString;

// =============================================================================
// Capability traits
// =============================================================================

/// Stable identity used to match an element across old and new sequences.
///
/// Keys must be unique within one sequence; duplicates are rejected with
/// [`ReconcileError::DuplicateIdentity`](crate::ReconcileError::DuplicateIdentity).
pub trait Identifiable {
    /// Identity key type
    type Key: Eq + Hash + fmt::Debug;

    /// Return the identity key of this element.
    fn identity(&self) -> Self::Key;
}

/// Content equality for identity-matched elements.
///
/// Returning `false` for a matched pair produces a replace op.
pub trait ContentEq {
    /// Whether `self` and `other` render the same.
    fn content_eq(&self, other: &Self) -> bool;
}

/// A section: an element that owns an ordered list of items.
pub trait Sectionable: Identifiable + ContentEq {
    /// Item type stored in the section
    type Item: Identifiable + ContentEq;

    /// Items in visual order.
    fn items(&self) -> &[Self::Item];

    /// Optional header label.
    fn title(&self) -> Option<&str> {
        None
    }
}

// =============================================================================
// Section
// =============================================================================

/// General-purpose section with a key, an optional title and items.
///
/// Two sections with the same key are content-equal when their titles match.
/// Item changes are reported per item, so they do not count as section
/// content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<K, T> {
    pub id: K,
    pub title: Option<CompactString>,
    pub items: Vec<T>,
}

impl<K, T> Section<K, T> {
    /// Create an untitled section.
    pub fn new(id: K, items: Vec<T>) -> Self {
        Self {
            id,
            title: None,
            items,
        }
    }

    /// Set the header title.
    pub fn with_title(mut self, title: impl Into<CompactString>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the section has no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K, T> Identifiable for Section<K, T>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    type Key = K;

    fn identity(&self) -> K {
        self.id.clone()
    }
}

impl<K, T> ContentEq for Section<K, T> {
    fn content_eq(&self, other: &Self) -> bool {
        self.title == other.title
    }
}

impl<K, T> Sectionable for Section<K, T>
where
    K: Clone + Eq + Hash + fmt::Debug,
    T: Identifiable + ContentEq,
{
    type Item = T;

    fn items(&self) -> &[T] {
        &self.items
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}
