//! Host abstraction: element handles and the batches observers deliver.
//!
//! lazily never owns document nodes. A host (the browser through `lazily-wasm`,
//! or the headless [`arena_dom`](crate::arena_dom) document) hands out cheap,
//! identity-comparable handles that implement [`Element`], and feeds observer
//! batches to the [`Lazily`](crate::Lazily) coordinator as [`MutationRecord`]s
//! and [`IntersectionEntry`]s.

use std::fmt;
use std::hash::Hash;

use crate::Error;

/// Handle to an element living in a host document.
///
/// Two handles compare equal iff they point at the same element. All methods
/// take `&self`: like DOM handles, elements are mutated through shared
/// references and the document owns the storage.
pub trait Element: Clone + Eq + Hash + fmt::Debug + 'static {
    /// Lowercase local tag name (`"img"`, `"video"`, ...).
    fn tag_name(&self) -> String;

    /// Value of the attribute `name`, if present.
    fn attribute(&self, name: &str) -> Option<String>;

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), Error>;

    fn remove_attribute(&self, name: &str) -> Result<(), Error>;

    /// All descendant elements in document order, excluding `self`.
    fn descendants(&self) -> Vec<Self>;

    /// Descendant elements with the given tag, in document order.
    fn descendants_by_tag(&self, tag: &str) -> Vec<Self> {
        self.descendants()
            .into_iter()
            .filter(|el| el.tag_name() == tag)
            .collect()
    }

    /// Whether the element is currently attached to its document.
    fn is_connected(&self) -> bool;

    /// Whether the host honors a `loading="lazy"` attribute on this element.
    fn supports_native_lazy_loading(&self) -> bool;

    /// Set `marker` on the element. Returns false if it was already set.
    fn mark(&self, marker: Marker) -> bool;

    fn is_marked(&self, marker: Marker) -> bool;

    /// Keep `value` under `name` in storage that is not a live attribute.
    fn stash(&self, name: &str, value: String);

    fn stashed(&self, name: &str) -> Option<String>;

    /// Remove and return the value stashed under `name`.
    fn unstash(&self, name: &str) -> Option<String>;
}

/// Per-element flags, stored by the host on the element itself so they are
/// released with it. Marks are never cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Marker {
    /// Reported to the insertion handlers.
    Inserted = 1,
    /// Registered with the media policy.
    Media = 2,
    /// Handed to native `loading="lazy"`.
    Native = 4,
    /// Parked attributes restored.
    Loaded = 8,
}

impl Marker {
    pub fn bit(self) -> u8 {
        self as u8
    }
}

/// A node added to the document, as reported by a mutation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<E> {
    Element(E),
    Text,
    Comment,
    Other,
}

impl<E> Node<E> {
    pub fn as_element(&self) -> Option<&E> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn into_element(self) -> Option<E> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// One child-list mutation: the nodes it added, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord<E> {
    pub added_nodes: Vec<Node<E>>,
}

impl<E> MutationRecord<E> {
    pub fn new(added_nodes: Vec<Node<E>>) -> Self {
        Self { added_nodes }
    }
}

/// One intersection change for an observed element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntersectionEntry<E> {
    pub target: E,
    /// True when the target overlaps the viewport by any amount.
    pub is_intersecting: bool,
}

impl<E> IntersectionEntry<E> {
    pub fn entering(target: E) -> Self {
        Self {
            target,
            is_intersecting: true,
        }
    }

    pub fn leaving(target: E) -> Self {
        Self {
            target,
            is_intersecting: false,
        }
    }
}
