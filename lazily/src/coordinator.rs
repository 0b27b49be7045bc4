//! The coordinator shared by every consumer of a document.

use crate::Error;
use crate::element::{Element, IntersectionEntry, MutationRecord};
use crate::handler::{InsertionCallback, VisibilityCallback};
use crate::insertion::InsertionWatcher;
use crate::visibility::{ViewportObserver, VisibilityRegistry};

/// One per document: routes insertions and visibility changes to subscribers.
///
/// The host owns the observation primitives. It builds the two watchers once,
/// hands them to [`Lazily::new`], and then forwards every mutation batch to
/// [`handle_mutations`](Self::handle_mutations) and every intersection batch
/// to [`handle_intersections`](Self::handle_intersections).
///
/// Registration methods return `&Self` so calls can be chained:
///
/// ```
/// use std::rc::Rc;
/// use lazily::{Lazily, arena_dom::{Document, ElementRef}, viewport::Viewport};
///
/// let doc = Document::parse("<html><body><img src=a.png></body></html>");
/// let lazily = Lazily::with_observer(Viewport::new());
/// let img = doc.query("img").unwrap();
///
/// lazily
///     .on_insertion(Rc::new(|el: &ElementRef| println!("inserted {el:?}")))
///     .observe_visibility(img, Rc::new(|el: &ElementRef| println!("visible {el:?}")));
/// ```
pub struct Lazily<E: Element, O: ViewportObserver<E>> {
    insertions: InsertionWatcher<E>,
    visibility: VisibilityRegistry<E, O>,
}

impl<E: Element, O: ViewportObserver<E>> Lazily<E, O> {
    pub fn new(insertions: InsertionWatcher<E>, visibility: VisibilityRegistry<E, O>) -> Self {
        Self {
            insertions,
            visibility,
        }
    }

    /// Wire a coordinator for a host that has both observation primitives.
    pub fn with_observer(observer: O) -> Self {
        Self::new(InsertionWatcher::new(), VisibilityRegistry::new(observer))
    }

    /// Wire a coordinator for a host lacking either primitive. Every operation
    /// is accepted and does nothing.
    pub fn unsupported() -> Self {
        Self::new(InsertionWatcher::disabled(), VisibilityRegistry::disabled())
    }

    pub fn is_supported(&self) -> bool {
        self.insertions.is_enabled() && self.visibility.is_enabled()
    }

    pub fn insertions(&self) -> &InsertionWatcher<E> {
        &self.insertions
    }

    pub fn visibility(&self) -> &VisibilityRegistry<E, O> {
        &self.visibility
    }

    /// Call `handler` with every element inserted from now on.
    pub fn on_insertion(&self, handler: InsertionCallback<E>) -> &Self {
        self.insertions.subscribe(handler);
        self
    }

    /// Call `handler` every time `target` enters the viewport.
    ///
    /// `target` may be `None` or a detached element, in which case nothing
    /// happens.
    pub fn observe_visibility(
        &self,
        target: impl Into<Option<E>>,
        handler: VisibilityCallback<E>,
    ) -> &Self {
        if let Some(element) = target.into() {
            self.visibility.observe(&element, handler);
        }
        self
    }

    /// [`on_insertion`](Self::on_insertion) for hosts whose handlers arrive
    /// untyped. `None` stands for a value that is not callable and is rejected
    /// with [`Error::InvalidHandler`] before anything is registered.
    pub fn try_on_insertion(&self, handler: Option<InsertionCallback<E>>) -> Result<&Self, Error> {
        let handler = handler.ok_or(Error::InvalidHandler)?;
        Ok(self.on_insertion(handler))
    }

    /// [`observe_visibility`](Self::observe_visibility) for untyped hosts. A
    /// missing target is checked first and still does nothing.
    pub fn try_observe_visibility(
        &self,
        target: impl Into<Option<E>>,
        handler: Option<VisibilityCallback<E>>,
    ) -> Result<&Self, Error> {
        let Some(element) = target.into() else {
            return Ok(self);
        };
        let handler = handler.ok_or(Error::InvalidHandler)?;
        Ok(self.observe_visibility(element, handler))
    }

    /// Remove the first registration of `handler` for `element`, if any.
    pub fn unobserve_visibility(&self, element: &E, handler: &VisibilityCallback<E>) -> &Self {
        self.visibility.unobserve(element, handler);
        self
    }

    /// Entry point for the host's mutation observer.
    pub fn handle_mutations<I>(&self, records: I)
    where
        I: IntoIterator<Item = MutationRecord<E>>,
    {
        self.insertions.dispatch(records);
    }

    /// Entry point for the host's intersection observer.
    pub fn handle_intersections<I>(&self, entries: I)
    where
        I: IntoIterator<Item = IntersectionEntry<E>>,
    {
        self.visibility.dispatch(entries);
    }

    /// Report `root` and its existing descendants as if they had just been
    /// inserted. Elements already reported are skipped.
    pub fn initialize_subtree(&self, root: &E) {
        if !self.is_supported() {
            return;
        }
        self.insertions.initialize(root);
        for element in root.descendants() {
            self.insertions.initialize(&element);
        }
    }
}
