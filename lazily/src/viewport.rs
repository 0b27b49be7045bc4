//! Simulated viewport for the headless host.
//!
//! The test (or embedding) decides which elements are on screen with
//! [`Viewport::show`] and [`Viewport::hide`]; the viewport queues an
//! [`IntersectionEntry`] for every change of an observed element, plus the
//! initial entry a browser delivers when observation starts. Entries are
//! drained with [`Viewport::take_records`] and fed to
//! [`Lazily::handle_intersections`](crate::Lazily::handle_intersections).

use std::cell::RefCell;
use std::collections::HashSet;

use indexmap::IndexSet;

use crate::arena_dom::ElementRef;
use crate::element::IntersectionEntry;
use crate::visibility::ViewportObserver;

#[derive(Default)]
pub struct Viewport {
    observed: RefCell<IndexSet<ElementRef>>,
    visible: RefCell<HashSet<ElementRef>>,
    pending: RefCell<Vec<IntersectionEntry<ElementRef>>>,
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `element` on screen.
    pub fn show(&self, element: &ElementRef) {
        if self.visible.borrow_mut().insert(element.clone()) && self.is_observing(element) {
            self.queue(IntersectionEntry::entering(element.clone()));
        }
    }

    /// Take `element` off screen.
    pub fn hide(&self, element: &ElementRef) {
        if self.visible.borrow_mut().remove(element) && self.is_observing(element) {
            self.queue(IntersectionEntry::leaving(element.clone()));
        }
    }

    pub fn is_visible(&self, element: &ElementRef) -> bool {
        self.visible.borrow().contains(element)
    }

    pub fn is_observing(&self, element: &ElementRef) -> bool {
        self.observed.borrow().contains(element)
    }

    /// Observed elements, in the order observation started.
    pub fn observed(&self) -> Vec<ElementRef> {
        self.observed.borrow().iter().cloned().collect()
    }

    /// Drain the queued entries.
    pub fn take_records(&self) -> Vec<IntersectionEntry<ElementRef>> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    fn queue(&self, entry: IntersectionEntry<ElementRef>) {
        self.pending.borrow_mut().push(entry);
    }
}

impl ViewportObserver<ElementRef> for Viewport {
    fn observe(&self, element: &ElementRef) {
        if !self.observed.borrow_mut().insert(element.clone()) {
            return;
        }
        let entry = IntersectionEntry {
            target: element.clone(),
            is_intersecting: self.is_visible(element),
        };
        self.queue(entry);
    }

    fn unobserve(&self, element: &ElementRef) {
        if self.observed.borrow_mut().shift_remove(element) {
            self.pending
                .borrow_mut()
                .retain(|entry| &entry.target != element);
        }
    }
}
