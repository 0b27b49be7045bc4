//! Per-element visibility subscriptions on top of a viewport observer.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use smallvec::SmallVec;

use crate::element::{Element, IntersectionEntry};
use crate::handler::{VisibilityCallback, same_handler};

/// The host's viewport-intersection primitive.
///
/// Implementations start and stop delivering [`IntersectionEntry`]s for an
/// element; the entries themselves reach the registry through
/// [`VisibilityRegistry::dispatch`].
pub trait ViewportObserver<E> {
    fn observe(&self, element: &E);
    fn unobserve(&self, element: &E);
}

impl<E, O: ViewportObserver<E> + ?Sized> ViewportObserver<E> for std::rc::Rc<O> {
    fn observe(&self, element: &E) {
        (**self).observe(element)
    }

    fn unobserve(&self, element: &E) {
        (**self).unobserve(element)
    }
}

struct Registration<E> {
    id: u64,
    handler: VisibilityCallback<E>,
}

/// Most elements carry one or two subscribers.
type Registrations<E> = SmallVec<[Registration<E>; 2]>;

/// Maps observed elements to their ordered visibility handlers.
///
/// Each registration gets a unique id so that dispatch can tell whether a
/// handler it snapshotted is still subscribed when its turn comes.
pub struct VisibilityRegistry<E: Element, O: ViewportObserver<E>> {
    observer: Option<O>,
    table: RefCell<HashMap<E, Registrations<E>>>,
    next_id: Cell<u64>,
}

impl<E: Element, O: ViewportObserver<E>> VisibilityRegistry<E, O> {
    pub fn new(observer: O) -> Self {
        Self {
            observer: Some(observer),
            table: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// A registry for hosts without an intersection observer; every operation
    /// is a no-op.
    pub fn disabled() -> Self {
        Self {
            observer: None,
            table: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.observer.is_some()
    }

    pub fn observer(&self) -> Option<&O> {
        self.observer.as_ref()
    }

    /// Subscribe `handler` to `element`, starting the underlying observation on
    /// the first subscription. Detached elements are ignored.
    pub fn observe(&self, element: &E, handler: VisibilityCallback<E>) {
        let Some(observer) = &self.observer else {
            return;
        };

        if !element.is_connected() {
            trace!(?element, "ignoring detached element");
            return;
        }

        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let first = {
            let mut table = self.table.borrow_mut();
            let registrations = table.entry(element.clone()).or_default();
            registrations.push(Registration { id, handler });
            registrations.len() == 1
        };

        if first {
            debug!(?element, "observing visibility");
            observer.observe(element);
        }
    }

    /// Drop the first registration of `handler` for `element`. When none are
    /// left the element's entry is removed and observation stops.
    pub fn unobserve(&self, element: &E, handler: &VisibilityCallback<E>) {
        let Some(observer) = &self.observer else {
            return;
        };

        let emptied = {
            let mut table = self.table.borrow_mut();
            let Some(registrations) = table.get_mut(element) else {
                return;
            };
            let Some(index) = registrations
                .iter()
                .position(|r| same_handler(&r.handler, handler))
            else {
                return;
            };
            registrations.remove(index);
            if registrations.is_empty() {
                table.remove(element);
                true
            } else {
                false
            }
        };

        if emptied {
            debug!(?element, "no handlers left, unobserving");
            observer.unobserve(element);
        }
    }

    pub fn is_observed(&self, element: &E) -> bool {
        self.table.borrow().contains_key(element)
    }

    pub fn handler_count(&self, element: &E) -> usize {
        self.table.borrow().get(element).map_or(0, |r| r.len())
    }

    /// Whether `handler` is registered on any element.
    pub fn is_subscribed(&self, handler: &VisibilityCallback<E>) -> bool {
        self.table.borrow().values().any(|registrations| {
            registrations
                .iter()
                .any(|r| same_handler(&r.handler, handler))
        })
    }

    /// Elements with at least one subscriber, in no particular order.
    pub fn observed_elements(&self) -> Vec<E> {
        self.table.borrow().keys().cloned().collect()
    }

    /// Process one intersection batch in delivery order.
    pub fn dispatch<I>(&self, entries: I)
    where
        I: IntoIterator<Item = IntersectionEntry<E>>,
    {
        if self.observer.is_none() {
            return;
        }

        for entry in entries {
            if !entry.is_intersecting {
                continue;
            }
            self.notify(&entry.target);
        }
    }

    fn notify(&self, element: &E) {
        let snapshot: SmallVec<[(u64, VisibilityCallback<E>); 2]> =
            match self.table.borrow().get(element) {
                Some(registrations) => registrations
                    .iter()
                    .map(|r| (r.id, r.handler.clone()))
                    .collect(),
                None => return,
            };

        trace!(?element, handlers = snapshot.len(), "element visible");
        for (id, handler) in snapshot {
            // An earlier handler in this batch may have unsubscribed this one.
            if !self.is_registered(element, id) {
                continue;
            }
            handler.on_visible(element);
        }
    }

    fn is_registered(&self, element: &E, id: u64) -> bool {
        self.table
            .borrow()
            .get(element)
            .is_some_and(|registrations| registrations.iter().any(|r| r.id == id))
    }
}
