//! Reports each element added to the document to the insertion handlers, once.

use std::cell::RefCell;

use crate::element::{Element, Marker, MutationRecord, Node};
use crate::handler::InsertionCallback;

/// Turns mutation batches into per-element insertion events.
///
/// Every element is reported at most once: the first report sets
/// [`Marker::Inserted`] on the element and later batches (re-insertion, moves,
/// duplicate delivery) skip it. The flag lives on the element, so the watcher
/// holds no reference to anything it reported. Only added nodes are looked at,
/// so attribute writes made by handlers never feed back into dispatch.
pub struct InsertionWatcher<E: Element> {
    enabled: bool,
    handlers: RefCell<Vec<InsertionCallback<E>>>,
}

impl<E: Element> InsertionWatcher<E> {
    /// A watcher fed by a live mutation observer.
    pub fn new() -> Self {
        Self {
            enabled: true,
            handlers: RefCell::new(Vec::new()),
        }
    }

    /// A watcher for hosts without a mutation observer: registrations are
    /// accepted but never invoked.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a handler. Handlers are invoked in registration order and are
    /// never removed; registering one twice invokes it twice.
    pub fn subscribe(&self, handler: InsertionCallback<E>) {
        self.handlers.borrow_mut().push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn is_initialized(&self, element: &E) -> bool {
        element.is_marked(Marker::Inserted)
    }

    /// Process one mutation batch in delivery order.
    pub fn dispatch<I>(&self, records: I)
    where
        I: IntoIterator<Item = MutationRecord<E>>,
    {
        if !self.enabled {
            return;
        }

        for record in records {
            for node in record.added_nodes {
                match node {
                    Node::Element(element) => {
                        self.initialize(&element);
                    }
                    _ => trace!("skipping non-element node"),
                }
            }
        }
    }

    /// Flag `element` and report it to every handler. Returns false when the
    /// element was already reported or the watcher is disabled.
    pub fn initialize(&self, element: &E) -> bool {
        if !self.enabled {
            return false;
        }

        if !element.mark(Marker::Inserted) {
            trace!(?element, "already initialized");
            return false;
        }

        // Handlers may subscribe more handlers; those wait for the next element.
        let handlers: Vec<InsertionCallback<E>> = self.handlers.borrow().clone();
        debug!(?element, handlers = handlers.len(), "element inserted");
        for handler in &handlers {
            handler.on_insertion(element);
        }

        true
    }
}

impl<E: Element> Default for InsertionWatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}
