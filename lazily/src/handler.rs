//! Callback interfaces for insertion and visibility subscribers.
//!
//! Handlers are shared as `Rc<dyn ...>`: the same `Rc` passed to
//! [`observe_visibility`](crate::Lazily::observe_visibility) identifies the
//! registration when it is later passed to
//! [`unobserve_visibility`](crate::Lazily::unobserve_visibility).
//! Closures taking `&E` implement both traits.

use std::rc::Rc;

/// Receives every element inserted into the watched document, once.
pub trait InsertionHandler<E> {
    fn on_insertion(&self, element: &E);
}

/// Receives an element each time it enters the viewport.
pub trait VisibilityHandler<E> {
    fn on_visible(&self, element: &E);
}

impl<E, F> InsertionHandler<E> for F
where
    F: Fn(&E),
{
    fn on_insertion(&self, element: &E) {
        self(element)
    }
}

impl<E, F> VisibilityHandler<E> for F
where
    F: Fn(&E),
{
    fn on_visible(&self, element: &E) {
        self(element)
    }
}

pub type InsertionCallback<E> = Rc<dyn InsertionHandler<E>>;

pub type VisibilityCallback<E> = Rc<dyn VisibilityHandler<E>>;

/// Identity of a shared handler: the address of its allocation, ignoring vtables.
pub(crate) fn same_handler<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
