//! Deferred loading of embedded media, driven by two document observers.
//!
//! lazily provides:
//! - **Insertion watching**: every element added to the document is reported
//!   once to the registered [`InsertionHandler`]s
//! - **Visibility subscriptions**: any number of [`VisibilityHandler`]s per
//!   element, called each time it enters the viewport
//! - **Media policy**: parks the URL attributes of `img`, `iframe`, `picture`
//!   and `video` until they are visible, or hands them to native
//!   `loading="lazy"` when the host supports it
//! - **Headless host** (feature `headless`): an html5ever-parsed arena document
//!   and a simulated viewport
//!
//! The browser host lives in `lazily-wasm`. Hosts lacking either observation
//! primitive get a [`Lazily::unsupported`] coordinator, on which every
//! operation is a no-op.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use lazily::{Lazily, MediaPolicy, MediaState, PolicyOptions};
//! use lazily::arena_dom::Document;
//! use lazily::viewport::Viewport;
//!
//! let doc = Document::parse("<html><body></body></html>");
//! let viewport = Rc::new(Viewport::new());
//! let lazily = Rc::new(Lazily::with_observer(viewport.clone()));
//! let policy = MediaPolicy::install(&lazily, PolicyOptions::default());
//!
//! let body = doc.body().unwrap();
//! let img = doc.append_html(&body, r#"<img src="cat.jpg">"#).remove(0);
//! lazily.handle_mutations(doc.take_records());
//! assert_eq!(policy.state(&img), MediaState::Deferred);
//! assert_eq!(doc.to_html(), "<img>");
//!
//! viewport.show(&img);
//! lazily.handle_intersections(viewport.take_records());
//! assert_eq!(doc.to_html(), r#"<img src="cat.jpg">"#);
//! ```

#[macro_use]
mod tracing_macros;

mod coordinator;
mod error;
mod handler;
mod insertion;
mod policy;
mod visibility;

pub mod element;

#[cfg(feature = "headless")]
pub mod arena_dom;
#[cfg(feature = "headless")]
pub mod viewport;

pub use coordinator::Lazily;
pub use element::{Element, IntersectionEntry, Marker, MutationRecord, Node};
pub use error::Error;
pub use handler::{InsertionCallback, InsertionHandler, VisibilityCallback, VisibilityHandler};
pub use insertion::InsertionWatcher;
pub use policy::{MediaKind, MediaPolicy, MediaState, PolicyOptions};
pub use visibility::{ViewportObserver, VisibilityRegistry};
