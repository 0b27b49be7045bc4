//! Media attribute policy: which attributes to park until an element is visible.
//!
//! On insertion, recognized media elements have their URL-carrying attributes
//! moved into inert storage so the host does not fetch them. The first time the
//! element enters the viewport the attributes are put back, in table order, and
//! the visibility subscription is dropped. Hosts with native lazy loading get a
//! `loading="lazy"` attribute instead.
//!
//! | tag       | parked on `<source>` children | parked on the element |
//! |-----------|-------------------------------|-----------------------|
//! | `img`     |                               | `src`, `srcset`       |
//! | `iframe`  |                               | `src`                 |
//! | `picture` | `src`, `srcset`               |                       |
//! | `video`   | `src`                         | `poster`, `src`       |

use std::rc::{Rc, Weak};

use facet::Facet;

use crate::coordinator::Lazily;
use crate::element::{Element, Marker};
use crate::handler::VisibilityCallback;
use crate::visibility::ViewportObserver;

/// Media elements the policy knows how to defer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Iframe,
    Picture,
    Video,
}

impl MediaKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "img" => Some(MediaKind::Image),
            "iframe" => Some(MediaKind::Iframe),
            "picture" => Some(MediaKind::Picture),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            MediaKind::Image => "img",
            MediaKind::Iframe => "iframe",
            MediaKind::Picture => "picture",
            MediaKind::Video => "video",
        }
    }

    /// Attributes parked on each descendant `<source>`.
    pub fn source_attributes(self) -> &'static [&'static str] {
        match self {
            MediaKind::Picture => &["src", "srcset"],
            MediaKind::Video => &["src"],
            MediaKind::Image | MediaKind::Iframe => &[],
        }
    }

    /// Attributes parked on the element itself, after its sources.
    pub fn own_attributes(self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => &["src", "srcset"],
            MediaKind::Iframe => &["src"],
            MediaKind::Picture => &[],
            MediaKind::Video => &["poster", "src"],
        }
    }

    /// Every (element, attribute list) pair to swap, in table order.
    fn targets<E: Element>(self, element: &E) -> Vec<(E, &'static [&'static str])> {
        let mut targets = Vec::new();
        let source_attributes = self.source_attributes();
        if !source_attributes.is_empty() {
            for source in element.descendants_by_tag("source") {
                targets.push((source, source_attributes));
            }
        }
        let own_attributes = self.own_attributes();
        if !own_attributes.is_empty() {
            targets.push((element.clone(), own_attributes));
        }
        targets
    }
}

/// Where an element stands in the policy's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    /// Never seen, or not a recognized media element.
    Unregistered,
    /// Handed to the host's native `loading="lazy"` support.
    Native,
    /// Attributes parked, waiting for the first visibility event.
    Deferred,
    /// Attributes restored.
    Loaded,
}

/// Policy switches, usually parsed from JSON by the host.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(default)]
pub struct PolicyOptions {
    /// Use `loading="lazy"` where the host supports it instead of parking.
    pub prefer_native: bool,
    /// Restore every deferred element before the document is printed.
    pub load_on_print: bool,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            prefer_native: true,
            load_on_print: true,
        }
    }
}

/// Defers media loading for a [`Lazily`] coordinator.
///
/// The registration record lives on each element as [`Marker`]s, separate
/// from the insertion watcher's flag, so registering an element directly and
/// seeing it inserted later do not collide. Parked values go to the element's
/// stash. The policy itself holds no element.
pub struct MediaPolicy<E: Element, O: ViewportObserver<E>> {
    lazily: Weak<Lazily<E, O>>,
    options: PolicyOptions,
    on_visible: VisibilityCallback<E>,
}

impl<E: Element, O: ViewportObserver<E> + 'static> MediaPolicy<E, O> {
    /// Create the policy and subscribe it to `lazily`'s insertions.
    pub fn install(lazily: &Rc<Lazily<E, O>>, options: PolicyOptions) -> Rc<Self> {
        let policy = Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let on_visible: VisibilityCallback<E> = Rc::new(move |element: &E| {
                if let Some(policy) = weak.upgrade() {
                    policy.on_intersection(element);
                }
            });
            Self {
                lazily: Rc::downgrade(lazily),
                options,
                on_visible,
            }
        });

        let weak = Rc::downgrade(&policy);
        lazily.on_insertion(Rc::new(move |element: &E| {
            if let Some(policy) = weak.upgrade() {
                policy.register(element);
            }
        }));

        policy
    }

    pub fn options(&self) -> &PolicyOptions {
        &self.options
    }

    pub fn state(&self, element: &E) -> MediaState {
        if !element.is_marked(Marker::Media) {
            MediaState::Unregistered
        } else if element.is_marked(Marker::Native) {
            MediaState::Native
        } else if element.is_marked(Marker::Loaded) {
            MediaState::Loaded
        } else {
            MediaState::Deferred
        }
    }

    /// Parked attribute values of `element` (or one of its sources), in order.
    pub fn parked(&self, element: &E) -> Vec<(&'static str, String)> {
        parkable(element)
            .iter()
            .filter_map(|&name| element.stashed(name).map(|value| (name, value)))
            .collect()
    }

    /// Elements still waiting to be loaded, in no particular order.
    pub fn deferred(&self) -> Vec<E> {
        let Some(lazily) = self.lazily.upgrade() else {
            return Vec::new();
        };
        lazily
            .visibility()
            .observed_elements()
            .into_iter()
            .filter(|element| self.state(element) == MediaState::Deferred)
            .collect()
    }

    /// Defer `element` if it is a recognized media element seen for the first
    /// time. Returns whether anything was done.
    pub fn register(&self, element: &E) -> bool {
        let Some(kind) = MediaKind::from_tag(&element.tag_name()) else {
            return false;
        };
        let Some(lazily) = self.lazily.upgrade() else {
            return false;
        };
        if !lazily.is_supported() || !element.is_connected() {
            return false;
        }

        if !element.mark(Marker::Media) {
            trace!(?element, "media element already registered");
            return false;
        }

        if self.options.prefer_native && element.supports_native_lazy_loading() {
            if !element.has_attribute("loading") {
                if let Err(_e) = element.set_attribute("loading", "lazy") {
                    warn!(?element, error = %_e, "could not declare native lazy loading");
                }
            }
            element.mark(Marker::Native);
            debug!(?element, "using native lazy loading");
            return true;
        }

        for (target, attributes) in kind.targets(element) {
            self.park(&target, attributes);
        }
        debug!(?element, ?kind, "media deferred");

        lazily.observe_visibility(element.clone(), self.on_visible.clone());
        true
    }

    /// Restore the parked attributes of a deferred element. Returns false if
    /// the element was not deferred.
    pub fn load(&self, element: &E) -> bool {
        if self.state(element) != MediaState::Deferred {
            return false;
        }
        let Some(kind) = MediaKind::from_tag(&element.tag_name()) else {
            return false;
        };

        element.mark(Marker::Loaded);
        for (target, attributes) in kind.targets(element) {
            self.restore(&target, attributes);
        }
        debug!(?element, ?kind, "media loaded");
        true
    }

    /// Load every deferred element now and drop their subscriptions.
    pub fn load_all(&self) {
        for element in self.deferred() {
            self.on_intersection(&element);
        }
    }

    fn on_intersection(&self, element: &E) {
        self.load(element);
        if let Some(lazily) = self.lazily.upgrade() {
            lazily.unobserve_visibility(element, &self.on_visible);
        }
    }

    fn park(&self, target: &E, attributes: &'static [&'static str]) {
        for &name in attributes {
            let Some(value) = target.attribute(name) else {
                continue;
            };
            if let Err(_e) = target.remove_attribute(name) {
                warn!(element = ?target, attribute = name, error = %_e, "could not park attribute");
                continue;
            }
            target.stash(name, value);
        }
    }

    fn restore(&self, target: &E, attributes: &'static [&'static str]) {
        for &name in attributes {
            let Some(value) = target.unstash(name) else {
                continue;
            };
            if let Err(_e) = target.set_attribute(name, &value) {
                warn!(
                    element = ?target,
                    attribute = name,
                    error = %_e,
                    "could not restore attribute"
                );
            }
        }
    }
}

/// Attribute names that may be parked on `target`: a media element's own
/// list, or the union of source lists for a `<source>`.
fn parkable<E: Element>(target: &E) -> &'static [&'static str] {
    let tag = target.tag_name();
    match MediaKind::from_tag(&tag) {
        Some(kind) => kind.own_attributes(),
        None if tag == "source" => &["src", "srcset"],
        None => &[],
    }
}
