//! Browser host for lazily.
//!
//! Wires one `MutationObserver` (rooted at `document.documentElement`, watching
//! the child lists of the whole subtree) and one `IntersectionObserver` to a
//! [`Lazily`] coordinator, installs the media policy, and exposes the
//! coordinator to JavaScript:
//!
//! ```js
//! import init, { start } from "./lazily_wasm.js";
//! await init();
//! const lazily = start();
//! lazily
//!     .onInsertion((el) => console.log("inserted", el))
//!     .observeVisibility(banner, onBannerVisible);
//! ```
//!
//! When the window lacks either observer, [`start`] returns a handle on which
//! every call is accepted and does nothing.

use std::cell::{Cell, RefCell};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use js_sys::{Array, Function, Object, Reflect, Symbol};
use lazily::{
    Element, Error, InsertionCallback, InsertionHandler, IntersectionEntry, Lazily, Marker,
    MediaPolicy, MutationRecord, Node, PolicyOptions, ViewportObserver, VisibilityCallback,
    VisibilityHandler,
};
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

thread_local! {
    static ELEMENT_KEY: Symbol = Symbol::for_("lazily.element");
    static MARKS_KEY: Symbol = Symbol::for_("lazily.marks");
    static STASH_KEY: Symbol = Symbol::for_("lazily.stash");
    static NEXT_ELEMENT_ID: Cell<u32> = const { Cell::new(1) };
    static RUNTIME: RefCell<Option<LazilyHandle>> = const { RefCell::new(None) };
}

/// A DOM element with a stable identity for hashing.
///
/// The id, the marks and the stash all live on the element itself under
/// symbols, so every wrapper of the same element agrees on them and they are
/// collected with the element.
#[derive(Clone, Debug)]
pub struct WebElement {
    element: web_sys::Element,
    id: u32,
}

impl WebElement {
    pub fn new(element: web_sys::Element) -> Self {
        let id = ELEMENT_KEY.with(|key| {
            if let Some(id) = Reflect::get(&element, key).ok().and_then(|v| v.as_f64()) {
                return id as u32;
            }
            let id = NEXT_ELEMENT_ID.with(|next| {
                let id = next.get();
                next.set(id + 1);
                id
            });
            if Reflect::set(&element, key, &JsValue::from(id)).is_err() {
                warn!(id, "could not tag element with its id");
            }
            id
        });
        Self { element, id }
    }

    pub fn element(&self) -> &web_sys::Element {
        &self.element
    }

    fn marks(&self) -> u8 {
        MARKS_KEY.with(|key| {
            Reflect::get(&self.element, key)
                .ok()
                .and_then(|v| v.as_f64())
                .map_or(0, |v| v as u8)
        })
    }

    /// The element's stash object, created on first use when `create` is set.
    fn stash_object(&self, create: bool) -> Option<Object> {
        STASH_KEY.with(|key| {
            let existing = Reflect::get(&self.element, key)
                .ok()
                .and_then(|v| v.dyn_into::<Object>().ok());
            if existing.is_some() || !create {
                return existing;
            }
            let object = Object::new();
            match Reflect::set(&self.element, key, &object) {
                Ok(_) => Some(object),
                Err(e) => {
                    warn!(error = ?e, "could not attach stash to element");
                    None
                }
            }
        })
    }
}

impl PartialEq for WebElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Object::is(&self.element, &other.element)
    }
}

impl Eq for WebElement {}

impl Hash for WebElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn js_message(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

impl Element for WebElement {
    fn tag_name(&self) -> String {
        self.element.local_name().to_ascii_lowercase()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.element.get_attribute(name)
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.element.has_attribute(name)
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), Error> {
        self.element
            .set_attribute(name, value)
            .map_err(|e| Error::host("set", name, js_message(&e)))
    }

    fn remove_attribute(&self, name: &str) -> Result<(), Error> {
        self.element
            .remove_attribute(name)
            .map_err(|e| Error::host("remove", name, js_message(&e)))
    }

    fn descendants(&self) -> Vec<Self> {
        query_all(&self.element, "*")
    }

    fn descendants_by_tag(&self, tag: &str) -> Vec<Self> {
        query_all(&self.element, tag)
    }

    fn is_connected(&self) -> bool {
        self.element.is_connected()
    }

    fn supports_native_lazy_loading(&self) -> bool {
        Reflect::has(&self.element, &JsValue::from_str("loading")).unwrap_or(false)
    }

    fn mark(&self, marker: Marker) -> bool {
        let marks = self.marks();
        if marks & marker.bit() != 0 {
            return false;
        }
        let value = JsValue::from(marks | marker.bit());
        if MARKS_KEY.with(|key| Reflect::set(&self.element, key, &value)).is_err() {
            warn!(?marker, "could not mark element");
        }
        true
    }

    fn is_marked(&self, marker: Marker) -> bool {
        self.marks() & marker.bit() != 0
    }

    fn stash(&self, name: &str, value: String) {
        if let Some(stash) = self.stash_object(true) {
            let _ = Reflect::set(&stash, &JsValue::from_str(name), &JsValue::from(value));
        }
    }

    fn stashed(&self, name: &str) -> Option<String> {
        let stash = self.stash_object(false)?;
        Reflect::get(&stash, &JsValue::from_str(name))
            .ok()
            .and_then(|v| v.as_string())
    }

    fn unstash(&self, name: &str) -> Option<String> {
        let stash = self.stash_object(false)?;
        let key = JsValue::from_str(name);
        let value = Reflect::get(&stash, &key).ok().and_then(|v| v.as_string())?;
        let _ = Reflect::delete_property(&stash, &key);
        Some(value)
    }
}

fn query_all(root: &web_sys::Element, selector: &str) -> Vec<WebElement> {
    let Ok(list) = root.query_selector_all(selector) else {
        return Vec::new();
    };
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
        .map(WebElement::new)
        .collect()
}

/// The window's `IntersectionObserver` and the closure it calls.
pub struct WebViewport {
    observer: web_sys::IntersectionObserver,
    _callback: Closure<dyn FnMut(Array, web_sys::IntersectionObserver)>,
}

impl ViewportObserver<WebElement> for WebViewport {
    fn observe(&self, element: &WebElement) {
        self.observer.observe(&element.element);
    }

    fn unobserve(&self, element: &WebElement) {
        self.observer.unobserve(&element.element);
    }
}

type WebLazily = Lazily<WebElement, WebViewport>;

impl WebViewport {
    fn new(lazily: Weak<WebLazily>) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(Array, web_sys::IntersectionObserver)>::new(
            move |entries: Array, _observer: web_sys::IntersectionObserver| {
                let Some(lazily) = lazily.upgrade() else {
                    return;
                };
                let entries = entries.iter().map(|entry| {
                    let entry: web_sys::IntersectionObserverEntry = entry.unchecked_into();
                    IntersectionEntry {
                        target: WebElement::new(entry.target()),
                        is_intersecting: entry.is_intersecting(),
                    }
                });
                lazily.handle_intersections(entries);
            },
        );
        let observer = web_sys::IntersectionObserver::new(callback.as_ref().unchecked_ref())?;
        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

/// The document's `MutationObserver` and the closure it calls.
struct InsertionSource {
    observer: web_sys::MutationObserver,
    _callback: Closure<dyn FnMut(Array, web_sys::MutationObserver)>,
}

impl InsertionSource {
    fn start(lazily: Weak<WebLazily>, root: &web_sys::Element) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(Array, web_sys::MutationObserver)>::new(
            move |records: Array, _observer: web_sys::MutationObserver| {
                let Some(lazily) = lazily.upgrade() else {
                    return;
                };
                let records = records.iter().map(|record| {
                    let record: web_sys::MutationRecord = record.unchecked_into();
                    mutation_record(&record)
                });
                lazily.handle_mutations(records);
            },
        );
        let observer = web_sys::MutationObserver::new(callback.as_ref().unchecked_ref())?;

        let init = web_sys::MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer.observe_with_options(root, &init)?;

        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for InsertionSource {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

fn mutation_record(record: &web_sys::MutationRecord) -> MutationRecord<WebElement> {
    let added = record.added_nodes();
    let added_nodes = (0..added.length())
        .filter_map(|i| added.item(i))
        .map(|node| match node.node_type() {
            web_sys::Node::ELEMENT_NODE => match node.dyn_into::<web_sys::Element>() {
                Ok(element) => Node::Element(WebElement::new(element)),
                Err(_) => Node::Other,
            },
            web_sys::Node::TEXT_NODE => Node::Text,
            web_sys::Node::COMMENT_NODE => Node::Comment,
            _ => Node::Other,
        })
        .collect();
    MutationRecord::new(added_nodes)
}

/// Whether the window has both observation primitives.
fn is_supported(window: &web_sys::Window) -> bool {
    let has = |name: &str| Reflect::has(window, &JsValue::from_str(name)).unwrap_or(false);
    has("MutationObserver") && has("IntersectionObserver")
}

/// A JavaScript function registered as a handler.
struct JsHandler {
    function: Function,
}

impl JsHandler {
    fn call(&self, element: &WebElement) {
        if let Err(e) = self.function.call1(&JsValue::NULL, element.element()) {
            warn!(error = ?e, "handler threw");
        }
    }
}

impl InsertionHandler<WebElement> for JsHandler {
    fn on_insertion(&self, element: &WebElement) {
        self.call(element)
    }
}

impl VisibilityHandler<WebElement> for JsHandler {
    fn on_visible(&self, element: &WebElement) {
        self.call(element)
    }
}

fn callable(handler: JsValue) -> Option<Function> {
    handler.dyn_into::<Function>().ok()
}

fn js_error(error: Error) -> JsValue {
    js_sys::Error::new(&error.to_string()).into()
}

struct Runtime {
    lazily: Rc<WebLazily>,
    options: PolicyOptions,
    policy: Option<Rc<MediaPolicy<WebElement, WebViewport>>>,
    /// Visibility handlers by JS function, so unobserve finds the same registration.
    visibility_handlers: RefCell<Vec<(Function, VisibilityCallback<WebElement>)>>,
    _insertions: Option<InsertionSource>,
    _before_print: Option<Closure<dyn FnMut()>>,
}

impl Runtime {
    fn visibility_handler(&self, function: Function) -> VisibilityCallback<WebElement> {
        let mut handlers = self.visibility_handlers.borrow_mut();
        if let Some((_, handler)) = handlers.iter().find(|(f, _)| Object::is(f, &function)) {
            return handler.clone();
        }
        let handler: VisibilityCallback<WebElement> = Rc::new(JsHandler {
            function: function.clone(),
        });
        handlers.push((function, handler.clone()));
        handler
    }

    fn find_visibility_handler(
        &self,
        function: &Function,
    ) -> Option<VisibilityCallback<WebElement>> {
        self.visibility_handlers
            .borrow()
            .iter()
            .find(|(f, _)| Object::is(f, function))
            .map(|(_, handler)| handler.clone())
    }

    /// Drop the cached wrapper once its function has no registration left.
    fn forget_if_unused(&self, handler: &VisibilityCallback<WebElement>) {
        if self.lazily.visibility().is_subscribed(handler) {
            return;
        }
        self.visibility_handlers
            .borrow_mut()
            .retain(|(_, cached)| !std::ptr::addr_eq(Rc::as_ptr(cached), Rc::as_ptr(handler)));
    }
}

/// JavaScript handle on the document's coordinator. Methods return the handle
/// so calls can be chained.
#[wasm_bindgen(js_name = Lazily)]
#[derive(Clone)]
pub struct LazilyHandle {
    runtime: Rc<Runtime>,
}

#[wasm_bindgen(js_class = Lazily)]
impl LazilyHandle {
    #[wasm_bindgen(getter, js_name = isSupported)]
    pub fn is_supported(&self) -> bool {
        self.runtime.lazily.is_supported()
    }

    #[wasm_bindgen(getter, js_name = insertionHandlerCount)]
    pub fn insertion_handler_count(&self) -> usize {
        self.runtime.lazily.insertions().handler_count()
    }

    /// Call `handler(element)` for every element inserted from now on.
    #[wasm_bindgen(js_name = onInsertion)]
    pub fn on_insertion(&self, handler: JsValue) -> Result<LazilyHandle, JsValue> {
        let handler = callable(handler).map(|function| {
            let handler: InsertionCallback<WebElement> = Rc::new(JsHandler { function });
            handler
        });
        self.runtime
            .lazily
            .try_on_insertion(handler)
            .map_err(js_error)?;
        Ok(self.clone())
    }

    /// Call `handler(element)` each time `element` enters the viewport.
    /// Non-elements are ignored.
    #[wasm_bindgen(js_name = observeVisibility)]
    pub fn observe_visibility(
        &self,
        element: JsValue,
        handler: JsValue,
    ) -> Result<LazilyHandle, JsValue> {
        let element = element
            .dyn_into::<web_sys::Element>()
            .ok()
            .map(WebElement::new);
        let handler = match (&element, callable(handler)) {
            (Some(_), Some(function)) => Some(self.runtime.visibility_handler(function)),
            _ => None,
        };

        let result = self
            .runtime
            .lazily
            .try_observe_visibility(element, handler.clone())
            .map(|_| ())
            .map_err(js_error);
        // Detached elements register nothing.
        if let Some(handler) = &handler {
            self.runtime.forget_if_unused(handler);
        }
        result?;
        Ok(self.clone())
    }

    /// Remove one registration of `handler` for `element`, if any.
    #[wasm_bindgen(js_name = unobserveVisibility)]
    pub fn unobserve_visibility(&self, element: JsValue, handler: JsValue) -> LazilyHandle {
        let (Ok(element), Ok(function)) = (
            element.dyn_into::<web_sys::Element>(),
            handler.dyn_into::<Function>(),
        ) else {
            return self.clone();
        };
        if let Some(handler) = self.runtime.find_visibility_handler(&function) {
            self.runtime
                .lazily
                .unobserve_visibility(&WebElement::new(element), &handler);
            self.runtime.forget_if_unused(&handler);
        }
        self.clone()
    }

    /// Restore every deferred media element now.
    #[wasm_bindgen(js_name = loadAll)]
    pub fn load_all(&self) {
        if let Some(policy) = &self.runtime.policy {
            policy.load_all();
        }
    }
}

/// Start lazily on the current document with default options.
#[wasm_bindgen]
pub fn start() -> Result<LazilyHandle, JsValue> {
    start_with(PolicyOptions::default())
}

/// Start lazily with options given as JSON, e.g. `{"prefer_native": false}`.
#[wasm_bindgen(js_name = startWithOptions)]
pub fn start_with_options(options_json: &str) -> Result<LazilyHandle, JsValue> {
    let options: PolicyOptions = facet_json::from_str(options_json)
        .map_err(|e| JsValue::from_str(&format!("invalid options: {e}")))?;
    start_with(options)
}

fn start_with(options: PolicyOptions) -> Result<LazilyHandle, JsValue> {
    if let Some(handle) = RUNTIME.with(|runtime| runtime.borrow().clone()) {
        if handle.runtime.options != options {
            debug!(?options, "lazily already started, new options ignored");
        }
        return Ok(handle);
    }

    wasm_tracing::set_as_global_default();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let root = window
        .document()
        .and_then(|document| document.document_element())
        .ok_or_else(|| JsValue::from_str("no document element"))?;

    let runtime = if is_supported(&window) {
        supported_runtime(&window, &root, options)?
    } else {
        debug!("MutationObserver or IntersectionObserver missing, running as a no-op");
        Runtime {
            lazily: Rc::new(Lazily::unsupported()),
            options,
            policy: None,
            visibility_handlers: RefCell::new(Vec::new()),
            _insertions: None,
            _before_print: None,
        }
    };

    let handle = LazilyHandle {
        runtime: Rc::new(runtime),
    };
    RUNTIME.with(|runtime| *runtime.borrow_mut() = Some(handle.clone()));
    Ok(handle)
}

fn supported_runtime(
    window: &web_sys::Window,
    root: &web_sys::Element,
    options: PolicyOptions,
) -> Result<Runtime, JsValue> {
    let mut viewport_error = None;
    let lazily: Rc<WebLazily> = Rc::new_cyclic(|weak| match WebViewport::new(weak.clone()) {
        Ok(viewport) => Lazily::with_observer(viewport),
        Err(e) => {
            viewport_error = Some(e);
            Lazily::unsupported()
        }
    });
    if let Some(e) = viewport_error {
        return Err(e);
    }

    let load_on_print = options.load_on_print;
    let policy = MediaPolicy::install(&lazily, options);

    // Content parsed before the observer existed.
    lazily.initialize_subtree(&WebElement::new(root.clone()));
    let insertions = InsertionSource::start(Rc::downgrade(&lazily), root)?;

    let before_print = if load_on_print {
        let weak = Rc::downgrade(&policy);
        let callback = Closure::<dyn FnMut()>::new(move || {
            if let Some(policy) = weak.upgrade() {
                policy.load_all();
            }
        });
        window.add_event_listener_with_callback("beforeprint", callback.as_ref().unchecked_ref())?;
        Some(callback)
    } else {
        None
    };

    debug!("lazily started");
    Ok(Runtime {
        lazily,
        options: policy.options().clone(),
        policy: Some(policy),
        visibility_handlers: RefCell::new(Vec::new()),
        _insertions: Some(insertions),
        _before_print: before_print,
    })
}
