//! Headless host: an arena document that behaves like a small live DOM.
//!
//! Used to run the coordinator and the media policy outside a browser:
//! - **indextree Arena**: every node of the document in one arena
//! - **html5ever parsing**: documents and inserted fragments are parsed the way
//!   a browser would parse them
//! - **Mutation records**: child-list changes under the document are queued and
//!   drained with [`Document::take_records`], like `MutationObserver.takeRecords()`
//! - **Serialization**: [`Document::to_html`] for assertions
//!
//! Attribute writes are never recorded, matching a child-list-only observer.
//! Marks and stashed values live in the element's arena slot and never show up
//! in the serialized markup.

use html5ever::tree_builder::{ElemName, ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, LocalName, QualName, local_name, namespace_url, ns, parse_document};
use indexmap::IndexMap;
use indextree::{Arena, NodeId};
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use tendril::{StrTendril, TendrilSink};

use crate::Error;
use crate::element::{Element, Marker, MutationRecord, Node};

/// What goes in each arena slot
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Document root (invisible, parent of `<html>`)
    Document,
    Element(ElementData),
    Text(StrTendril),
    Comment(StrTendril),
}

#[derive(Debug, Clone)]
pub struct ElementData {
    /// Namespace and local name, as html5ever produced them
    pub name: QualName,
    /// IndexMap preserves attribute order for stable serialization
    pub attrs: IndexMap<String, StrTendril>,
    marks: u8,
    stash: IndexMap<String, String>,
}

impl ElementData {
    fn new(name: QualName, attrs: IndexMap<String, StrTendril>) -> Self {
        Self {
            name,
            attrs,
            marks: 0,
            stash: IndexMap::new(),
        }
    }

    pub fn tag(&self) -> &str {
        self.name.local.as_ref()
    }
}

struct Inner {
    arena: RefCell<Arena<NodeData>>,
    /// Document node, ancestor of every connected node
    document: NodeId,
    doctype: Option<StrTendril>,
    records: RefCell<Vec<MutationRecord<ElementRef>>>,
    native_lazy_loading: Cell<bool>,
}

/// A parsed, mutable document. Cloning yields another handle to the same tree.
#[derive(Clone)]
pub struct Document {
    inner: Rc<Inner>,
}

impl Document {
    /// Parse a full HTML document. Parsing itself produces no mutation records.
    pub fn parse(html: &str) -> Self {
        let parsed = parse_html(html);
        Document {
            inner: Rc::new(Inner {
                arena: RefCell::new(parsed.arena),
                document: parsed.document,
                doctype: parsed.doctype,
                records: RefCell::new(Vec::new()),
                native_lazy_loading: Cell::new(false),
            }),
        }
    }

    pub fn doctype(&self) -> Option<String> {
        self.inner.doctype.as_ref().map(|d| d.to_string())
    }

    /// Whether `img` and `iframe` elements of this document honor `loading="lazy"`.
    pub fn set_native_lazy_loading(&self, supported: bool) {
        self.inner.native_lazy_loading.set(supported);
    }

    /// Number of live handles to this document, this one and every
    /// [`ElementRef`] included.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// The `<html>` element
    pub fn root(&self) -> Option<ElementRef> {
        let arena = self.inner.arena.borrow();
        self.inner
            .document
            .children(&arena)
            .find(|&id| is_element(&arena, id))
            .map(|id| self.element(id))
    }

    pub fn body(&self) -> Option<ElementRef> {
        self.query("body")
    }

    /// First connected element with `tag`, in document order.
    pub fn query(&self, tag: &str) -> Option<ElementRef> {
        self.query_all(tag).into_iter().next()
    }

    /// Every connected element with `tag`, in document order.
    pub fn query_all(&self, tag: &str) -> Vec<ElementRef> {
        let arena = self.inner.arena.borrow();
        self.inner
            .document
            .descendants(&arena)
            .filter(|&id| tag_of(&arena, id).is_some_and(|t| t == tag))
            .map(|id| self.element(id))
            .collect()
    }

    /// Create a detached HTML element.
    pub fn create_element(&self, tag: &str) -> ElementRef {
        let name = QualName::new(None, ns!(html), LocalName::from(tag));
        let id = self
            .inner
            .arena
            .borrow_mut()
            .new_node(NodeData::Element(ElementData::new(name, IndexMap::new())));
        self.element(id)
    }

    /// Move `child` to the end of `parent`'s children.
    ///
    /// Fails without touching the tree when `child` is `parent` or one of its
    /// ancestors.
    pub fn append_child(&self, parent: &ElementRef, child: &ElementRef) -> Result<(), Error> {
        {
            let mut arena = self.inner.arena.borrow_mut();
            if parent.id.ancestors(&arena).any(|id| id == child.id) {
                return Err(Error::Hierarchy);
            }
            child.id.detach(&mut arena);
            parent.id.append(child.id, &mut arena);
        }
        self.record(parent, vec![Node::Element(child.clone())]);
        Ok(())
    }

    /// Parse `html` as body content and append the resulting nodes to `parent`.
    /// Returns the top-level elements that were added.
    pub fn append_html(&self, parent: &ElementRef, html: &str) -> Vec<ElementRef> {
        let fragment = parse_html(&format!("<html><body>{html}</body></html>"));
        let Some(body) = fragment.body() else {
            return Vec::new();
        };

        let added: Vec<NodeId> = {
            let mut arena = self.inner.arena.borrow_mut();
            body.children(&fragment.arena)
                .map(|source| {
                    let id = import(&mut arena, &fragment.arena, source);
                    parent.id.append(id, &mut arena);
                    id
                })
                .collect()
        };

        let nodes: Vec<Node<ElementRef>> = added.iter().map(|&id| self.node(id)).collect();
        let elements = nodes
            .iter()
            .filter_map(|node| node.as_element().cloned())
            .collect();
        self.record(parent, nodes);
        elements
    }

    /// Detach `element` from the tree. Removals are not recorded.
    pub fn remove(&self, element: &ElementRef) {
        element.id.detach(&mut self.inner.arena.borrow_mut());
    }

    /// Drain the queued mutation records.
    pub fn take_records(&self) -> Vec<MutationRecord<ElementRef>> {
        std::mem::take(&mut *self.inner.records.borrow_mut())
    }

    /// Serialize the children of `<body>` to HTML.
    pub fn to_html(&self) -> String {
        match self.body() {
            Some(body) => body.inner_html(),
            None => String::new(),
        }
    }

    fn record(&self, parent: &ElementRef, added_nodes: Vec<Node<ElementRef>>) {
        if added_nodes.is_empty() || !parent.is_connected() {
            return;
        }
        self.inner
            .records
            .borrow_mut()
            .push(MutationRecord::new(added_nodes));
    }

    fn element(&self, id: NodeId) -> ElementRef {
        ElementRef {
            doc: self.clone(),
            id,
        }
    }

    fn node(&self, id: NodeId) -> Node<ElementRef> {
        match self.inner.arena.borrow()[id].get() {
            NodeData::Element(_) => Node::Element(self.element(id)),
            NodeData::Text(_) => Node::Text,
            NodeData::Comment(_) => Node::Comment,
            NodeData::Document => Node::Other,
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("doctype", &self.inner.doctype)
            .finish_non_exhaustive()
    }
}

/// Handle to an element of a [`Document`].
#[derive(Clone)]
pub struct ElementRef {
    doc: Document,
    id: NodeId,
}

impl ElementRef {
    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Serialize this element's children to HTML.
    pub fn inner_html(&self) -> String {
        let arena = self.doc.inner.arena.borrow();
        let mut out = String::new();
        for child in self.id.children(&arena) {
            serialize_node(&arena, &mut out, child);
        }
        out
    }

    /// Serialize this element, including itself, to HTML.
    pub fn outer_html(&self) -> String {
        let arena = self.doc.inner.arena.borrow();
        let mut out = String::new();
        serialize_node(&arena, &mut out, self.id);
        out
    }

    fn with_data<R>(&self, f: impl FnOnce(&ElementData) -> R) -> R {
        let arena = self.doc.inner.arena.borrow();
        match arena[self.id].get() {
            NodeData::Element(elem) => f(elem),
            _ => unreachable!("ElementRef always points at an element"),
        }
    }

    fn with_data_mut<R>(&self, f: impl FnOnce(&mut ElementData) -> R) -> R {
        let mut arena = self.doc.inner.arena.borrow_mut();
        match arena[self.id].get_mut() {
            NodeData::Element(elem) => f(elem),
            _ => unreachable!("ElementRef always points at an element"),
        }
    }
}

impl PartialEq for ElementRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.doc.inner, &other.doc.inner) && self.id == other.id
    }
}

impl Eq for ElementRef {}

impl Hash for ElementRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.doc.inner).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.doc.inner.arena.try_borrow() {
            Ok(arena) => match tag_of(&arena, self.id) {
                Some(tag) => write!(f, "<{tag}> {:?}", self.id),
                None => write!(f, "{:?}", self.id),
            },
            Err(_) => write!(f, "{:?}", self.id),
        }
    }
}

impl Element for ElementRef {
    fn tag_name(&self) -> String {
        self.with_data(|elem| elem.tag().to_ascii_lowercase())
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.with_data(|elem| elem.attrs.get(name).map(|v| v.to_string()))
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::host("set", name, "attribute name is empty"));
        }
        self.with_data_mut(|elem| {
            elem.attrs.insert(name.to_owned(), StrTendril::from(value));
        });
        Ok(())
    }

    fn remove_attribute(&self, name: &str) -> Result<(), Error> {
        self.with_data_mut(|elem| {
            elem.attrs.shift_remove(name);
        });
        Ok(())
    }

    fn descendants(&self) -> Vec<Self> {
        let ids: Vec<NodeId> = {
            let arena = self.doc.inner.arena.borrow();
            self.id
                .descendants(&arena)
                .skip(1)
                .filter(|&id| is_element(&arena, id))
                .collect()
        };
        ids.into_iter().map(|id| self.doc.element(id)).collect()
    }

    fn is_connected(&self) -> bool {
        let arena = self.doc.inner.arena.borrow();
        self.id
            .ancestors(&arena)
            .any(|id| id == self.doc.inner.document)
    }

    fn supports_native_lazy_loading(&self) -> bool {
        self.doc.inner.native_lazy_loading.get()
            && matches!(self.tag_name().as_str(), "img" | "iframe")
    }

    fn mark(&self, marker: Marker) -> bool {
        self.with_data_mut(|elem| {
            let fresh = elem.marks & marker.bit() == 0;
            elem.marks |= marker.bit();
            fresh
        })
    }

    fn is_marked(&self, marker: Marker) -> bool {
        self.with_data(|elem| elem.marks & marker.bit() != 0)
    }

    fn stash(&self, name: &str, value: String) {
        self.with_data_mut(|elem| {
            elem.stash.insert(name.to_owned(), value);
        });
    }

    fn stashed(&self, name: &str) -> Option<String> {
        self.with_data(|elem| elem.stash.get(name).cloned())
    }

    fn unstash(&self, name: &str) -> Option<String> {
        self.with_data_mut(|elem| elem.stash.shift_remove(name))
    }
}

fn is_element(arena: &Arena<NodeData>, id: NodeId) -> bool {
    matches!(arena[id].get(), NodeData::Element(_))
}

fn tag_of(arena: &Arena<NodeData>, id: NodeId) -> Option<&str> {
    match arena[id].get() {
        NodeData::Element(elem) => Some(elem.tag()),
        _ => None,
    }
}

/// Deep-copy `source` from another arena into `arena`.
fn import(arena: &mut Arena<NodeData>, from: &Arena<NodeData>, source: NodeId) -> NodeId {
    let id = arena.new_node(from[source].get().clone());
    for child in source.children(from) {
        let copy = import(arena, from, child);
        id.append(copy, arena);
    }
    id
}

/// HTML5 void elements: no children, no closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

fn escape_into(out: &mut String, text: &str, in_attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn serialize_node(arena: &Arena<NodeData>, out: &mut String, id: NodeId) {
    match arena[id].get() {
        NodeData::Document => {
            for child in id.children(arena) {
                serialize_node(arena, out, child);
            }
        }
        NodeData::Element(elem) => {
            let tag = elem.tag();
            out.push('<');
            out.push_str(tag);
            for (name, value) in &elem.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(out, value, true);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag) {
                return;
            }
            for child in id.children(arena) {
                serialize_node(arena, out, child);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeData::Text(text) => escape_into(out, text, false),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

/// Output of a parse: a standalone arena rooted at a document node.
struct ParsedHtml {
    arena: Arena<NodeData>,
    document: NodeId,
    doctype: Option<StrTendril>,
}

impl ParsedHtml {
    fn body(&self) -> Option<NodeId> {
        self.document
            .descendants(&self.arena)
            .find(|&id| tag_of(&self.arena, id) == Some("body"))
    }
}

fn parse_html(html: &str) -> ParsedHtml {
    let mut arena = Arena::new();
    let document = arena.new_node(NodeData::Document);
    let sink = ArenaSink {
        arena: RefCell::new(arena),
        document,
        doctype: RefCell::new(None),
    };
    parse_document(sink, Default::default()).one(StrTendril::from(html))
}

/// html5ever asks for element names by value; the arena is behind a RefCell.
#[derive(Debug, Clone)]
struct OwnedElemName(QualName);

impl ElemName for OwnedElemName {
    fn ns(&self) -> &html5ever::Namespace {
        &self.0.ns
    }

    fn local_name(&self) -> &LocalName {
        &self.0.local
    }
}

/// Builds the arena while html5ever drives tree construction. Handles are
/// plain `NodeId`s, so every callback borrows the arena for its own duration.
struct ArenaSink {
    arena: RefCell<Arena<NodeData>>,
    document: NodeId,
    doctype: RefCell<Option<StrTendril>>,
}

impl ArenaSink {
    fn new_node(&self, data: NodeData) -> NodeId {
        self.arena.borrow_mut().new_node(data)
    }
}

impl TreeSink for ArenaSink {
    type Handle = NodeId;
    type Output = ParsedHtml;
    type ElemName<'a>
        = OwnedElemName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        ParsedHtml {
            arena: self.arena.into_inner(),
            document: self.document,
            doctype: self.doctype.into_inner(),
        }
    }

    // Malformed input is recovered from, never reported.
    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> Self::Handle {
        self.document
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn same_node(&self, a: &Self::Handle, b: &Self::Handle) -> bool {
        a == b
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> OwnedElemName {
        match self.arena.borrow()[*target].get() {
            NodeData::Element(elem) => OwnedElemName(elem.name.clone()),
            _ => OwnedElemName(QualName::new(None, ns!(html), local_name!(""))),
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        let attrs = attrs
            .into_iter()
            .map(|attr| (attr.name.local.to_string(), attr.value))
            .collect();
        self.new_node(NodeData::Element(ElementData::new(name, attrs)))
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        self.new_node(NodeData::Comment(text))
    }

    // Processing instructions only exist in foreign content; keep an empty
    // comment so the tree builder has a handle to place.
    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        self.new_node(NodeData::Comment(StrTendril::new()))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let mut arena = self.arena.borrow_mut();
        let node = match child {
            NodeOrText::AppendNode(node) => node,
            NodeOrText::AppendText(text) => {
                // Adjacent text is merged into one node, as in a browser DOM.
                let last_child = parent.children(&arena).next_back();
                if let Some(last) = last_child
                    && let NodeData::Text(existing) = arena[last].get_mut()
                {
                    existing.push_tendril(&text);
                    return;
                }
                arena.new_node(NodeData::Text(text))
            }
        };
        parent.append(node, &mut arena);
    }

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let mut arena = self.arena.borrow_mut();
        let node = match new_node {
            NodeOrText::AppendNode(node) => node,
            NodeOrText::AppendText(text) => arena.new_node(NodeData::Text(text)),
        };
        sibling.insert_before(node, &mut arena);
    }

    // Only reached for misnested table content; the element always has a parent here.
    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        _prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        self.append(element, child);
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
        *self.doctype.borrow_mut() = Some(name);
    }

    // Template contents are kept inline as ordinary children.
    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        *target
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        if let NodeData::Element(elem) = self.arena.borrow_mut()[*target].get_mut() {
            for attr in attrs {
                elem.attrs
                    .entry(attr.name.local.to_string())
                    .or_insert(attr.value);
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        target.detach(&mut self.arena.borrow_mut());
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let mut arena = self.arena.borrow_mut();
        let children: Vec<NodeId> = node.children(&arena).collect();
        for child in children {
            child.detach(&mut arena);
            new_parent.append(child, &mut arena);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn test_parse_and_query() {
        let doc = Document::parse(
            r#"<!DOCTYPE html><html><body><img src="a.png" alt="a"><p>text</p></body></html>"#,
        );
        assert_eq!(doc.doctype().as_deref(), Some("html"));

        let img = doc.query("img").expect("should have img");
        assert_eq!(img.tag_name(), "img");
        assert_eq!(img.attribute("src").as_deref(), Some("a.png"));
        assert!(img.is_connected());
        assert_eq!(doc.root().map(|r| r.tag_name()).as_deref(), Some("html"));
    }

    #[test]
    fn test_parsing_records_nothing() {
        let doc = Document::parse("<html><body><img src=a.png></body></html>");
        assert!(doc.take_records().is_empty());
    }

    #[test]
    fn test_append_html_records_top_level_nodes() {
        let doc = Document::parse("<html><body></body></html>");
        let body = doc.body().expect("should have body");

        let added = doc.append_html(&body, "<div><img src=x.jpg></div>hello<!-- c -->");
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].tag_name(), "div");

        let records = doc.take_records();
        assert_eq!(records.len(), 1);
        let nodes = &records[0].added_nodes;
        assert_eq!(nodes.len(), 3);
        assert!(matches!(nodes[0], Node::Element(_)));
        assert_eq!(nodes[1], Node::Text);
        assert_eq!(nodes[2], Node::Comment);

        assert!(doc.take_records().is_empty(), "records are drained");
    }

    #[test]
    fn test_detached_parent_records_nothing() {
        let doc = Document::parse("<html><body></body></html>");
        let div = doc.create_element("div");
        assert!(!div.is_connected());

        let img = doc.create_element("img");
        doc.append_child(&div, &img).unwrap();
        assert!(doc.take_records().is_empty());

        let body = doc.body().expect("should have body");
        doc.append_child(&body, &div).unwrap();
        let records = doc.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].added_nodes, vec![Node::Element(div.clone())]);
        assert!(img.is_connected());
    }

    #[test]
    fn test_attribute_writes_are_not_recorded() {
        let doc = Document::parse("<html><body><img src=a.png></body></html>");
        let img = doc.query("img").expect("should have img");

        img.remove_attribute("src").unwrap();
        img.set_attribute("data-x", "1").unwrap();
        assert!(doc.take_records().is_empty());
        assert_eq!(doc.to_html(), r#"<img data-x="1">"#);
    }

    #[test]
    fn test_remove_disconnects() {
        let doc = Document::parse("<html><body><div><img></div></body></html>");
        let div = doc.query("div").expect("should have div");
        let img = doc.query("img").expect("should have img");

        doc.remove(&div);
        assert!(!div.is_connected());
        assert!(!img.is_connected());
        assert!(doc.query("img").is_none());
        assert_eq!(div.descendants(), vec![img]);
    }

    #[test]
    fn test_element_identity() {
        let doc = Document::parse("<html><body><img><img></body></html>");
        let imgs = doc.query_all("img");
        assert_eq!(imgs.len(), 2);
        assert_ne!(imgs[0], imgs[1]);
        assert_eq!(doc.query("img"), Some(imgs[0].clone()));

        let other = Document::parse("<html><body><img><img></body></html>");
        assert_ne!(other.query("img"), doc.query("img"));
    }

    #[test]
    fn test_descendants_by_tag() {
        let doc = Document::parse(
            r#"<html><body><video><source src=a.webm><track><source src=b.mp4></video></body></html>"#,
        );
        let video = doc.query("video").expect("should have video");
        let sources = video.descendants_by_tag("source");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].attribute("src").as_deref(), Some("b.mp4"));
    }

    #[test]
    fn test_native_lazy_loading_support() {
        let doc = Document::parse("<html><body><img><video></video></body></html>");
        let img = doc.query("img").expect("should have img");
        let video = doc.query("video").expect("should have video");
        assert!(!img.supports_native_lazy_loading());

        doc.set_native_lazy_loading(true);
        assert!(img.supports_native_lazy_loading());
        assert!(!video.supports_native_lazy_loading());
    }

    #[test]
    fn test_to_html_escaping() {
        let doc = Document::parse(
            r#"<html><body><div title="a&quot;b">&lt;script&gt; &amp;</div></body></html>"#,
        );
        assert_eq!(
            doc.to_html(),
            r#"<div title="a&quot;b">&lt;script&gt; &amp;</div>"#
        );
    }

    #[test]
    fn test_append_child_rejects_cycles() {
        let doc = Document::parse("<html><body><div><p></p></div></body></html>");
        let div = doc.query("div").expect("should have div");
        let p = doc.query("p").expect("should have p");

        assert_eq!(doc.append_child(&p, &div), Err(Error::Hierarchy));
        assert_eq!(doc.append_child(&div, &div), Err(Error::Hierarchy));
        assert!(doc.take_records().is_empty());
        assert_eq!(doc.to_html(), "<div><p></p></div>");
    }

    #[test]
    fn test_marks_and_stash_stay_out_of_markup() {
        let doc = Document::parse("<html><body><img src=a.png></body></html>");
        let img = doc.query("img").expect("should have img");

        assert!(img.mark(Marker::Inserted));
        assert!(!img.mark(Marker::Inserted));
        assert!(img.is_marked(Marker::Inserted));
        assert!(!img.is_marked(Marker::Media));

        img.stash("src", "a.png".to_owned());
        assert_eq!(img.stashed("src").as_deref(), Some("a.png"));
        assert_eq!(doc.to_html(), r#"<img src="a.png">"#);
        assert_eq!(img.unstash("src").as_deref(), Some("a.png"));
        assert_eq!(img.unstash("src"), None);
    }

    #[test]
    fn test_svg_keeps_its_namespace() {
        let doc = Document::parse(
            "<html><body><svg><foreignObject><img></foreignObject></svg></body></html>",
        );
        let svg = doc.query("svg").expect("should have svg");
        let name = svg.with_data(|elem| elem.name.clone());
        assert_eq!(name.ns, ns!(svg));
        assert!(doc.query("img").is_some());
    }
}
