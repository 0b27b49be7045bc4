//! Tests for insertion and visibility dispatch through the coordinator.

use facet_testhelpers::test;
use lazily::arena_dom::{Document, ElementRef};
use lazily::viewport::Viewport;
use lazily::{
    Error, InsertionCallback, IntersectionEntry, Lazily, MutationRecord, Node, VisibilityCallback,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn setup(html: &str) -> (Document, Rc<Viewport>, Rc<Lazily<ElementRef, Rc<Viewport>>>) {
    let doc = Document::parse(html);
    let viewport = Rc::new(Viewport::new());
    let lazily = Rc::new(Lazily::with_observer(viewport.clone()));
    (doc, viewport, lazily)
}

fn el_name(el: &ElementRef) -> String {
    use lazily::Element;
    el.attribute("id").unwrap_or_else(|| el.tag_name())
}

fn insertion(log: &Log, label: &'static str) -> InsertionCallback<ElementRef> {
    let log = log.clone();
    Rc::new(move |el: &ElementRef| log.borrow_mut().push(format!("{label}:{}", el_name(el))))
}

fn visibility(log: &Log, label: &'static str) -> VisibilityCallback<ElementRef> {
    let log = log.clone();
    Rc::new(move |el: &ElementRef| log.borrow_mut().push(format!("{label}:{}", el_name(el))))
}

#[test]
fn test_insertion_reported_once_per_element() {
    let (doc, _viewport, lazily) = setup("<html><body></body></html>");
    let log = Log::default();
    lazily.on_insertion(insertion(&log, "a"));

    let body = doc.body().unwrap();
    let added = doc.append_html(&body, r#"<div id="one"></div><p id="two"></p>"#);
    let records = doc.take_records();

    // Same batch delivered twice.
    lazily.handle_mutations(records.clone());
    lazily.handle_mutations(records);

    // Moved out and back in.
    doc.remove(&added[0]);
    doc.append_child(&body, &added[0]).unwrap();
    lazily.handle_mutations(doc.take_records());

    assert_eq!(*log.borrow(), vec!["a:one", "a:two"]);
    assert!(lazily.insertions().is_initialized(&added[0]));
}

#[test]
fn test_insertion_skips_text_and_comments() {
    let (doc, _viewport, lazily) = setup("<html><body></body></html>");
    let log = Log::default();
    lazily.on_insertion(insertion(&log, "a"));

    let body = doc.body().unwrap();
    doc.append_html(&body, "text<!-- note --><span id=s></span>");
    lazily.handle_mutations(doc.take_records());
    lazily.handle_mutations(vec![MutationRecord::new(vec![Node::Text, Node::Other])]);

    assert_eq!(*log.borrow(), vec!["a:s"]);
}

#[test]
fn test_only_added_nodes_are_reported() {
    let (doc, _viewport, lazily) = setup("<html><body></body></html>");
    let log = Log::default();
    lazily.on_insertion(insertion(&log, "a"));

    let body = doc.body().unwrap();
    doc.append_html(&body, r#"<div id="outer"><img id="inner"></div>"#);
    lazily.handle_mutations(doc.take_records());

    assert_eq!(*log.borrow(), vec!["a:outer"]);
}

#[test]
fn test_duplicate_insertion_handler_invoked_twice() {
    let (doc, _viewport, lazily) = setup("<html><body></body></html>");
    let log = Log::default();
    let handler = insertion(&log, "a");
    lazily
        .on_insertion(handler.clone())
        .on_insertion(insertion(&log, "b"))
        .on_insertion(handler);
    assert_eq!(lazily.insertions().handler_count(), 3);

    let body = doc.body().unwrap();
    doc.append_html(&body, "<div id=d></div>");
    lazily.handle_mutations(doc.take_records());

    assert_eq!(*log.borrow(), vec!["a:d", "b:d", "a:d"]);
}

#[test]
fn test_handler_attribute_writes_do_not_retrigger() {
    use lazily::Element;

    let (doc, _viewport, lazily) = setup("<html><body></body></html>");
    let count = Rc::new(RefCell::new(0));
    let seen = count.clone();
    lazily.on_insertion(Rc::new(move |el: &ElementRef| {
        *seen.borrow_mut() += 1;
        el.set_attribute("data-seen", "").unwrap();
    }));

    let body = doc.body().unwrap();
    doc.append_html(&body, "<div></div>");
    lazily.handle_mutations(doc.take_records());
    lazily.handle_mutations(doc.take_records());

    assert_eq!(*count.borrow(), 1);
    assert_eq!(doc.to_html(), r#"<div data-seen=""></div>"#);
}

#[test]
fn test_handler_registered_during_dispatch_waits_for_next_element() {
    let (doc, _viewport, lazily) = setup("<html><body></body></html>");
    let log = Log::default();

    let weak = Rc::downgrade(&lazily);
    let late = insertion(&log, "late");
    let registered = Rc::new(RefCell::new(false));
    let log_first = log.clone();
    lazily.on_insertion(Rc::new(move |el: &ElementRef| {
        log_first.borrow_mut().push(format!("first:{}", el_name(el)));
        if !registered.replace(true) {
            if let Some(lazily) = weak.upgrade() {
                lazily.on_insertion(late.clone());
            }
        }
    }));

    let body = doc.body().unwrap();
    doc.append_html(&body, "<p id=one></p><p id=two></p>");
    lazily.handle_mutations(doc.take_records());

    assert_eq!(*log.borrow(), vec!["first:one", "first:two", "late:two"]);
}

#[test]
fn test_initialize_subtree_reports_existing_elements() {
    let (doc, _viewport, lazily) = setup(
        r#"<html><body><div id="a"><img id="b"></div><p id="c"></p></body></html>"#,
    );
    let log = Log::default();
    lazily.on_insertion(insertion(&log, "x"));

    let body = doc.body().unwrap();
    lazily.initialize_subtree(&body);
    lazily.initialize_subtree(&body);

    assert_eq!(*log.borrow(), vec!["x:body", "x:a", "x:b", "x:c"]);
}

#[test]
fn test_visibility_handlers_run_in_registration_order() {
    let (doc, viewport, lazily) = setup(r#"<html><body><img id="pic"></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();

    lazily
        .observe_visibility(img.clone(), visibility(&log, "1"))
        .observe_visibility(img.clone(), visibility(&log, "2"))
        .observe_visibility(img.clone(), visibility(&log, "3"));
    assert_eq!(lazily.visibility().handler_count(&img), 3);
    assert_eq!(viewport.observed(), vec![img.clone()]);

    viewport.show(&img);
    lazily.handle_intersections(viewport.take_records());

    assert_eq!(*log.borrow(), vec!["1:pic", "2:pic", "3:pic"]);
}

#[test]
fn test_visibility_fires_on_every_entering() {
    let (doc, viewport, lazily) = setup(r#"<html><body><img id="pic"></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();
    lazily.observe_visibility(img.clone(), visibility(&log, "h"));

    viewport.show(&img);
    lazily.handle_intersections(viewport.take_records());
    viewport.hide(&img);
    lazily.handle_intersections(viewport.take_records());
    assert_eq!(*log.borrow(), vec!["h:pic"], "leaving delivers nothing");

    viewport.show(&img);
    lazily.handle_intersections(viewport.take_records());
    assert_eq!(*log.borrow(), vec!["h:pic", "h:pic"]);
}

#[test]
fn test_duplicate_visibility_handler_invoked_twice() {
    let (doc, viewport, lazily) = setup(r#"<html><body><img id="pic"></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();
    let handler = visibility(&log, "h");

    lazily
        .observe_visibility(img.clone(), handler.clone())
        .observe_visibility(img.clone(), handler.clone());
    viewport.show(&img);
    lazily.handle_intersections(viewport.take_records());
    assert_eq!(*log.borrow(), vec!["h:pic", "h:pic"]);

    // Removes one registration only.
    lazily.unobserve_visibility(&img, &handler);
    lazily.handle_intersections(vec![IntersectionEntry::entering(img.clone())]);
    assert_eq!(log.borrow().len(), 3);
}

#[test]
fn test_one_shot_handler_unsubscribes_itself() {
    let (doc, viewport, lazily) = setup(r#"<html><body><img id="pic"></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();

    let weak = Rc::downgrade(&lazily);
    let slot: Rc<RefCell<Option<VisibilityCallback<ElementRef>>>> = Rc::default();
    let own = slot.clone();
    let log_once = log.clone();
    let once: VisibilityCallback<ElementRef> = Rc::new(move |el: &ElementRef| {
        log_once.borrow_mut().push(format!("once:{}", el_name(el)));
        if let (Some(lazily), Some(me)) = (weak.upgrade(), own.borrow().as_ref()) {
            lazily.unobserve_visibility(el, me);
        }
    });
    *slot.borrow_mut() = Some(once.clone());

    lazily
        .observe_visibility(img.clone(), visibility(&log, "before"))
        .observe_visibility(img.clone(), once)
        .observe_visibility(img.clone(), visibility(&log, "after"));

    viewport.show(&img);
    lazily.handle_intersections(viewport.take_records());
    assert_eq!(*log.borrow(), vec!["before:pic", "once:pic", "after:pic"]);

    lazily.handle_intersections(vec![IntersectionEntry::entering(img.clone())]);
    assert_eq!(
        *log.borrow(),
        vec!["before:pic", "once:pic", "after:pic", "before:pic", "after:pic"]
    );

    // Break the handler's reference to itself.
    slot.borrow_mut().take();
}

#[test]
fn test_handler_removed_mid_dispatch_is_skipped() {
    let (doc, _viewport, lazily) = setup(r#"<html><body><img id="pic"></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();

    let victim = visibility(&log, "victim");
    let weak = Rc::downgrade(&lazily);
    let target = victim.clone();
    let log_killer = log.clone();
    let killer: VisibilityCallback<ElementRef> = Rc::new(move |el: &ElementRef| {
        log_killer.borrow_mut().push("killer".to_owned());
        if let Some(lazily) = weak.upgrade() {
            lazily.unobserve_visibility(el, &target);
        }
    });

    lazily
        .observe_visibility(img.clone(), killer)
        .observe_visibility(img.clone(), victim);
    lazily.handle_intersections(vec![IntersectionEntry::entering(img.clone())]);

    assert_eq!(*log.borrow(), vec!["killer"]);
}

#[test]
fn test_unobserve_unknown_is_noop() {
    let (doc, viewport, lazily) = setup(r#"<html><body><img id="pic"><p></p></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();
    let p = doc.query("p").unwrap();
    let registered = visibility(&log, "h");
    let stranger = visibility(&log, "stranger");

    lazily
        .unobserve_visibility(&p, &registered)
        .observe_visibility(img.clone(), registered.clone())
        .unobserve_visibility(&img, &stranger)
        .unobserve_visibility(&p, &registered);

    assert_eq!(lazily.visibility().handler_count(&img), 1);
    viewport.show(&img);
    lazily.handle_intersections(viewport.take_records());
    assert_eq!(*log.borrow(), vec!["h:pic"]);
}

#[test]
fn test_last_unobserve_stops_observation() {
    let (doc, viewport, lazily) = setup(r#"<html><body><img id="pic"></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();
    let a = visibility(&log, "a");
    let b = visibility(&log, "b");

    lazily
        .observe_visibility(img.clone(), a.clone())
        .observe_visibility(img.clone(), b.clone());
    lazily.unobserve_visibility(&img, &a);
    assert!(viewport.is_observing(&img));

    lazily.unobserve_visibility(&img, &b);
    assert!(!viewport.is_observing(&img));
    assert!(!lazily.visibility().is_observed(&img));

    // Observing again restarts it.
    lazily.observe_visibility(img.clone(), a);
    assert!(viewport.is_observing(&img));
}

#[test]
fn test_observe_visibility_ignores_non_elements() {
    let (doc, viewport, lazily) = setup(r#"<html><body><div><img></div></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();
    let div = doc.query("div").unwrap();

    lazily.observe_visibility(None::<ElementRef>, visibility(&log, "none"));

    doc.remove(&div);
    lazily.observe_visibility(img.clone(), visibility(&log, "detached"));

    assert!(viewport.observed().is_empty());
    assert!(lazily.visibility().observed_elements().is_empty());
}

#[test]
fn test_non_intersecting_entries_are_ignored() {
    let (doc, _viewport, lazily) = setup(r#"<html><body><img id="pic"></body></html>"#);
    let log = Log::default();
    let img = doc.query("img").unwrap();
    lazily.observe_visibility(img.clone(), visibility(&log, "h"));

    lazily.handle_intersections(vec![
        IntersectionEntry::leaving(img.clone()),
        IntersectionEntry::entering(img.clone()),
        IntersectionEntry::leaving(img.clone()),
    ]);

    assert_eq!(*log.borrow(), vec!["h:pic"]);
}

#[test]
fn test_unsupported_host_is_noop() {
    let doc = Document::parse(r#"<html><body><img id="pic"></body></html>"#);
    let lazily: Lazily<ElementRef, Viewport> = Lazily::unsupported();
    assert!(!lazily.is_supported());

    let log = Log::default();
    let img = doc.query("img").unwrap();
    lazily
        .on_insertion(insertion(&log, "insert"))
        .observe_visibility(img.clone(), visibility(&log, "visible"));
    assert_eq!(lazily.insertions().handler_count(), 1);

    let body = doc.body().unwrap();
    doc.append_html(&body, "<div></div>");
    lazily.handle_mutations(doc.take_records());
    lazily.handle_intersections(vec![IntersectionEntry::entering(img.clone())]);
    lazily.initialize_subtree(&body);

    assert!(log.borrow().is_empty());
    assert!(!lazily.visibility().is_observed(&img));
}

#[test]
fn test_independent_consumers_do_not_conflict() {
    let (doc, viewport, lazily) = setup(r#"<html><body><img id="x"><img id="y"></body></html>"#);
    let log = Log::default();
    let imgs = doc.query_all("img");
    let shared = visibility(&log, "shared");

    lazily
        .observe_visibility(imgs[0].clone(), shared.clone())
        .observe_visibility(imgs[1].clone(), shared.clone());
    lazily.unobserve_visibility(&imgs[0], &shared);

    viewport.show(&imgs[0]);
    viewport.show(&imgs[1]);
    lazily.handle_intersections(viewport.take_records());

    assert_eq!(*log.borrow(), vec!["shared:y"]);
}

#[test]
fn test_non_callable_handler_is_rejected_before_registration() {
    let (doc, _viewport, lazily) = setup("<html><body><img></body></html>");
    let img = doc.query("img").unwrap();

    assert_eq!(lazily.try_on_insertion(None).err(), Some(Error::InvalidHandler));
    assert_eq!(lazily.insertions().handler_count(), 0);
    assert_eq!(
        Error::InvalidHandler.to_string(),
        "Please provide a valid handler function"
    );

    assert_eq!(
        lazily.try_observe_visibility(img.clone(), None).err(),
        Some(Error::InvalidHandler)
    );
    assert!(!lazily.visibility().is_observed(&img));

    // A missing target is ignored before the handler is looked at.
    assert!(lazily.try_observe_visibility(None::<ElementRef>, None).is_ok());

    let log = Log::default();
    lazily
        .try_on_insertion(Some(insertion(&log, "a")))
        .unwrap()
        .try_observe_visibility(img.clone(), Some(visibility(&log, "v")))
        .unwrap();
    assert_eq!(lazily.insertions().handler_count(), 1);
    assert_eq!(lazily.visibility().handler_count(&img), 1);
}

#[test]
fn test_watcher_keeps_no_reference_to_reported_elements() {
    let (doc, _viewport, lazily) = setup("<html><body></body></html>");
    let log = Log::default();
    lazily.on_insertion(insertion(&log, "a"));

    for _ in 0..3 {
        let body = doc.body().unwrap();
        let added = doc.append_html(&body, r#"<div id="d"><p></p></div><img id="i">"#);
        lazily.handle_mutations(doc.take_records());
        for element in &added {
            assert!(lazily.insertions().is_initialized(element));
            doc.remove(element);
        }
    }

    assert_eq!(log.borrow().len(), 6);
    assert_eq!(doc.handle_count(), 1);
}
