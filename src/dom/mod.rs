//! In-memory document model the engine attaches to.
//!
//! [`Document`] keeps its nodes in a `scraper` node tree, so configured
//! selectors match through `scraper` exactly as they would over parsed
//! markup. On top of the tree it tracks the handful of DOM facilities the
//! engine relies on: inline style, the `value` and `checked` properties,
//! focus, a child-list mutation log (the observer stream) and a log of
//! dispatched notifications. A browser binding mirrors the live page into
//! it; tests build fixtures with [`Document::append_element`].

mod selector;

use std::collections::HashMap;

use ego_tree::Tree;
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node};
use tracing::warn;

pub use selector::Selector;

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(ego_tree::NodeId);

/// State that lives on the node object rather than in its markup.
#[derive(Debug, Clone, Default)]
struct Props {
    style: Vec<(String, String)>,
    value: String,
    checked: bool,
}

/// One child-list change observed under the document root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// `node` was inserted under `parent`.
    Added {
        /// The inserted node.
        node: NodeId,
        /// Its new parent.
        parent: NodeId,
    },
    /// `node` was detached from `parent`.
    Removed {
        /// The detached node.
        node: NodeId,
        /// The parent it was detached from.
        parent: NodeId,
    },
}

/// A notification fired at an element (`input`, `change`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Element the notification was fired at.
    pub target: NodeId,
    /// Event type.
    pub event: String,
}

/// The page model.
#[derive(Debug, Clone)]
pub struct Document {
    tree: Tree<Node>,
    root: NodeId,
    body: NodeId,
    props: HashMap<NodeId, Props>,
    mutations: Vec<Mutation>,
    dispatched: Vec<Dispatched>,
    focused: Option<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn is_attr_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(|c| {
            c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | '<' | '>' | '/' | '=')
        })
}

/// Build a detached element the way the HTML parser would from its start
/// tag. Most tags are parsed inside a `<template>`, where the parser keeps
/// any element (table parts included); the document-level tags need a
/// document parse.
fn parse_element(tag: &str, attrs: &[(String, String)]) -> Option<Node> {
    let mut start_tag = format!("<{tag}");
    for (name, value) in attrs {
        start_tag.push_str(&format!(" {name}=\"{}\"", escape_attr(value)));
    }
    start_tag.push('>');

    let last_named = |html: &Html| {
        html.tree
            .root()
            .descendants()
            .filter_map(|n| n.value().as_element())
            .filter(|e| e.name() == tag)
            .last()
            .map(|e| Node::Element(e.clone()))
    };
    match tag {
        "html" | "head" | "body" | "frameset" => last_named(&Html::parse_document(&start_tag)),
        _ => last_named(&Html::parse_fragment(&format!("<template>{start_tag}"))),
    }
}

impl Document {
    /// An empty document holding only `<html><head></head><body></body></html>`.
    pub fn new() -> Self {
        let tree = Html::parse_document("<html><head></head><body></body></html>").tree;
        let find = |name: &str| {
            tree.root()
                .descendants()
                .find(|n| n.value().as_element().is_some_and(|e| e.name() == name))
                .map_or(tree.root().id(), |n| n.id())
        };
        let (root, body) = (NodeId(find("html")), NodeId(find("body")));
        Self {
            tree,
            root,
            body,
            props: HashMap::new(),
            mutations: Vec::new(),
            dispatched: Vec::new(),
            focused: None,
        }
    }

    /// The `<html>` element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<body>` element.
    pub fn body(&self) -> NodeId {
        self.body
    }

    // -----------------------------------------------------------------------
    // Construction and tree edits
    // -----------------------------------------------------------------------

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let node = parse_element(&tag, &[]).unwrap_or_else(|| {
            warn!(%tag, "element name rejected by the parser");
            Node::Fragment
        });
        self.push(node)
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(Node::Text(Text { text: text.into() }))
    }

    fn push(&mut self, node: Node) -> NodeId {
        NodeId(self.tree.orphan(node).id())
    }

    /// Create an element with `attrs` and append it to `parent`.
    ///
    /// # Examples
    ///
    /// ```
    /// use autofield::dom::Document;
    ///
    /// let mut doc = Document::new();
    /// let form = doc.append_element(doc.body(), "form", &[("id", "signup")]);
    /// assert_eq!(doc.attr(form, "id"), Some("signup"));
    /// assert!(doc.is_connected(form));
    /// ```
    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let el = self.create_element(tag);
        self.edit_attrs(el, |current| {
            for (name, value) in attrs {
                upsert(current, name, value);
            }
        });
        self.append_child(parent, el);
        el
    }

    /// Append a text node to `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let node = self.create_text(text);
        self.append_child(parent, node);
        node
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` before `reference`, or last when
    /// `reference` is `None` or not a child of `parent`. No-op when `child`
    /// is `parent` or one of its ancestors.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if self.contains(child, parent) || !self.is_element(parent) {
            return;
        }
        self.detach(child);
        let reference = reference.filter(|r| *r != child && self.parent(*r) == Some(parent));
        match reference {
            Some(reference) => {
                if let Some(mut at) = self.tree.get_mut(reference.0) {
                    at.insert_id_before(child.0);
                }
            }
            None => {
                if let Some(mut at) = self.tree.get_mut(parent.0) {
                    at.append_id(child.0);
                }
            }
        }
        if self.is_connected(parent) {
            self.mutations.push(Mutation::Added {
                node: child,
                parent,
            });
        }
    }

    /// Insert `child` right after `reference`. No-op when `reference` is
    /// detached.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) {
        let Some(parent) = self.parent(reference) else {
            return;
        };
        let next = self.next_sibling(reference).filter(|n| *n != child);
        self.insert_before(parent, child, next);
    }

    /// Detach `node` from its parent.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        let connected = self.is_connected(parent);
        if let Some(mut n) = self.tree.get_mut(node.0) {
            n.detach();
        }
        if connected {
            self.mutations.push(Mutation::Removed { node, parent });
        }
    }

    /// Drain the child-list mutations recorded since the last call.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.mutations)
    }

    // -----------------------------------------------------------------------
    // Tree queries
    // -----------------------------------------------------------------------

    /// The node as a `scraper` element, for selector matching.
    pub(crate) fn element(&self, node: NodeId) -> Option<ElementRef<'_>> {
        self.tree.get(node.0).and_then(ElementRef::wrap)
    }

    fn element_value(&self, node: NodeId) -> Option<&Element> {
        self.tree.get(node.0)?.value().as_element()
    }

    /// Parent element of `node`.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree
            .get(node.0)?
            .parent()
            .filter(|p| p.value().is_element())
            .map(|p| NodeId(p.id()))
    }

    /// Children of `node` in order.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .get(node.0)
            .map(|n| n.children().map(|c| NodeId(c.id())).collect())
            .unwrap_or_default()
    }

    /// Sibling following `node`.
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.tree
            .get(node.0)?
            .next_sibling()
            .map(|s| NodeId(s.id()))
    }

    /// Every node below `node` in document order, `node` excluded.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .get(node.0)
            .map(|n| n.descendants().skip(1).map(|d| NodeId(d.id())).collect())
            .unwrap_or_default()
    }

    /// Element descendants of `node` in document order.
    pub fn descendant_elements(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .get(node.0)
            .map(|n| {
                n.descendants()
                    .skip(1)
                    .filter(|d| d.value().is_element())
                    .map(|d| NodeId(d.id()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree
            .get(node.0)
            .is_some_and(|n| n.id() == ancestor.0 || n.ancestors().any(|a| a.id() == ancestor.0))
    }

    /// Whether `node` is attached under the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    /// Nearest inclusive ancestor satisfying `pred`.
    pub fn closest(&self, node: NodeId, pred: impl Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if pred(self, n) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest_matching(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        self.closest(node, |doc, n| selector.matches(doc, n))
    }

    /// Element descendants of `scope` matching `selector`, in document order.
    pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendant_elements(scope)
            .into_iter()
            .filter(|n| selector.matches(self, *n))
            .collect()
    }

    /// First element descendant of `scope` matching `selector`.
    pub fn query_selector(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendant_elements(scope)
            .into_iter()
            .find(|n| selector.matches(self, *n))
    }

    // -----------------------------------------------------------------------
    // Node data
    // -----------------------------------------------------------------------

    /// Whether `node` is an element.
    pub fn is_element(&self, node: NodeId) -> bool {
        self.element_value(node).is_some()
    }

    /// Lowercase tag name, or `""` for text nodes.
    pub fn tag(&self, node: NodeId) -> &str {
        self.element_value(node).map_or("", Element::name)
    }

    /// Attribute value. Names are matched ASCII case-insensitively.
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element_value(node)?.attr(&name.to_ascii_lowercase())
    }

    /// Whether the attribute is present.
    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    /// Rebuild the element of `node` with its attribute list passed through
    /// `edit`. Unchanged lists leave the node alone.
    fn edit_attrs(&mut self, node: NodeId, edit: impl FnOnce(&mut Vec<(String, String)>)) {
        let Some(el) = self.element_value(node) else {
            return;
        };
        let tag = el.name().to_owned();
        let before: Vec<(String, String)> = el
            .attrs()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        let mut after = before.clone();
        edit(&mut after);
        if after == before {
            return;
        }
        let Some(rebuilt) = parse_element(&tag, &after) else {
            return;
        };
        if let Some(mut n) = self.tree.get_mut(node.0) {
            *n.value() = rebuilt;
        }
    }

    /// Set (or replace) an attribute.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        self.edit_attrs(node, |attrs| upsert(attrs, name, value));
    }

    /// Replace every attribute of `node` with `attrs`.
    pub fn replace_attrs(&mut self, node: NodeId, attrs: &[(&str, &str)]) {
        self.edit_attrs(node, |current| {
            current.clear();
            for (name, value) in attrs {
                upsert(current, name, value);
            }
        });
    }

    /// Remove an attribute.
    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        let name = name.to_ascii_lowercase();
        self.edit_attrs(node, |attrs| attrs.retain(|(n, _)| *n != name));
    }

    /// Whether the `class` attribute lists `class`.
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|c| c.split_whitespace().any(|x| x == class))
    }

    /// Add `class` to the `class` attribute.
    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let joined = match self.attr(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{existing} {class}"),
            _ => class.to_owned(),
        };
        self.set_attr(node, "class", &joined);
    }

    /// Remove `class` from the `class` attribute.
    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(existing) = self.attr(node, "class") else {
            return;
        };
        let kept: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
        let kept = kept.join(" ");
        self.set_attr(node, "class", &kept);
    }

    fn props_mut(&mut self, node: NodeId) -> &mut Props {
        self.props.entry(node).or_default()
    }

    /// Inline style property.
    pub fn style(&self, node: NodeId, prop: &str) -> Option<&str> {
        self.props
            .get(&node)?
            .style
            .iter()
            .find(|(p, _)| p == prop)
            .map(|(_, v)| v.as_str())
    }

    /// Set an inline style property.
    pub fn set_style(&mut self, node: NodeId, prop: &str, value: &str) {
        let style = &mut self.props_mut(node).style;
        match style.iter_mut().find(|(p, _)| p == prop) {
            Some((_, v)) => *v = value.to_owned(),
            None => style.push((prop.to_owned(), value.to_owned())),
        }
    }

    /// Remove an inline style property.
    pub fn remove_style(&mut self, node: NodeId, prop: &str) {
        if let Some(props) = self.props.get_mut(&node) {
            props.style.retain(|(p, _)| p != prop);
        }
    }

    /// Drop every inline style property, as hosts do when re-rendering.
    pub fn clear_style(&mut self, node: NodeId) {
        if let Some(props) = self.props.get_mut(&node) {
            props.style.clear();
        }
    }

    /// The `value` property of a form control.
    pub fn value(&self, node: NodeId) -> &str {
        self.props.get(&node).map_or("", |p| p.value.as_str())
    }

    /// The underlying `value` setter. No notification is fired.
    pub fn set_value(&mut self, node: NodeId, value: &str) {
        value.clone_into(&mut self.props_mut(node).value);
    }

    /// The `checked` property.
    pub fn checked(&self, node: NodeId) -> bool {
        self.props.get(&node).is_some_and(|p| p.checked)
    }

    /// Set the `checked` property.
    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        self.props_mut(node).checked = checked;
    }

    /// Concatenated text of every text node below (or at) `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        let Some(n) = self.tree.get(node.0) else {
            return String::new();
        };
        n.descendants()
            .filter_map(|d| match d.value() {
                Node::Text(t) => Some(&*t.text),
                _ => None,
            })
            .collect()
    }

    /// Replace the children of `node` with one text node (or set the text of
    /// a text node). An element whose only child is a text node keeps that
    /// node and has its text replaced.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        let children = self.children(node);
        let target = match children.as_slice() {
            [only] if self.text(*only).is_some() => *only,
            _ if self.text(node).is_some() => node,
            _ => {
                self.clear_children(node);
                if !text.is_empty() {
                    self.append_text(node, text);
                }
                return;
            }
        };
        if let Some(mut n) = self.tree.get_mut(target.0) {
            if let Node::Text(t) = n.value() {
                t.text = text.into();
            }
        }
    }

    /// Text of a text node.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.tree.get(node.0)?.value() {
            Node::Text(t) => Some(&*t.text),
            _ => None,
        }
    }

    /// Detach every child of `node`.
    pub fn clear_children(&mut self, node: NodeId) {
        for child in self.children(node) {
            self.detach(child);
        }
    }

    // -----------------------------------------------------------------------
    // Focus and notifications
    // -----------------------------------------------------------------------

    /// Move focus to `node`.
    pub fn focus(&mut self, node: NodeId) {
        self.focused = Some(node);
    }

    /// The focused element.
    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    /// Fire a notification at `target`.
    pub fn dispatch(&mut self, target: NodeId, event: &str) {
        self.dispatched.push(Dispatched {
            target,
            event: event.to_owned(),
        });
    }

    /// Drain the notifications fired since the last call.
    pub fn take_dispatched(&mut self) -> Vec<Dispatched> {
        std::mem::take(&mut self.dispatched)
    }
}

/// Set `name` in an attribute list, lowercased the way the parser stores it.
fn upsert(attrs: &mut Vec<(String, String)>, name: &str, value: &str) {
    if !is_attr_name(name) {
        warn!(%name, "attribute name rejected");
        return;
    }
    let name = name.to_ascii_lowercase();
    match attrs.iter_mut().find(|(n, _)| *n == name) {
        Some((_, v)) => value.clone_into(v),
        None => attrs.push((name, value.to_owned())),
    }
}
