//! In-memory page model.
//!
//! The page-execution environment the rest of the crate works against: an
//! arena of element, text and shadow-root nodes with just enough browser
//! semantics for accessibility snapshots and interaction:
//!
//! - shadow roots and slot assignment (named and default slots)
//! - computed `display`/`visibility` and a bounding box per element
//! - focus, scroll position and a log of dispatched events
//! - form state (value, checkedness, option selectedness)
//!
//! Nodes are never freed. Removing a node detaches it, so a [`NodeId`] keeps
//! identifying the same node for the lifetime of its [`Document`] and
//! [`Document::is_connected`] answers whether it is still part of the page.

pub mod html;
pub mod pattern;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Index of a node inside its document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Identity of one loaded document. Every navigation produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(u64);

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
    ShadowRoot { host: NodeId },
}

/// Element state: tag, attributes and live form state.
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Lowercase tag name.
    pub tag: String,
    attrs: Vec<(String, String)>,
    pub value: String,
    pub checked: bool,
    pub selected: bool,
    pub shadow_root: Option<NodeId>,
    pub layout: Option<Rect>,
}

impl ElementData {
    fn new(tag: &str, attrs: &[(&str, &str)]) -> Self {
        let attrs: Vec<(String, String)> = attrs
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), (*v).to_string()))
            .collect();
        let has = |name: &str| attrs.iter().any(|(k, _)| k == name);
        let value = attrs
            .iter()
            .find(|(k, _)| k == "value")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        Self {
            tag: tag.to_ascii_lowercase(),
            checked: has("checked"),
            selected: has("selected"),
            value,
            attrs,
            shadow_root: None,
            layout: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// A rendered box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Rect = Rect::new(0.0, 0.0, 0.0, 0.0);

    /// Box used for elements without explicit layout. There is no layout
    /// engine, so every rendered element gets a non-empty box.
    pub const NOMINAL: Rect = Rect::new(0.0, 0.0, 100.0, 20.0);

    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }
}

/// The subset of computed style the accessibility code reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
}

/// Tags a user agent stylesheet renders with `display: none`.
/// Events kept in the dispatch log; older ones are dropped first.
pub const MAX_EVENTS: usize = 1000;

const DISPLAY_NONE_TAGS: &[&str] = &[
    "head", "script", "style", "template", "title", "meta", "link", "datalist",
];

/// DOM event types dispatched by interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    MouseDown,
    MouseUp,
    Click,
    MouseOver,
    MouseEnter,
    MouseMove,
    Focus,
    Blur,
    Input,
    Change,
    KeyDown,
    KeyPress,
    KeyUp,
}

/// One event delivered to a node, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedEvent {
    pub target: NodeId,
    pub kind: EventKind,
    pub key: Option<String>,
}

/// A loaded page.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    url: String,
    title: Option<String>,
    nodes: Vec<Node>,
    root: NodeId,
    active_element: Option<NodeId>,
    scrolled_to: Option<NodeId>,
    events: Vec<DispatchedEvent>,
}

impl Document {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: DocumentId::next(),
            url: url.into(),
            title: None,
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            active_element: None,
            scrolled_to: None,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Explicit title if one was set, otherwise the text of the first
    /// connected `<title>` element.
    pub fn title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.tag(n) == Some("title"))
            .map(|n| normalize_space(&self.text_content(n)))
            .unwrap_or_default()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    // ------------------------------------------------------------------
    // Construction and mutation
    // ------------------------------------------------------------------

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    /// Create an element and append it to `parent`.
    pub fn create_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push_node(Some(parent), NodeKind::Element(ElementData::new(tag, attrs)))
    }

    /// Create an element that is not attached to the tree.
    pub fn create_detached_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push_node(None, NodeKind::Element(ElementData::new(tag, attrs)))
    }

    pub fn create_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push_node(Some(parent), NodeKind::Text(text.to_string()))
    }

    /// Attach a shadow root to `host`, returning the existing one if present.
    pub fn attach_shadow(&mut self, host: NodeId) -> Option<NodeId> {
        if let Some(existing) = self.shadow_root(host) {
            return Some(existing);
        }
        self.element(host)?;
        let root = self.push_node(None, NodeKind::ShadowRoot { host });
        if let Some(element) = self.element_mut(host) {
            element.shadow_root = Some(root);
        }
        Some(root)
    }

    /// Move `child` to the end of `parent`'s children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.remove(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Detach a node from its parent. The node and its subtree stay in the
    /// arena but are no longer connected.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
        if let Some(active) = self.active_element {
            if !self.is_connected(active) {
                self.active_element = None;
            }
        }
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if let Some(element) = self.element_mut(node) {
            match element.attrs.iter_mut().find(|(k, _)| *k == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => element.attrs.push((name, value.to_string())),
            }
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(element) = self.element_mut(node) {
            element.attrs.retain(|(k, _)| k != name);
        }
    }

    /// Replace all children of `node` with a single text node.
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            self.create_text(node, text);
        }
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) {
        if let Some(element) = self.element_mut(node) {
            element.value = value.to_string();
        }
    }

    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        if let Some(element) = self.element_mut(node) {
            element.checked = checked;
        }
    }

    pub fn set_selected(&mut self, node: NodeId, selected: bool) {
        if let Some(element) = self.element_mut(node) {
            element.selected = selected;
        }
    }

    pub fn set_layout(&mut self, node: NodeId, rect: Rect) {
        if let Some(element) = self.element_mut(node) {
            element.layout = Some(rect);
        }
    }

    // ------------------------------------------------------------------
    // Structure queries
    // ------------------------------------------------------------------

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(node.0)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.attr(name))
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Parent element in the light tree, skipping the document node.
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| self.is_element(p))
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
    }

    pub fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.element(node).and_then(|e| e.shadow_root)
    }

    pub fn shadow_host(&self, node: NodeId) -> Option<NodeId> {
        match self.nodes[node.0].kind {
            NodeKind::ShadowRoot { host } => Some(host),
            _ => None,
        }
    }

    /// Root of the tree scope containing `node`: the document or a shadow root.
    pub fn tree_scope(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Whether the node is still part of the live page, following shadow
    /// roots out to their hosts.
    pub fn is_connected(&self, node: NodeId) -> bool {
        if node.0 >= self.nodes.len() {
            return false;
        }
        let scope = self.tree_scope(node);
        if scope == self.root {
            return true;
        }
        match self.shadow_host(scope) {
            Some(host) => self.is_connected(host),
            None => false,
        }
    }

    /// Element descendants of `root` in pre-order, light tree only.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                out.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// First element with the given id in the same tree scope as `context`.
    pub fn element_by_id(&self, context: NodeId, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        let scope = self.tree_scope(context);
        self.descendants(scope)
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(id))
    }

    /// Concatenated text of all light-tree text descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut |_| true, &mut out);
        out
    }

    /// Like [`Document::text_content`], but skips subtrees rooted at
    /// elements for which `descend` returns false.
    pub fn text_content_filtered(&self, node: NodeId, mut descend: impl FnMut(NodeId) -> bool) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut descend, &mut out);
        out
    }

    fn collect_text(&self, root: NodeId, descend: &mut dyn FnMut(NodeId) -> bool, out: &mut String) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match &self.nodes[node.0].kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element(element) if matches!(element.tag.as_str(), "script" | "style") => {}
                _ => {
                    for &child in self.children(node).iter().rev() {
                        if self.is_element(child) && !descend(child) {
                            continue;
                        }
                        stack.push(child);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    /// The slot a light-tree child of a shadow host is distributed into.
    pub fn assigned_slot(&self, node: NodeId) -> Option<NodeId> {
        let host = self.parent(node)?;
        let shadow = self.shadow_root(host)?;
        let wanted = match &self.nodes[node.0].kind {
            NodeKind::Element(element) => element.attr("slot").unwrap_or(""),
            NodeKind::Text(_) => "",
            _ => return None,
        };
        self.descendants(shadow)
            .into_iter()
            .find(|&n| self.tag(n) == Some("slot") && self.attr(n, "name").unwrap_or("") == wanted)
    }

    /// Nodes distributed into `slot`, in the host's child order.
    pub fn assigned_nodes(&self, slot: NodeId) -> Vec<NodeId> {
        let Some(host) = self.shadow_host(self.tree_scope(slot)) else {
            return Vec::new();
        };
        self.children(host)
            .iter()
            .copied()
            .filter(|&child| self.assigned_slot(child) == Some(slot))
            .collect()
    }

    // ------------------------------------------------------------------
    // Style and layout
    // ------------------------------------------------------------------

    /// Value of a property declared in the inline `style` attribute.
    pub fn inline_style(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.attr(node, "style")?;
        style
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .filter(|(name, _)| name.trim().eq_ignore_ascii_case(property))
            .map(|(_, value)| value.trim().to_ascii_lowercase())
            .last()
    }

    pub fn computed_style(&self, node: NodeId) -> ComputedStyle {
        let display = self.inline_style(node, "display").unwrap_or_else(|| {
            let hidden_by_default = self
                .tag(node)
                .is_some_and(|tag| DISPLAY_NONE_TAGS.contains(&tag));
            if hidden_by_default || self.has_attr(node, "hidden") {
                "none".to_string()
            } else {
                "block".to_string()
            }
        });
        let visibility = self
            .inline_style(node, "visibility")
            .unwrap_or_else(|| "visible".to_string());
        ComputedStyle {
            display,
            visibility,
        }
    }

    pub fn bounding_box(&self, node: NodeId) -> Rect {
        let Some(element) = self.element(node) else {
            return Rect::ZERO;
        };
        if let Some(rect) = element.layout {
            return rect;
        }
        if self.computed_style(node).display == "none" || self.is_collapsed_option(node) {
            return Rect::ZERO;
        }
        let width = self
            .inline_style(node, "width")
            .and_then(|v| parse_px(&v))
            .unwrap_or(Rect::NOMINAL.width);
        let height = self
            .inline_style(node, "height")
            .and_then(|v| parse_px(&v))
            .unwrap_or(Rect::NOMINAL.height);
        Rect::new(0.0, 0.0, width, height)
    }

    /// Options of a drop-down select are not rendered until it opens.
    fn is_collapsed_option(&self, node: NodeId) -> bool {
        if self.tag(node) != Some("option") {
            return false;
        }
        let mut ancestor = self.parent_element(node);
        while let Some(current) = ancestor {
            if self.tag(current) == Some("select") {
                return !is_list_box_select(self, current);
            }
            ancestor = self.parent_element(current);
        }
        false
    }

    // ------------------------------------------------------------------
    // Focus, scrolling, events
    // ------------------------------------------------------------------

    pub fn active_element(&self) -> Option<NodeId> {
        self.active_element
    }

    pub fn is_focusable(&self, node: NodeId) -> bool {
        let Some(element) = self.element(node) else {
            return false;
        };
        if element.attr("disabled").is_some() {
            return false;
        }
        match element.tag.as_str() {
            "button" | "select" | "textarea" | "summary" => true,
            "input" => element.attr("type") != Some("hidden"),
            "a" | "area" => element.attr("href").is_some(),
            _ => element.attr("tabindex").is_some() || is_content_editable(self, node),
        }
    }

    /// Move focus, dispatching blur to the previous element and focus to the new one.
    pub fn focus(&mut self, node: NodeId) {
        if self.active_element == Some(node) {
            return;
        }
        if let Some(previous) = self.active_element.take() {
            self.dispatch(previous, EventKind::Blur, None);
        }
        self.active_element = Some(node);
        self.dispatch(node, EventKind::Focus, None);
    }

    pub fn scroll_into_view(&mut self, node: NodeId) {
        self.scrolled_to = Some(node);
    }

    pub fn scrolled_to(&self) -> Option<NodeId> {
        self.scrolled_to
    }

    pub fn dispatch(&mut self, target: NodeId, kind: EventKind, key: Option<&str>) {
        if self.events.len() >= MAX_EVENTS {
            self.events.remove(0);
        }
        self.events.push(DispatchedEvent {
            target,
            kind,
            key: key.map(str::to_string),
        });
    }

    pub fn events(&self) -> &[DispatchedEvent] {
        &self.events
    }
}

/// Collapse whitespace runs to one space and trim both ends.
pub fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A `<select>` rendered as a list box rather than a drop-down.
pub fn is_list_box_select(doc: &Document, node: NodeId) -> bool {
    doc.has_attr(node, "multiple")
        || doc
            .attr(node, "size")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .is_some_and(|size| size > 1)
}

pub fn is_content_editable(doc: &Document, node: NodeId) -> bool {
    matches!(
        doc.attr(node, "contenteditable").map(str::to_ascii_lowercase).as_deref(),
        Some("" | "true" | "plaintext-only")
    )
}

fn parse_px(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> (Document, NodeId) {
        let mut doc = Document::new("about:blank");
        let root = doc.root();
        let body = doc.create_element(root, "body", &[]);
        (doc, body)
    }

    #[test]
    fn text_content_of_deep_tree() {
        let (mut doc, body) = page();
        let mut parent = body;
        for _ in 0..100_000 {
            parent = doc.create_element(parent, "span", &[]);
        }
        doc.create_text(parent, "bottom");
        doc.create_text(body, " tail");
        assert_eq!(doc.text_content(body), "bottom tail");
    }

    #[test]
    fn removed_nodes_are_disconnected() {
        let (mut doc, body) = page();
        let div = doc.create_element(body, "div", &[]);
        let span = doc.create_element(div, "span", &[]);
        assert!(doc.is_connected(span));

        doc.remove(div);
        assert!(!doc.is_connected(div));
        assert!(!doc.is_connected(span));
    }

    #[test]
    fn shadow_content_is_connected_through_host() {
        let (mut doc, body) = page();
        let host = doc.create_element(body, "x-card", &[]);
        let shadow = doc.attach_shadow(host).unwrap();
        let inner = doc.create_element(shadow, "button", &[]);
        assert!(doc.is_connected(inner));
        assert_eq!(doc.tree_scope(inner), shadow);

        doc.remove(host);
        assert!(!doc.is_connected(inner));
    }

    #[test]
    fn slot_assignment_by_name_and_default() {
        let (mut doc, body) = page();
        let host = doc.create_element(body, "x-dialog", &[]);
        let titled = doc.create_element(host, "h2", &[("slot", "title")]);
        let plain = doc.create_element(host, "p", &[]);
        let shadow = doc.attach_shadow(host).unwrap();
        let title_slot = doc.create_element(shadow, "slot", &[("name", "title")]);
        let default_slot = doc.create_element(shadow, "slot", &[]);

        assert_eq!(doc.assigned_slot(titled), Some(title_slot));
        assert_eq!(doc.assigned_slot(plain), Some(default_slot));
        assert_eq!(doc.assigned_nodes(title_slot), vec![titled]);
        assert_eq!(doc.assigned_nodes(default_slot), vec![plain]);
    }

    #[test]
    fn unmatched_slot_name_is_not_assigned() {
        let (mut doc, body) = page();
        let host = doc.create_element(body, "x-panel", &[]);
        let child = doc.create_element(host, "span", &[("slot", "missing")]);
        doc.attach_shadow(host);
        assert_eq!(doc.assigned_slot(child), None);
    }

    #[test]
    fn computed_style_reads_inline_style_and_hidden() {
        let (mut doc, body) = page();
        let none = doc.create_element(body, "div", &[("style", "color: red; display: none")]);
        let hidden = doc.create_element(body, "div", &[("hidden", "")]);
        let invisible = doc.create_element(body, "div", &[("style", "visibility:hidden")]);
        let script = doc.create_element(body, "script", &[]);

        assert_eq!(doc.computed_style(none).display, "none");
        assert_eq!(doc.computed_style(hidden).display, "none");
        assert_eq!(doc.computed_style(invisible).visibility, "hidden");
        assert_eq!(doc.computed_style(script).display, "none");
    }

    #[test]
    fn bounding_box_uses_inline_size_then_nominal() {
        let (mut doc, body) = page();
        let zero = doc.create_element(body, "div", &[("style", "width: 0; height: 0px")]);
        let sized = doc.create_element(body, "div", &[("style", "width: 40px")]);
        let plain = doc.create_element(body, "div", &[]);

        assert!(doc.bounding_box(zero).is_empty());
        assert_eq!(doc.bounding_box(sized).width, 40.0);
        assert_eq!(doc.bounding_box(sized).height, Rect::NOMINAL.height);
        assert_eq!(doc.bounding_box(plain), Rect::NOMINAL);
    }

    #[test]
    fn drop_down_options_have_no_box() {
        let (mut doc, body) = page();
        let select = doc.create_element(body, "select", &[]);
        let option = doc.create_element(select, "option", &[]);
        let list = doc.create_element(body, "select", &[("multiple", "")]);
        let listed = doc.create_element(list, "option", &[]);

        assert!(doc.bounding_box(option).is_empty());
        assert!(!doc.bounding_box(listed).is_empty());
    }

    #[test]
    fn element_by_id_is_scoped_to_tree() {
        let (mut doc, body) = page();
        let outer = doc.create_element(body, "span", &[("id", "label")]);
        let host = doc.create_element(body, "div", &[]);
        let shadow = doc.attach_shadow(host).unwrap();
        let inner = doc.create_element(shadow, "span", &[("id", "label")]);
        let button = doc.create_element(shadow, "button", &[]);

        assert_eq!(doc.element_by_id(body, "label"), Some(outer));
        assert_eq!(doc.element_by_id(button, "label"), Some(inner));
    }

    #[test]
    fn event_log_keeps_the_newest() {
        let (mut doc, body) = page();
        let input = doc.create_element(body, "input", &[]);
        for _ in 0..MAX_EVENTS {
            doc.dispatch(input, EventKind::Input, None);
        }
        doc.dispatch(input, EventKind::KeyDown, Some("Enter"));

        assert_eq!(doc.events().len(), MAX_EVENTS);
        let last = doc.events().last().unwrap();
        assert_eq!(last.kind, EventKind::KeyDown);
        assert_eq!(last.key.as_deref(), Some("Enter"));
    }

    #[test]
    fn focus_dispatches_blur_and_focus() {
        let (mut doc, body) = page();
        let a = doc.create_element(body, "input", &[]);
        let b = doc.create_element(body, "input", &[]);
        doc.focus(a);
        doc.focus(b);

        let kinds: Vec<_> = doc.events().iter().map(|e| (e.target, e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (a, EventKind::Focus),
                (a, EventKind::Blur),
                (b, EventKind::Focus)
            ]
        );
        assert_eq!(doc.active_element(), Some(b));
    }

    #[test]
    fn removing_focused_element_clears_focus() {
        let (mut doc, body) = page();
        let input = doc.create_element(body, "input", &[]);
        doc.focus(input);
        doc.remove(input);
        assert_eq!(doc.active_element(), None);
    }

    #[test]
    fn text_content_skips_script() {
        let (mut doc, body) = page();
        let p = doc.create_element(body, "p", &[]);
        doc.create_text(p, "Hello ");
        let script = doc.create_element(p, "script", &[]);
        doc.create_text(script, "var x = 1;");
        doc.create_text(p, "world");
        assert_eq!(doc.text_content(p), "Hello world");
    }

    #[test]
    fn title_prefers_explicit_value() {
        let (mut doc, body) = page();
        let title = doc.create_element(body, "title", &[]);
        doc.create_text(title, "  Inbox \n (3) ");
        assert_eq!(doc.title(), "Inbox (3)");
        doc.set_title("Override");
        assert_eq!(doc.title(), "Override");
    }

    #[test]
    fn documents_get_distinct_ids() {
        assert_ne!(Document::new("a").id(), Document::new("b").id());
    }
}
