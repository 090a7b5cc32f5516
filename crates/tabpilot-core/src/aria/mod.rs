//! Role, name and state classification.
//!
//! [`Classifier::classify`] is a pure function of one element and the page it
//! lives in. The snapshot walker and role-based selector resolution share a
//! single classifier so that a role and name read from a snapshot always
//! resolve back to the same element.
//!
//! # State tokens
//!
//! States are gated by role and emitted in a fixed order:
//!
//! | Token | Roles | Source |
//! |-------|-------|--------|
//! | `checked` / `unchecked` / `checked=mixed` | checkbox family | `aria-checked`, else native |
//! | `disabled` | disableable roles | `disabled` or `aria-disabled="true"` |
//! | `expanded` / `collapsed` | expandable roles | `aria-expanded` only |
//! | `pressed` / `not-pressed` / `pressed=mixed` | button with `aria-pressed` | `aria-pressed` |
//! | `selected` | selectable roles | `aria-selected="true"` or selected option |
//! | `level=<n>` | heading, treeitem | `aria-level`, else heading depth |
//! | `focused` | any | page focus |

mod name;
pub mod tables;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dom::{is_list_box_select, Document, NodeId};

pub use name::MAX_FALLBACK_NAME_CHARS;
pub use tables::RoleTables;

/// A three-valued ARIA state (`true`, `false`, `mixed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tristate {
    True,
    False,
    Mixed,
}

impl Tristate {
    fn from_aria(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Tristate::True,
            "mixed" => Tristate::Mixed,
            _ => Tristate::False,
        }
    }
}

/// Everything the classifier knows about one element. Fields that do not
/// apply to the element's role are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub role: Option<String>,
    pub name: String,
    pub disabled: Option<bool>,
    pub checked: Option<Tristate>,
    pub expanded: Option<bool>,
    pub pressed: Option<Tristate>,
    pub selected: Option<bool>,
    pub level: Option<u32>,
    pub focused: bool,
}

impl Classification {
    /// State tokens in canonical order.
    pub fn states(&self) -> StateSet {
        let mut tokens = Vec::new();
        match self.checked {
            Some(Tristate::True) => tokens.push("checked".to_string()),
            Some(Tristate::False) => tokens.push("unchecked".to_string()),
            Some(Tristate::Mixed) => tokens.push("checked=mixed".to_string()),
            None => {}
        }
        if self.disabled == Some(true) {
            tokens.push("disabled".to_string());
        }
        match self.expanded {
            Some(true) => tokens.push("expanded".to_string()),
            Some(false) => tokens.push("collapsed".to_string()),
            None => {}
        }
        match self.pressed {
            Some(Tristate::True) => tokens.push("pressed".to_string()),
            Some(Tristate::False) => tokens.push("not-pressed".to_string()),
            Some(Tristate::Mixed) => tokens.push("pressed=mixed".to_string()),
            None => {}
        }
        if self.selected == Some(true) {
            tokens.push("selected".to_string());
        }
        if let Some(level) = self.level {
            tokens.push(format!("level={}", level));
        }
        if self.focused {
            tokens.push("focused".to_string());
        }
        StateSet(tokens)
    }
}

/// Ordered state tokens. On the wire this is one space-separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSet(Vec<String>);

impl StateSet {
    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl Serialize for StateSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StateSet(raw.split_whitespace().map(str::to_string).collect()))
    }
}

/// Role, name and state computation over a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    tables: &'static RoleTables,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&RoleTables::STANDARD)
    }
}

impl Classifier {
    pub const fn new(tables: &'static RoleTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &'static RoleTables {
        self.tables
    }

    pub fn classify(&self, doc: &Document, node: NodeId) -> Classification {
        let role = self.role(doc, node);
        let name = name::accessible_name(self, doc, node, role.as_deref());
        let has_role = |set: &[&str]| role.as_deref().is_some_and(|r| set.contains(&r));

        let checked = has_role(self.tables.checkable).then(|| checked_state(doc, node));
        let disabled = has_role(self.tables.disableable).then(|| {
            doc.has_attr(node, "disabled") || attr_is_true(doc, node, "aria-disabled")
        });
        let expanded = if has_role(self.tables.expandable) {
            doc.attr(node, "aria-expanded")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
        } else {
            None
        };
        let pressed = if role.as_deref() == Some("button") {
            doc.attr(node, "aria-pressed").map(Tristate::from_aria)
        } else {
            None
        };
        let selected = has_role(self.tables.selectable).then(|| {
            attr_is_true(doc, node, "aria-selected")
                || (doc.tag(node) == Some("option") && doc.element(node).is_some_and(|e| e.selected))
        });
        let level = if has_role(self.tables.leveled) {
            heading_level(doc, node)
        } else {
            None
        };

        Classification {
            name,
            disabled,
            checked,
            expanded,
            pressed,
            selected,
            level,
            focused: doc.active_element() == Some(node),
            role,
        }
    }

    /// Explicit `role` (first token), else the implicit role of the tag.
    pub fn role(&self, doc: &Document, node: NodeId) -> Option<String> {
        let element = doc.element(node)?;
        if let Some(explicit) = element
            .attr("role")
            .and_then(|r| r.split_whitespace().next())
        {
            return Some(explicit.to_ascii_lowercase());
        }

        let implicit = match element.tag.as_str() {
            "a" | "area" => element.attr("href").map(|_| "link"),
            "img" => element
                .attr("alt")
                .filter(|alt| !alt.trim().is_empty())
                .map(|_| "img"),
            "select" => Some(if is_list_box_select(doc, node) {
                "listbox"
            } else {
                "combobox"
            }),
            "input" => self.tables.input_role(element.attr("type").unwrap_or("text")),
            tag => self.tables.tag_role(tag),
        };
        implicit.map(str::to_string)
    }

    /// Whether the element and its whole subtree are excluded from the
    /// accessibility tree.
    pub fn is_hidden(&self, doc: &Document, node: NodeId) -> bool {
        if !doc.is_element(node) {
            return false;
        }
        if attr_is_true(doc, node, "aria-hidden") {
            return true;
        }
        let style = doc.computed_style(node);
        if style.display == "none" || style.visibility == "hidden" {
            return true;
        }
        doc.bounding_box(node).is_empty()
    }

    /// Inclusion policy: interactive and structural roles, and images that
    /// carry alternative text.
    pub fn is_exposed(&self, classification: &Classification) -> bool {
        match classification.role.as_deref() {
            Some("img") => !classification.name.is_empty(),
            role => self.may_expose(role),
        }
    }

    /// Whether an element with this role can be exposed at all. Images
    /// additionally need a name.
    pub fn may_expose(&self, role: Option<&str>) -> bool {
        let Some(role) = role else {
            return false;
        };
        role == "img"
            || self.tables.interactive.contains(&role)
            || self.tables.structural.contains(&role)
    }
}

fn attr_is_true(doc: &Document, node: NodeId, name: &str) -> bool {
    doc.attr(node, name)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn checked_state(doc: &Document, node: NodeId) -> Tristate {
    if let Some(aria) = doc.attr(node, "aria-checked") {
        return Tristate::from_aria(aria);
    }
    match doc.element(node) {
        Some(element) if element.checked => Tristate::True,
        _ => Tristate::False,
    }
}

fn heading_level(doc: &Document, node: NodeId) -> Option<u32> {
    if let Some(level) = doc
        .attr(node, "aria-level")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|&l| l > 0)
    {
        return Some(level);
    }
    let tag = doc.tag(node)?;
    match tag.as_bytes() {
        [b'h', digit @ b'1'..=b'6'] => Some(u32::from(digit - b'0')),
        _ => None,
    }
}
