//! Accessible name computation.
//!
//! A simplified, ordered chain. The first source producing a non-empty
//! normalized string wins:
//!
//! 1. `aria-labelledby` (referenced elements' text, space-joined)
//! 2. `aria-label`
//! 3. associated `<label>` (`for=id` or wrapping), ignoring nested controls
//! 4. `alt`
//! 5. `title`
//! 6. `placeholder`
//! 7. text content, for roles named from content
//! 8. current value of text inputs and textareas
//! 9. text content, truncated to [`MAX_FALLBACK_NAME_CHARS`]

use crate::dom::{normalize_space, Document, NodeId};

use super::Classifier;

/// Longest name taken from the generic text-content fallback.
pub const MAX_FALLBACK_NAME_CHARS: usize = 100;

/// Elements a `<label>` can be associated with.
const LABELABLE_TAGS: &[&str] = &[
    "button", "input", "meter", "output", "progress", "select", "textarea",
];

/// Controls whose text never contributes to a label's text.
const FORM_CONTROL_TAGS: &[&str] = &["button", "input", "select", "textarea"];

pub(super) fn accessible_name(
    classifier: &Classifier,
    doc: &Document,
    node: NodeId,
    role: Option<&str>,
) -> String {
    let tables = classifier.tables();

    if let Some(name) = labelled_by(doc, node) {
        return name;
    }
    if let Some(name) = attr_text(doc, node, "aria-label") {
        return name;
    }
    if let Some(name) = label_text(doc, node) {
        return name;
    }
    for attr in ["alt", "title", "placeholder"] {
        if let Some(name) = attr_text(doc, node, attr) {
            return name;
        }
    }

    if role.is_some_and(|r| tables.name_from_content.contains(&r)) {
        let text = visible_text(classifier, doc, node);
        if !text.is_empty() {
            return text;
        }
    }

    if let Some(value) = text_value(doc, node) {
        return value;
    }

    truncate(&visible_text(classifier, doc, node), MAX_FALLBACK_NAME_CHARS)
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn attr_text(doc: &Document, node: NodeId, name: &str) -> Option<String> {
    doc.attr(node, name).map(normalize_space).and_then(non_empty)
}

fn labelled_by(doc: &Document, node: NodeId) -> Option<String> {
    let ids = doc.attr(node, "aria-labelledby")?;
    let parts: Vec<String> = ids
        .split_whitespace()
        .filter_map(|id| doc.element_by_id(node, id))
        .map(|target| normalize_space(&doc.text_content(target)))
        .filter(|text| !text.is_empty())
        .collect();
    non_empty(parts.join(" "))
}

fn label_text(doc: &Document, node: NodeId) -> Option<String> {
    let tag = doc.tag(node)?;
    if !LABELABLE_TAGS.contains(&tag) {
        return None;
    }

    let mut labels = Vec::new();
    if let Some(id) = doc.attr(node, "id").filter(|id| !id.is_empty()) {
        let scope = doc.tree_scope(node);
        labels.extend(
            doc.descendants(scope)
                .into_iter()
                .filter(|&n| doc.tag(n) == Some("label") && doc.attr(n, "for") == Some(id)),
        );
    }
    let mut ancestor = doc.parent_element(node);
    while let Some(current) = ancestor {
        if doc.tag(current) == Some("label") {
            if !labels.contains(&current) {
                labels.push(current);
            }
            break;
        }
        ancestor = doc.parent_element(current);
    }

    let parts: Vec<String> = labels
        .into_iter()
        .map(|label| {
            let text = doc.text_content_filtered(label, |child| {
                doc.tag(child)
                    .map_or(true, |tag| !FORM_CONTROL_TAGS.contains(&tag))
            });
            normalize_space(&text)
        })
        .filter(|text| !text.is_empty())
        .collect();
    non_empty(parts.join(" "))
}

fn text_value(doc: &Document, node: NodeId) -> Option<String> {
    let element = doc.element(node)?;
    let is_text_control = match element.tag.as_str() {
        "textarea" => true,
        "input" => !matches!(
            element.attr("type").map(str::to_ascii_lowercase).as_deref(),
            Some("checkbox" | "radio")
        ),
        _ => false,
    };
    if !is_text_control {
        return None;
    }
    non_empty(normalize_space(&element.value))
}

/// Normalized text of the light subtree, skipping hidden descendants.
fn visible_text(classifier: &Classifier, doc: &Document, node: NodeId) -> String {
    normalize_space(&doc.text_content_filtered(node, |child| !classifier.is_hidden(doc, child)))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    cut.trim_end().to_string()
}
