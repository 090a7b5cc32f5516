//! Interaction execution.
//!
//! [`perform`] applies one action to one resolved element. Parameters are
//! checked before anything on the page changes, so a rejected action leaves
//! the page exactly as it was.
//!
//! Every action is followed by [`SETTLE_DELAY`]. The delay is the caller's to
//! await: this module is synchronous and never sleeps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dom::{normalize_space, Document, EventKind, NodeId};
use crate::error::ApiError;
use crate::input::{parse_key_sequence, KeyPress};

/// Pause after each action so page-side effects settle before the result
/// is read.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Click,
    Type,
    Hover,
    Select,
    Press,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Type => "type",
            Action::Hover => "hover",
            Action::Select => "select",
            Action::Press => "press",
        }
    }
}

/// Action arguments. Which ones are required depends on the action.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionParams<'a> {
    pub text: Option<&'a str>,
    pub key: Option<&'a str>,
    pub value: Option<&'a str>,
}

/// Effects the page cannot apply to itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Absolute URL of a followed link.
    pub navigate_to: Option<String>,
}

/// Check that `action` has what it needs, before the target is resolved.
pub fn validate(action: Action, params: &ActionParams<'_>, has_target: bool) -> Result<(), ApiError> {
    if !has_target && action != Action::Press {
        return Err(ApiError::invalid_request_with_suggestion(
            format!("'{}' needs a target element", action.as_str()),
            "Pass element as {\"ref\":\"e1\"}, {\"selector\":\"...\"} or {\"role\":\"...\",\"name\":\"...\"}",
        ));
    }
    match action {
        Action::Type if params.text.is_none() => Err(missing(action, "text")),
        Action::Select if params.value.is_none() => Err(missing(action, "value")),
        Action::Press => {
            let key = params.key.ok_or_else(|| missing(action, "key"))?;
            parse_keys(key).map(|_| ())
        }
        _ => Ok(()),
    }
}

fn missing(action: Action, param: &str) -> ApiError {
    ApiError::invalid_request(format!("'{}' requires '{}'", action.as_str(), param))
}

fn parse_keys(key: &str) -> Result<Vec<KeyPress>, ApiError> {
    parse_key_sequence(key).ok_or_else(|| {
        ApiError::invalid_request_with_suggestion(
            format!("Unknown key '{}'", key),
            "Use a single character, a named key (Enter, Tab, Escape, ArrowUp, F5) or a combo like Ctrl+Shift+A",
        )
    })
}

/// Perform `action` on `target`. Only `press` may omit the target.
pub fn perform(
    doc: &mut Document,
    target: Option<NodeId>,
    action: Action,
    params: &ActionParams<'_>,
) -> Result<Outcome, ApiError> {
    validate(action, params, target.is_some())?;
    tracing::debug!(action = action.as_str(), ?target, "performing action");

    match (action, target) {
        (Action::Press, target) => {
            let presses = parse_keys(params.key.unwrap_or_default())?;
            press(doc, target, &presses);
            Ok(Outcome::default())
        }
        (_, None) => Err(ApiError::internal("target vanished after validation")),
        (Action::Click, Some(node)) => Ok(click(doc, node)),
        (Action::Type, Some(node)) => {
            type_text(doc, node, params.text.unwrap_or_default())?;
            Ok(Outcome::default())
        }
        (Action::Hover, Some(node)) => {
            doc.scroll_into_view(node);
            for kind in [EventKind::MouseOver, EventKind::MouseEnter, EventKind::MouseMove] {
                doc.dispatch(node, kind, None);
            }
            Ok(Outcome::default())
        }
        (Action::Select, Some(node)) => {
            select_option(doc, node, params.value.unwrap_or_default())?;
            Ok(Outcome::default())
        }
    }
}

// ============================================================================
// Click
// ============================================================================

fn click(doc: &mut Document, node: NodeId) -> Outcome {
    doc.scroll_into_view(node);
    if is_disabled(doc, node) {
        tracing::debug!(?node, "click on disabled control ignored");
        return Outcome::default();
    }
    for kind in [EventKind::MouseDown, EventKind::MouseUp, EventKind::Click] {
        doc.dispatch(node, kind, None);
    }
    activate(doc, node)
}

/// Native activation behavior of a clicked element.
fn activate(doc: &mut Document, node: NodeId) -> Outcome {
    if doc.is_focusable(node) {
        doc.focus(node);
    }

    let tag = doc.tag(node).unwrap_or_default().to_string();
    match tag.as_str() {
        "input" => match input_type(doc, node).as_str() {
            "checkbox" => {
                let checked = doc.element(node).is_some_and(|e| e.checked);
                doc.set_checked(node, !checked);
                fire_input_and_change(doc, node);
            }
            "radio" => check_radio(doc, node),
            _ => {}
        },
        "a" | "area" => {
            if let Some(href) = doc.attr(node, "href") {
                return Outcome {
                    navigate_to: resolve_href(doc.url(), href),
                };
            }
        }
        "summary" => {
            if let Some(details) = doc.parent_element(node).filter(|&p| doc.tag(p) == Some("details")) {
                if doc.has_attr(details, "open") {
                    doc.remove_attr(details, "open");
                } else {
                    doc.set_attr(details, "open", "");
                }
            }
        }
        "label" => {
            if let Some(control) = labeled_control(doc, node) {
                if !is_disabled(doc, control) {
                    doc.dispatch(control, EventKind::Click, None);
                    return activate(doc, control);
                }
            }
        }
        _ => {}
    }
    Outcome::default()
}

fn check_radio(doc: &mut Document, node: NodeId) {
    if doc.element(node).is_some_and(|e| e.checked) {
        return;
    }
    if let Some(group) = doc.attr(node, "name").map(str::to_string) {
        let scope = doc.tree_scope(node);
        let form = enclosing(doc, node, "form");
        let peers: Vec<NodeId> = doc
            .descendants(scope)
            .into_iter()
            .filter(|&n| {
                n != node
                    && doc.tag(n) == Some("input")
                    && input_type(doc, n) == "radio"
                    && doc.attr(n, "name") == Some(group.as_str())
                    && enclosing(doc, n, "form") == form
            })
            .collect();
        for peer in peers {
            doc.set_checked(peer, false);
        }
    }
    doc.set_checked(node, true);
    fire_input_and_change(doc, node);
}

fn labeled_control(doc: &Document, label: NodeId) -> Option<NodeId> {
    if let Some(id) = doc.attr(label, "for") {
        return doc.element_by_id(label, id);
    }
    doc.descendants(label).into_iter().find(|&n| {
        matches!(
            doc.tag(n),
            Some("input" | "select" | "textarea" | "button")
        )
    })
}

/// Resolve a link target against the document URL.
fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }
    match url::Url::parse(base).and_then(|base| base.join(href)) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => url::Url::parse(href).ok().map(|u| u.to_string()),
    }
}

// ============================================================================
// Type
// ============================================================================

/// Input types that do not take typed text.
const NON_TEXT_INPUT_TYPES: &[&str] = &[
    "button", "submit", "reset", "image", "checkbox", "radio", "hidden", "file", "range",
    "color",
];

fn is_editable(doc: &Document, node: NodeId) -> bool {
    if is_disabled(doc, node) || doc.has_attr(node, "readonly") {
        return false;
    }
    match doc.tag(node) {
        Some("textarea") => true,
        Some("input") => !NON_TEXT_INPUT_TYPES.contains(&input_type(doc, node).as_str()),
        _ => crate::dom::is_content_editable(doc, node),
    }
}

fn type_text(doc: &mut Document, node: NodeId, text: &str) -> Result<(), ApiError> {
    if !is_editable(doc, node) {
        return Err(ApiError::invalid_request_with_suggestion(
            "Target element does not accept text",
            "Type into a textbox, searchbox, textarea or contenteditable element",
        ));
    }
    doc.scroll_into_view(node);
    doc.focus(node);
    if matches!(doc.tag(node), Some("input" | "textarea")) {
        doc.set_value(node, text);
    } else {
        doc.set_text(node, text);
    }
    fire_input_and_change(doc, node);
    Ok(())
}

// ============================================================================
// Select
// ============================================================================

fn select_option(doc: &mut Document, node: NodeId, wanted: &str) -> Result<(), ApiError> {
    if doc.tag(node) != Some("select") {
        return Err(ApiError::invalid_request_with_suggestion(
            "Target element is not a <select>",
            "Resolve the combobox or listbox element itself",
        ));
    }
    let options: Vec<NodeId> = doc
        .descendants(node)
        .into_iter()
        .filter(|&n| doc.tag(n) == Some("option"))
        .collect();

    let by_value = options.iter().copied().find(|&o| option_value(doc, o) == wanted);
    let chosen = by_value
        .or_else(|| {
            let wanted = normalize_space(wanted);
            options.iter().copied().find(|&o| option_label(doc, o) == wanted)
        })
        .ok_or_else(|| {
            let available: Vec<String> = options.iter().map(|&o| option_label(doc, o)).collect();
            ApiError::invalid_request_with_suggestion(
                format!("No option matches '{}'", wanted),
                format!("Available options: {}", available.join(", ")),
            )
        })?;

    doc.scroll_into_view(node);
    if !doc.has_attr(node, "multiple") {
        for &option in &options {
            doc.set_selected(option, false);
        }
    }
    doc.set_selected(chosen, true);
    let value = option_value(doc, chosen);
    doc.set_value(node, &value);
    fire_input_and_change(doc, node);
    Ok(())
}

fn option_value(doc: &Document, option: NodeId) -> String {
    match doc.attr(option, "value") {
        Some(value) => value.to_string(),
        None => normalize_space(&doc.text_content(option)),
    }
}

fn option_label(doc: &Document, option: NodeId) -> String {
    match doc.attr(option, "label") {
        Some(label) => normalize_space(label),
        None => normalize_space(&doc.text_content(option)),
    }
}

// ============================================================================
// Press
// ============================================================================

fn press(doc: &mut Document, target: Option<NodeId>, presses: &[KeyPress]) {
    if let Some(node) = target {
        doc.scroll_into_view(node);
        if doc.is_focusable(node) {
            doc.focus(node);
        }
    }
    for key in presses {
        let receiver = doc.active_element().unwrap_or(doc.root());
        let combo = key.combo();
        doc.dispatch(receiver, EventKind::KeyDown, Some(&combo));
        if key.is_printable() {
            doc.dispatch(receiver, EventKind::KeyPress, Some(&combo));
        }
        apply_key_default(doc, receiver, key);
        doc.dispatch(receiver, EventKind::KeyUp, Some(&combo));
    }
}

/// Text editing default actions for the focused control.
fn apply_key_default(doc: &mut Document, node: NodeId, key: &KeyPress) {
    if !matches!(doc.tag(node), Some("input" | "textarea")) || !is_editable(doc, node) {
        return;
    }
    let Some(mut value) = doc.element(node).map(|e| e.value.clone()) else {
        return;
    };
    if key.is_printable() {
        value.push_str(&key.key);
    } else if key.key == "Backspace" && !key.ctrl && !key.alt && !key.meta {
        value.pop();
    } else if key.key == "Enter" && doc.tag(node) == Some("textarea") {
        value.push('\n');
    } else {
        return;
    }
    doc.set_value(node, &value);
    doc.dispatch(node, EventKind::Input, None);
}

// ============================================================================
// Helpers
// ============================================================================

fn input_type(doc: &Document, node: NodeId) -> String {
    doc.attr(node, "type")
        .map(|t| t.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "text".to_string())
}

fn is_disabled(doc: &Document, node: NodeId) -> bool {
    let form_control = matches!(
        doc.tag(node),
        Some("button" | "input" | "select" | "textarea" | "option" | "optgroup")
    );
    (form_control && doc.has_attr(node, "disabled"))
        || doc
            .attr(node, "aria-disabled")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn enclosing(doc: &Document, node: NodeId, tag: &str) -> Option<NodeId> {
    let mut current = doc.parent_element(node);
    while let Some(n) = current {
        if doc.tag(n) == Some(tag) {
            return Some(n);
        }
        current = doc.parent_element(n);
    }
    None
}

fn fire_input_and_change(doc: &mut Document, node: NodeId) {
    doc.dispatch(node, EventKind::Input, None);
    doc.dispatch(node, EventKind::Change, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{html, DispatchedEvent};
    use crate::error::ErrorCode;

    fn page(source: &str) -> Document {
        html::parse("https://example.com/app/index.html", source).unwrap()
    }

    fn by_id(doc: &Document, id: &str) -> NodeId {
        doc.element_by_id(doc.root(), id).unwrap()
    }

    fn kinds(events: &[DispatchedEvent], target: NodeId) -> Vec<EventKind> {
        events
            .iter()
            .filter(|e| e.target == target)
            .map(|e| e.kind)
            .collect()
    }

    fn text(t: &str) -> ActionParams<'_> {
        ActionParams {
            text: Some(t),
            ..Default::default()
        }
    }

    #[test]
    fn click_fires_mouse_sequence_and_focuses() {
        let mut doc = page(r#"<button id="b">Go</button>"#);
        let b = by_id(&doc, "b");
        perform(&mut doc, Some(b), Action::Click, &ActionParams::default()).unwrap();

        assert_eq!(
            kinds(doc.events(), b),
            vec![
                EventKind::MouseDown,
                EventKind::MouseUp,
                EventKind::Click,
                EventKind::Focus
            ]
        );
        assert_eq!(doc.active_element(), Some(b));
        assert_eq!(doc.scrolled_to(), Some(b));
    }

    #[test]
    fn click_toggles_checkbox() {
        let mut doc = page(r#"<input id="c" type="checkbox">"#);
        let c = by_id(&doc, "c");
        perform(&mut doc, Some(c), Action::Click, &ActionParams::default()).unwrap();
        assert!(doc.element(c).unwrap().checked);
        perform(&mut doc, Some(c), Action::Click, &ActionParams::default()).unwrap();
        assert!(!doc.element(c).unwrap().checked);
    }

    #[test]
    fn click_checks_radio_and_clears_group() {
        let mut doc = page(
            r#"<input id="a" type="radio" name="size" checked><input id="b" type="radio" name="size">
               <input id="other" type="radio" name="color" checked>"#,
        );
        let (a, b, other) = (by_id(&doc, "a"), by_id(&doc, "b"), by_id(&doc, "other"));
        perform(&mut doc, Some(b), Action::Click, &ActionParams::default()).unwrap();
        assert!(doc.element(b).unwrap().checked);
        assert!(!doc.element(a).unwrap().checked);
        assert!(doc.element(other).unwrap().checked);
    }

    #[test]
    fn click_on_label_activates_control() {
        let mut doc = page(r#"<label for="c">Agree</label><input id="c" type="checkbox">"#);
        let label = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some("label"))
            .unwrap();
        let c = by_id(&doc, "c");
        perform(&mut doc, Some(label), Action::Click, &ActionParams::default()).unwrap();
        assert!(doc.element(c).unwrap().checked);
    }

    #[test]
    fn click_on_disabled_button_does_nothing() {
        let mut doc = page(r#"<button id="b" disabled>Go</button>"#);
        let b = by_id(&doc, "b");
        perform(&mut doc, Some(b), Action::Click, &ActionParams::default()).unwrap();
        assert!(doc.events().is_empty());
        assert_eq!(doc.active_element(), None);
    }

    #[test]
    fn click_link_reports_navigation() {
        let mut doc = page(r##"<a id="l" href="../docs/start.html">Docs</a><a id="f" href="#top">Top</a>"##);
        let (l, f) = (by_id(&doc, "l"), by_id(&doc, "f"));
        let outcome = perform(&mut doc, Some(l), Action::Click, &ActionParams::default()).unwrap();
        assert_eq!(
            outcome.navigate_to.as_deref(),
            Some("https://example.com/docs/start.html")
        );
        let outcome = perform(&mut doc, Some(f), Action::Click, &ActionParams::default()).unwrap();
        assert_eq!(outcome.navigate_to, None);
    }

    #[test]
    fn type_replaces_value_and_fires_events() {
        let mut doc = page(r#"<input id="q" value="old">"#);
        let q = by_id(&doc, "q");
        perform(&mut doc, Some(q), Action::Type, &text("new query")).unwrap();
        assert_eq!(doc.element(q).unwrap().value, "new query");
        assert_eq!(
            kinds(doc.events(), q),
            vec![EventKind::Focus, EventKind::Input, EventKind::Change]
        );
    }

    #[test]
    fn type_into_contenteditable_sets_text() {
        let mut doc = page(r#"<div id="d" contenteditable>old</div>"#);
        let d = by_id(&doc, "d");
        perform(&mut doc, Some(d), Action::Type, &text("hello")).unwrap();
        assert_eq!(doc.text_content(d), "hello");
    }

    #[test]
    fn type_rejects_non_editable_without_mutation() {
        let mut doc = page(r#"<button id="b">Go</button><input id="r" readonly>"#);
        for id in ["b", "r"] {
            let node = by_id(&doc, id);
            let err = perform(&mut doc, Some(node), Action::Type, &text("x")).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidRequest);
        }
        assert!(doc.events().is_empty());
        assert_eq!(doc.scrolled_to(), None);
    }

    #[test]
    fn missing_params_are_rejected_before_mutation() {
        let mut doc = page(r#"<input id="q">"#);
        let q = by_id(&doc, "q");
        for action in [Action::Type, Action::Select, Action::Press] {
            let err = perform(&mut doc, Some(q), action, &ActionParams::default()).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidRequest);
        }
        let err = perform(&mut doc, None, Action::Click, &ActionParams::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert!(doc.events().is_empty());
    }

    #[test]
    fn hover_fires_pointer_events() {
        let mut doc = page(r#"<a id="l" href="/">Menu</a>"#);
        let l = by_id(&doc, "l");
        perform(&mut doc, Some(l), Action::Hover, &ActionParams::default()).unwrap();
        assert_eq!(
            kinds(doc.events(), l),
            vec![EventKind::MouseOver, EventKind::MouseEnter, EventKind::MouseMove]
        );
    }

    #[test]
    fn select_by_value_then_label() {
        let mut doc = page(
            r#"<select id="s"><option value="s">Small</option><option value="l" selected>Large</option></select>"#,
        );
        let s = by_id(&doc, "s");
        let value = |v| ActionParams {
            value: Some(v),
            ..Default::default()
        };

        perform(&mut doc, Some(s), Action::Select, &value("s")).unwrap();
        assert_eq!(doc.element(s).unwrap().value, "s");
        perform(&mut doc, Some(s), Action::Select, &value("Large")).unwrap();
        assert_eq!(doc.element(s).unwrap().value, "l");

        let selected: Vec<_> = doc
            .descendants(s)
            .into_iter()
            .filter(|&o| doc.element(o).unwrap().selected)
            .collect();
        assert_eq!(selected.len(), 1);

        let err = perform(&mut doc, Some(s), Action::Select, &value("Huge")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert!(err.suggestion.unwrap().contains("Small"));
    }

    #[test]
    fn select_requires_select_element() {
        let mut doc = page(r#"<input id="q">"#);
        let q = by_id(&doc, "q");
        let params = ActionParams {
            value: Some("x"),
            ..Default::default()
        };
        let err = perform(&mut doc, Some(q), Action::Select, &params).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn press_targets_focused_element_or_document() {
        let mut doc = page(r#"<input id="q">"#);
        let q = by_id(&doc, "q");
        let key = |k| ActionParams {
            key: Some(k),
            ..Default::default()
        };

        perform(&mut doc, None, Action::Press, &key("Escape")).unwrap();
        assert_eq!(
            kinds(doc.events(), doc.root()),
            vec![EventKind::KeyDown, EventKind::KeyUp]
        );

        perform(&mut doc, Some(q), Action::Press, &key("a")).unwrap();
        assert_eq!(
            kinds(doc.events(), q),
            vec![
                EventKind::Focus,
                EventKind::KeyDown,
                EventKind::KeyPress,
                EventKind::Input,
                EventKind::KeyUp
            ]
        );
        assert_eq!(doc.element(q).unwrap().value, "a");
        let last = doc.events().last().unwrap();
        assert_eq!(last.key.as_deref(), Some("a"));
    }

    #[test]
    fn press_rejects_unknown_key_names() {
        let mut doc = page("");
        let params = ActionParams {
            key: Some("Ctrl+Banana"),
            ..Default::default()
        };
        let err = perform(&mut doc, None, Action::Press, &params).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert!(doc.events().is_empty());
    }
}
