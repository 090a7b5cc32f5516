//! Accessibility-tree snapshots.
//!
//! A snapshot is the page as an agent should see it: the URL, the title and
//! the ordered list of exposed elements, each with a ref the agent can hand
//! back to `interact`.
//!
//! ```json
//! {
//!   "url": "https://example.com/login",
//!   "title": "Sign in",
//!   "elements": [
//!     { "ref": "e1", "role": "textbox", "name": "Email", "states": "focused" },
//!     { "ref": "e2", "role": "button", "name": "Submit", "states": "" }
//!   ]
//! }
//! ```
//!
//! Snapshots are values. Taking a new one never changes an earlier one, but
//! both share refs through the session's [`RefTable`].

use serde::{Deserialize, Serialize};

use crate::aria::{Classifier, StateSet};
use crate::dom::Document;
use crate::refs::{ElementHandle, RefId, RefTable};
use crate::walk::TreeWalker;

/// One exposed element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AriaElement {
    #[serde(rename = "ref")]
    pub ref_id: RefId,
    pub role: String,
    pub name: String,
    pub states: StateSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AriaSnapshot {
    pub url: String,
    pub title: String,
    pub elements: Vec<AriaElement>,
}

/// Walk `doc` and produce a snapshot, minting refs for first-seen elements.
pub fn take_snapshot(doc: &Document, classifier: &Classifier, refs: &mut RefTable) -> AriaSnapshot {
    let elements: Vec<AriaElement> = TreeWalker::new(doc, classifier)
        .exposed()
        .into_iter()
        .filter_map(|visited| {
            let states = visited.classification.states();
            let role = visited.classification.role?;
            Some(AriaElement {
                ref_id: refs.get_or_create(ElementHandle::new(doc, visited.node)),
                role,
                name: visited.classification.name,
                states,
            })
        })
        .collect();

    tracing::debug!(url = doc.url(), count = elements.len(), "snapshot taken");

    AriaSnapshot {
        url: doc.url().to_string(),
        title: doc.title(),
        elements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::html;

    fn snapshot(doc: &Document, refs: &mut RefTable) -> AriaSnapshot {
        take_snapshot(doc, &Classifier::default(), refs)
    }

    #[test]
    fn single_button_wire_shape() {
        let doc = html::parse(
            "about:blank",
            "<title>Form</title><body><button>Submit</button></body>",
        )
        .unwrap();
        let mut refs = RefTable::new();
        let snap = snapshot(&doc, &mut refs);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "url": "about:blank",
                "title": "Form",
                "elements": [
                    { "ref": "e1", "role": "button", "name": "Submit", "states": "" }
                ]
            })
        );
    }

    #[test]
    fn refs_are_stable_across_snapshots() {
        let mut doc = html::parse(
            "about:blank",
            r#"<button id="a">A</button><button id="b">B</button>"#,
        )
        .unwrap();
        let mut refs = RefTable::new();
        let first = snapshot(&doc, &mut refs);

        // A new element gets a new ref; existing refs do not move.
        let root = doc.root();
        let c = doc.create_detached_element("a", &[("href", "/c")]);
        doc.create_text(c, "C");
        doc.append_child(root, c);
        let second = snapshot(&doc, &mut refs);

        assert_eq!(first.elements[0].ref_id, second.elements[0].ref_id);
        assert_eq!(first.elements[1].ref_id, second.elements[1].ref_id);
        assert_eq!(second.elements[2].ref_id.to_string(), "e3");
    }

    #[test]
    fn earlier_snapshot_is_unchanged_by_later_ones() {
        let mut doc = html::parse("about:blank", r#"<input id="q" aria-label="Query">"#).unwrap();
        let mut refs = RefTable::new();
        let before = snapshot(&doc, &mut refs);
        let copy = before.clone();

        let q = doc.element_by_id(doc.root(), "q").unwrap();
        doc.focus(q);
        let after = snapshot(&doc, &mut refs);

        assert_eq!(before, copy);
        assert_eq!(after.elements[0].states.to_string(), "focused");
        assert!(before.elements[0].states.is_empty());
    }

    #[test]
    fn owned_duplicates_share_a_ref() {
        let doc = html::parse(
            "about:blank",
            r#"<div role="listbox" aria-owns="o"></div><div role="option" id="o">One</div>"#,
        )
        .unwrap();
        let mut refs = RefTable::new();
        let snap = snapshot(&doc, &mut refs);
        let options: Vec<_> = snap.elements.iter().filter(|e| e.role == "option").collect();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].ref_id, options[1].ref_id);
    }

    #[test]
    fn deeply_nested_page_snapshot() {
        let html = format!("{}<button>Deep</button>", "<div>".repeat(100_000));
        let doc = html::parse("about:blank", &html).unwrap();
        let mut refs = RefTable::new();
        let snap = snapshot(&doc, &mut refs);
        assert_eq!(snap.elements.len(), 1);
        assert_eq!(snap.elements[0].role, "button");
        assert_eq!(snap.elements[0].name, "Deep");
    }
}
