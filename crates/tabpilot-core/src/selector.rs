//! Logical element selectors.
//!
//! An agent names an element in one of three ways:
//!
//! | Wire form | Strategy |
//! |-----------|----------|
//! | `{"ref": "e3"}` | ref from an earlier snapshot |
//! | `{"selector": "form > button.primary"}` | structural pattern (alias `pattern`) |
//! | `{"role": "button", "name": "OK"}` | accessible role, optional exact name |
//!
//! Resolution yields exactly one live element or fails. It never guesses:
//! several matches are `ELEMENT_AMBIGUOUS`, not the first one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aria::Classifier;
use crate::dom::pattern::Pattern;
use crate::dom::{normalize_space, Document, NodeId};
use crate::error::ApiError;
use crate::refs::{RefId, RefTable};
use crate::walk::TreeWalker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireSelector", into = "WireSelector")]
pub enum ElementSelector {
    ByRef(String),
    ByPattern(String),
    ByRole { role: String, name: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RefSelector {
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternSelector {
    #[serde(alias = "pattern")]
    selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoleSelector {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireSelector {
    Ref(RefSelector),
    Pattern(PatternSelector),
    Role(RoleSelector),
}

impl TryFrom<WireSelector> for ElementSelector {
    type Error = String;

    fn try_from(wire: WireSelector) -> Result<Self, Self::Error> {
        Ok(match wire {
            WireSelector::Ref(s) => ElementSelector::ByRef(s.reference),
            WireSelector::Pattern(s) => ElementSelector::ByPattern(s.selector),
            WireSelector::Role(s) => {
                if s.role.trim().is_empty() {
                    return Err("role selector needs a non-empty role".to_string());
                }
                ElementSelector::ByRole {
                    role: s.role,
                    name: s.name,
                }
            }
        })
    }
}

impl From<ElementSelector> for WireSelector {
    fn from(selector: ElementSelector) -> Self {
        match selector {
            ElementSelector::ByRef(reference) => WireSelector::Ref(RefSelector { reference }),
            ElementSelector::ByPattern(selector) => {
                WireSelector::Pattern(PatternSelector { selector })
            }
            ElementSelector::ByRole { role, name } => {
                WireSelector::Role(RoleSelector { role, name })
            }
        }
    }
}

impl fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementSelector::ByRef(reference) => write!(f, "ref {}", reference),
            ElementSelector::ByPattern(pattern) => write!(f, "selector '{}'", pattern),
            ElementSelector::ByRole { role, name: None } => write!(f, "role={}", role),
            ElementSelector::ByRole {
                role,
                name: Some(name),
            } => write!(f, "role={} name={:?}", role, name),
        }
    }
}

impl ElementSelector {
    /// Parse the `element` field of an `interact` request.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ApiError> {
        serde_json::from_value(value).map_err(|_| {
            ApiError::invalid_request_with_suggestion(
                "element must be exactly one of {ref}, {selector} or {role, name?}",
                "Use {\"ref\":\"e1\"}, {\"selector\":\"button.primary\"} or {\"role\":\"button\",\"name\":\"OK\"}",
            )
        })
    }
}

/// Resolves selectors against the current page.
pub struct Resolver<'a> {
    pub doc: &'a Document,
    pub classifier: &'a Classifier,
    pub refs: &'a RefTable,
}

impl Resolver<'_> {
    pub fn resolve(&self, selector: &ElementSelector) -> Result<NodeId, ApiError> {
        let node = match selector {
            ElementSelector::ByRef(reference) => {
                // A token that is not even ref-shaped cannot be a known ref.
                let id: RefId = reference
                    .parse()
                    .map_err(|_| ApiError::ref_not_found(reference))?;
                self.refs.resolve(self.doc, &id)?
            }
            ElementSelector::ByPattern(source) => {
                let pattern = source.parse::<Pattern>().map_err(|e| {
                    ApiError::invalid_request_with_suggestion(
                        e.to_string(),
                        "Supported: tag, #id, .class, [attr=value], :checked, :focus, and the ' ', '>', '+', '~' combinators",
                    )
                })?;
                exactly_one(selector, pattern.query_all(self.doc))?
            }
            ElementSelector::ByRole { role, name } => {
                let matches = self.by_role(role, name.as_deref());
                exactly_one(selector, matches)?
            }
        };
        tracing::debug!(%selector, ?node, "selector resolved");
        Ok(node)
    }

    fn by_role(&self, role: &str, name: Option<&str>) -> Vec<NodeId> {
        let role = role.trim().to_ascii_lowercase();
        let name = name.map(normalize_space);
        TreeWalker::new(self.doc, self.classifier)
            .visible_elements()
            .into_iter()
            .filter(|&node| {
                if self.classifier.role(self.doc, node).as_deref() != Some(role.as_str()) {
                    return false;
                }
                match &name {
                    Some(wanted) => self.classifier.classify(self.doc, node).name == *wanted,
                    None => true,
                }
            })
            .collect()
    }
}

fn exactly_one(selector: &ElementSelector, matches: Vec<NodeId>) -> Result<NodeId, ApiError> {
    match matches.as_slice() {
        [] => Err(ApiError::no_match(selector)),
        [node] => Ok(*node),
        _ => Err(ApiError::ambiguous(selector, matches.len())),
    }
}
