//! Reference assignment and resolution for exposed elements.
//!
//! Refs (like `e1`, `e2`) are stable identifiers for elements the walker
//! exposed. A ref is minted the first time an element is seen and keeps
//! pointing at that element for the rest of the session, so an agent can act
//! on an element it read in any earlier snapshot.
//!
//! The table never evicts and never renumbers. Resolution is a reverse lookup
//! over cached entries followed by a liveness check, never a page traversal.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, DocumentId, NodeId};
use crate::error::ApiError;

/// Textual reference to an element, `e<N>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefId(u64);

impl RefId {
    pub fn number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl FromStr for RefId {
    type Err = ApiError;

    /// Accepts `e3` and `@e3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('@')
            .unwrap_or(trimmed)
            .strip_prefix('e')
            .ok_or_else(|| invalid_ref(s))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid_ref(s));
        }
        digits.parse().map(RefId).map_err(|_| invalid_ref(s))
    }
}

fn invalid_ref(s: &str) -> ApiError {
    ApiError::invalid_request_with_suggestion(
        format!("'{}' is not an element reference", s),
        "References look like 'e3' (or '@e3'), as printed by 'tabpilot snapshot'",
    )
}

impl TryFrom<String> for RefId {
    type Error = ApiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RefId> for String {
    fn from(value: RefId) -> Self {
        value.to_string()
    }
}

/// Identity of one node in one loaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub document: DocumentId,
    pub node: NodeId,
}

impl ElementHandle {
    pub fn new(doc: &Document, node: NodeId) -> Self {
        Self {
            document: doc.id(),
            node,
        }
    }

    /// Still part of `doc`: same document and connected.
    pub fn is_live_in(&self, doc: &Document) -> bool {
        self.document == doc.id() && doc.is_connected(self.node)
    }
}

/// Session-lifetime map between refs and element handles.
#[derive(Debug, Default)]
pub struct RefTable {
    by_ref: HashMap<RefId, ElementHandle>,
    by_handle: HashMap<ElementHandle, RefId>,
    /// Last number handed out. Never reset.
    last: u64,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ref for `handle`, minting the next one on first sight.
    pub fn get_or_create(&mut self, handle: ElementHandle) -> RefId {
        if let Some(existing) = self.by_handle.get(&handle) {
            return existing.clone();
        }
        self.last += 1;
        let id = RefId(self.last);
        self.by_ref.insert(id.clone(), handle);
        self.by_handle.insert(handle, id.clone());
        id
    }

    /// The cached handle for `id`, without a liveness check.
    pub fn get(&self, id: &RefId) -> Option<ElementHandle> {
        self.by_ref.get(id).copied()
    }

    /// Resolve `id` to a live node of `doc`.
    ///
    /// Unknown refs fail with `ELEMENT_NOT_FOUND`; refs whose element was
    /// removed or belongs to an earlier document fail with `STALE_REFERENCE`.
    pub fn resolve(&self, doc: &Document, id: &RefId) -> Result<NodeId, ApiError> {
        let handle = self
            .get(id)
            .ok_or_else(|| ApiError::ref_not_found(&id.to_string()))?;
        if !handle.is_live_in(doc) {
            tracing::debug!(%id, "stale reference");
            return Err(ApiError::stale_reference(&id.to_string()));
        }
        Ok(handle.node)
    }

    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn page() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("about:blank");
        let root = doc.root();
        let a = doc.create_element(root, "button", &[]);
        let b = doc.create_element(root, "button", &[]);
        (doc, a, b)
    }

    #[test]
    fn test_refs_are_minted_in_order_and_cached() {
        let (doc, a, b) = page();
        let mut table = RefTable::new();

        let ra = table.get_or_create(ElementHandle::new(&doc, a));
        let rb = table.get_or_create(ElementHandle::new(&doc, b));
        assert_eq!(ra.to_string(), "e1");
        assert_eq!(rb.to_string(), "e2");

        // Same element, same ref.
        assert_eq!(table.get_or_create(ElementHandle::new(&doc, a)), ra);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_resolve_roundtrip() {
        let (doc, a, _) = page();
        let mut table = RefTable::new();
        let id = table.get_or_create(ElementHandle::new(&doc, a));
        assert_eq!(table.resolve(&doc, &id).unwrap(), a);
    }

    #[test]
    fn test_unknown_ref_is_not_found() {
        let (doc, _, _) = page();
        let table = RefTable::new();
        let err = table.resolve(&doc, &"e9".parse().unwrap()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ElementNotFound);
    }

    #[test]
    fn test_removed_element_is_stale() {
        let (mut doc, a, _) = page();
        let mut table = RefTable::new();
        let id = table.get_or_create(ElementHandle::new(&doc, a));
        doc.remove(a);
        let err = table.resolve(&doc, &id).unwrap_err();
        assert_eq!(err.code, ErrorCode::StaleReference);
    }

    #[test]
    fn test_previous_document_is_stale_and_counter_continues() {
        let (old, a, _) = page();
        let mut table = RefTable::new();
        let id = table.get_or_create(ElementHandle::new(&old, a));

        // Same node index in a new document is a different element.
        let (new, a2, _) = page();
        assert_eq!(a, a2);
        let err = table.resolve(&new, &id).unwrap_err();
        assert_eq!(err.code, ErrorCode::StaleReference);

        let fresh = table.get_or_create(ElementHandle::new(&new, a2));
        assert_eq!(fresh.to_string(), "e2");
    }

    #[test]
    fn test_ref_parsing() {
        assert_eq!("e3".parse::<RefId>().unwrap().number(), 3);
        assert_eq!("@e12".parse::<RefId>().unwrap().number(), 12);
        assert_eq!(" e1 ".parse::<RefId>().unwrap().number(), 1);
        for bad in ["", "e", "3", "x3", "e-1", "e1a", "@@e1"] {
            let err = bad.parse::<RefId>().unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidRequest, "{:?}", bad);
        }
    }

    #[test]
    fn test_ref_serializes_as_string() {
        let id: RefId = "e7".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"e7\"");
        let back: RefId = serde_json::from_str("\"@e7\"").unwrap();
        assert_eq!(back, id);
    }
}
