//! Flattened accessibility-tree traversal.
//!
//! The walker visits the page the way assistive technology sees it: shadow
//! roots are flattened into their hosts, slotted light-tree children appear at
//! their slot instead of their source position, and `aria-owns` pulls
//! out-of-tree elements in after a node's own children.

use crate::aria::{Classification, Classifier};
use crate::dom::{Document, NodeId};

/// An element the walker decided to expose, in visit order.
#[derive(Debug, Clone)]
pub struct Visited {
    pub node: NodeId,
    pub classification: Classification,
}

/// Pending work for the explicit-stack traversal in [`TreeWalker::exposed`].
enum Frame {
    Enter(NodeId),
    /// Reached through `aria-owns`; skipped when already on the current path.
    Owned(NodeId),
    Exit,
}

pub struct TreeWalker<'a> {
    doc: &'a Document,
    classifier: &'a Classifier,
}

impl<'a> TreeWalker<'a> {
    pub fn new(doc: &'a Document, classifier: &'a Classifier) -> Self {
        Self { doc, classifier }
    }

    /// Exposed elements in pre-order, depth-first, including `aria-owns`
    /// children. An owned element is visited both at its own position and at
    /// its owner's, so it may appear twice.
    pub fn exposed(&self) -> Vec<Visited> {
        let mut out = Vec::new();
        let mut path: Vec<NodeId> = Vec::new();
        let mut stack: Vec<Frame> = flattened_children(self.doc, self.doc.root())
            .into_iter()
            .rev()
            .map(Frame::Enter)
            .collect();

        while let Some(frame) = stack.pop() {
            let node = match frame {
                Frame::Exit => {
                    path.pop();
                    continue;
                }
                Frame::Owned(owned) if path.contains(&owned) => {
                    tracing::debug!(?owned, "skipping aria-owns cycle");
                    continue;
                }
                Frame::Owned(node) | Frame::Enter(node) => node,
            };
            if !self.doc.is_element(node) || self.classifier.is_hidden(self.doc, node) {
                continue;
            }

            // Names are only computed for roles that can be exposed.
            if self.classifier.may_expose(self.classifier.role(self.doc, node).as_deref()) {
                let classification = self.classifier.classify(self.doc, node);
                if self.classifier.is_exposed(&classification) {
                    out.push(Visited {
                        node,
                        classification,
                    });
                }
            }

            path.push(node);
            stack.push(Frame::Exit);
            stack.extend(owned_elements(self.doc, node).into_iter().rev().map(Frame::Owned));
            stack.extend(flattened_children(self.doc, node).into_iter().rev().map(Frame::Enter));
        }
        out
    }

    /// Every visible element of the flattened tree exactly once, in
    /// document order. `aria-owns` is not followed.
    pub fn visible_elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = flattened_children(self.doc, self.doc.root());
        stack.reverse();
        while let Some(node) = stack.pop() {
            if !self.doc.is_element(node) || self.classifier.is_hidden(self.doc, node) {
                continue;
            }
            out.push(node);
            let mut children = flattened_children(self.doc, node);
            children.reverse();
            stack.extend(children);
        }
        out
    }
}

/// Children of `node` in the flattened tree.
///
/// A slot yields its assigned nodes, or its own children when nothing is
/// assigned. A shadow host skips light children that are assigned to a slot
/// and appends its shadow root's children after the rest.
pub fn flattened_children(doc: &Document, node: NodeId) -> Vec<NodeId> {
    if doc.tag(node) == Some("slot") && doc.shadow_host(doc.tree_scope(node)).is_some() {
        let assigned = doc.assigned_nodes(node);
        if !assigned.is_empty() {
            return assigned;
        }
        return doc.children(node).to_vec();
    }

    let mut children: Vec<NodeId> = match doc.shadow_root(node) {
        Some(_) => doc
            .children(node)
            .iter()
            .copied()
            .filter(|&child| doc.assigned_slot(child).is_none())
            .collect(),
        None => doc.children(node).to_vec(),
    };
    if let Some(shadow) = doc.shadow_root(node) {
        children.extend_from_slice(doc.children(shadow));
    }
    children
}

/// Elements named by `aria-owns`, resolved in the owner's tree scope.
fn owned_elements(doc: &Document, node: NodeId) -> Vec<NodeId> {
    doc.attr(node, "aria-owns")
        .map(|ids| {
            ids.split_whitespace()
                .filter_map(|id| doc.element_by_id(node, id))
                .collect()
        })
        .unwrap_or_default()
}
