//! CSS-like structural patterns.
//!
//! A practical subset of selectors, enough for agents addressing elements by
//! structure: compound steps (`tag`, `*`, `#id`, `.class`, attribute
//! conditions, a few pseudo-classes), the four combinators, and `,` groups.
//! Matching runs against the light tree of the document, like
//! `querySelectorAll`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::{Document, NodeId};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported pattern '{pattern}': {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
    Word(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pseudo {
    Checked,
    Disabled,
    Enabled,
    Focus,
    FirstChild,
    LastChild,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Step {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, AttrOp)>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    Adjacent,
    Sibling,
}

/// One compound step plus its relation to the step on its left.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    step: Step,
    combinator: Option<Combinator>,
}

/// A parsed pattern: one or more comma-separated chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    groups: Vec<Vec<Part>>,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let err = |reason| PatternError {
            pattern: source.to_string(),
            reason,
        };
        let mut groups = Vec::new();
        for group in split_top_level(source, ',') {
            let group = group.trim();
            if group.is_empty() {
                return Err(err("empty selector group"));
            }
            groups.push(parse_chain(group).map_err(err)?);
        }
        Ok(Self {
            source: source.trim().to_string(),
            groups,
        })
    }
}

impl Pattern {
    /// All matching elements in document order, without duplicates.
    pub fn query_all(&self, doc: &Document) -> Vec<NodeId> {
        doc.descendants(doc.root())
            .into_iter()
            .filter(|&node| self.matches(doc, node))
            .collect()
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.groups
            .iter()
            .any(|chain| matches_chain(doc, node, chain))
    }
}

fn split_top_level(source: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in source.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth -= 1,
            (None, c) if c == sep && depth == 0 => {
                out.push(&source[start..i]);
                start = i + ch.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&source[start..]);
    out
}

fn parse_chain(group: &str) -> Result<Vec<Part>, &'static str> {
    let mut parts = Vec::new();
    let mut pending: Option<Combinator> = None;
    let mut token = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    let flush = |token: &mut String, pending: &mut Option<Combinator>, parts: &mut Vec<Part>| -> Result<(), &'static str> {
        if token.is_empty() {
            return Ok(());
        }
        let step = parse_step(token)?;
        let combinator = if parts.is_empty() {
            if pending.is_some() {
                return Err("combinator without a left-hand step");
            }
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        parts.push(Part { step, combinator });
        token.clear();
        Ok(())
    };

    for ch in group.chars() {
        if let Some(q) = quote {
            token.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                token.push(ch);
            }
            '[' => {
                depth += 1;
                token.push(ch);
            }
            ']' => {
                depth -= 1;
                token.push(ch);
            }
            '>' | '+' | '~' if depth == 0 => {
                flush(&mut token, &mut pending, &mut parts)?;
                if pending.is_some() || parts.is_empty() {
                    return Err("dangling combinator");
                }
                pending = Some(match ch {
                    '>' => Combinator::Child,
                    '+' => Combinator::Adjacent,
                    _ => Combinator::Sibling,
                });
            }
            c if c.is_whitespace() && depth == 0 => {
                flush(&mut token, &mut pending, &mut parts)?;
            }
            _ => token.push(ch),
        }
    }
    if quote.is_some() || depth != 0 {
        return Err("unbalanced brackets or quotes");
    }
    flush(&mut token, &mut pending, &mut parts)?;
    if pending.is_some() {
        return Err("dangling combinator");
    }
    Ok(parts)
}

fn parse_ident(src: &str, start: usize) -> (String, usize) {
    let end = src[start..]
        .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .map_or(src.len(), |off| start + off);
    (src[start..end].to_string(), end)
}

fn parse_step(src: &str) -> Result<Step, &'static str> {
    let mut step = Step::default();
    let mut i = 0;
    let mut universal = false;
    while i < src.len() {
        let rest = &src[i..];
        if rest.starts_with('*') {
            universal = true;
            i += 1;
        } else if rest.starts_with('#') {
            let (id, next) = parse_ident(src, i + 1);
            if id.is_empty() {
                return Err("empty id");
            }
            step.id = Some(id);
            i = next;
        } else if rest.starts_with('.') {
            let (class, next) = parse_ident(src, i + 1);
            if class.is_empty() {
                return Err("empty class");
            }
            step.classes.push(class);
            i = next;
        } else if rest.starts_with('[') {
            let close = closing_bracket(rest).ok_or("unclosed attribute condition")?;
            step.attrs.push(parse_attr(&rest[1..close])?);
            i += close + 1;
        } else if rest.starts_with(':') {
            let (name, next) = parse_ident(src, i + 1);
            let pseudo = match name.as_str() {
                "checked" => Pseudo::Checked,
                "disabled" => Pseudo::Disabled,
                "enabled" => Pseudo::Enabled,
                "focus" => Pseudo::Focus,
                "first-child" => Pseudo::FirstChild,
                "last-child" => Pseudo::LastChild,
                _ => return Err("unsupported pseudo-class"),
            };
            step.pseudos.push(pseudo);
            i = next;
        } else {
            if step.tag.is_some() || universal || i != 0 {
                return Err("unexpected tag name");
            }
            let (tag, next) = parse_ident(src, i);
            if tag.is_empty() {
                return Err("unexpected character");
            }
            step.tag = Some(tag.to_ascii_lowercase());
            i = next;
        }
    }
    Ok(step)
}

/// Byte offset of the `]` closing the condition that opens `rest`, ignoring
/// brackets inside quoted values.
fn closing_bracket(rest: &str) -> Option<usize> {
    let mut quote = None;
    for (i, ch) in rest.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_attr(body: &str) -> Result<(String, AttrOp), &'static str> {
    // Names cannot contain operator characters, so the first one starts the
    // operator and everything after it is the value.
    let Some(at) = body.find(['^', '$', '*', '~', '=']) else {
        let name = body.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err("empty attribute condition");
        }
        return Ok((name, AttrOp::Exists));
    };

    let name = body[..at].trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err("attribute condition without a name");
    }
    let (make, value): (fn(String) -> AttrOp, &str) = match &body[at..] {
        op if op.starts_with("^=") => (AttrOp::Prefix, &op[2..]),
        op if op.starts_with("$=") => (AttrOp::Suffix, &op[2..]),
        op if op.starts_with("*=") => (AttrOp::Substring, &op[2..]),
        op if op.starts_with("~=") => (AttrOp::Word, &op[2..]),
        op if op.starts_with('=') => (AttrOp::Equals, &op[1..]),
        _ => return Err("unsupported attribute operator"),
    };
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Ok((name, make(value.to_string())))
}

fn matches_step(doc: &Document, node: NodeId, step: &Step) -> bool {
    let Some(element) = doc.element(node) else {
        return false;
    };
    if step.tag.as_ref().is_some_and(|tag| *tag != element.tag) {
        return false;
    }
    if step.id.as_deref().is_some_and(|id| element.attr("id") != Some(id)) {
        return false;
    }
    let class_attr = element.attr("class").unwrap_or("");
    if !step
        .classes
        .iter()
        .all(|class| class_attr.split_whitespace().any(|c| c == class))
    {
        return false;
    }
    let attrs_match = step.attrs.iter().all(|(name, op)| {
        let Some(value) = element.attr(name) else {
            return false;
        };
        match op {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v,
            AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
            AttrOp::Suffix(v) => !v.is_empty() && value.ends_with(v.as_str()),
            AttrOp::Substring(v) => !v.is_empty() && value.contains(v.as_str()),
            AttrOp::Word(v) => value.split_whitespace().any(|w| w == v),
        }
    });
    if !attrs_match {
        return false;
    }
    step.pseudos.iter().all(|pseudo| match pseudo {
        Pseudo::Checked => element.checked || (element.tag == "option" && element.selected),
        Pseudo::Disabled => element.attr("disabled").is_some(),
        Pseudo::Enabled => element.attr("disabled").is_none(),
        Pseudo::Focus => doc.active_element() == Some(node),
        Pseudo::FirstChild => element_siblings(doc, node).first() == Some(&node),
        Pseudo::LastChild => element_siblings(doc, node).last() == Some(&node),
    })
}

fn element_siblings(doc: &Document, node: NodeId) -> Vec<NodeId> {
    match doc.parent(node) {
        Some(parent) => doc.element_children(parent).collect(),
        None => vec![node],
    }
}

/// Match a chain right to left, backtracking over ancestors and siblings.
fn matches_chain(doc: &Document, node: NodeId, chain: &[Part]) -> bool {
    let Some((last, rest)) = chain.split_last() else {
        return false;
    };
    if !matches_step(doc, node, &last.step) {
        return false;
    }
    let Some(combinator) = last.combinator else {
        return rest.is_empty();
    };
    match combinator {
        Combinator::Child => doc
            .parent_element(node)
            .is_some_and(|parent| matches_chain(doc, parent, rest)),
        Combinator::Descendant => {
            let mut ancestor = doc.parent_element(node);
            while let Some(current) = ancestor {
                if matches_chain(doc, current, rest) {
                    return true;
                }
                ancestor = doc.parent_element(current);
            }
            false
        }
        Combinator::Adjacent | Combinator::Sibling => {
            let siblings = element_siblings(doc, node);
            let Some(pos) = siblings.iter().position(|&s| s == node) else {
                return false;
            };
            let before = &siblings[..pos];
            if combinator == Combinator::Adjacent {
                before
                    .last()
                    .is_some_and(|&prev| matches_chain(doc, prev, rest))
            } else {
                before.iter().rev().any(|&prev| matches_chain(doc, prev, rest))
            }
        }
    }
}
