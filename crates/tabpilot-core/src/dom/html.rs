//! Forgiving HTML loader.
//!
//! Builds a [`Document`] from markup. This is a tokenizer with an open
//! element stack, not a standards-compliant tree builder: mismatched end tags pop
//! to the nearest matching element and are otherwise ignored.
//!
//! Supported: comments, doctype, void elements, raw-text `script`/`style`,
//! common character references, and declarative shadow roots
//! (`<template shadowrootmode="open">` becomes the parent's shadow root).

use thiserror::Error;

use super::{Document, NodeId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HtmlError {
    #[error("unclosed comment starting at byte {0}")]
    UnclosedComment(usize),
    #[error("unclosed tag starting at byte {0}")]
    UnclosedTag(usize),
    #[error("unclosed <{tag}> starting at byte {at}")]
    UnclosedRawText { tag: String, at: usize },
    #[error("invalid tag name at byte {0}")]
    InvalidTagName(usize),
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_TAGS: &[&str] = &["script", "style", "textarea", "title"];

/// Deepest element nesting the loader builds. Elements opened below this
/// depth become children of the element at the cap, as in browsers.
pub const MAX_TREE_DEPTH: usize = 512;

/// A parsed start tag.
struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
}

/// Parse `html` into a new document located at `url`.
pub fn parse(url: &str, html: &str) -> Result<Document, HtmlError> {
    let mut doc = Document::new(url);
    let mut stack = vec![doc.root()];
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if html[i..].starts_with("<!--") {
            let end = html[i + 4..]
                .find("-->")
                .ok_or(HtmlError::UnclosedComment(i))?;
            i += 4 + end + 3;
            continue;
        }

        if bytes[i] == b'<' && html[i..].starts_with("<!") {
            // doctype and other declarations
            let end = html[i..].find('>').ok_or(HtmlError::UnclosedTag(i))?;
            i += end + 1;
            continue;
        }

        if bytes[i] == b'<' && html[i..].starts_with("</") {
            let end = html[i..].find('>').ok_or(HtmlError::UnclosedTag(i))?;
            let name = html[i + 2..i + end].trim().to_ascii_lowercase();
            i += end + 1;
            close_element(&doc, &mut stack, &name);
            continue;
        }

        if bytes[i] == b'<' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
            let (tag, next) = parse_start_tag(html, i)?;
            i = next;
            let parent = current(&stack);
            let node = open_element(&mut doc, parent, &tag);

            if RAW_TEXT_TAGS.contains(&tag.name.as_str()) {
                let close = find_end_tag(html, i, &tag.name).ok_or_else(|| HtmlError::UnclosedRawText {
                    tag: tag.name.clone(),
                    at: i,
                })?;
                let body = &html[i..close];
                if !body.is_empty() {
                    let text = if tag.name == "textarea" || tag.name == "title" {
                        decode_entities(body)
                    } else {
                        body.to_string()
                    };
                    if tag.name == "textarea" {
                        doc.set_value(node, &text);
                    }
                    doc.create_text(node, &text);
                }
                i = close + html[close..].find('>').map_or(html.len() - close, |e| e + 1);
                continue;
            }

            // stack[0] is the document, so its length is one more than the depth
            if !tag.self_closing
                && !VOID_TAGS.contains(&tag.name.as_str())
                && stack.len() <= MAX_TREE_DEPTH
            {
                stack.push(node);
            }
            continue;
        }

        let start = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }
        let text = decode_entities(&html[start..i]);
        doc.create_text(current(&stack), &text);
    }

    Ok(doc)
}

fn current(stack: &[NodeId]) -> NodeId {
    stack[stack.len() - 1]
}

/// Create the element for a start tag. A declarative shadow template turns
/// into the parent's shadow root instead of an element.
fn open_element(doc: &mut Document, parent: NodeId, tag: &StartTag) -> NodeId {
    let is_shadow_template = tag.name == "template"
        && tag
            .attrs
            .iter()
            .any(|(k, _)| k == "shadowrootmode" || k == "shadowroot");
    if is_shadow_template && doc.is_element(parent) {
        if let Some(shadow) = doc.attach_shadow(parent) {
            return shadow;
        }
    }
    let attrs: Vec<(&str, &str)> = tag
        .attrs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    doc.create_element(parent, &tag.name, &attrs)
}

/// Pop the stack up to and including the nearest element named `name`.
/// Unmatched end tags are ignored.
fn close_element(doc: &Document, stack: &mut Vec<NodeId>, name: &str) {
    let matches = |node: NodeId| {
        doc.tag(node) == Some(name)
            || (name == "template" && doc.shadow_host(node).is_some())
    };
    if let Some(pos) = stack.iter().rposition(|&n| matches(n)) {
        if pos > 0 {
            stack.truncate(pos);
        }
    }
}

fn parse_start_tag(html: &str, at: usize) -> Result<(StartTag, usize), HtmlError> {
    let bytes = html.as_bytes();
    let mut i = at + 1;
    let name_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    if i == name_start {
        return Err(HtmlError::InvalidTagName(at));
    }
    let name = html[name_start..i].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return Err(HtmlError::UnclosedTag(at)),
            Some(b'>') => {
                i += 1;
                break;
            }
            Some(b'/') => {
                self_closing = true;
                i += 1;
                continue;
            }
            Some(_) => {}
        }

        let attr_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'>' | b'/') {
            i += 1;
        }
        let attr_name = html[attr_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    let end = html[i + 1..]
                        .find(quote as char)
                        .ok_or(HtmlError::UnclosedTag(at))?;
                    value = decode_entities(&html[i + 1..i + 1 + end]);
                    i += end + 2;
                }
                _ => {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&html[value_start..i]);
                }
            }
        }

        if !attr_name.is_empty() && !attrs.iter().any(|(k, _): &(String, String)| *k == attr_name) {
            attrs.push((attr_name, value));
        }
    }

    Ok((
        StartTag {
            name,
            attrs,
            self_closing,
        },
        i,
    ))
}

/// Byte offset of the `</tag` that closes a raw-text element.
fn find_end_tag(html: &str, from: usize, tag: &str) -> Option<usize> {
    let needle = format!("</{}", tag);
    let lower = html[from..].to_ascii_lowercase();
    lower.find(&needle).map(|pos| from + pos)
}

/// Decode the character references pages commonly use.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';').filter(|&s| s <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" | "#39" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity.strip_prefix('#').and_then(|num| {
                let code = match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse().ok(),
                };
                code.and_then(char::from_u32)
            }),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(doc: &Document, tag: &str) -> NodeId {
        let mut all = doc.descendants(doc.root());
        for node in doc.descendants(doc.root()) {
            if let Some(shadow) = doc.shadow_root(node) {
                all.extend(doc.descendants(shadow));
            }
        }
        all.into_iter()
            .find(|&n| doc.tag(n) == Some(tag))
            .unwrap_or_else(|| panic!("no <{}> in document", tag))
    }

    #[test]
    fn parses_nested_elements_and_text() {
        let doc = parse("about:blank", "<!DOCTYPE html><body><p class=\"x\">Hi <b>there</b></p></body>").unwrap();
        let p = find(&doc, "p");
        assert_eq!(doc.attr(p, "class"), Some("x"));
        assert_eq!(doc.text_content(p), "Hi there");
    }

    #[test]
    fn void_and_self_closing_tags_do_not_nest() {
        let doc = parse("about:blank", "<div><input id=a><br/><span>after</span></div>").unwrap();
        let input = find(&doc, "input");
        let span = find(&doc, "span");
        assert_eq!(doc.parent(input), doc.parent(span));
    }

    #[test]
    fn boolean_and_unquoted_attributes() {
        let doc = parse("about:blank", "<input type=checkbox checked disabled>").unwrap();
        let input = find(&doc, "input");
        assert_eq!(doc.attr(input, "type"), Some("checkbox"));
        assert_eq!(doc.attr(input, "disabled"), Some(""));
        assert!(doc.element(input).unwrap().checked);
    }

    #[test]
    fn comments_and_scripts_are_not_text() {
        let doc = parse(
            "about:blank",
            "<div><!-- note --><script>if (a < b) {}</script>ok</div>",
        )
        .unwrap();
        let div = find(&doc, "div");
        assert_eq!(doc.text_content(div), "ok");
    }

    #[test]
    fn textarea_body_becomes_value() {
        let doc = parse("about:blank", "<textarea>a &amp; b</textarea>").unwrap();
        let textarea = find(&doc, "textarea");
        assert_eq!(doc.element(textarea).unwrap().value, "a & b");
    }

    #[test]
    fn title_is_read_from_markup() {
        let doc = parse("about:blank", "<head><title>Tom &amp; Jerry</title></head>").unwrap();
        assert_eq!(doc.title(), "Tom & Jerry");
    }

    #[test]
    fn declarative_shadow_root() {
        let html = r#"<x-card><template shadowrootmode="open"><button>Inner</button><slot></slot></template><span>light</span></x-card>"#;
        let doc = parse("about:blank", html).unwrap();
        let host = find(&doc, "x-card");
        let shadow = doc.shadow_root(host).expect("shadow root attached");
        let button = find(&doc, "button");
        assert_eq!(doc.tree_scope(button), shadow);
        let span = find(&doc, "span");
        assert_eq!(doc.parent(span), Some(host));
    }

    #[test]
    fn stray_end_tags_are_ignored() {
        let doc = parse("about:blank", "<div></span><p>x</p></div>").unwrap();
        let div = find(&doc, "div");
        let p = find(&doc, "p");
        assert_eq!(doc.parent(p), Some(div));
    }

    #[test]
    fn nesting_is_capped() {
        let html = format!("{}<button>Deep</button>", "<div>".repeat(100_000));
        let doc = parse("about:blank", &html).unwrap();
        let button = find(&doc, "button");

        let mut depth = 0;
        let mut node = button;
        while let Some(parent) = doc.parent_element(node) {
            depth += 1;
            node = parent;
        }
        assert_eq!(depth, MAX_TREE_DEPTH);
        assert_eq!(doc.text_content(doc.root()), "Deep");
    }

    #[test]
    fn unclosed_comment_is_an_error() {
        assert_eq!(
            parse("about:blank", "<p><!-- never closed").unwrap_err(),
            HtmlError::UnclosedComment(3)
        );
    }

    #[test]
    fn decodes_numeric_references() {
        assert_eq!(decode_entities("&#65;&#x42;&lt;"), "AB<");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
    }
}
