//! Reduce an HTML page to its content-bearing markup.
//!
//! Drops scripts, styles, page chrome (header/nav/footer/aside), forms,
//! comments and elements left empty, strips every attribute except `href`
//! and `src`, then collapses whitespace.

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::sync::OnceLock;

const DROPPED: &[&str] = &[
    "script", "style", "noscript", "header", "nav", "footer", "aside", "form", "iframe", "svg",
];
const KEPT_ATTRIBUTES: &[&str] = &["href", "src"];
const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn clean_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    render(document.root_element(), &mut out);
    collapse_whitespace(&out)
}

fn render(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if DROPPED.contains(&name) {
        return;
    }

    let mut inner = String::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => escape_text(&text.text, &mut inner),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    render(child, &mut inner);
                }
            }
            _ => {}
        }
    }

    let is_void = VOID.contains(&name);
    let has_kept_attr = element
        .value()
        .attrs()
        .any(|(attr, _)| KEPT_ATTRIBUTES.contains(&attr));
    if inner.trim().is_empty() && !is_void && !has_kept_attr {
        return;
    }
    if is_void && !has_kept_attr && name != "br" && name != "hr" {
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        if KEPT_ATTRIBUTES.contains(&attr) {
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            out.push_str(&value.replace('&', "&amp;").replace('"', "&quot;"));
            out.push('"');
        }
    }
    out.push('>');
    if is_void {
        return;
    }
    out.push_str(&inner);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn collapse_whitespace(html: &str) -> String {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| Some((Regex::new(r"\s+").ok()?, Regex::new(r">\s+<").ok()?)));
    match patterns {
        Some((spaces, between_tags)) => {
            let collapsed = spaces.replace_all(html, " ");
            between_tags.replace_all(&collapsed, "><").trim().to_string()
        }
        None => html.trim().to_string(),
    }
}
