//! Article-body extraction cascade.
//!
//! Structured data is tried before semantic containers; the first strategy
//! that yields non-empty text wins.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref JSONP_RE: Regex = Regex::new(r"(?s)^\s*[\w$.]+\s*\((.*)\)\s*;?\s*$").unwrap();
    static ref ASSIGNMENT_RE: Regex =
        Regex::new(r"(?s)^\s*(?:var\s+|let\s+|const\s+)?[\w$.]+\s*=\s*(.*)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// `<p>` texts joined by newlines, falling back to the full text.
    Paragraphs,
    /// All visible text.
    Full,
}

#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// First non-empty string under one of `keys` in an `ld+json` block.
    JsonLd { keys: &'static [&'static str] },
    /// JSON inside a `<script>` (optionally `var x = {...};`), read at JSON pointers.
    EmbeddedJson {
        selector: &'static str,
        pointers: &'static [&'static str],
    },
    /// `content` attribute of a meta tag.
    Meta { selector: &'static str },
    /// Text of the first matching container, minus `strip` descendants.
    Container {
        selectors: &'static [&'static str],
        strip: &'static [&'static str],
        mode: TextMode,
    },
}

pub fn extract_body(document: &Html, strategies: &[Strategy]) -> Option<String> {
    for (i, strategy) in strategies.iter().enumerate() {
        let text = match strategy {
            Strategy::JsonLd { keys } => from_json_ld(document, keys),
            Strategy::EmbeddedJson { selector, pointers } => from_embedded_json(document, selector, pointers),
            Strategy::Meta { selector } => from_meta(document, selector),
            Strategy::Container {
                selectors,
                strip,
                mode,
            } => from_containers(document, selectors, strip, *mode),
        };
        match text {
            Some(text) if !text.trim().is_empty() => {
                debug!(strategy = i, "body extracted");
                return Some(text);
            }
            _ => continue,
        }
    }
    None
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!(selector, "invalid selector: {:?}", e);
            None
        }
    }
}

pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").trim().to_string()
}

fn from_json_ld(document: &Html, keys: &[&str]) -> Option<String> {
    let selector = parse_selector(r#"script[type="application/ld+json"]"#)?;
    for script in document.select(&selector) {
        let raw = script.text().collect::<String>();
        let json: Value = match serde_json::from_str(raw.trim()) {
            Ok(json) => json,
            Err(_) => continue,
        };
        if let Some(text) = find_in_ld(&json, keys) {
            return Some(text);
        }
    }
    None
}

fn find_in_ld(json: &Value, keys: &[&str]) -> Option<String> {
    match json {
        Value::Array(items) => items.iter().find_map(|item| find_in_ld(item, keys)),
        Value::Object(map) => {
            for key in keys {
                if let Some(Value::String(s)) = map.get(*key) {
                    let text = strip_tags(s);
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
            }
            map.get("@graph").and_then(|graph| find_in_ld(graph, keys))
        }
        _ => None,
    }
}

fn from_embedded_json(document: &Html, selector: &str, pointers: &[&str]) -> Option<String> {
    let selector = parse_selector(selector)?;
    for script in document.select(&selector) {
        let raw = script.text().collect::<String>();
        let payload = unwrap_assignment(&raw).unwrap_or(raw.trim());
        let json: Value = match serde_json::from_str(payload) {
            Ok(json) => json,
            Err(_) => continue,
        };
        for pointer in pointers {
            if let Some(Value::String(s)) = json.pointer(pointer) {
                let text = strip_tags(s);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn from_meta(document: &Html, selector: &str) -> Option<String> {
    let selector = parse_selector(selector)?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn from_containers(document: &Html, selectors: &[&str], strip: &[&str], mode: TextMode) -> Option<String> {
    for selector in selectors {
        let Some(sel) = parse_selector(selector) else {
            continue;
        };
        if let Some(container) = document.select(&sel).next() {
            let text = container_text(container, strip, mode);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Text of `container` after removing `strip` matches, scripts and styles.
pub fn container_text<'a>(container: ElementRef<'a>, strip: &[&str], mode: TextMode) -> String {
    let skipped: Vec<ElementRef<'a>> = strip
        .iter()
        .filter_map(|s| parse_selector(s))
        .flat_map(|sel| container.select(&sel).collect::<Vec<_>>())
        .collect();

    if mode == TextMode::Paragraphs {
        if let Some(p) = parse_selector("p") {
            let paragraphs: Vec<String> = container
                .select(&p)
                .filter(|el| !is_within(*el, &skipped))
                .map(|el| {
                    let mut out = String::new();
                    push_text(el, &skipped, &mut out);
                    normalize(&out).replace('\n', " ")
                })
                .filter(|t| !t.is_empty())
                .collect();
            if !paragraphs.is_empty() {
                return paragraphs.join("\n");
            }
        }
    }

    let mut out = String::new();
    push_text(container, &skipped, &mut out);
    normalize(&out)
}

fn is_within<'a>(el: ElementRef<'a>, skipped: &[ElementRef<'a>]) -> bool {
    if skipped.contains(&el) {
        return true;
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| skipped.contains(&ancestor))
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div" | "br" | "li" | "ul" | "ol" | "section" | "article" | "tr" | "table" | "blockquote"
            | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

fn push_text<'a>(el: ElementRef<'a>, skipped: &[ElementRef<'a>], out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if matches!(name, "script" | "style" | "noscript") || skipped.contains(&child_el) {
                continue;
            }
            let block = is_block(name);
            if block {
                out.push('\n');
            }
            push_text(child_el, skipped, out);
            if block {
                out.push('\n');
            }
        }
    }
}

/// Trim every line and drop the empty ones.
fn normalize(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Unwrap `callback({...})`. Known callback names are tried first, then any
/// identifier.
pub fn unwrap_jsonp<'a>(text: &'a str, callbacks: &[&str]) -> Option<&'a str> {
    let trimmed = text.trim();
    for callback in callbacks {
        if let Some(rest) = trimmed.strip_prefix(callback) {
            let rest = rest.trim_start();
            if let Some(inner) = rest.strip_prefix('(') {
                let inner = inner.trim_end().trim_end_matches(';').trim_end();
                if let Some(inner) = inner.strip_suffix(')') {
                    return Some(inner.trim());
                }
            }
        }
    }
    JSONP_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Unwrap `var name = {...};`.
pub fn unwrap_assignment(text: &str) -> Option<&str> {
    ASSIGNMENT_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().trim_end_matches(';').trim_end())
}
