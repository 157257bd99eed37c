//! Reference discovery and rewriting in raw HTML.

use std::borrow::Cow;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::css;
use crate::entities::{escape_xml, replace_entities};
use crate::links::LinkHandler;
use crate::util::is_stylesheet;

/// Attributes whose value is a reference to another resource.
pub const LINK_ATTRIBUTES: &[&str] = &[
    "action",
    "archive",
    "background",
    "cite",
    "classid",
    "codebase",
    "data",
    "href",
    "longdesc",
    "profile",
    "src",
    "usemap",
    "dynsrc",
    "lowsrc",
    "poster",
    "xlink:href",
];

/// A comment, or a start tag with its attributes. Quoted values may contain
/// `>`; a bare value runs to the next whitespace or `>` whatever quotes it holds.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|<[a-zA-Z][^\s/>]*(?:"[^"]*"|'[^']*'|=\s*[^\s"'>][^\s>]*|[^>"'])*>"#).unwrap()
});

/// `name=value` with double-quoted, single-quoted or bare values.
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>][^\s>]*))"#).unwrap()
});

static SCRIPT_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</script").unwrap());
static STYLE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</style").unwrap());

// ============================================================================
// Tag scanning
// ============================================================================

/// A start tag found in the document. Offsets are byte offsets into the
/// scanned text.
#[derive(Debug)]
struct Tag<'a> {
    range: Range<usize>,
    text: &'a str,
    name: &'a str,
    /// Raw text content of `<script>` and `<style>`.
    body: Option<Range<usize>>,
}

impl<'a> Tag<'a> {
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn attributes(&self) -> impl Iterator<Item = Attribute<'a>> + use<'a> {
        let offset = 1 + self.name.len();
        let text = self.text;
        ATTR_RE.captures_iter(&text[offset..]).filter_map(move |caps| {
            let name = caps.get(1)?.as_str();
            let (value, quote) = match (caps.get(2), caps.get(3), caps.get(4)) {
                (Some(m), _, _) => (m, Some('"')),
                (_, Some(m), _) => (m, Some('\'')),
                (_, _, Some(m)) => (m, None),
                _ => return None,
            };
            Some(Attribute {
                name,
                value: value.as_str(),
                range: offset + value.start()..offset + value.end(),
                quote,
            })
        })
    }

    fn attribute(&self, name: &str) -> Option<Attribute<'a>> {
        self.attributes().find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug)]
struct Attribute<'a> {
    name: &'a str,
    /// Raw value, entities not decoded.
    value: &'a str,
    /// Span of the value inside the tag text, excluding quotes.
    range: Range<usize>,
    quote: Option<char>,
}

/// Iterates over start tags, skipping comments and the content of
/// `<script>` and `<style>` elements.
struct TagScanner<'a> {
    html: &'a str,
    pos: usize,
}

impl<'a> TagScanner<'a> {
    fn new(html: &'a str) -> Self {
        Self { html, pos: 0 }
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        loop {
            let m = TAG_RE.find_at(self.html, self.pos)?;
            self.pos = m.end();
            let text = m.as_str();
            if text.starts_with("<!--") {
                continue;
            }

            let name_len = text[1..]
                .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
                .unwrap_or(text.len() - 1);
            let name = &text[1..1 + name_len];

            let mut body = None;
            if !text.ends_with("/>") {
                let end_re = if name.eq_ignore_ascii_case("script") {
                    Some(&*SCRIPT_END_RE)
                } else if name.eq_ignore_ascii_case("style") {
                    Some(&*STYLE_END_RE)
                } else {
                    None
                };
                if let Some(end_re) = end_re {
                    let body_end = end_re
                        .find_at(self.html, self.pos)
                        .map_or(self.html.len(), |close| close.start());
                    body = Some(self.pos..body_end);
                    self.pos = body_end;
                }
            }

            return Some(Tag {
                range: m.range(),
                text,
                name,
                body,
            });
        }
    }
}

/// Byte ranges of the raw text content of `<script>` and `<style>` elements.
pub(super) fn raw_text_ranges(html: &str) -> Vec<Range<usize>> {
    TagScanner::new(html).filter_map(|tag| tag.body).collect()
}

fn decode_value(raw: &str) -> String {
    replace_entities(raw, Some(encoding_rs::WINDOWS_1252))
}

fn is_link_attribute(name: &str) -> bool {
    LINK_ATTRIBUTES.iter().any(|a| a.eq_ignore_ascii_case(name))
}

fn quoted(value: &str, quote: Option<char>) -> String {
    let escaped = escape_xml(value, true);
    match quote {
        Some(_) => escaped,
        None => format!("\"{escaped}\""),
    }
}

// ============================================================================
// Public operations
// ============================================================================

/// Targets of `<a href>` links in document order, entity-decoded.
///
/// Empty values are skipped; nothing is resolved.
pub fn anchor_hrefs(html: &str) -> Vec<String> {
    TagScanner::new(html)
        .filter(|tag| tag.is("a"))
        .filter_map(|tag| tag.attribute("href"))
        .map(|attr| decode_value(attr.value))
        .filter(|href| !href.trim().is_empty())
        .collect()
}

/// Offer every reference in `html` to `handler` and write back the
/// replacements it returns.
///
/// Values of [`LINK_ATTRIBUTES`] are entity-decoded and trimmed before they
/// reach the handler. `style` attributes and `<style>` blocks are rewritten
/// with [`css::replace_urls`]. Everything else, including the quoting of
/// untouched attributes, is kept byte for byte.
///
/// ```
/// use std::path::Path;
/// use folio::html::rewrite_links;
///
/// let mut handler = |raw: &str, _: &Path| (raw == "a b.png").then(|| "images/a_b.png".to_string());
/// let out = rewrite_links(r#"<img src='a b.png' alt="x">"#, Path::new("/"), &mut handler);
/// assert_eq!(out, r#"<img src='images/a_b.png' alt="x">"#);
/// ```
pub fn rewrite_links<'a>(html: &'a str, base: &Path, handler: &mut dyn LinkHandler) -> Cow<'a, str> {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();

    for tag in TagScanner::new(html) {
        for attr in tag.attributes() {
            let replacement = if attr.name.eq_ignore_ascii_case("style") {
                let decoded = decode_value(attr.value);
                if !decoded.to_ascii_lowercase().contains("url(") {
                    continue;
                }
                match css::replace_urls(&decoded, base, handler) {
                    Cow::Owned(css) => css,
                    Cow::Borrowed(_) => continue,
                }
            } else if is_link_attribute(attr.name) {
                let decoded = decode_value(attr.value);
                let link = decoded.trim();
                match handler.resolve(link, base) {
                    Some(new) if new != link => new,
                    _ => continue,
                }
            } else {
                continue;
            };

            let start = tag.range.start + attr.range.start;
            let end = tag.range.start + attr.range.end;
            edits.push((start..end, quoted(&replacement, attr.quote)));
        }

        if tag.is("style")
            && let Some(body) = tag.body.clone()
        {
            let is_css = tag
                .attribute("type")
                .is_none_or(|t| is_stylesheet(decode_value(t.value).trim()));
            if is_css && let Cow::Owned(css) = css::replace_urls(&html[body.clone()], base, handler) {
                edits.push((body, css));
            }
        }
    }

    if edits.is_empty() {
        return Cow::Borrowed(html);
    }

    let mut result = String::with_capacity(html.len());
    let mut last = 0;
    for (range, text) in edits {
        result.push_str(&html[last..range.start]);
        result.push_str(&text);
        last = range.end;
    }
    result.push_str(&html[last..]);
    Cow::Owned(result)
}
