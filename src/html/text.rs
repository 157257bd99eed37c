//! Title, heading and `<meta>` extraction.

use std::ops::Range;

use log::debug;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::links::raw_text_ranges;
use crate::entities::{EntityDecoder, replace_entities};

/// Elements whose first occurrence can label a document, in priority order.
const HEADER_TAGS: [&[u8]; 6] = [b"h1", b"h2", b"h3", b"h4", b"h5", b"strong"];

/// What [`scan_document`] found in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Whitespace-collapsed text of `<head><title>`, if non-empty.
    pub title: Option<String>,
    /// Text of the first `h1`, else the first `h2` and so on down to `h5`,
    /// else the first `strong`.
    pub header: Option<String>,
    /// `lang` (or `xml:lang`) of the root element.
    pub language: Option<String>,
    /// `(name, content)` of every `<meta name=... content=...>`, names lowercased.
    pub meta: Vec<(String, String)>,
}

impl DocumentInfo {
    /// Content of the first `<meta>` whose name is one of `names`.
    pub fn meta_content(&self, names: &[&str]) -> Option<&str> {
        self.meta
            .iter()
            .find(|(name, content)| names.contains(&name.as_str()) && !content.trim().is_empty())
            .map(|(_, content)| content.as_str())
    }
}

/// Replace every whitespace run with a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lowercase_name(name: &[u8]) -> Vec<u8> {
    name.to_ascii_lowercase()
}

fn header_index(name: &[u8]) -> Option<usize> {
    HEADER_TAGS.iter().position(|tag| *tag == name)
}

fn attribute_value(e: &BytesStart, names: &[&[u8]]) -> Option<String> {
    e.html_attributes()
        .flatten()
        .find(|attr| names.iter().any(|n| attr.key.as_ref().eq_ignore_ascii_case(n)))
        .map(|attr| replace_entities(&String::from_utf8_lossy(&attr.value), None))
}

fn starts_markup(rest: &str) -> bool {
    rest.starts_with(|c: char| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
}

fn push_escaped(out: &mut String, html: &str, segment: Range<usize>) {
    let mut last = segment.start;
    for pos in memchr::memchr_iter(b'<', &html.as_bytes()[segment.clone()]) {
        let pos = segment.start + pos;
        if starts_markup(&html[pos + 1..]) {
            continue;
        }
        out.push_str(&html[last..pos]);
        out.push_str("&lt;");
        last = pos + 1;
    }
    out.push_str(&html[last..segment.end]);
}

/// Copy of `html` the XML reader can get through: `<script>` and `<style>`
/// content is dropped and a `<` that cannot open markup becomes `&lt;`.
fn prepare_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for body in raw_text_ranges(html) {
        push_escaped(&mut out, html, last..body.start);
        last = body.end;
    }
    push_escaped(&mut out, html, last..html.len());
    out
}

/// Extract title, first heading, language and meta tags from `html`.
///
/// The document is read leniently: mismatched and unclosed tags, bare `&`
/// and `<` in text, and markup-like script or style content are tolerated.
/// A hard parse error ends the scan with whatever had been collected up to
/// that point.
pub fn scan_document(html: &str) -> DocumentInfo {
    let html = prepare_markup(html);
    let mut reader = Reader::from_str(&html);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.allow_dangling_amp = true;

    let decoder = EntityDecoder::default();
    let mut info = DocumentInfo::default();
    let mut headers: [Option<String>; 6] = Default::default();
    // Header elements currently open, with the text gathered so far.
    let mut open_headers: Vec<(usize, String)> = Vec::new();
    let mut title: Option<String> = None;
    let mut in_body = false;
    let mut skip_until: Option<Vec<u8>> = None;

    loop {
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => event,
            Err(e) => {
                debug!("Stopped reading document at byte {}: {e}", reader.buffer_position());
                break;
            }
        };

        if let Some(name) = &skip_until {
            if let Event::End(e) = &event
                && e.local_name().as_ref().eq_ignore_ascii_case(name)
            {
                skip_until = None;
            }
            continue;
        }

        let mut text = None;
        match event {
            Event::Start(e) => {
                let name = lowercase_name(e.local_name().as_ref());
                match name.as_slice() {
                    b"script" | b"style" => skip_until = Some(name.clone()),
                    b"body" => in_body = true,
                    b"title" if !in_body && info.title.is_none() => title = Some(String::new()),
                    b"html" => info.language = attribute_value(&e, &[b"lang", b"xml:lang"]),
                    b"meta" => push_meta(&e, &mut info),
                    other => {
                        if let Some(i) = header_index(other)
                            && headers[i].is_none()
                            && !open_headers.iter().any(|(j, _)| *j == i)
                        {
                            open_headers.push((i, String::new()));
                        }
                    }
                }
            }
            Event::Empty(e) => match lowercase_name(e.local_name().as_ref()).as_slice() {
                b"meta" => push_meta(&e, &mut info),
                b"html" => info.language = attribute_value(&e, &[b"lang", b"xml:lang"]),
                _ => {}
            },
            Event::Text(e) => text = Some(String::from_utf8_lossy(e.as_ref()).into_owned()),
            Event::CData(e) => text = Some(String::from_utf8_lossy(&e).into_owned()),
            Event::GeneralRef(e) => text = Some(decoder.decode(&String::from_utf8_lossy(e.as_ref()))),
            Event::End(e) => {
                let name = lowercase_name(e.local_name().as_ref());
                if name == b"title"
                    && let Some(t) = title.take()
                {
                    let t = collapse_whitespace(&t);
                    if !t.is_empty() {
                        info.title = Some(t);
                    }
                }
                if let Some(i) = header_index(&name)
                    && let Some(k) = open_headers.iter().position(|(j, _)| *j == i)
                {
                    let (_, gathered) = open_headers.remove(k);
                    let gathered = collapse_whitespace(&gathered);
                    if !gathered.is_empty() {
                        headers[i] = Some(gathered);
                    }
                }
            }
            _ => {}
        }

        if let Some(text) = text {
            if let Some(t) = title.as_mut() {
                t.push_str(&text);
            }
            for (_, gathered) in &mut open_headers {
                gathered.push_str(&text);
            }
        }
    }

    info.header = headers.into_iter().flatten().next();
    info
}

fn push_meta(e: &BytesStart, info: &mut DocumentInfo) {
    let name = attribute_value(e, &[b"name"]);
    let content = attribute_value(e, &[b"content"]);
    if let (Some(name), Some(content)) = (name, content) {
        info.meta.push((name.trim().to_lowercase(), content));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_and_header() {
        let info = scan_document(
            "<html><head><title>\n  My   Book\n</title></head>\
             <body><h2>Second</h2><h1>First  <em>heading</em></h1></body></html>",
        );
        assert_eq!(info.title.as_deref(), Some("My Book"));
        assert_eq!(info.header.as_deref(), Some("First heading"));
    }

    #[test]
    fn test_header_priority_falls_back() {
        let info = scan_document("<html><body><p><strong>Bold</strong></p><h3></h3><h4>Four</h4></body></html>");
        assert_eq!(info.title, None);
        assert_eq!(info.header.as_deref(), Some("Four"));

        let info = scan_document("<html><body><p><strong>Bold</strong></p></body></html>");
        assert_eq!(info.header.as_deref(), Some("Bold"));

        assert_eq!(scan_document("<html><body><p>plain</p></body></html>").header, None);
    }

    #[test]
    fn test_entities_in_text() {
        let info = scan_document("<html><head><title>Tom &amp; Jerry&nbsp;&#150;&#x41;</title></head></html>");
        assert_eq!(info.title.as_deref(), Some("Tom & Jerry \u{2013}A"));
    }

    #[test]
    fn test_lenient_html() {
        let info = scan_document(
            "<!DOCTYPE html><HTML lang=fr><HEAD><META charset=utf-8><TITLE>Old</TITLE>\
             <script>var x = 1;</script></HEAD>\
             <BODY><p>one<p>two<br><H1>Heading</H1></BODY></HTML>",
        );
        assert_eq!(info.language.as_deref(), Some("fr"));
        assert_eq!(info.title.as_deref(), Some("Old"));
        assert_eq!(info.header.as_deref(), Some("Heading"));
    }

    #[test]
    fn test_bare_ampersands() {
        let info = scan_document(
            "<html><head><title>Q & A</title></head>\
             <body><h1>Fish & chips &amp; peas</h1></body></html>",
        );
        assert_eq!(info.title.as_deref(), Some("Q & A"));
        assert_eq!(info.header.as_deref(), Some("Fish & chips & peas"));
    }

    #[test]
    fn test_script_before_title() {
        let info = scan_document(
            "<html><head><script>if (a < b && c) { document.write('<h1>no</h1>'); }</script>\
             <style>p > em { color: red }</style><title>After script</title></head>\
             <body><h1>a < b</h1></body></html>",
        );
        assert_eq!(info.title.as_deref(), Some("After script"));
        assert_eq!(info.header.as_deref(), Some("a < b"));
    }

    #[test]
    fn test_unquoted_attributes_with_bare_text() {
        let info = scan_document(
            "<html lang=en-GB><head><meta name=author content=Smith>\
             <title>R&D notes</title></head><body><h2 class=x>Ch. 1 & 2</h2></body></html>",
        );
        assert_eq!(info.language.as_deref(), Some("en-GB"));
        assert_eq!(info.meta_content(&["author"]), Some("Smith"));
        assert_eq!(info.title.as_deref(), Some("R&D notes"));
        assert_eq!(info.header.as_deref(), Some("Ch. 1 & 2"));
    }

    #[test]
    fn test_title_in_body_ignored() {
        let info = scan_document("<html><body><svg><title>Icon</title></svg><h1>Real</h1></body></html>");
        assert_eq!(info.title, None);
        assert_eq!(info.header.as_deref(), Some("Real"));
    }

    #[test]
    fn test_meta_tags() {
        let info = scan_document(
            r#"<html><head><meta name="Author" content="Jane Doe"/><meta name="description" content="A &quot;story&quot;"></head></html>"#,
        );
        assert_eq!(info.meta_content(&["author", "dc.creator"]), Some("Jane Doe"));
        assert_eq!(info.meta_content(&["description"]), Some("A \"story\""));
        assert_eq!(info.meta_content(&["keywords"]), None);
    }
}
