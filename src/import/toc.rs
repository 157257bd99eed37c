//! Table of contents synthesis for books built from loose HTML.

use std::collections::HashSet;

use log::warn;

use crate::book::{Book, TocEntry};
use crate::html::{DocumentInfo, scan_document};
use crate::util::is_html;

/// Label used for documents with neither a title nor a heading.
pub const UNLABELED: &str = "(unlabeled)";

/// One entry per linear (X)HTML spine item, in reading order.
///
/// Each entry is labelled with the document's `<title>`, or its first
/// heading when it has none. If any two documents share a title, titles are
/// not distinctive and every entry is labelled with its heading instead.
pub fn build_toc(book: &Book, encoding: Option<&str>) -> Vec<TocEntry> {
    let mut labels = Vec::new();
    let documents = book
        .spine_items()
        .filter(|(entry, item)| entry.linear && is_html(&item.media_type));
    for (_, item) in documents {
        let info = match item.text(encoding) {
            Ok(text) => scan_document(&text),
            Err(e) => {
                warn!("Could not read {} for the table of contents: {e}", item.href);
                DocumentInfo::default()
            }
        };
        let header = info.header.unwrap_or_else(|| UNLABELED.to_string());
        labels.push((info.title, header, item.href.clone()));
    }

    let mut seen = HashSet::new();
    let titles_unique = labels
        .iter()
        .filter_map(|(title, _, _)| title.as_deref())
        .all(|title| seen.insert(title));

    labels
        .into_iter()
        .map(|(title, header, href)| {
            let label = match title {
                Some(title) if titles_unique => title,
                _ => header,
            };
            TocEntry::new(label, href)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::ManifestItem;

    fn book(docs: &[(&str, bool)]) -> Book {
        let mut book = Book::new();
        for (i, (html, linear)) in docs.iter().enumerate() {
            let (id, href) = book.manifest.generate("html", &format!("doc{i}.html"));
            book.manifest
                .add(ManifestItem::with_data(id.clone(), href, "text/html", html.as_bytes().to_vec()))
                .unwrap();
            book.add_spine_item(id, *linear);
        }
        book
    }

    fn doc(title: Option<&str>, h1: Option<&str>) -> String {
        let title = title.map(|t| format!("<title>{t}</title>")).unwrap_or_default();
        let h1 = h1.map(|h| format!("<h1>{h}</h1>")).unwrap_or_default();
        format!("<html><head>{title}</head><body>{h1}<p>text</p></body></html>")
    }

    fn titles(toc: &[TocEntry]) -> Vec<&str> {
        toc.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn test_titles_with_header_fallback() {
        let a = doc(Some("Intro"), Some("One"));
        let b = doc(None, Some("Two"));
        let c = doc(None, None);
        let toc = build_toc(&book(&[(a.as_str(), true), (b.as_str(), true), (c.as_str(), true)]), None);
        assert_eq!(titles(&toc), ["Intro", "Two", UNLABELED]);
        assert_eq!(toc[1].href, "doc1.html");
    }

    #[test]
    fn test_duplicate_titles_use_headers_everywhere() {
        let a = doc(Some("Chapter"), Some("The Beginning"));
        let b = doc(Some("Chapter"), Some("The End"));
        let c = doc(Some("Appendix"), None);
        let toc = build_toc(&book(&[(a.as_str(), true), (b.as_str(), true), (c.as_str(), true)]), None);
        assert_eq!(titles(&toc), ["The Beginning", "The End", UNLABELED]);
    }

    #[test]
    fn test_non_linear_items_skipped() {
        let a = doc(Some("Main"), None);
        let b = doc(Some("Main"), Some("Notes"));
        let toc = build_toc(&book(&[(a.as_str(), true), (b.as_str(), false)]), None);
        assert_eq!(titles(&toc), ["Main"]);
    }
}
