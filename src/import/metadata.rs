//! Book metadata for HTML input.

use std::path::Path;

use log::warn;

use super::ConvertOptions;
use crate::book::{Identifier, Metadata};
use crate::html::scan_document;
use crate::util::{decode_document, uuid_v4};

/// Placeholder for a missing title or author.
pub const UNKNOWN: &str = "Unknown";

/// Id of the identifier generated for every converted book.
pub const UUID_ID: &str = "uuid_id";

/// Extracts metadata from the bytes of a document.
pub trait MetadataReader {
    fn read_metadata(&self, data: &[u8], encoding: Option<&str>) -> Metadata;
}

/// Reads `<title>`, `<html lang>` and the usual `<meta>` tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlMetadataReader;

impl MetadataReader for HtmlMetadataReader {
    fn read_metadata(&self, data: &[u8], encoding: Option<&str>) -> Metadata {
        let info = scan_document(&decode_document(data, encoding));
        let meta = |names: &[&str]| info.meta_content(names).map(|s| s.trim().to_string());

        Metadata {
            title: info.title.clone().unwrap_or_default(),
            authors: meta(&["author", "dc.creator", "dc.author"])
                .map(|authors| split_authors(&authors))
                .unwrap_or_default(),
            language: meta(&["dc.language", "language"])
                .or_else(|| info.language.clone())
                .unwrap_or_default(),
            publisher: meta(&["publisher", "dc.publisher"]),
            description: meta(&["description", "dc.description"]),
            subjects: meta(&["keywords", "dc.subject"])
                .map(|k| {
                    k.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            date: meta(&["date", "dc.date"]),
            rights: meta(&["copyright", "dc.rights"]),
            ..Default::default()
        }
    }
}

/// Split an author string on `&`, dropping empty names.
pub fn split_authors(raw: &str) -> Vec<String> {
    raw.split('&')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect()
}

/// Metadata implied by a file name: the stem, with underscores as spaces.
pub fn metadata_from_filename(path: &Path) -> Metadata {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    Metadata::new(stem.trim())
}

/// Combine filename and extracted metadata and fill the gaps.
///
/// Extracted fields win over filename ones. Gaps are filled by
/// [`apply_defaults`] and a fresh UUID identifier is always added; its id is
/// returned as the book's unique identifier.
pub fn merge_metadata(from_filename: Metadata, extracted: Metadata, options: &ConvertOptions) -> (Metadata, String) {
    let mut metadata = from_filename;
    metadata.update(extracted);
    apply_defaults(&mut metadata, options);
    let uid = add_uuid(&mut metadata);
    (metadata, uid)
}

/// Take a missing language or author from `options`, falling back to `en`
/// and a placeholder; a missing title also becomes the placeholder. Each
/// fallback is logged as a warning.
pub fn apply_defaults(metadata: &mut Metadata, options: &ConvertOptions) {
    if metadata.language.trim().is_empty() {
        metadata.language = match options.language.as_deref().map(str::trim) {
            Some(language) if !language.is_empty() => language.to_string(),
            _ => {
                warn!("Language not specified");
                "en".to_string()
            }
        };
    }
    if metadata.authors.is_empty() {
        let authors = options.authors.as_deref().map(split_authors).unwrap_or_default();
        metadata.authors = if authors.is_empty() {
            warn!("Creator not specified");
            vec![UNKNOWN.to_string()]
        } else {
            authors
        };
    }
    if metadata.title.trim().is_empty() {
        warn!("Title not specified");
        metadata.title = UNKNOWN.to_string();
    }
}

/// Add a random UUID identifier and return its id.
pub fn add_uuid(metadata: &mut Metadata) -> String {
    metadata.identifiers.push(Identifier {
        id: Some(UUID_ID.to_string()),
        scheme: Some("uuid".to_string()),
        value: uuid_v4(),
    });
    UUID_ID.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_metadata_reader() {
        let html = br#"<html lang="fr"><head><title>Le Livre</title>
            <meta name="author" content="A. Un &amp; B. Deux">
            <meta name="keywords" content="one, two,,">
            <meta name="description" content="Short"></head><body></body></html>"#;
        let metadata = HtmlMetadataReader.read_metadata(html, None);
        assert_eq!(metadata.title, "Le Livre");
        assert_eq!(metadata.authors, ["A. Un", "B. Deux"]);
        assert_eq!(metadata.language, "fr");
        assert_eq!(metadata.subjects, ["one", "two"]);
        assert_eq!(metadata.description.as_deref(), Some("Short"));
        assert_eq!(metadata.publisher, None);
    }

    #[test]
    fn test_metadata_from_filename() {
        assert_eq!(metadata_from_filename(Path::new("/x/my_great_book.html")).title, "my great book");
        assert_eq!(metadata_from_filename(Path::new("_index_.htm")).title, "index");
    }

    #[test]
    fn test_merge_fills_defaults() {
        let (metadata, uid) = merge_metadata(Metadata::default(), Metadata::default(), &ConvertOptions::default());
        assert_eq!(metadata.title, UNKNOWN);
        assert_eq!(metadata.authors, [UNKNOWN]);
        assert_eq!(metadata.language, "en");
        assert_eq!(uid, UUID_ID);
        let ident = &metadata.identifiers[0];
        assert_eq!(ident.id.as_deref(), Some(UUID_ID));
        assert_eq!(ident.scheme.as_deref(), Some("uuid"));
        assert_eq!(ident.value.len(), 36);
    }

    #[test]
    fn test_merge_prefers_extracted_then_options() {
        let options = ConvertOptions {
            language: Some("de".into()),
            authors: Some("X & Y".into()),
            ..Default::default()
        };
        let (metadata, _) = merge_metadata(Metadata::new("file name"), Metadata::new("Real"), &options);
        assert_eq!(metadata.title, "Real");
        assert_eq!(metadata.language, "de");
        assert_eq!(metadata.authors, ["X", "Y"]);

        let (metadata, _) = merge_metadata(Metadata::new("file name"), Metadata::default(), &options);
        assert_eq!(metadata.title, "file name");
    }
}
