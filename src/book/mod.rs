//! The in-memory e-book model: manifest, spine, table of contents and
//! metadata.

mod manifest;

pub use manifest::{Manifest, ManifestItem};

/// A converted book, ready for serialization by an output format.
#[derive(Debug, Default)]
pub struct Book {
    pub metadata: Metadata,
    pub manifest: Manifest,
    pub spine: Vec<SpineItem>,
    pub toc: Vec<TocEntry>,
    /// Id of the identifier in `metadata.identifiers` that names this book.
    pub uid: Option<String>,
}

/// Book metadata (Dublin Core subset).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
    pub identifiers: Vec<Identifier>,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
    pub publisher: Option<String>,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
    pub description: Option<String>,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Vec::is_empty"))]
    pub subjects: Vec<String>,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
    pub date: Option<String>,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
    pub rights: Option<String>,
    /// Manifest id of the cover image.
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
    pub cover: Option<String>,
}

/// A `dc:identifier`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Identifier {
    /// XML id, referenced by the package's `unique-identifier`.
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
    pub id: Option<String>,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
    pub scheme: Option<String>,
    pub value: String,
}

/// An entry of the reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct SpineItem {
    /// Manifest id of the document.
    pub idref: String,
    pub linear: bool,
}

/// A table of contents entry (hierarchical)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct TocEntry {
    pub title: String,
    pub href: String,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Vec::is_empty"))]
    pub children: Vec<TocEntry>,
    /// Play order for sorting (from NCX playOrder attribute)
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Option::is_none"))]
    pub play_order: Option<usize>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a manifest item to the reading order.
    pub fn add_spine_item(&mut self, idref: impl Into<String>, linear: bool) {
        self.spine.push(SpineItem {
            idref: idref.into(),
            linear,
        });
    }

    /// Spine entries paired with their manifest items, in reading order.
    ///
    /// Entries whose idref is not in the manifest are skipped.
    pub fn spine_items(&self) -> impl Iterator<Item = (&SpineItem, &ManifestItem)> {
        self.spine
            .iter()
            .filter_map(|entry| self.manifest.get(&entry.idref).map(|item| (entry, item)))
    }

    /// The identifier named by [`Book::uid`].
    pub fn unique_identifier(&self) -> Option<&Identifier> {
        let uid = self.uid.as_deref()?;
        self.metadata
            .identifiers
            .iter()
            .find(|ident| ident.id.as_deref() == Some(uid))
    }
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifiers.push(identifier);
        self
    }

    /// Overwrite fields with the non-empty fields of `other`.
    pub fn update(&mut self, other: Metadata) {
        if !other.title.trim().is_empty() {
            self.title = other.title;
        }
        if !other.authors.is_empty() {
            self.authors = other.authors;
        }
        if !other.language.trim().is_empty() {
            self.language = other.language;
        }
        if !other.identifiers.is_empty() {
            self.identifiers = other.identifiers;
        }
        if !other.subjects.is_empty() {
            self.subjects = other.subjects;
        }
        self.publisher = other.publisher.or(self.publisher.take());
        self.description = other.description.or(self.description.take());
        self.date = other.date.or(self.date.take());
        self.rights = other.rights.or(self.rights.take());
        self.cover = other.cover.or(self.cover.take());
    }
}

impl TocEntry {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            children: Vec::new(),
            play_order: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_update_prefers_non_empty() {
        let mut base = Metadata::new("from_filename").with_language("de");
        base.publisher = Some("Old".into());
        let extracted = Metadata {
            title: "Real Title".into(),
            authors: vec!["A. Writer".into()],
            description: Some("About".into()),
            ..Default::default()
        };
        base.update(extracted);

        assert_eq!(base.title, "Real Title");
        assert_eq!(base.authors, ["A. Writer"]);
        assert_eq!(base.language, "de");
        assert_eq!(base.publisher.as_deref(), Some("Old"));
        assert_eq!(base.description.as_deref(), Some("About"));
    }

    #[test]
    fn test_unique_identifier() {
        let mut book = Book::new();
        book.metadata = Metadata::new("T").with_identifier(Identifier {
            id: Some("uuid_id".into()),
            scheme: Some("uuid".into()),
            value: "1234".into(),
        });
        assert!(book.unique_identifier().is_none());
        book.uid = Some("uuid_id".into());
        assert_eq!(book.unique_identifier().map(|i| i.value.as_str()), Some("1234"));
    }
}
