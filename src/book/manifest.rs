use std::borrow::Cow;
use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::rc::Rc;

use crate::css::{CssImportFetcher, Stylesheet};
use crate::error::{Error, Result};
use crate::io::{Container, quote_href};
use crate::util::{decode_document, is_stylesheet};

/// Where an item's bytes come from until they are first read.
struct Source {
    container: Rc<dyn Container>,
    name: String,
}

/// A content item: a document, stylesheet, image or other resource.
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    source: Option<Source>,
    data: OnceCell<Vec<u8>>,
    css_fetcher: Option<CssImportFetcher>,
}

impl fmt::Debug for ManifestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestItem")
            .field("id", &self.id)
            .field("href", &self.href)
            .field("media_type", &self.media_type)
            .field("loaded", &self.data.get().is_some())
            .finish()
    }
}

impl ManifestItem {
    /// An item whose content is read from `name` in `container` on first use.
    pub fn lazy(
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
        container: Rc<dyn Container>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            source: Some(Source {
                container,
                name: name.into(),
            }),
            data: OnceCell::new(),
            css_fetcher: None,
        }
    }

    /// An item with in-memory content.
    pub fn with_data(
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            source: None,
            data: OnceCell::from(data),
            css_fetcher: None,
        }
    }

    /// Attach the fetcher used for this stylesheet's `@import` rules.
    pub fn with_css_fetcher(mut self, fetcher: CssImportFetcher) -> Self {
        self.css_fetcher = Some(fetcher);
        self
    }

    pub fn css_fetcher(&self) -> Option<&CssImportFetcher> {
        self.css_fetcher.as_ref()
    }

    /// Raw content, read from the container the first time it is asked for.
    pub fn data(&self) -> io::Result<&[u8]> {
        if let Some(data) = self.data.get() {
            return Ok(data);
        }
        let bytes = match &self.source {
            Some(source) => source.container.read(&source.name)?,
            None => Vec::new(),
        };
        Ok(self.data.get_or_init(|| bytes))
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = OnceCell::from(data);
    }

    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }

    /// Content decoded to text. `encoding` overrides any declared charset.
    pub fn text(&self, encoding: Option<&str>) -> io::Result<Cow<'_, str>> {
        Ok(decode_document(self.data()?, encoding))
    }

    /// Parse a stylesheet item and fetch its `@import` rules.
    ///
    /// Returns `None` for items that are not stylesheets.
    pub fn stylesheet(&self) -> io::Result<Option<Stylesheet>> {
        if !is_stylesheet(&self.media_type) {
            return Ok(None);
        }
        let mut sheet = Stylesheet::parse(&self.text(None)?);
        if let Some(fetcher) = &self.css_fetcher {
            sheet.resolve_imports(&mut fetcher.clone());
        }
        Ok(Some(sheet))
    }
}

/// The set of content items of a book, in insertion order.
///
/// Ids and hrefs are unique; hrefs are additionally unique when compared
/// case-insensitively, so the book can be unpacked on case-insensitive
/// filesystems.
#[derive(Debug, Default)]
pub struct Manifest {
    items: Vec<ManifestItem>,
    by_id: HashMap<String, usize>,
    by_href: HashMap<String, usize>,
    hrefs_lower: HashSet<String>,
    /// Next numeric suffix to try for each id prefix.
    id_counters: HashMap<String, usize>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce an id and href that are not used by any item yet.
    ///
    /// Ids are `prefix`, `prefix1`, `prefix2`, ...; a colliding href
    /// `name.ext` becomes `name1.ext`, `name2.ext`, .... The href is
    /// percent-encoded before it is compared.
    ///
    /// ```
    /// use folio::book::{Manifest, ManifestItem};
    ///
    /// let mut manifest = Manifest::new();
    /// let (id, href) = manifest.generate("added", "a b.png");
    /// assert_eq!((id.as_str(), href.as_str()), ("added", "a%20b.png"));
    /// manifest.add(ManifestItem::with_data(id, href, "image/png", Vec::new())).unwrap();
    ///
    /// let (id, href) = manifest.generate("added", "A B.png");
    /// assert_eq!((id.as_str(), href.as_str()), ("added1", "A%20B1.png"));
    /// ```
    pub fn generate(&mut self, id_prefix: &str, href: &str) -> (String, String) {
        let counter = self.id_counters.entry(id_prefix.to_string()).or_insert(0);
        let mut id = if *counter == 0 {
            id_prefix.to_string()
        } else {
            format!("{id_prefix}{counter}")
        };
        while self.by_id.contains_key(&id) {
            *counter += 1;
            id = format!("{id_prefix}{counter}");
        }
        *counter += 1;

        let href = quote_href(href);
        let (stem, ext) = split_extension(&href);
        let mut candidate = href.clone();
        let mut index = 1;
        while self.hrefs_lower.contains(&candidate.to_lowercase()) {
            candidate = format!("{stem}{index}{ext}");
            index += 1;
        }
        (id, candidate)
    }

    /// Add an item. Fails if its id or href is already taken.
    pub fn add(&mut self, item: ManifestItem) -> Result<&mut ManifestItem> {
        if self.by_id.contains_key(&item.id) {
            return Err(Error::DuplicateItem(format!("id {}", item.id)));
        }
        if self.hrefs_lower.contains(&item.href.to_lowercase()) {
            return Err(Error::DuplicateItem(format!("href {}", item.href)));
        }
        let index = self.items.len();
        self.by_id.insert(item.id.clone(), index);
        self.by_href.insert(item.href.clone(), index);
        self.hrefs_lower.insert(item.href.to_lowercase());
        self.items.push(item);
        Ok(&mut self.items[index])
    }

    pub fn get(&self, id: &str) -> Option<&ManifestItem> {
        self.by_id.get(id).map(|&i| &self.items[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ManifestItem> {
        self.by_id.get(id).map(|&i| &mut self.items[i])
    }

    pub fn by_href(&self, href: &str) -> Option<&ManifestItem> {
        self.by_href.get(href).map(|&i| &self.items[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter()
    }

    /// Ids of all items, in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse the stylesheet item `id`, resolving its imports.
    pub fn stylesheet(&self, id: &str) -> io::Result<Option<Stylesheet>> {
        match self.get(id) {
            Some(item) => item.stylesheet(),
            None => Ok(None),
        }
    }
}

/// Split `href` into stem and extension (with its dot) the way file names
/// are usually split: a leading dot does not start an extension.
fn split_extension(href: &str) -> (&str, &str) {
    let name_start = href.rfind('/').map_or(0, |i| i + 1);
    let name = &href[name_start..];
    match name.rfind('.') {
        Some(dot) if name[..dot].chars().any(|c| c != '.') => href.split_at(name_start + dot),
        _ => (href, ""),
    }
}
