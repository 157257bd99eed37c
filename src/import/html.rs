//! Input from a tree of linked HTML files.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use super::ConvertOptions;
use super::filelist::{FileEntry, get_filelist};
use super::metadata::{HtmlMetadataReader, MetadataReader, merge_metadata, metadata_from_filename};
use super::registry::{ResourceAdder, ResourceRegistry};
use super::toc::build_toc;
use crate::book::{Book, ManifestItem};
use crate::css::replace_urls;
use crate::error::Result;
use crate::filenames::sanitize_file_name;
use crate::html::rewrite_links;
use crate::io::quote_href;
use crate::util::{HTML_MIME, is_stylesheet};

/// State of one HTML conversion.
///
/// The book and the registry of files already added to it are owned here
/// and handed to each stage in turn.
pub struct Conversion<'a> {
    options: &'a ConvertOptions,
    book: Book,
    registry: ResourceRegistry,
}

impl<'a> Conversion<'a> {
    pub fn new(options: &'a ConvertOptions) -> Self {
        Self {
            options,
            book: Book::new(),
            registry: ResourceRegistry::new(),
        }
    }

    /// Convert the HTML file at `root` and everything it links to.
    pub fn run(mut self, root: &Path) -> Result<Book> {
        info!("Collecting HTML files linked from {}", root.display());
        let files: Vec<FileEntry> = get_filelist(root, self.options)?
            .into_iter()
            .filter(|entry| !entry.is_binary)
            .collect();
        info!("Found {} HTML files", files.len());

        let html_ids = self.register_documents(&files);
        info!("Rewriting links in {} documents", html_ids.len());
        for id in &html_ids {
            self.rewrite_document(id);
        }
        self.rewrite_stylesheets();

        info!("Reading metadata");
        self.read_metadata(root)?;

        info!("Building table of contents");
        self.book.toc = build_toc(&self.book, self.options.input_encoding.as_deref());

        info!(
            "Converted {} into {} manifest items",
            root.display(),
            self.book.manifest.len()
        );
        Ok(self.book)
    }

    /// Add every document to the manifest and the spine, in list order,
    /// before any links are rewritten so that links between documents
    /// resolve to their final hrefs.
    fn register_documents(&mut self, files: &[FileEntry]) -> Vec<String> {
        let mut ids = Vec::with_capacity(files.len());
        for entry in files {
            let (Some(name), Some(dir)) = (entry.path.file_name(), entry.path.parent()) else {
                continue;
            };
            let name = name.to_string_lossy();
            let (id, href) = self.book.manifest.generate("html", &sanitize_file_name(&name));
            let container = self.registry.container(dir);
            let item = ManifestItem::lazy(id.clone(), href.clone(), HTML_MIME, container, quote_href(&name));
            if let Err(e) = self.book.manifest.add(item) {
                warn!("Could not add {}: {e}", entry.path.display());
                continue;
            }
            debug!("Added {} as {href}", entry.path.display());
            self.registry.insert(&entry.path, href);
            self.book.add_spine_item(id.clone(), true);
            ids.push(id);
        }
        ids
    }

    /// Rewrite the links of document `id`, adding what they point to.
    ///
    /// The rewritten document replaces the item's content as UTF-8.
    fn rewrite_document(&mut self, id: &str) {
        let Some(item) = self.book.manifest.get(id) else {
            return;
        };
        let Some(base) = self.registry.source_dir(&item.href).map(Path::to_path_buf) else {
            return;
        };
        let html = match item.text(self.options.input_encoding.as_deref()) {
            Ok(text) => text.into_owned(),
            Err(e) => {
                warn!("Could not read {}: {e}", item.href);
                return;
            }
        };

        let mut adder = ResourceAdder::new(&mut self.registry, &mut self.book.manifest);
        let rewritten = rewrite_links(&html, &base, &mut adder).into_owned();
        if let Some(item) = self.book.manifest.get_mut(id) {
            item.set_data(rewritten.into_bytes());
        }
    }

    /// Rewrite `url()` and `@import` references in every stylesheet,
    /// including those that are only added while doing so.
    fn rewrite_stylesheets(&mut self) {
        let mut done = 0;
        loop {
            let pending: Vec<String> = self
                .book
                .manifest
                .iter()
                .skip(done)
                .filter(|item| is_stylesheet(&item.media_type))
                .map(|item| item.id.clone())
                .collect();
            if pending.is_empty() {
                break;
            }
            done = self.book.manifest.len();
            for id in pending {
                self.rewrite_stylesheet(&id);
            }
        }
    }

    fn rewrite_stylesheet(&mut self, id: &str) {
        let Some(item) = self.book.manifest.get(id) else {
            return;
        };
        let Some(base) = self.registry.source_dir(&item.href).map(Path::to_path_buf) else {
            return;
        };
        let css = match item.text(self.options.input_encoding.as_deref()) {
            Ok(text) => text.into_owned(),
            Err(e) => {
                warn!("Could not read stylesheet {}: {e}", item.href);
                return;
            }
        };

        let mut adder = ResourceAdder::new(&mut self.registry, &mut self.book.manifest);
        if let Cow::Owned(rewritten) = replace_urls(&css, &base, &mut adder)
            && let Some(item) = self.book.manifest.get_mut(id)
        {
            item.set_data(rewritten.into_bytes());
        }
    }

    fn read_metadata(&mut self, root: &Path) -> Result<()> {
        let data = fs::read(root)?;
        let extracted = HtmlMetadataReader.read_metadata(&data, self.options.input_encoding.as_deref());
        let (metadata, uid) = merge_metadata(metadata_from_filename(root), extracted, self.options);
        self.book.metadata = metadata;
        self.book.uid = Some(uid);
        Ok(())
    }
}
