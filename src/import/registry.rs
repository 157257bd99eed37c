//! Bookkeeping of local files that have been added to the manifest.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, warn};

use crate::book::{Manifest, ManifestItem};
use crate::css::CssImportFetcher;
use crate::filenames::sanitize_file_name;
use crate::io::{Container, DirContainer, quote_href};
use crate::links::{FileKey, LinkHandler, Resolution, link_to_local_path};
use crate::util::{BINARY_MIME, guess_media_type, is_stylesheet, sniff_image};

/// Bytes read when sniffing the type of a file without a known extension.
const SNIFF_LEN: u64 = 32;

/// Outcome of offering a link to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The link names a file in the manifest; this is its href, followed by
    /// the link's fragment if it had one.
    Registered(String),
    /// The reference should be left as it is.
    Unchanged,
}

/// Maps local files to the hrefs of the manifest items created for them.
///
/// Each file is added at most once: registering it again, under any path
/// that names the same file, returns the href it got the first time.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    hrefs: HashMap<FileKey, String>,
    sources: HashMap<String, PathBuf>,
    containers: HashMap<PathBuf, Rc<dyn Container>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` is stored in the manifest under `href`.
    pub fn insert(&mut self, path: &Path, href: impl Into<String>) {
        let href = href.into();
        self.sources.insert(href.clone(), path.to_path_buf());
        self.hrefs.insert(FileKey::of(path), href);
    }

    /// Href registered for `path`.
    pub fn href(&self, path: &Path) -> Option<&str> {
        self.hrefs.get(&FileKey::of(path)).map(String::as_str)
    }

    /// Registered href for `path` with `#fragment` appended if given.
    pub fn resolve_with_fragment(&self, path: &Path, fragment: Option<&str>) -> Option<String> {
        let href = self.href(path)?;
        Some(match fragment {
            Some(fragment) => format!("{href}#{fragment}"),
            None => href.to_string(),
        })
    }

    /// Directory of the file that `href` was created from.
    pub fn source_dir(&self, href: &str) -> Option<&Path> {
        self.sources.get(href).and_then(|path| path.parent())
    }

    pub fn len(&self) -> usize {
        self.hrefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hrefs.is_empty()
    }

    /// Container for reading files from `dir`, shared between the items in it.
    pub fn container(&mut self, dir: &Path) -> Rc<dyn Container> {
        self.containers
            .entry(dir.to_path_buf())
            .or_insert_with(|| Rc::new(DirContainer::new(dir)))
            .clone()
    }

    /// Resolve `raw_link` against `base` and make sure the file it names is
    /// in `manifest`.
    ///
    /// Failures of any kind leave the reference unchanged: external links,
    /// undecodable links, missing or unreadable files, directories and plain
    /// text files.
    pub fn register(&mut self, manifest: &mut Manifest, raw_link: &str, base: &Path) -> Registration {
        let (path, fragment) = match link_to_local_path(raw_link, base) {
            Resolution::Resolved { path, fragment } => (path, fragment),
            Resolution::NotLocal => return Registration::Unchanged,
            Resolution::Error(reason) => {
                warn!("{reason}");
                return Registration::Unchanged;
            }
        };

        if let Some(href) = self.resolve_with_fragment(&path, fragment.as_deref()) {
            return Registration::Registered(href);
        }

        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {
                warn!("{raw_link} is a link to a directory. Ignoring.");
                return Registration::Unchanged;
            }
            Ok(_) => {
                if let Err(e) = File::open(&path) {
                    debug!("Not adding unreadable {}: {e}", path.display());
                    return Registration::Unchanged;
                }
            }
            Err(e) => {
                debug!("Not adding {}: {e}", path.display());
                return Registration::Unchanged;
            }
        }
        let Some(file_name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
            return Registration::Unchanged;
        };
        let Some(dir) = path.parent() else {
            return Registration::Unchanged;
        };

        let (id, href) = manifest.generate("added", &sanitize_file_name(&file_name));
        let media_type = match guess_media_type(&file_name) {
            Some(media_type) => media_type,
            None => sniff_file(&path).unwrap_or(BINARY_MIME),
        };
        if media_type == "text/plain" {
            warn!("Ignoring link to text file {raw_link:?}");
            return Registration::Unchanged;
        }

        debug!("Added {} as {href} ({media_type})", path.display());
        let container = self.container(dir);
        let mut item = ManifestItem::lazy(id, href.clone(), media_type, container, quote_href(&file_name));
        if is_stylesheet(media_type) {
            item = item.with_css_fetcher(CssImportFetcher::new(dir));
        }
        if let Err(e) = manifest.add(item) {
            warn!("Could not add {}: {e}", path.display());
            return Registration::Unchanged;
        }
        self.insert(&path, href.clone());

        Registration::Registered(match fragment {
            Some(fragment) => format!("{href}#{fragment}"),
            None => href,
        })
    }
}

/// Guess the media type of `path` from its leading bytes.
fn sniff_file(path: &Path) -> Option<&'static str> {
    let mut head = Vec::new();
    File::open(path).ok()?.take(SNIFF_LEN).read_to_end(&mut head).ok()?;
    sniff_image(&head).map(|format| format.mime_type())
}

/// The link handler used while rewriting documents: every local reference
/// is added to the manifest and replaced by its href.
pub struct ResourceAdder<'a> {
    registry: &'a mut ResourceRegistry,
    manifest: &'a mut Manifest,
}

impl<'a> ResourceAdder<'a> {
    pub fn new(registry: &'a mut ResourceRegistry, manifest: &'a mut Manifest) -> Self {
        Self { registry, manifest }
    }
}

impl LinkHandler for ResourceAdder<'_> {
    fn resolve(&mut self, raw_link: &str, base: &Path) -> Option<String> {
        match self.registry.register(self.manifest, raw_link, base) {
            Registration::Registered(href) => Some(href),
            Registration::Unchanged => None,
        }
    }
}
