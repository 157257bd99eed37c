//! Input from an OPF package document and the files it lists.

use std::fs;
use std::path::Path;

use log::{info, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::ConvertOptions;
use super::metadata::{add_uuid, apply_defaults};
use super::toc::build_toc;
use crate::book::{Book, Identifier, ManifestItem, Metadata, SpineItem, TocEntry};
use crate::css::CssImportFetcher;
use crate::entities::{EntityDecoder, replace_entities};
use crate::error::{Error, Result};
use crate::io::{DirContainer, unquote_href};
use crate::util::{decode_document, is_stylesheet};

/// Contents of an OPF package document.
#[derive(Debug, Default)]
pub struct OpfPackage {
    pub metadata: Metadata,
    /// `unique-identifier` of the `<package>` element.
    pub unique_identifier: Option<String>,
    pub items: Vec<OpfItem>,
    pub spine: Vec<SpineItem>,
    /// Manifest id of the NCX table of contents.
    pub toc_id: Option<String>,
}

/// A `<manifest><item>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpfItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Attribute value by local name, with entities decoded.
fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == name)
        .map(|a| replace_entities(&String::from_utf8_lossy(&a.value), None))
}

/// Parse an OPF package document.
pub fn parse_opf(content: &str) -> Result<OpfPackage> {
    let mut reader = Reader::from_str(content);

    let decoder = EntityDecoder::default();
    let mut package = OpfPackage::default();
    let mut seen_package = false;
    let mut in_metadata = false;
    let mut cover_id = None;
    // (element local name, id, scheme) of the Dublin Core element being read
    let mut current: Option<(String, Option<String>, Option<String>)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"package" => {
                        seen_package = true;
                        package.unique_identifier = attr(&e, b"unique-identifier");
                    }
                    b"metadata" => in_metadata = true,
                    local @ (b"title" | b"creator" | b"language" | b"identifier" | b"publisher"
                    | b"description" | b"subject" | b"date" | b"rights")
                        if in_metadata =>
                    {
                        current = Some((
                            String::from_utf8_lossy(local).into_owned(),
                            attr(&e, b"id"),
                            attr(&e, b"scheme"),
                        ));
                        text.clear();
                    }
                    _ => handle_empty(&e, &mut package, &mut cover_id),
                }
            }
            Event::Empty(e) => handle_empty(&e, &mut package, &mut cover_id),
            Event::Text(e) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current.is_some() {
                    text.push_str(&decoder.decode(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::End(e) => {
                let name = e.name();
                if local_name(name.as_ref()) == b"metadata" {
                    in_metadata = false;
                }
                if let Some((element, id, scheme)) = current.take() {
                    let value = text.trim().to_string();
                    let metadata = &mut package.metadata;
                    match element.as_str() {
                        "title" if metadata.title.is_empty() => metadata.title = value,
                        "creator" => metadata.authors.push(value),
                        "language" if metadata.language.is_empty() => metadata.language = value,
                        "identifier" => metadata.identifiers.push(Identifier { id, scheme, value }),
                        "publisher" => metadata.publisher = Some(value),
                        "description" => metadata.description = Some(value),
                        "subject" => metadata.subjects.push(value),
                        "date" => metadata.date = Some(value),
                        "rights" => metadata.rights = Some(value),
                        _ => {}
                    }
                    text.clear();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_package {
        return Err(Error::MissingElement("package".into()));
    }

    // EPUB 3 cover-image property wins over the EPUB 2 meta
    let cover = package
        .items
        .iter()
        .find(|item| {
            item.properties
                .as_deref()
                .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == "cover-image"))
        })
        .map(|item| item.id.clone())
        .or_else(|| cover_id.filter(|id| package.items.iter().any(|item| &item.id == id)));
    package.metadata.cover = cover;

    Ok(package)
}

/// `item`, `itemref`, `spine` and `meta` carry everything in attributes and
/// may be written with or without an end tag.
fn handle_empty(e: &BytesStart, package: &mut OpfPackage, cover_id: &mut Option<String>) {
    let name = e.name();
    match local_name(name.as_ref()) {
        b"item" => {
            let (Some(id), Some(href)) = (attr(e, b"id"), attr(e, b"href")) else {
                return;
            };
            package.items.push(OpfItem {
                id,
                href,
                media_type: attr(e, b"media-type").unwrap_or_default(),
                properties: attr(e, b"properties"),
            });
        }
        b"itemref" => {
            if let Some(idref) = attr(e, b"idref") {
                let linear = attr(e, b"linear").is_none_or(|l| !l.trim().eq_ignore_ascii_case("no"));
                package.spine.push(SpineItem { idref, linear });
            }
        }
        b"spine" => package.toc_id = attr(e, b"toc"),
        b"meta" => {
            if attr(e, b"name").as_deref() == Some("cover")
                && let Some(content) = attr(e, b"content")
            {
                *cover_id = Some(content);
            }
        }
        _ => {}
    }
}

#[derive(Default)]
struct NavPointState {
    children: Vec<TocEntry>,
    text: Option<String>,
    src: Option<String>,
    play_order: Option<usize>,
}

/// Parse an NCX table of contents. Entries without a label or target are
/// dropped; their children move up to the parent.
pub fn parse_ncx(content: &str) -> Result<Vec<TocEntry>> {
    let mut reader = Reader::from_str(content);

    let decoder = EntityDecoder::default();
    let mut stack = vec![NavPointState::default()];
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"navPoint" => stack.push(NavPointState {
                    play_order: attr(&e, b"playOrder").and_then(|o| o.trim().parse().ok()),
                    ..Default::default()
                }),
                b"text" => in_text = true,
                b"content" => set_src(&e, &mut stack),
                _ => {}
            },
            Event::Empty(e) => {
                if local_name(e.name().as_ref()) == b"content" {
                    set_src(&e, &mut stack);
                }
            }
            Event::Text(e) => {
                if in_text && let Some(state) = stack.last_mut() {
                    state
                        .text
                        .get_or_insert_with(String::new)
                        .push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if in_text && let Some(state) = stack.last_mut() {
                    let resolved = decoder.decode(&String::from_utf8_lossy(e.as_ref()));
                    state.text.get_or_insert_with(String::new).push_str(&resolved);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navPoint" if stack.len() > 1 => {
                    if let Some(state) = stack.pop()
                        && let Some(parent) = stack.last_mut()
                    {
                        match (state.text, state.src) {
                            (Some(text), Some(src)) => {
                                let mut entry = TocEntry::new(text.trim(), src);
                                entry.children = state.children;
                                entry.play_order = state.play_order;
                                parent.children.push(entry);
                            }
                            _ => parent.children.extend(state.children),
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(stack.pop().map(|s| s.children).unwrap_or_default())
}

fn set_src(e: &BytesStart, stack: &mut [NavPointState]) {
    if let Some(state) = stack.last_mut()
        && let Some(src) = attr(e, b"src")
    {
        state.src = Some(src);
    }
}

/// Resolve `relative` against the directory of `base`, both hrefs relative
/// to the package root.
fn resolve_href(base: &str, relative: &str) -> String {
    if relative.starts_with('#') || relative.contains("://") {
        return relative.to_string();
    }
    let mut parts: Vec<&str> = match base.rfind('/') {
        Some(slash) => base[..slash].split('/').collect(),
        None => Vec::new(),
    };
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

fn rebase_toc(entries: &mut [TocEntry], ncx_href: &str) {
    for entry in entries {
        entry.href = resolve_href(ncx_href, &entry.href);
        rebase_toc(&mut entry.children, ncx_href);
    }
}

/// Build a book from the OPF package at `path`.
///
/// Items are loaded lazily from the package directory. The table of
/// contents comes from the NCX named by the spine, or is synthesized from
/// the documents when there is none.
pub fn read_opf(path: &Path, options: &ConvertOptions) -> Result<Book> {
    let data = fs::read(path)?;
    let package = parse_opf(&decode_document(&data, None))?;
    if package.items.is_empty() {
        return Err(Error::InvalidOpf(format!("{} has an empty manifest", path.display())));
    }
    info!("Reading OPF package {}", path.display());

    let root = path.parent().unwrap_or(Path::new(""));
    let container = std::rc::Rc::new(DirContainer::new(root));
    let mut book = Book::new();

    for item in &package.items {
        let mut manifest_item = ManifestItem::lazy(
            item.id.clone(),
            item.href.clone(),
            item.media_type.clone(),
            container.clone(),
            item.href.clone(),
        );
        if is_stylesheet(&item.media_type) {
            let dir = root.join(resolve_href(&unquote_href(&item.href), "."));
            manifest_item = manifest_item.with_css_fetcher(CssImportFetcher::new(dir));
        }
        if let Err(e) = book.manifest.add(manifest_item) {
            warn!("Skipping manifest item {}: {e}", item.id);
        }
    }

    for entry in package.spine {
        if book.manifest.get(&entry.idref).is_some() {
            book.spine.push(entry);
        } else {
            warn!("Spine item {} is not in the manifest", entry.idref);
        }
    }

    let ncx = package
        .toc_id
        .as_deref()
        .and_then(|id| book.manifest.get(id))
        .map(|item| (item.href.clone(), item.text(None).map(|t| parse_ncx(&t))));
    book.toc = match ncx {
        Some((href, Ok(Ok(mut toc)))) if !toc.is_empty() => {
            rebase_toc(&mut toc, &href);
            toc
        }
        Some((href, Ok(Err(e)))) => {
            warn!("Could not parse the table of contents {href}: {e}");
            Vec::new()
        }
        Some((href, Err(e))) => {
            warn!("Could not read the table of contents {href}: {e}");
            Vec::new()
        }
        _ => Vec::new(),
    };
    if book.toc.is_empty() {
        book.toc = build_toc(&book, options.input_encoding.as_deref());
    }

    let mut metadata = package.metadata;
    apply_defaults(&mut metadata, options);
    let uid = match package.unique_identifier {
        Some(uid) if metadata.identifiers.iter().any(|i| i.id.as_deref() == Some(uid.as_str())) => uid,
        _ => add_uuid(&mut metadata),
    };
    book.metadata = metadata;
    book.uid = Some(uid);

    Ok(book)
}
