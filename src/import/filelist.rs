//! Discovery of the HTML documents reachable from the input file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use super::ConvertOptions;
use crate::html::anchor_hrefs;
use crate::links::{FileKey, Resolution, link_to_local_path, normalize_path};
use crate::util::decode_document;

/// Only this much of a linked file is examined to decide whether it is HTML.
const SNIFF_LEN: usize = 4096;

/// A file found while following links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute, normalized path.
    pub path: PathBuf,
    /// The file is not HTML; it is recorded but its links are not followed.
    pub is_binary: bool,
    /// Number of links between the root document and this file.
    pub level: usize,
}

#[derive(Debug)]
struct Node {
    entry: FileEntry,
    /// Distinct local link targets, in document order.
    links: Vec<(FileKey, PathBuf)>,
}

/// Returns true if `data` contains `<html` (case-insensitive, whitespace
/// allowed after the `<`).
fn looks_like_html(data: &[u8]) -> bool {
    memchr::memchr_iter(b'<', data).any(|pos| {
        let rest = &data[pos + 1..];
        let start = rest.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(rest.len());
        rest[start..]
            .get(..4)
            .is_some_and(|tag| tag.eq_ignore_ascii_case(b"html"))
    })
}

fn load(path: &Path, level: usize, encoding: Option<&str>) -> io::Result<Node> {
    let data = fs::read(path)?;
    if data.is_empty() && level == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The file {} is empty", path.display()),
        ));
    }
    let is_binary = level > 0 && (data.is_empty() || !looks_like_html(&data[..data.len().min(SNIFF_LEN)]));

    let mut links = Vec::new();
    if !is_binary {
        let text = decode_document(&data, encoding);
        let base = path.parent().unwrap_or(Path::new(""));
        let mut seen = HashSet::new();
        for href in anchor_hrefs(&text) {
            match link_to_local_path(&href, base) {
                Resolution::Resolved { path, .. } => {
                    let key = FileKey::of(&path);
                    if seen.insert(key.clone()) {
                        links.push((key, path));
                    }
                }
                Resolution::NotLocal => {}
                Resolution::Error(reason) => debug!("{reason}"),
            }
        }
    }

    Ok(Node {
        entry: FileEntry {
            path: path.to_path_buf(),
            is_binary,
            level,
        },
        links,
    })
}

/// Follow `<a href>` links from `root` up to `options.max_levels` deep.
///
/// Every reachable file appears once. Files that are not HTML are listed
/// with `is_binary` set and are not followed; links to files that cannot be
/// read are dropped. The order is breadth-first discovery order when
/// `options.breadth_first` is set, otherwise a depth-first pre-order walk
/// that follows each document's links in the order they appear.
///
/// Failing to read the root itself is an error.
pub fn get_filelist(root: &Path, options: &ConvertOptions) -> io::Result<Vec<FileEntry>> {
    let root = normalize_path(&std::path::absolute(root)?);
    let encoding = options.input_encoding.as_deref();

    let mut flat = vec![load(&root, 0, encoding)?];
    let mut index: HashMap<FileKey, usize> = HashMap::from([(FileKey::of(&root), 0)]);
    let mut next_level = vec![0];
    let mut level = 0;

    while level < options.max_levels && !next_level.is_empty() {
        level += 1;
        let mut found = Vec::new();
        for &parent in &next_level {
            let mut rejects = HashSet::new();
            for (key, link) in flat[parent].links.clone() {
                if index.contains_key(&key) {
                    continue;
                }
                match load(&link, level, encoding) {
                    Ok(node) => {
                        if node.entry.is_binary {
                            debug!("{} is a binary file", link.display());
                        } else {
                            found.push(flat.len());
                        }
                        index.insert(key, flat.len());
                        flat.push(node);
                    }
                    Err(e) => {
                        debug!("Ignoring link to {}: {e}", link.display());
                        rejects.insert(key);
                    }
                }
            }
            flat[parent].links.retain(|(key, _)| !rejects.contains(key));
        }
        next_level = found;
    }

    let order = if options.breadth_first {
        (0..flat.len()).collect()
    } else {
        depth_first(&flat, &index)
    };
    Ok(order.into_iter().map(|i| flat[i].entry.clone()).collect())
}

/// Pre-order walk from the root over links to discovered files.
fn depth_first(flat: &[Node], index: &HashMap<FileKey, usize>) -> Vec<usize> {
    let mut visited = vec![false; flat.len()];
    let mut order = vec![0];
    visited[0] = true;
    // (node, position of the next link to follow)
    let mut stack = vec![(0usize, 0usize)];

    while let Some(top) = stack.last_mut() {
        let (node, pos) = *top;
        let Some((key, _)) = flat[node].links.get(pos) else {
            stack.pop();
            continue;
        };
        top.1 += 1;
        if let Some(&child) = index.get(key)
            && !visited[child]
        {
            visited[child] = true;
            order.push(child);
            stack.push((child, 0));
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn page(links: &[&str]) -> String {
        let anchors: String = links.iter().map(|l| format!("<a href=\"{l}\">x</a>")).collect();
        format!("<html><body>{anchors}</body></html>")
    }

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn names(entries: &[FileEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn options(max_levels: usize, breadth_first: bool) -> ConvertOptions {
        ConvertOptions {
            max_levels,
            breadth_first,
            ..Default::default()
        }
    }

    /// index -> a, b; a -> c; b -> d; c -> index
    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(&dir, "index.html", &page(&["a.html", "b.html#top", "a.html", "http://x.org/", "#self"]));
        write(&dir, "a.html", &page(&["c.html"]));
        write(&dir, "b.html", &page(&["d.html"]));
        write(&dir, "c.html", &page(&["index.html"]));
        write(&dir, "d.html", &page(&[]));
        dir
    }

    #[test]
    fn test_max_levels_zero_is_root_only() {
        let dir = tree();
        let list = get_filelist(&dir.path().join("index.html"), &options(0, false)).unwrap();
        assert_eq!(names(&list), ["index.html"]);
        assert_eq!(list[0].level, 0);
        assert!(!list[0].is_binary);
    }

    #[test]
    fn test_breadth_first_order() {
        let dir = tree();
        let list = get_filelist(&dir.path().join("index.html"), &options(5, true)).unwrap();
        assert_eq!(names(&list), ["index.html", "a.html", "b.html", "c.html", "d.html"]);
        assert_eq!(list.iter().map(|e| e.level).collect::<Vec<_>>(), [0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_depth_first_order() {
        let dir = tree();
        let list = get_filelist(&dir.path().join("index.html"), &options(5, false)).unwrap();
        assert_eq!(names(&list), ["index.html", "a.html", "c.html", "b.html", "d.html"]);
    }

    #[test]
    fn test_depth_bound() {
        let dir = tree();
        let list = get_filelist(&dir.path().join("index.html"), &options(1, false)).unwrap();
        assert_eq!(names(&list), ["index.html", "a.html", "b.html"]);
    }

    #[test]
    fn test_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.html", &page(&["b.html"]));
        write(&dir, "b.html", &page(&["a.html", "b.html"]));
        let list = get_filelist(&dir.path().join("a.html"), &options(100, false)).unwrap();
        assert_eq!(names(&list), ["a.html", "b.html"]);
    }

    #[test]
    fn test_one_entry_per_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "index.html", &page(&["Next.html", "sub/../next.html", "NEXT.HTML"]));
        write(&dir, "next.html", &page(&[]));
        let case_insensitive = dir.path().join("NEXT.HTML").exists();

        let list = get_filelist(&dir.path().join("index.html"), &options(5, false)).unwrap();
        if case_insensitive {
            assert_eq!(list.len(), 2);
        } else {
            // Next.html and NEXT.HTML do not exist on a case-sensitive filesystem.
            assert_eq!(names(&list), ["index.html", "next.html"]);
        }
    }

    #[test]
    fn test_names_differing_in_case_are_distinct_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "index.html", &page(&["a.html", "A.HTML"]));
        write(&dir, "a.html", &page(&[]));
        write(&dir, "A.HTML", &page(&["index.html"]));
        let distinct = fs::read_dir(dir.path()).unwrap().count() == 3;

        let list = get_filelist(&dir.path().join("index.html"), &options(5, false)).unwrap();
        if distinct {
            assert_eq!(names(&list), ["index.html", "a.html", "A.HTML"]);
        } else {
            assert_eq!(list.len(), 2);
        }
    }

    #[test]
    fn test_binary_and_missing_targets() {
        let dir = TempDir::new().unwrap();
        write(&dir, "index.html", &page(&["data.bin", "missing.html", "next.html"]));
        fs::write(dir.path().join("data.bin"), b"\x00\x01<p>no markup").unwrap();
        write(&dir, "next.html", &page(&["index.html"]));

        let list = get_filelist(&dir.path().join("index.html"), &options(5, false)).unwrap();
        assert_eq!(names(&list), ["index.html", "data.bin", "next.html"]);
        assert!(list[1].is_binary);
        assert!(!list[2].is_binary);
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(get_filelist(&dir.path().join("nope.html"), &ConvertOptions::default()).is_err());
        write(&dir, "empty.html", "");
        assert!(get_filelist(&dir.path().join("empty.html"), &ConvertOptions::default()).is_err());
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html(b"<!DOCTYPE html><HTML>"));
        assert!(looks_like_html(b"junk < html lang=en>"));
        assert!(!looks_like_html(b"<p>fragment</p>"));
        assert!(!looks_like_html(b"<htm"));
    }
}
