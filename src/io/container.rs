use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

/// Characters percent-encoded when a file name is used as an href.
///
/// Everything outside the unreserved set except `/` (path separator) and the
/// sub-delimiters that are harmless in a path segment.
const HREF_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encode a file name or relative path for use as an href.
pub fn quote_href(name: &str) -> String {
    utf8_percent_encode(name, HREF_ENCODE_SET).to_string()
}

/// Reverse [`quote_href`]; invalid UTF-8 sequences are replaced.
pub fn unquote_href(href: &str) -> String {
    percent_decode_str(href).decode_utf8_lossy().into_owned()
}

/// Byte-level read access to named files.
///
/// Names are hrefs relative to the container root and may be
/// percent-encoded.
pub trait Container: std::fmt::Debug {
    /// Read the full contents of `href`.
    fn read(&self, href: &str) -> io::Result<Vec<u8>>;

    /// Returns true if `href` names a readable file.
    fn exists(&self, href: &str) -> bool;
}

// --- Implementation: Directory ---

/// A container rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirContainer {
    root: PathBuf,
}

impl DirContainer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map an href to a path below the root.
    ///
    /// Hrefs that would escape the root (absolute paths or `..` past the top)
    /// are rejected.
    fn resolve(&self, href: &str) -> io::Result<PathBuf> {
        let name = unquote_href(href.split('#').next().unwrap_or(href));
        let mut path = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(&name).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir if depth > 0 => {
                    path.pop();
                    depth -= 1;
                }
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("href escapes container root: {href}"),
                    ));
                }
            }
        }
        Ok(path)
    }
}

impl Container for DirContainer {
    fn read(&self, href: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(href)?)
    }

    fn exists(&self, href: &str) -> bool {
        self.resolve(href).is_ok_and(|p| p.is_file())
    }
}

// --- Implementation: In-Memory ---

/// An in-memory container keyed by unquoted href.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, href: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(href.into(), data.into());
    }
}

impl Container for MemoryContainer {
    fn read(&self, href: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(&unquote_href(href))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, href.to_string()))
    }

    fn exists(&self, href: &str) -> bool {
        self.files.contains_key(&unquote_href(href))
    }
}
