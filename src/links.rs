//! Resolution of raw link text to local filesystem paths.
//!
//! Documents reference each other with URL syntax (`../img/a%20b.png#x`),
//! while the collector works with absolute paths on disk. [`link_to_local_path`]
//! bridges the two and reports the outcome as a [`Resolution`] instead of
//! failing, so callers can decide to leave a reference untouched.

use std::fs;
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Outcome of resolving one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The link names a local file.
    Resolved {
        /// Absolute, lexically normalized path.
        path: PathBuf,
        /// Decoded fragment, if the link had a non-empty one.
        fragment: Option<String>,
    },
    /// The link is external (`http:`, `mailto:`, `data:`) or has no path
    /// component (`#anchor`, `?query`).
    NotLocal,
    /// The link could not be decoded.
    Error(String),
}

impl Resolution {
    /// The resolved path, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Resolution::Resolved { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// A capability for rewriting references found while walking a document.
///
/// The traversal (HTML attributes, CSS `url()`) is independent of what a
/// reference is replaced with; each walk is handed one of these.
pub trait LinkHandler {
    /// Return the replacement for `raw_link`, found in a document located in
    /// directory `base`, or `None` to leave the reference as it is.
    fn resolve(&mut self, raw_link: &str, base: &Path) -> Option<String>;
}

impl<F> LinkHandler for F
where
    F: FnMut(&str, &Path) -> Option<String>,
{
    fn resolve(&mut self, raw_link: &str, base: &Path) -> Option<String> {
        self(raw_link, base)
    }
}

/// Resolve `raw` against the directory `base`.
///
/// ```
/// use std::path::Path;
/// use folio::links::{link_to_local_path, Resolution};
///
/// let res = link_to_local_path("images/a%20b.png#top", Path::new("/book/text"));
/// assert_eq!(res.path(), Some(Path::new("/book/text/images/a b.png")));
///
/// assert_eq!(link_to_local_path("http://example.com/", Path::new("/book")), Resolution::NotLocal);
/// assert_eq!(link_to_local_path("#note-1", Path::new("/book")), Resolution::NotLocal);
/// ```
pub fn link_to_local_path(raw: &str, base: &Path) -> Resolution {
    let raw = raw.trim();
    if raw.is_empty() {
        return Resolution::NotLocal;
    }

    let mut rest = raw;
    if let Some(scheme) = url_scheme(raw) {
        if !scheme.eq_ignore_ascii_case("file") {
            return Resolution::NotLocal;
        }
        rest = strip_file_authority(&raw[scheme.len() + 1..]);
    }

    let (before_fragment, fragment) = match rest.split_once('#') {
        Some((before, fragment)) => (before, Some(fragment)),
        None => (rest, None),
    };
    let path = before_fragment
        .split_once('?')
        .map_or(before_fragment, |(path, _)| path);
    if path.is_empty() {
        return Resolution::NotLocal;
    }

    let decoded_path = match percent_decode_str(path).decode_utf8() {
        Ok(p) => p,
        Err(e) => return Resolution::Error(format!("failed to decode link {raw:?}: {e}")),
    };
    let fragment = match fragment.map(|f| percent_decode_str(f).decode_utf8()) {
        Some(Ok(f)) if !f.is_empty() => Some(f.into_owned()),
        Some(Err(e)) => return Resolution::Error(format!("failed to decode link {raw:?}: {e}")),
        _ => None,
    };

    let local = decoded_path.replace('/', &MAIN_SEPARATOR.to_string());
    let local = local.trim();
    if local.is_empty() {
        return Resolution::NotLocal;
    }
    let joined = if Path::new(local).is_absolute() {
        PathBuf::from(local)
    } else {
        base.join(local)
    };

    Resolution::Resolved {
        path: normalize_path(&joined),
        fragment,
    }
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent.
///
/// The filesystem is not consulted, so symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(name) => result.push(name),
            Component::CurDir => {}
            Component::RootDir => result.push(component.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
        }
    }
    result
}

/// Identity of a file on disk, used to tell whether two paths name the
/// same file.
///
/// Different spellings of one file (case variants on a case-insensitive
/// filesystem, symlinks, hard links) get equal keys, while distinct files
/// never do. A path that cannot be inspected is keyed by itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileKey {
    /// Device and inode number.
    Inode(u64, u64),
    /// Canonical path, or the path as given when it does not exist.
    Path(PathBuf),
}

impl FileKey {
    #[cfg(unix)]
    pub fn of(path: &Path) -> Self {
        use std::os::unix::fs::MetadataExt;

        match fs::metadata(path) {
            Ok(meta) => FileKey::Inode(meta.dev(), meta.ino()),
            Err(_) => FileKey::Path(path.to_path_buf()),
        }
    }

    #[cfg(not(unix))]
    pub fn of(path: &Path) -> Self {
        FileKey::Path(fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
    }
}

/// Return the URL scheme of `link` if it has one.
///
/// Single letters are treated as Windows drive letters, not schemes.
fn url_scheme(link: &str) -> Option<&str> {
    let colon = link.find(':')?;
    let scheme = &link[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = scheme.len() > 1
        && first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Strip `//host` from the remainder of a `file:` URL.
fn strip_file_authority(rest: &str) -> &str {
    match rest.strip_prefix("//") {
        Some(after) => after.find('/').map_or("", |slash| &after[slash..]),
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(raw: &str, base: &str) -> (PathBuf, Option<String>) {
        match link_to_local_path(raw, Path::new(base)) {
            Resolution::Resolved { path, fragment } => (path, fragment),
            other => panic!("expected {raw:?} to resolve, got {other:?}"),
        }
    }

    #[test]
    fn test_relative_link_with_fragment() {
        let (path, fragment) = resolved("chapter2.html#sec-1", "/book/text");
        assert_eq!(path, PathBuf::from("/book/text/chapter2.html"));
        assert_eq!(fragment.as_deref(), Some("sec-1"));
    }

    #[test]
    fn test_parent_directory_is_normalized() {
        let (path, fragment) = resolved("../styles/./main.css", "/book/text");
        assert_eq!(path, PathBuf::from("/book/styles/main.css"));
        assert_eq!(fragment, None);
    }

    #[test]
    fn test_percent_encoding_and_query() {
        let (path, fragment) = resolved("my%20page.html?x=1#caf%C3%A9", "/book");
        assert_eq!(path, PathBuf::from("/book/my page.html"));
        assert_eq!(fragment.as_deref(), Some("café"));
    }

    #[test]
    fn test_absolute_and_file_urls() {
        let (path, _) = resolved("/abs/x.png", "/book");
        assert_eq!(path, PathBuf::from("/abs/x.png"));
        let (path, _) = resolved("file:///abs/y.png", "/book");
        assert_eq!(path, PathBuf::from("/abs/y.png"));
        let (path, _) = resolved("file://localhost/abs/z.png", "/book");
        assert_eq!(path, PathBuf::from("/abs/z.png"));
    }

    #[test]
    fn test_not_local() {
        let base = Path::new("/book");
        for raw in [
            "",
            "   ",
            "#anchor",
            "?q=1",
            "http://example.com/a.html",
            "HTTPS://example.com",
            "mailto:someone@example.com",
            "data:image/png;base64,AAAA",
            "javascript:void(0)",
        ] {
            assert_eq!(link_to_local_path(raw, base), Resolution::NotLocal, "{raw:?}");
        }
    }

    #[test]
    fn test_empty_fragment_is_none() {
        let (_, fragment) = resolved("a.html#", "/book");
        assert_eq!(fragment, None);
    }

    #[test]
    fn test_malformed_encoding_is_error() {
        let res = link_to_local_path("bad%FF%FE.html", Path::new("/book"));
        assert!(matches!(res, Resolution::Error(_)));
    }

    #[test]
    fn test_file_key_identity() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        assert_eq!(FileKey::of(&a), FileKey::of(&dir.path().join(".").join("a.png")));
        assert_ne!(FileKey::of(&a), FileKey::of(&b));
        let missing = dir.path().join("missing.png");
        assert_eq!(FileKey::of(&missing), FileKey::Path(missing.clone()));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_key_follows_symlinks() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("target.css");
        let link = dir.path().join("link.css");
        fs::write(&target, "p {}").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();
        assert_eq!(FileKey::of(&target), FileKey::of(&link));
    }

    #[test]
    fn test_closure_link_handler() {
        let mut handler = |raw: &str, _base: &Path| Some(raw.to_uppercase());
        assert_eq!(
            LinkHandler::resolve(&mut handler, "a.png", Path::new("/")),
            Some("A.PNG".to_string())
        );
    }
}
