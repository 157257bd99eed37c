//! Stylesheet handling: URL rewriting, `@import` discovery and cleanup of
//! Microsoft Office output.
//!
//! Nothing here builds a CSS object model. The tokenizer from `cssparser`
//! is only used to locate references with their byte offsets, so every
//! byte outside a rewritten reference is preserved.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use cssparser::{ParseError, Parser, ParserInput, Token};
use log::{debug, warn};
use regex_lite::{Captures, Regex};

use crate::links::{LinkHandler, Resolution, link_to_local_path};

type CssParseError<'i> = ParseError<'i, ()>;

/// Default namespace rule inserted into stylesheets applied to XHTML.
pub const XHTML_NAMESPACE_RULE: &str = "@namespace \"http://www.w3.org/1999/xhtml\";";

/// Declarations emitted by Microsoft Office that only bloat the output.
static MS_PAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)(^|;|\{)\s*(?:mso-|panose-|text-underline|tab-interval).+?($|;|\})").unwrap()
});

static COMMENT_PAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

// ============================================================================
// Reference scanning
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    /// `url(...)`, quoted or not.
    Url,
    /// The bare string form of `@import "..."`.
    ImportString,
}

#[derive(Debug, Clone)]
struct UrlRef {
    start: usize,
    end: usize,
    url: String,
    kind: RefKind,
    /// Whether the reference is the target of an `@import` rule.
    import: bool,
}

fn scan_refs(css: &str) -> Vec<UrlRef> {
    let mut refs = Vec::new();
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    scan_refs_recursive(&mut parser, &mut refs);
    refs
}

fn scan_refs_recursive(parser: &mut Parser, refs: &mut Vec<UrlRef>) {
    let mut in_import = false;
    loop {
        let start = parser.position().byte_index();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::UnquotedUrl(url) => {
                refs.push(UrlRef {
                    start,
                    end: parser.position().byte_index(),
                    url: url.to_string(),
                    kind: RefKind::Url,
                    import: in_import,
                });
                in_import = false;
            }
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let mut url = None;
                let _ = parser.parse_nested_block(|p| {
                    if let Ok(Token::QuotedString(s)) = p.next() {
                        url = Some(s.to_string());
                    }
                    Ok::<_, CssParseError>(())
                });
                if let Some(url) = url {
                    refs.push(UrlRef {
                        start,
                        end: parser.position().byte_index(),
                        url,
                        kind: RefKind::Url,
                        import: in_import,
                    });
                }
                in_import = false;
            }
            Token::QuotedString(url) if in_import => {
                refs.push(UrlRef {
                    start,
                    end: parser.position().byte_index(),
                    url: url.to_string(),
                    kind: RefKind::ImportString,
                    import: true,
                });
                in_import = false;
            }
            Token::AtKeyword(name) => in_import = name.eq_ignore_ascii_case("import"),
            Token::WhiteSpace(_) | Token::Comment(_) => {}
            Token::Function(_)
            | Token::CurlyBracketBlock
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock => {
                in_import = false;
                let _ = parser.parse_nested_block(|p| {
                    scan_refs_recursive(p, refs);
                    Ok::<_, CssParseError>(())
                });
            }
            _ => in_import = false,
        }
    }
}

fn is_data_uri(url: &str) -> bool {
    url.trim_start()
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Quote `value` as a CSS string.
fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\a "),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Rewrite every `url(...)` and `@import "..."` reference in `css` through
/// `handler`. References inside comments and `data:` URIs are never offered
/// to the handler.
///
/// Returns the input unchanged (borrowed) when nothing was rewritten.
pub fn replace_urls<'a>(css: &'a str, base: &Path, handler: &mut dyn LinkHandler) -> Cow<'a, str> {
    let mut replacements = Vec::new();
    for r in scan_refs(css) {
        if is_data_uri(&r.url) {
            continue;
        }
        let Some(new_url) = handler.resolve(&r.url, base) else {
            continue;
        };
        if new_url == r.url {
            continue;
        }
        let text = match r.kind {
            RefKind::Url => format!("url({})", css_string(&new_url)),
            RefKind::ImportString => css_string(&new_url),
        };
        replacements.push((r.start, r.end, text));
    }

    if replacements.is_empty() {
        return Cow::Borrowed(css);
    }

    let mut result = css.to_string();
    for (start, end, replacement) in replacements.into_iter().rev() {
        result.replace_range(start..end, &replacement);
    }
    Cow::Owned(result)
}

/// The targets of `@import` rules, in source order.
pub fn collect_imports(css: &str) -> Vec<String> {
    scan_refs(css)
        .into_iter()
        .filter(|r| r.import && !is_data_uri(&r.url))
        .map(|r| r.url)
        .collect()
}

// ============================================================================
// Preprocessing
// ============================================================================

/// Clean a stylesheet before use.
///
/// Declarations such as `mso-*`, `panose-*`, `text-underline*` and
/// `tab-interval` are dropped. With `add_namespace`, comments are removed and
/// the XHTML default namespace rule is inserted after any leading `@import`,
/// `@charset` and blank lines.
pub fn preprocess(data: &str, add_namespace: bool) -> String {
    let data = MS_PAT.replace_all(data, |caps: &Captures| {
        let start = caps.get(1).map_or("", |m| m.as_str());
        match caps.get(2).map_or("", |m| m.as_str()) {
            ";" => start.to_string(),
            end => format!("{start}{end}"),
        }
    });
    if !add_namespace {
        return data.into_owned();
    }

    // Comments before the first rule would hide it from the line check below.
    let data = COMMENT_PAT.replace_all(&data, "");
    let mut lines = Vec::new();
    let mut namespaced = false;
    for line in data.lines() {
        let ll = line.trim_start();
        if !(namespaced || ll.is_empty() || ll.starts_with("@import") || ll.starts_with("@charset")) {
            lines.push(XHTML_NAMESPACE_RULE);
            namespaced = true;
        }
        lines.push(line);
    }
    lines.join("\n")
}

// ============================================================================
// Parsed stylesheets and import fetching
// ============================================================================

/// A stylesheet prepared for the document model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stylesheet {
    /// Preprocessed text, with the XHTML namespace rule added.
    pub text: String,
    /// Targets of the `@import` rules, as written.
    pub imports: Vec<String>,
    /// Filled by [`Stylesheet::resolve_imports`].
    pub imported: Vec<ImportedSheet>,
}

/// An `@import` target together with the text it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSheet {
    pub href: String,
    /// `None` when the import could not be fetched.
    pub text: Option<String>,
}

impl Stylesheet {
    pub fn parse(data: &str) -> Self {
        let text = preprocess(data, true);
        let imports = collect_imports(&text);
        Self {
            text,
            imports,
            imported: Vec::new(),
        }
    }

    /// Fetch every imported stylesheet relative to the fetcher's directory.
    pub fn resolve_imports(&mut self, fetcher: &mut CssImportFetcher) {
        let base = fetcher.base.clone();
        self.imported = self
            .imports
            .iter()
            .map(|href| ImportedSheet {
                href: href.clone(),
                text: fetcher.resolve(href, &base),
            })
            .collect();
    }
}

/// Loads stylesheets named by `@import` rules from the local filesystem.
///
/// The "replacement" it returns for a link is the preprocessed text of the
/// imported stylesheet.
#[derive(Debug, Clone)]
pub struct CssImportFetcher {
    base: PathBuf,
}

impl CssImportFetcher {
    /// A fetcher for a stylesheet located in directory `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl LinkHandler for CssImportFetcher {
    fn resolve(&mut self, raw_link: &str, base: &Path) -> Option<String> {
        let path = match link_to_local_path(raw_link, base) {
            Resolution::Resolved { path, .. } => path,
            Resolution::NotLocal => return None,
            Resolution::Error(reason) => {
                warn!("{reason}");
                return None;
            }
        };
        if path.is_dir() {
            debug!("Ignoring @import of directory {}", path.display());
            return None;
        }
        match fs::read(&path) {
            Ok(raw) => Some(preprocess(&String::from_utf8_lossy(&raw), false)),
            Err(e) => {
                warn!("Failed to read CSS file {}: {e}", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Upper-cases every link it is offered and records what it saw.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    impl LinkHandler for Recorder {
        fn resolve(&mut self, raw_link: &str, _base: &Path) -> Option<String> {
            self.seen.push(raw_link.to_string());
            Some(raw_link.to_uppercase())
        }
    }

    fn rewrite(css: &str) -> (String, Vec<String>) {
        let mut recorder = Recorder::default();
        let out = replace_urls(css, Path::new("/book"), &mut recorder).into_owned();
        (out, recorder.seen)
    }

    #[test]
    fn test_replace_urls_quoted_and_unquoted() {
        let (out, seen) = rewrite("p { background: url(a.png) } q { src: url('b.ttf') }");
        assert_eq!(seen, ["a.png", "b.ttf"]);
        assert_eq!(out, "p { background: url(\"A.PNG\") } q { src: url(\"B.TTF\") }");
    }

    #[test]
    fn test_replace_urls_import_forms() {
        let (out, seen) = rewrite("@import \"base.css\";\n@import url(extra.css) screen;\nbody{}");
        assert_eq!(seen, ["base.css", "extra.css"]);
        assert_eq!(out, "@import \"BASE.CSS\";\n@import url(\"EXTRA.CSS\") screen;\nbody{}");
    }

    #[test]
    fn test_replace_urls_skips_comments_and_data() {
        let css = "/* url(x.png) */ a { background: url(data:image/png;base64,AAAA) }";
        let (out, seen) = rewrite(css);
        assert!(seen.is_empty());
        assert_eq!(out, css);
    }

    #[test]
    fn test_replace_urls_unchanged_is_borrowed() {
        let mut keep = |_: &str, _: &Path| -> Option<String> { None };
        let css = "a { background: url(x.png) }";
        assert!(matches!(replace_urls(css, Path::new("/"), &mut keep), Cow::Borrowed(_)));
    }

    #[test]
    fn test_replace_urls_nested_blocks() {
        let (out, _) = rewrite("@media print { .x { background-image: url(p.png) } }");
        assert_eq!(out, "@media print { .x { background-image: url(\"P.PNG\") } }");
    }

    #[test]
    fn test_preprocess_removes_office_junk() {
        let css = "p.MsoNormal { mso-style-parent: \"\"; margin: 0 }\nspan { color: red; panose-1: 2 4 5 }";
        let out = preprocess(css, false);
        assert!(!out.contains("mso-"));
        assert!(!out.contains("panose"));
        assert!(out.contains("margin: 0"));
        assert!(out.contains("color: red"));
    }

    #[test]
    fn test_preprocess_adds_namespace_after_imports() {
        let css = "/* header */\n@charset \"utf-8\";\n@import \"a.css\";\n\nbody { margin: 0 }";
        let out = preprocess(css, true);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            [
                "",
                "@charset \"utf-8\";",
                "@import \"a.css\";",
                "",
                XHTML_NAMESPACE_RULE,
                "body { margin: 0 }",
            ]
        );
    }

    #[test]
    fn test_preprocess_only_imports_gets_no_namespace() {
        assert_eq!(preprocess("@import \"a.css\";", true), "@import \"a.css\";");
    }

    #[test]
    fn test_collect_imports() {
        let css = "@import 'one.css';\n@import url(\"two.css\");\na { background: url(bg.png) }";
        assert_eq!(collect_imports(css), ["one.css", "two.css"]);
    }

    #[test]
    fn test_stylesheet_resolves_imports_from_disk() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.css"), "p { mso-x: 1; color: blue }").unwrap();

        let mut sheet = Stylesheet::parse("@import \"base.css\";\n@import \"missing.css\";\nh1 { color: red }");
        assert!(sheet.text.contains(XHTML_NAMESPACE_RULE));
        assert_eq!(sheet.imports, ["base.css", "missing.css"]);

        sheet.resolve_imports(&mut CssImportFetcher::new(dir.path()));
        let imported = &sheet.imported;
        assert_eq!(imported.len(), 2);
        assert_eq!(imported[0].text.as_deref(), Some("p { color: blue }"));
        assert_eq!(imported[1].text, None);
    }

    #[test]
    fn test_import_fetcher_ignores_remote_and_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mut fetcher = CssImportFetcher::new(dir.path());
        assert_eq!(fetcher.base(), dir.path());
        assert_eq!(fetcher.resolve("http://example.com/a.css", dir.path()), None);
        assert_eq!(fetcher.resolve("sub", dir.path()), None);
        assert_eq!(fetcher.resolve("nope.css", dir.path()), None);
    }
}
