//! File name sanitization for manifest hrefs.

/// Replace characters that are unsafe in file names on common filesystems,
/// and everything outside ASCII, with `_`.
pub fn ascii_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if !c.is_ascii()
                || (c.is_ascii_control() && !c.is_ascii_whitespace())
                || matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Produce a file- and URL-safe name from an arbitrary input name.
///
/// Query-string characters become `_`, whitespace runs collapse to a single
/// space, and surrounding whitespace and trailing dots are removed from both
/// the stem and the extension.
///
/// ```
/// use folio::filenames::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("a  b.txt."), "a b.txt");
/// assert_eq!(sanitize_file_name("page.php?id=3#top"), "page.php_id_3_top");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    let ascii = ascii_filename(name);
    let replaced: String = ascii
        .chars()
        .map(|c| if matches!(c, '?' | '&' | '=' | ';' | '#') { '_' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches('.');

    let joined = match trimmed.rsplit_once('.') {
        Some((stem, ext)) => format!("{}.{}", stem.trim(), ext.trim()),
        None => trimmed.trim().to_string(),
    };
    let result = joined.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if result.is_empty() {
        "index".to_string()
    } else {
        result.to_string()
    }
}
