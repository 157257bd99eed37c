//! Shared helpers: text decoding, media type detection, identifiers.

use std::borrow::Cow;

/// Get a time-based seed value for pseudo-random number generation.
pub fn time_seed_nanos() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(12345)
}

/// Generate a random (version 4) UUID string.
///
/// Uniqueness only matters within a conversion run and across runs started at
/// different instants, so a time-seeded LCG is sufficient.
pub fn uuid_v4() -> String {
    let mut state = time_seed_nanos() ^ u64::from(std::process::id()).rotate_left(32);
    let mut bytes = [0u8; 16];
    for byte in &mut bytes {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        *byte = (state >> 56) as u8;
    }

    // Set version (4) and variant (RFC 4122)
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`,
///    a `<meta charset>` or the user's `input_encoding`)
/// 3. Falls back to Windows-1252 (common in old HTML)
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Decode an HTML or XML document, honouring a declared encoding.
///
/// An explicit `input_encoding` wins over anything declared in the document.
pub fn decode_document<'a>(bytes: &'a [u8], input_encoding: Option<&str>) -> Cow<'a, str> {
    let hint = input_encoding
        .or_else(|| extract_xml_encoding(bytes))
        .or_else(|| extract_meta_charset(bytes));
    decode_text(bytes, hint)
}

// ============================================================================
// Media Types
// ============================================================================

/// Fallback media type for resources nothing else could classify.
pub const BINARY_MIME: &str = "application/octet-stream";

/// Media type assigned to HTML documents from the file list.
pub const HTML_MIME: &str = "text/html";

/// Media type of XHTML content documents.
pub const XHTML_MIME: &str = "application/xhtml+xml";

/// Media types treated as stylesheets.
pub const OEB_STYLES: &[&str] = &["text/css", "text/x-oeb1-css", "text/x-oeb-css"];

/// Check whether a media type is one of the stylesheet types.
pub fn is_stylesheet(media_type: &str) -> bool {
    OEB_STYLES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(media_type))
}

/// Check whether a media type denotes an (X)HTML document.
pub fn is_html(media_type: &str) -> bool {
    media_type.eq_ignore_ascii_case(HTML_MIME) || media_type.eq_ignore_ascii_case(XHTML_MIME)
}

/// Guess a media type from the extension of a file name or href.
///
/// Returns `None` for unknown or missing extensions; callers then fall back
/// to content sniffing.
pub fn guess_media_type(name: &str) -> Option<&'static str> {
    let name = name.split(['#', '?']).next().unwrap_or(name);
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" | "shtml" | "shtm" => HTML_MIME,
        "xhtml" | "xhtm" | "xht" => XHTML_MIME,
        "css" => "text/css",
        "txt" | "text" => "text/plain",
        "xml" => "application/xml",
        "opf" => "application/oebps-package+xml",
        "ncx" => "application/x-dtbncx+xml",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/vnd.microsoft.icon",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "js" => "application/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/x-wav",
        "mp4" => "video/mp4",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(mime)
}

/// Image formats recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// Get the MIME type string for this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
        }
    }
}

/// Detect an image format from magic bytes.
pub fn sniff_image(data: &[u8]) -> Option<ImageFormat> {
    if data.len() < 4 {
        return None;
    }

    // JPEG: FF D8 FF
    if data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF {
        return Some(ImageFormat::Jpeg);
    }
    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(ImageFormat::Png);
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(ImageFormat::Gif);
    }
    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some(ImageFormat::WebP);
    }
    if data.starts_with(b"BM") {
        return Some(ImageFormat::Bmp);
    }
    if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        return Some(ImageFormat::Tiff);
    }

    None
}

// ============================================================================
// Encoding Detection
// ============================================================================

/// Extract encoding from XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` in the first 100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = memchr::memmem::find(prefix, b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    quoted_value(&after_xml[enc_pos + 9..])
}

/// Extract the charset from a `<meta charset="...">` or
/// `<meta http-equiv="Content-Type" content="...; charset=...">` tag.
///
/// Only the first 1024 bytes are examined, as browsers do.
pub fn extract_meta_charset(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(1024);
    let prefix = &bytes[..check_len];

    let pos = prefix
        .windows(8)
        .position(|w| w.eq_ignore_ascii_case(b"charset="))?;
    let after = &prefix[pos + 8..];
    if let Some(value) = quoted_value(after) {
        return Some(value);
    }

    // Unquoted: inside a content="text/html; charset=utf-8" attribute
    let end = after
        .iter()
        .position(|&b| matches!(b, b'"' | b'\'' | b';' | b'>' | b' ' | b'/'))
        .unwrap_or(after.len());
    let value = std::str::from_utf8(&after[..end]).ok()?;
    (!value.is_empty()).then_some(value)
}

fn quoted_value(bytes: &[u8]) -> Option<&str> {
    let quote = *bytes.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value_end = memchr::memchr(quote, &bytes[1..])? + 1;
    std::str::from_utf8(&bytes[1..value_end]).ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_media_type_by_extension() {
        assert_eq!(guess_media_type("image.jpg"), Some("image/jpeg"));
        assert_eq!(guess_media_type("image.JPEG"), Some("image/jpeg"));
        assert_eq!(guess_media_type("style.css"), Some("text/css"));
        assert_eq!(guess_media_type("notes.txt"), Some("text/plain"));
        assert_eq!(guess_media_type("chapter.xhtml"), Some(XHTML_MIME));
        assert_eq!(guess_media_type("font.woff2"), Some("font/woff2"));
        assert_eq!(guess_media_type("image.png#frag"), Some("image/png"));
        assert_eq!(guess_media_type("unknown"), None);
        assert_eq!(guess_media_type("archive.xyz"), None);
    }

    #[test]
    fn test_sniff_image() {
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(
            sniff_image(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(ImageFormat::Png)
        );
        assert_eq!(sniff_image(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::WebP));
        assert_eq!(sniff_image(b"BM\0\0\0\0"), Some(ImageFormat::Bmp));
        assert_eq!(sniff_image(b"II*\0rest"), Some(ImageFormat::Tiff));
        assert_eq!(sniff_image(b"plain text"), None);
        assert_eq!(sniff_image(b"GI"), None);
    }

    #[test]
    fn test_stylesheet_and_html_types() {
        assert!(is_stylesheet("text/css"));
        assert!(is_stylesheet("text/x-oeb1-css"));
        assert!(!is_stylesheet("text/html"));
        assert!(is_html("text/html"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("image/png"));
    }

    #[test]
    fn test_decode_text_fallback() {
        assert_eq!(decode_text("héllo".as_bytes(), None), "héllo");
        // 0xE9 is é in windows-1252 and invalid as UTF-8
        assert_eq!(decode_text(&[b'h', 0xE9], None), "hé");
        // 0xE9 is й in koi8-r
        assert_eq!(decode_text(&[0xCA], Some("koi8-r")), "й");
    }

    #[test]
    fn test_extract_encodings() {
        let xml = br#"<?xml version="1.0" encoding="ISO-8859-1"?><html/>"#;
        assert_eq!(extract_xml_encoding(xml), Some("ISO-8859-1"));
        assert_eq!(extract_xml_encoding(b"<html/>"), None);

        let html = br#"<html><head><meta charset="koi8-r"></head></html>"#;
        assert_eq!(extract_meta_charset(html), Some("koi8-r"));

        let html = br#"<meta http-equiv="Content-Type" content="text/html; charset=windows-1251">"#;
        assert_eq!(extract_meta_charset(html), Some("windows-1251"));
    }

    #[test]
    fn test_uuid_v4_shape() {
        let id = uuid_v4();
        assert_eq!(id.len(), 36);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), [8, 4, 4, 4, 12]);
        assert!(parts[2].starts_with('4'));
        assert!(matches!(parts[3].as_bytes()[0], b'8' | b'9' | b'a' | b'b'));
    }
}
