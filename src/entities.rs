//! HTML/XML character entity decoding.
//!
//! Old HTML frequently mixes named entities, decimal/hex references and
//! numeric references that were really Windows-1252 bytes (`&#150;` for an
//! en dash). [`EntityDecoder`] maps a single entity name to its text and can
//! substitute every `&name;` occurrence in a string.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use encoding_rs::Encoding;
use regex_lite::{Captures, Regex};

/// Matches `&name;` where name is any run of non-whitespace.
static ENT_PAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&(\S+?);").unwrap());

/// Result exceptions that keep the decoded text well-formed XML.
pub const XML_RESULT_EXCEPTIONS: &[(&str, &str)] = &[
    ("\"", "&quot;"),
    ("'", "&apos;"),
    ("<", "&lt;"),
    (">", "&gt;"),
    ("&", "&amp;"),
];

/// Decodes named and numeric character references.
#[derive(Debug, Clone, Copy)]
pub struct EntityDecoder<'a> {
    /// Entity names (e.g. `apos`, `#1234`) that are returned untouched.
    exceptions: &'a [&'a str],
    /// Legacy single-byte encoding used for numeric references up to 255.
    encoding: Option<&'static Encoding>,
    /// Decoded strings that are replaced by the paired text.
    result_exceptions: &'a [(&'a str, &'a str)],
}

impl Default for EntityDecoder<'_> {
    fn default() -> Self {
        Self {
            exceptions: &[],
            encoding: Some(encoding_rs::WINDOWS_1252),
            result_exceptions: &[],
        }
    }
}

impl<'a> EntityDecoder<'a> {
    /// Decoder with no exceptions and Windows-1252 numeric references.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder whose output is safe to embed in XML text or attributes.
    pub fn xml() -> Self {
        Self::default().with_result_exceptions(XML_RESULT_EXCEPTIONS)
    }

    pub fn with_exceptions(mut self, exceptions: &'a [&'a str]) -> Self {
        self.exceptions = exceptions;
        self
    }

    /// Set the encoding for numeric references ≤ 255; `None` means plain Unicode.
    pub fn with_encoding(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_result_exceptions(mut self, result_exceptions: &'a [(&'a str, &'a str)]) -> Self {
        self.result_exceptions = result_exceptions;
        self
    }

    /// Decode one entity, given its name without the surrounding `&` and `;`.
    ///
    /// Unknown or malformed entities come back unchanged as `&name;`.
    pub fn decode(&self, name: &str) -> String {
        if self.exceptions.contains(&name) {
            return format!("&{name};");
        }
        // squot is generated by some broken CMS software
        if name == "apos" || name == "squot" {
            return self.check("'".to_string());
        }
        let name = if name == "hellips" { "hellip" } else { name };

        if let Some(num) = name.strip_prefix('#') {
            return match parse_numeric(num) {
                Some(code) => self.check(self.decode_numeric(code)),
                None => format!("&{name};"),
            };
        }

        if let Some(text) = lookup_html5(name) {
            return self.check(text);
        }
        match STANDARD_ENTITIES.get(name) {
            Some(&code) => self.check(unichr(u64::from(code))),
            None => format!("&{name};"),
        }
    }

    /// Replace every `&name;` in `text`.
    pub fn replace_all<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if !text.contains('&') {
            return Cow::Borrowed(text);
        }
        ENT_PAT.replace_all(text, |caps: &Captures| self.decode(&caps[1]))
    }

    fn decode_numeric(&self, code: u64) -> String {
        match self.encoding {
            Some(encoding) if code <= 255 => {
                let byte = [code as u8];
                match encoding.decode_without_bom_handling_and_without_replacement(&byte) {
                    Some(text) => text.into_owned(),
                    None => unichr(code),
                }
            }
            _ => unichr(code),
        }
    }

    fn check(&self, decoded: String) -> String {
        self.result_exceptions
            .iter()
            .find(|(from, _)| *from == decoded)
            .map(|(_, to)| (*to).to_string())
            .unwrap_or(decoded)
    }
}

/// Decode a single entity name with the default decoder.
pub fn entity_to_unicode(name: &str) -> String {
    EntityDecoder::default().decode(name)
}

/// Replace all entities in `raw`, decoding numeric references ≤ 255 through
/// `encoding` (Windows-1252 in most callers).
pub fn replace_entities(raw: &str, encoding: Option<&'static Encoding>) -> String {
    EntityDecoder::default()
        .with_encoding(encoding)
        .replace_all(raw)
        .into_owned()
}

/// Like [`replace_entities`], but characters that are special in XML come
/// back in escaped form.
pub fn xml_replace_entities(raw: &str, encoding: Option<&'static Encoding>) -> String {
    EntityDecoder::xml()
        .with_encoding(encoding)
        .replace_all(raw)
        .into_owned()
}

/// Decode entities, then escape the result for XML text (or an attribute
/// value when `attribute` is set).
///
/// Escaping happens once, after decoding, so `&lt;` round-trips to `&lt;`
/// rather than `&amp;lt;`.
pub fn prepare_string_for_xml(raw: &str, attribute: bool) -> String {
    escape_xml(&EntityDecoder::default().replace_all(raw), attribute)
}

/// Escape `&`, `<` and `>` (plus both quote characters when `attribute` is
/// set) without decoding anything first.
pub fn escape_xml(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\'' if attribute => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Parse the part after `#`: decimal, or hex with an `x`/`X` prefix.
///
/// Values too large for any code point saturate so they decode to `?`.
fn parse_numeric(num: &str) -> Option<u64> {
    let (digits, radix) = match num.strip_prefix(['x', 'X']) {
        Some(hex) => (hex, 16),
        None => (num, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    Some(u64::from_str_radix(digits, radix).unwrap_or(u64::MAX))
}

fn unichr(code: u64) -> String {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or('?')
        .to_string()
}

/// Look up the HTML5 named character reference table shipped with html5ever.
fn lookup_html5(name: &str) -> Option<String> {
    let key = format!("{name};");
    let &(first, second) = html5ever::data::NAMED_ENTITIES.get(key.as_str())?;
    // Entries of (0, 0) are prefixes of longer names, not entities.
    if first == 0 {
        return None;
    }
    let mut text: String = char::from_u32(first).into_iter().collect();
    if second != 0 {
        text.extend(char::from_u32(second));
    }
    Some(text)
}

/// The HTML 4 entity set.
static STANDARD_ENTITIES: LazyLock<HashMap<&'static str, u32>> = LazyLock::new(|| {
    [
        ("AElig", 198), ("Aacute", 193), ("Acirc", 194), ("Agrave", 192), ("Alpha", 913),
        ("Aring", 197), ("Atilde", 195), ("Auml", 196), ("Beta", 914), ("Ccedil", 199),
        ("Chi", 935), ("Dagger", 8225), ("Delta", 916), ("ETH", 208), ("Eacute", 201),
        ("Ecirc", 202), ("Egrave", 200), ("Epsilon", 917), ("Eta", 919), ("Euml", 203),
        ("Gamma", 915), ("Iacute", 205), ("Icirc", 206), ("Igrave", 204), ("Iota", 921),
        ("Iuml", 207), ("Kappa", 922), ("Lambda", 923), ("Mu", 924), ("Ntilde", 209),
        ("Nu", 925), ("OElig", 338), ("Oacute", 211), ("Ocirc", 212), ("Ograve", 210),
        ("Omega", 937), ("Omicron", 927), ("Oslash", 216), ("Otilde", 213), ("Ouml", 214),
        ("Phi", 934), ("Pi", 928), ("Prime", 8243), ("Psi", 936), ("Rho", 929),
        ("Scaron", 352), ("Sigma", 931), ("THORN", 222), ("Tau", 932), ("Theta", 920),
        ("Uacute", 218), ("Ucirc", 219), ("Ugrave", 217), ("Upsilon", 933), ("Uuml", 220),
        ("Xi", 926), ("Yacute", 221), ("Yuml", 376), ("Zeta", 918), ("aacute", 225),
        ("acirc", 226), ("acute", 180), ("aelig", 230), ("agrave", 224), ("alefsym", 8501),
        ("alpha", 945), ("amp", 38), ("and", 8743), ("ang", 8736), ("aring", 229),
        ("asymp", 8776), ("atilde", 227), ("auml", 228), ("bdquo", 8222), ("beta", 946),
        ("brvbar", 166), ("bull", 8226), ("cap", 8745), ("ccedil", 231), ("cedil", 184),
        ("cent", 162), ("chi", 967), ("circ", 710), ("clubs", 9827), ("cong", 8773),
        ("copy", 169), ("crarr", 8629), ("cup", 8746), ("curren", 164), ("dArr", 8659),
        ("dagger", 8224), ("darr", 8595), ("deg", 176), ("delta", 948), ("diams", 9830),
        ("divide", 247), ("eacute", 233), ("ecirc", 234), ("egrave", 232), ("empty", 8709),
        ("emsp", 8195), ("ensp", 8194), ("epsilon", 949), ("equiv", 8801), ("eta", 951),
        ("eth", 240), ("euml", 235), ("euro", 8364), ("exist", 8707), ("fnof", 402),
        ("forall", 8704), ("frac12", 189), ("frac14", 188), ("frac34", 190), ("frasl", 8260),
        ("gamma", 947), ("ge", 8805), ("gt", 62), ("hArr", 8660), ("harr", 8596),
        ("hearts", 9829), ("hellip", 8230), ("iacute", 237), ("icirc", 238), ("iexcl", 161),
        ("igrave", 236), ("image", 8465), ("infin", 8734), ("int", 8747), ("iota", 953),
        ("iquest", 191), ("isin", 8712), ("iuml", 239), ("kappa", 954), ("lArr", 8656),
        ("lambda", 955), ("lang", 9001), ("laquo", 171), ("larr", 8592), ("lceil", 8968),
        ("ldquo", 8220), ("le", 8804), ("lfloor", 8970), ("lowast", 8727), ("loz", 9674),
        ("lrm", 8206), ("lsaquo", 8249), ("lsquo", 8216), ("lt", 60), ("macr", 175),
        ("mdash", 8212), ("micro", 181), ("middot", 183), ("minus", 8722), ("mu", 956),
        ("nabla", 8711), ("nbsp", 160), ("ndash", 8211), ("ne", 8800), ("ni", 8715),
        ("not", 172), ("notin", 8713), ("nsub", 8836), ("ntilde", 241), ("nu", 957),
        ("oacute", 243), ("ocirc", 244), ("oelig", 339), ("ograve", 242), ("oline", 8254),
        ("omega", 969), ("omicron", 959), ("oplus", 8853), ("or", 8744), ("ordf", 170),
        ("ordm", 186), ("oslash", 248), ("otilde", 245), ("otimes", 8855), ("ouml", 246),
        ("para", 182), ("part", 8706), ("permil", 8240), ("perp", 8869), ("phi", 966),
        ("pi", 960), ("piv", 982), ("plusmn", 177), ("pound", 163), ("prime", 8242),
        ("prod", 8719), ("prop", 8733), ("psi", 968), ("quot", 34), ("rArr", 8658),
        ("radic", 8730), ("rang", 9002), ("raquo", 187), ("rarr", 8594), ("rceil", 8969),
        ("rdquo", 8221), ("real", 8476), ("reg", 174), ("rfloor", 8971), ("rho", 961),
        ("rlm", 8207), ("rsaquo", 8250), ("rsquo", 8217), ("sbquo", 8218), ("scaron", 353),
        ("sdot", 8901), ("sect", 167), ("shy", 173), ("sigma", 963), ("sigmaf", 962),
        ("sim", 8764), ("spades", 9824), ("sub", 8834), ("sube", 8838), ("sum", 8721),
        ("sup", 8835), ("sup1", 185), ("sup2", 178), ("sup3", 179), ("supe", 8839),
        ("szlig", 223), ("tau", 964), ("there4", 8756), ("theta", 952), ("thetasym", 977),
        ("thinsp", 8201), ("thorn", 254), ("tilde", 732), ("times", 215), ("trade", 8482),
        ("uArr", 8657), ("uacute", 250), ("uarr", 8593), ("ucirc", 251), ("ugrave", 249),
        ("uml", 168), ("upsih", 978), ("upsilon", 965), ("uuml", 252), ("weierp", 8472),
        ("xi", 958), ("yacute", 253), ("yen", 165), ("yuml", 255), ("zeta", 950),
        ("zwj", 8205), ("zwnj", 8204),
    ]
    .into_iter()
    .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_entities() {
        assert_eq!(entity_to_unicode("apos"), "'");
        assert_eq!(entity_to_unicode("squot"), "'");
        assert_eq!(entity_to_unicode("amp"), "&");
        assert_eq!(entity_to_unicode("hellips"), "\u{2026}");
        assert_eq!(entity_to_unicode("eacute"), "é");
        // HTML5-only name
        assert_eq!(entity_to_unicode("NotEqualTilde"), "\u{2242}\u{338}");
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(entity_to_unicode("#65"), "A");
        assert_eq!(entity_to_unicode("#x41"), "A");
        assert_eq!(entity_to_unicode("#X41"), "A");
        assert_eq!(entity_to_unicode("#8217"), "\u{2019}");
        // Windows-1252 byte 0x96 is an en dash
        assert_eq!(entity_to_unicode("#150"), "\u{2013}");
        assert_eq!(entity_to_unicode("#xFF"), "ÿ");
    }

    #[test]
    fn test_numeric_without_legacy_encoding() {
        let decoder = EntityDecoder::new().with_encoding(None);
        assert_eq!(decoder.decode("#150"), "\u{96}");
    }

    #[test]
    fn test_out_of_range_numeric_is_placeholder() {
        assert_eq!(entity_to_unicode("#1114112"), "?");
        assert_eq!(entity_to_unicode("#xD800"), "?");
        assert_eq!(entity_to_unicode("#99999999999999999999999"), "?");
    }

    #[test]
    fn test_unknown_and_malformed_unchanged() {
        assert_eq!(entity_to_unicode("bogus"), "&bogus;");
        assert_eq!(entity_to_unicode("#"), "&#;");
        assert_eq!(entity_to_unicode("#12ab"), "&#12ab;");
        assert_eq!(replace_entities("&bogus;", None), "&bogus;");
    }

    #[test]
    fn test_exceptions() {
        let decoder = EntityDecoder::new().with_exceptions(&["amp", "#60"]);
        assert_eq!(decoder.decode("amp"), "&amp;");
        assert_eq!(decoder.decode("#60"), "&#60;");
        assert_eq!(decoder.decode("lt"), "<");
    }

    #[test]
    fn test_replace_entities() {
        assert_eq!(
            replace_entities("Tom &amp; Jerry &#8212; &ldquo;cats&rdquo;", Some(encoding_rs::WINDOWS_1252)),
            "Tom & Jerry \u{2014} \u{201c}cats\u{201d}"
        );
        assert_eq!(replace_entities("no entities", None), "no entities");
    }

    #[test]
    fn test_xml_replace_entities() {
        assert_eq!(
            xml_replace_entities("&lt;b&gt; &amp; &apos;x&quot; &eacute;", None),
            "&lt;b&gt; &amp; &apos;x&quot; é"
        );
    }

    #[test]
    fn test_prepare_string_for_xml() {
        assert_eq!(prepare_string_for_xml("a < b &amp; c", false), "a &lt; b &amp; c");
        assert_eq!(prepare_string_for_xml("&lt;tag&gt;", false), "&lt;tag&gt;");
        assert_eq!(
            prepare_string_for_xml(r#"say "hi" it's"#, true),
            "say &quot;hi&quot; it&apos;s"
        );
        assert_eq!(prepare_string_for_xml("it's", false), "it's");
    }

    #[test]
    fn test_escape_xml_does_not_decode() {
        assert_eq!(escape_xml("&lt;", false), "&amp;lt;");
        assert_eq!(escape_xml("a\"b", true), "a&quot;b");
    }
}
