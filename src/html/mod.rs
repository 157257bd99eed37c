//! HTML scanning.
//!
//! Documents fed to the collector are arbitrary, often broken HTML. Link
//! rewriting works on the raw text and touches only the attribute values it
//! replaces; text extraction runs a lenient XML reader over the document.

mod links;
mod text;

pub use links::{LINK_ATTRIBUTES, anchor_hrefs, rewrite_links};
pub use text::{DocumentInfo, collapse_whitespace, scan_document};
