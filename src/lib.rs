//! # folio
//!
//! Collects a tree of linked HTML files into an e-book document model.
//!
//! Starting from a root document, folio follows local links, adds every
//! referenced document, stylesheet and image to a manifest under a
//! sanitized, unique href, and rewrites the references in the documents and
//! stylesheets to match. The result is a [`Book`]: manifest, spine, table of
//! contents and metadata, ready for an output format to serialize.
//!
//! ## Quick Start
//!
//! ```no_run
//! use folio::{ConvertOptions, convert};
//!
//! let book = convert("site/index.html", &ConvertOptions::default()).unwrap();
//! for (entry, item) in book.spine_items() {
//!     println!("{} {} linear={}", item.id, item.href, entry.linear);
//! }
//! ```
//!
//! An `.opf` package is read as it is, without following links:
//!
//! ```no_run
//! let book = folio::convert("book/content.opf", &Default::default()).unwrap();
//! println!("{}", book.metadata.title);
//! ```
//!
//! ## Building blocks
//!
//! The pieces of the pipeline are usable on their own:
//!
//! - [`links`]: resolve link text against a directory
//! - [`filenames`]: make file names safe for an e-book container
//! - [`entities`]: decode HTML character references
//! - [`html`] and [`css`]: rewrite references with a [`links::LinkHandler`]

pub mod book;
pub mod css;
pub mod entities;
pub mod error;
pub mod filenames;
pub mod html;
pub mod import;
pub mod io;
pub mod links;
pub(crate) mod util;

pub use book::{Book, Manifest, ManifestItem, Metadata, SpineItem, TocEntry};
pub use error::{Error, Result};
pub use import::{ConvertOptions, HtmlInput, convert};
