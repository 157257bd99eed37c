//! Input plugins: a tree of HTML files, or an OPF package.
//!
//! [`HtmlInput::convert`] picks the plugin from the input's extension and
//! returns the assembled [`Book`].

mod filelist;
mod html;
mod metadata;
mod opf;
mod registry;
mod toc;

pub use filelist::{FileEntry, get_filelist};
pub use html::Conversion;
pub use metadata::{
    HtmlMetadataReader, MetadataReader, UNKNOWN, UUID_ID, add_uuid, apply_defaults, merge_metadata,
    metadata_from_filename, split_authors,
};
pub use opf::{OpfItem, OpfPackage, parse_ncx, parse_opf, read_opf};
pub use registry::{Registration, ResourceAdder, ResourceRegistry};
pub use toc::{UNLABELED, build_toc};

use std::path::Path;

use crate::book::Book;
use crate::error::{Error, Result};

/// Extensions accepted as HTML input.
pub const HTML_EXTENSIONS: &[&str] = &["html", "htm", "xhtml", "xhtm", "shtm", "shtml"];

/// Options controlling a conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// List linked files breadth first instead of depth first.
    pub breadth_first: bool,
    /// Maximum number of links to follow away from the root document.
    pub max_levels: usize,
    /// Leave the input unpackaged. Only OPF input supports this.
    pub dont_package: bool,
    /// Encoding of the input documents, overriding anything they declare.
    pub input_encoding: Option<String>,
    /// Language used when the input does not declare one.
    pub language: Option<String>,
    /// Authors used when the input names none, separated by `&`.
    pub authors: Option<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            breadth_first: false,
            max_levels: 5,
            dont_package: false,
            input_encoding: None,
            language: None,
            authors: None,
        }
    }
}

/// Entry point for converting an HTML file or an OPF package.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlInput;

impl HtmlInput {
    /// Convert the file at `path`.
    ///
    /// `.opf` files are read as packages. Anything else is treated as the
    /// root of a tree of HTML files; that requires packaging, so
    /// `dont_package` is rejected.
    pub fn convert(&self, path: &Path, options: &ConvertOptions) -> Result<Book> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if extension == "opf" {
            return read_opf(path, options);
        }
        if options.dont_package {
            return Err(Error::UnsupportedConfiguration(
                "HTML input must be packaged; --dont-package only applies to OPF input".into(),
            ));
        }
        if !HTML_EXTENSIONS.contains(&extension.as_str()) {
            log::debug!("Treating {} as HTML", path.display());
        }
        Conversion::new(options).run(path)
    }
}

/// Convert the file at `path` with [`HtmlInput`].
pub fn convert(path: impl AsRef<Path>, options: &ConvertOptions) -> Result<Book> {
    HtmlInput.convert(path.as_ref(), options)
}
