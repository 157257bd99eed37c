//! Error types for folio operations.

use thiserror::Error;

/// Errors that can abort a conversion.
///
/// Problems with individual resources (unreadable files, undecodable links,
/// broken stylesheets) never surface here: they are logged and the affected
/// reference is left as it was.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Invalid OPF: {0}")]
    InvalidOpf(String),

    #[error("Duplicate manifest item: {0}")]
    DuplicateItem(String),

    #[error("Missing required element: {0}")]
    MissingElement(String),
}

pub type Result<T> = std::result::Result<T, Error>;
