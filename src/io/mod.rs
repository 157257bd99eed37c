//! Read access to the files a book is assembled from.

mod container;

pub use container::{Container, DirContainer, MemoryContainer, quote_href, unquote_href};
