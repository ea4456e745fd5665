//! Domain models
//!
//! Catalog records and identity shapes, plus the conversion boundary
//! between raw store documents and typed records.

mod account;
mod book;

pub use account::{Session, User};
pub use book::{
    catalog_genre, is_catalog_genre, Book, BookDocument, BookFields, BookPatch, CoverUpload, DocumentList,
    NewBook, CATALOG_GENRES,
};
