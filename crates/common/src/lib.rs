//! Bookshelf Common Library
//!
//! Shared code for the Bookshelf services including:
//! - Configuration management
//! - Error types and handling
//! - Catalog and identity models
//! - Hosted platform clients (identity, documents, blobs)
//! - Session holder and request authentication
//! - Book catalog facade
//! - Open Library client
//! - Metrics and observability

pub mod auth;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod openlibrary;
pub mod platform;
pub mod session;

// Re-export commonly used types
pub use auth::CurrentSession;
pub use catalog::BookService;
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use openlibrary::OpenLibraryClient;
pub use platform::Platform;
pub use session::SessionHolder;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
