//! API handlers module

pub mod auth;
pub mod books;
pub mod genres;
pub mod health;
pub mod library;
