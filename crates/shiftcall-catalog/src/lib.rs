//! # Shiftcall Catalog
//!
//! Read-through client for the record-system plus caller
//! authentication. Everything else in the workspace that needs
//! worker/provider/shift data goes through the `CatalogClient` trait rather
//! than talking to the record-system directly.

pub mod auth;
pub mod cache;
pub mod client;

pub use auth::{authenticate_by_phone, authenticate_by_pin, AuthOutcome};
pub use cache::{Aged, CachedCatalog};
pub use client::{CatalogClient, HttpCatalogClient};
