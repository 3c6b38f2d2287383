//! Lending Ledger
//!
//! Inventory engine for a lending library: members, titles with a finite
//! number of copies, and the loans linking them. The engine keeps
//! `available + outstanding loans == total copies` true for every book, even
//! with many callers racing on the same store. An HTTP adapter exposes it as a
//! REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<services::Services>,
}
