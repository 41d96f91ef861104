//! Core types and shared functionality for webpaper.
//!
//! This crate provides:
//! - Unified error types
//! - Layered configuration
//! - Data passed between pipeline stages

pub mod article;
pub mod config;
pub mod error;

pub use article::{ExtractedArticle, NormalizedDocument, PageContent};
pub use config::{AppConfig, ConfigError};
pub use error::{Error, ErrorKind};
