//! Issuedex - a searchable, permission-scoped projection of issue records.
//!
//! The record store owns issues. The document store holds a denormalized,
//! query-optimized copy that the sync coordinator keeps current, plus the
//! project and permission documents that scope every search.
//!
//! # Architecture
//!
//! - [`model`] - Issue records, issue documents, permission grants
//! - [`storage`] - SQLite record store, document store, filter compiler
//! - [`index`] - Collections, issue and permission indexes, authorization filters
//! - [`sync`] - Watermarked bootstrap/incremental sync and its scheduler
//! - [`config`] - Settings and database path resolution
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
