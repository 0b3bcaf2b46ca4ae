//! patrologia - turns a hierarchical HTML text corpus into a relational corpus
//!
//! This crate provides:
//! - A rate-limited, retrying page fetcher with cooperative cancellation
//! - Table-of-contents resolution with a synthetic division-probing fallback
//! - Division segmentation, section-role classification, verse/prose
//!   line extraction and footnote-anchor resolution
//! - Deterministic identities and idempotent upserts into REST or SQLite stores

pub mod classify;
pub mod config;
pub mod discover;
pub mod error;
pub mod fetch;
pub mod footnotes;
pub mod html;
pub mod identity;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod report;
pub mod segment;
pub mod store;
pub mod toc;
pub mod verse;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
