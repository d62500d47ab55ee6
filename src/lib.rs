//! Metadata enrichment for paperless-ngx documents.
//!
//! A polling worker picks up documents carrying a pipeline tag, asks a
//! language model for title, tags, correspondent, document type and date,
//! and writes the reconciled result back. An HTTP front-end exposes the
//! same operations for manual review.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod testing;
