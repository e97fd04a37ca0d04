//! # semidex
//!
//! A self-hosted document ingestion and semantic retrieval pipeline.
//!
//! semidex turns uploaded documents into a queryable vector index: text is
//! extracted, split into bounded overlapping segments, embedded with a
//! fixed sentence-embedding model, and upserted into a SQLite-backed
//! vector store. Questions are embedded with the same model and answered
//! with the top-K most similar passages.
//!
//! ## Architecture
//!
//! ```text
//! arrival event ──▶ extract ──▶ chunk ──▶ embed ──▶ index writer
//!                                (fan-out over segments)
//!
//! question ──▶ embed ──▶ similarity search ──▶ ranked passages
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sdx init                        # create the index database
//! sdx ingest ./docs               # ingest a file or directory
//! sdx query "how do we deploy?"   # retrieve relevant passages
//! sdx status ./docs/runbook.pdf   # indexed / partial / empty
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and fail-fast validation |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from PDF/OOXML/plain bytes |
//! | [`chunk`] | Overlapping text segmentation |
//! | [`embedding`] | Embedder trait, backends, vector utilities |
//! | [`index`] | Vector index trait and SQLite implementation |
//! | [`ingest`] | Per-document ingestion orchestration |
//! | [`query`] | Top-K passage retrieval |
//! | [`error`] | Pipeline error taxonomy |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod query;
