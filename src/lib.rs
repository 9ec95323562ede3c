//! # Question RAG
//!
//! Ingestion and retrieval pipeline for a bank of teacher-entered exam
//! questions.
//!
//! Raw question metadata is normalized, rendered into a tagged-block text
//! corpus, uploaded to object storage and imported into a managed retrieval
//! corpus. Retrieval tools query that corpus and parse the tags back out of
//! the hits, so an agent host can search questions by text, by concept or by
//! identifier.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌─────────────┐   ┌────────────┐
//! │ input JSON │──▶│ Normalizer │──▶│ Corpus text │──▶│ Blob store │
//! └────────────┘   └────────────┘   └─────────────┘   └─────┬──────┘
//!                                                            │ import
//!                                                            ▼
//!                  ┌──────────┐      ┌───────────┐     ┌────────────┐
//!                  │ CLI/HTTP │─────▶│ Retriever │────▶│   Corpus   │
//!                  └──────────┘      └───────────┘     └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! qrag ingest                       # normalize, build, upload, import
//! qrag search "strategic risks"     # free-text search
//! qrag concept Partnerships         # questions tagged with a concept
//! qrag get q_001                    # one question by id
//! qrag serve                        # HTTP tool host for the agent
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Typed domain errors |
//! | [`models`] | Core data types |
//! | [`input`] | Input document loading |
//! | [`normalize`] | Metadata normalization |
//! | [`corpus_text`] | Tagged-block corpus format (build + parse) |
//! | [`traits`] | Blob store, corpus service and tool traits |
//! | [`blob_fs`] / [`blob_s3`] | Blob store backends |
//! | [`corpus_local`] / [`corpus_vertex`] | Corpus backends |
//! | [`memory`] | In-memory backends |
//! | [`ingest`] | Ingestion driver |
//! | [`progress`] | Ingestion progress reporting |
//! | [`retrieval`] | Retrieval adapters |
//! | [`agent`] | Agent profile |
//! | [`server`] | HTTP tool host |

pub mod agent;
pub mod blob_fs;
pub mod blob_s3;
pub mod config;
pub mod corpus_local;
pub mod corpus_text;
pub mod corpus_vertex;
pub mod error;
pub mod ingest;
pub mod input;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod retrieval;
pub mod server;
pub mod traits;
