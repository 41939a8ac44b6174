//! # Ragbase
//!
//! A knowledge-base engine for retrieval-augmented generation.
//!
//! Ragbase ingests documents into owned, shareable collections, splits them
//! into boundary-aware overlapping chunks, embeds them through an external
//! inference backend, and answers queries by ranking chunks with a hybrid
//! vector+keyword score behind a per-caller authorization model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌──────────┐
//! │ Documents │──▶│    Pipeline       │──▶│  SQLite   │
//! │ txt / md  │   │ Chunk+Embed      │   │ chunks+vec│
//! └──────────┘   └──────────────────┘   └────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │  (rag)   │       │  (JSON)  │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                                   # create database
//! rag kb create manuals --owner alice       # create a collection
//! rag add <kb-id> notes.txt --caller alice  # ingest a document
//! rag search "shutdown sequence" --kb <kb-id> --caller alice
//! rag serve                                  # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunker`] | Boundary-aware text chunking |
//! | [`keywords`] | Lexical keyword scoring |
//! | [`embedding`] | Embedding provider abstraction + degradation policy |
//! | [`access`] | Per-caller collection authorization |
//! | [`collections`] | Collection and share-grant management |
//! | [`extract`] | Plain-text extraction boundary |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`retrieve`] | Hybrid vector+keyword retrieval |
//! | [`context`] | Context assembly and citations |
//! | [`server`] | HTTP JSON API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod access;
pub mod chunker;
pub mod collections;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod keywords;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod server;
