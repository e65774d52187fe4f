//! # DocVault
//!
//! A self-hosted document archive with text extraction and Q&A.
//!
//! DocVault ingests PDFs and images into a local SQLite-backed store,
//! extracts their text in the background (native PDF text with an OCR
//! fallback for scans), and exposes tag-aware listing, substring search,
//! and per-document question answering via a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Extraction  │──▶│  SQLite   │
//! │ PDF/IMG  │   │ pdf / OCR   │   │  + files  │
//! └──────────┘   └─────────────┘   └────┬─────┘
//!                                       │
//!                   ┌───────────────────┤
//!                   ▼                   ▼
//!              ┌──────────┐       ┌──────────┐
//!              │   CLI    │       │   HTTP   │
//!              │   (dv)   │       │  (axum)  │
//!              └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dv init                        # create database
//! dv upload report.pdf --tags finance,q3
//! dv list --tag finance
//! dv search "revenue"
//! dv ask <id> "What was the total?"
//! dv serve                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Domain error taxonomy |
//! | [`ingest`] | Upload validation and background extraction |
//! | [`extract`] | PDF text extraction and OCR |
//! | [`chunk`] | Paragraph-based text chunking |
//! | [`store`] | Document store (listing, search, updates) |
//! | [`qa`] | Q&A sessions over extracted text |
//! | [`answer`] | Hosted answer engine (OpenAI) |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod qa;
pub mod server;
pub mod store;
