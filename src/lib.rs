//! # Ticket Triage
//!
//! A retrieval-and-decision core for customer-support ticket pipelines.
//!
//! Ticket Triage ingests a knowledge base of support documents (text,
//! markdown, PDF, scanned images), chunks and embeds them into a local
//! SQLite-backed vector index, and answers incoming tickets by retrieving
//! grounding context, scoring its confidence in that context, and either
//! composing a customer-ready reply or escalating to a human agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │   Corpus     │──▶│   Ingest     │──▶│  SQLite   │
//! │ txt/md/pdf/… │   │ Chunk+Embed  │   │ gen-swap  │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │
//!            ticket ──▶ analyze ──▶ retrieve ─┤
//!                                             ▼
//!                              evaluate ──▶ compose | escalate
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! triage init                          # create database
//! triage ingest                        # build the vector index
//! triage answer "I forgot my password" # process one ticket
//! triage stats                         # inspect the index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`corpus`] | Knowledge-base scanning and categorization |
//! | [`chunker`] | Word-window chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`cache`] | Durable embedding cache |
//! | [`index`] | In-memory vector index with generation swap |
//! | [`ingest`] | Index build pipeline |
//! | [`retrieve`] | Query-time retrieval and reranking |
//! | [`evaluate`] | Confidence scoring and decision policy |
//! | [`respond`] | Reply composition |
//! | [`pipeline`] | End-to-end ticket processing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyze;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod respond;
pub mod retrieve;
pub mod stats;
