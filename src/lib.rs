//! # corpus-qa
//!
//! A retrieval-augmented question answering engine for local document
//! collections.
//!
//! corpus-qa ingests a folder of documents (plaintext, markdown, PDF, CSV),
//! chunks and embeds them into a flat vector index, and answers questions
//! by retrieving the most similar chunks and handing them — together with
//! recent conversation history — to a pluggable generation backend. Every
//! query/answer cycle is audited, and retrieval quality can be scored
//! against a labeled benchmark.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌─────────────┐
//! │  Documents │──▶│ Extract +   │──▶│ VectorIndex │
//! │ txt/md/pdf │   │ Chunk+Embed │   │ (flat, IP)  │
//! │    /csv    │   └─────────────┘   └──────┬──────┘
//! └───────────┘                             │ top-k
//!                                           ▼
//!              ┌──────────┐   ┌────────┐   ┌──────────┐
//!   question ─▶│ Retriever │──▶│ Prompt │──▶│ Generator │─▶ answer
//!              │ + filter  │   │ +memory│   │ local/API │     │
//!              └──────────┘   └────────┘   └──────────┘     ▼
//!                                                      ┌──────────┐
//!                                                      │ AuditLog │
//!                                                      │ JSON+CSV │
//!                                                      └──────────┘
//! ```
//!
//! ## Quick start
//!
//! ```bash
//! cqa ingest                          # build the index from [docs].root
//! cqa ask "what is a neural network"  # retrieve + generate
//! cqa ask "..." --source-type pdf --date-after 2024-01-01
//! cqa chat                            # interactive, with conversation memory
//! cqa eval benchmark.json -k 5        # recall / precision / F1 @ k
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-format text extraction |
//! | [`chunk`] | Overlapping word-window chunking |
//! | [`index`] | Flat inner-product vector index |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retriever`] | Corpus ownership, ingestion, filtered query |
//! | [`memory`] | Conversation memory |
//! | [`prompt`] | Deterministic prompt assembly |
//! | [`generate`] | Generation backend abstraction |
//! | [`audit`] | JSON + CSV audit logging |
//! | [`eval`] | Retrieval-quality metrics |
//! | [`pipeline`] | End-to-end orchestration |

pub mod audit;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod eval;
pub mod extract;
pub mod generate;
pub mod index;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
