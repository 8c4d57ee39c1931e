//! # docqa
//!
//! A single-session document question-answering tool.
//!
//! docqa loads one document (PDF, Word, Excel, plain text, or slide deck),
//! extracts and chunks its text, embeds the chunks into an in-memory vector
//! index, and answers natural-language questions by retrieving the
//! top-matching chunks and sending them together with the question to a
//! hosted LLM as an "answer only from the given context" request.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌──────────────┐
//! │ Extractor │──▶│ Chunker │──▶│ VectorIndex  │
//! │ pdf/ooxml │   │ overlap │   │ embed+cosine │
//! └───────────┘   └─────────┘   └──────┬───────┘
//!                                      │ top-k
//!                               ┌──────▼───────┐
//!                               │   Session    │──▶ hosted LLM
//!                               │ state+cache  │
//!                               └──────────────┘
//! ```
//!
//! One document is live at a time. Loading a file with a new name tears
//! down the previous index and answer cache before any processing begins;
//! re-loading the same name is a no-op. Answers are cached per
//! (question, retrieved context) pair for the lifetime of the session —
//! nothing is persisted.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and API-key lookup |
//! | [`extract`] | Multi-format text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index and top-k retrieval |
//! | [`answer`] | Prompt assembly and the hosted LLM client |
//! | [`session`] | Session state machine and answer cache |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod session;
