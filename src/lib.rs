//! # pdf-rag
//!
//! Upload PDF documents, index them into a vector store, and answer
//! questions with a tool-calling agent that cites the documents it read.
//!
//! ## Architecture
//!
//! ```text
//! POST /upload ──▶ extract ──▶ chunk ──▶ embed ──▶ ┌──────────────┐
//!                                                  │ Vector index │
//!                              ┌─────────────┐     └──────┬───────┘
//! GET /ask ──▶ Agent ◀────────▶│ pdf_retriever│◀──────────┘
//!               │              └─────────────┘
//!               ▼
//!          Chat model (Ollama / OpenAI)
//! ```
//!
//! The catalog of uploaded documents is a JSON flat file owned by
//! [`catalog::DocumentStore`]; chunk vectors live in a [`index::VectorIndex`].
//! Both are held by one [`app::App`] value shared by the HTTP handlers and
//! the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Service-boundary error type |
//! | [`catalog`] | Persistent document catalog |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index backends |
//! | [`llm`] | Chat model backends and messages |
//! | [`tools`] | Agent tools, including the retriever |
//! | [`agent`] | Bounded tool-calling loop |
//! | [`app`] | Application context and ingestion |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |

pub mod agent;
pub mod app;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
mod http;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod server;
pub mod tools;
