//! # Multi-hop Question Answering
//!
//! Answers questions whose answer needs several linked facts. Each question
//! runs through a fixed pipeline:
//!
//! - **Planner**: classify the question, extract entities and relations, and
//!   decompose it into dependent retrieval sub-tasks
//! - **Hybrid retrieval**: BM25 and dense rankings fused by reciprocal rank
//!   (or min-max normalisation)
//! - **Fact graph**: triples extracted from the evidence and merged into SQLite
//! - **Path reasoning**: shortest connecting paths or single-entity lookups
//! - **Validation**: chain-level confidence gating, plus arithmetic, external
//!   fact and cross-source checks
//! - **Answer synthesis**: a structured [`Answer`] for every question, even on
//!   failure
//!
//! ## Architecture
//!
//! ```text
//! question → Planner → HybridRetriever → FactGraphBuilder → PathReasoner
//!                                              ↓                 ↓
//!                                       SQLite (triples)   ChainValidator → Answer
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use multihop_reasoning::{Config, MultiHopPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let corpus = vec!["Albert Einstein worked at Princeton University.".to_string()];
//!     let pipeline = MultiHopPipeline::from_config(&config, corpus).await?;
//!     let answer = pipeline
//!         .process_question("q1", "Where did Albert Einstein work?")
//!         .await;
//!     println!("{}", answer.answer);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Command-line subcommands.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Entity, relation and triple extraction.
pub mod extraction;
/// Fact-graph construction.
pub mod graph;
/// Langbase client used as the text-completion service.
pub mod langbase;
/// Question orchestration and answer output.
pub mod pipeline;
/// Question parsing and decomposition.
pub mod planner;
/// System prompts for the completion service.
pub mod prompts;
/// Path reasoning over the fact graph.
pub mod reasoning;
/// Hybrid lexical and dense retrieval.
pub mod retrieval;
/// Timeout and backoff policy for external calls.
pub mod retry;
/// SQLite storage for the fact graph.
pub mod storage;
/// Validation of computations, facts and reasoning chains.
pub mod validation;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{Answer, MultiHopPipeline};
