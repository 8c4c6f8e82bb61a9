//! # Estuary
//!
//! A personal news and reading ingestion platform: RSS/Atom subscriptions,
//! a library of submitted URLs and uploaded documents, and a Gmail-polled
//! newsletter stream, enriched by tiered content extraction and LLM
//! summarization.
//!
//! ## Architecture
//!
//! ```text
//! Feeds / Library / Gmail -> Resolver -> Fetcher -> Extractors -> Store
//!                                                       |
//!                                    Summarizer <- LLM provider -> Clusterer
//! ```
//!
//! - [`feeds`]: RSS/Atom parsing with per-domain rate limiting
//! - [`resolver`]: aggregator URLs (Techmeme, Google News, Reddit, HN)
//!   resolved to their publisher URLs
//! - [`fetch`]: SSRF-validated fetching with JS-render and archive fallbacks
//! - [`extract`]: site-specific extractors plus reader-mode heuristics
//! - [`summarize`]: two-step generate-then-critique summarization
//! - [`store`]: SQLite persistence with an FTS index over article text
//! - [`cache`]: memory + disk tiers fronting every expensive operation

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires together store, cache, fetchers,
/// providers, and the scheduler with explicit dependencies.
pub mod app;

/// Two-tier cache: in-memory LRU in front of a durable on-disk store.
pub mod cache;

/// Command-line interface using clap.
pub mod cli;

/// Topic clustering over article sets.
pub mod cluster;

/// Environment-driven configuration.
pub mod config;

/// Core domain models: feeds, articles, per-user state, notification rules,
/// Gmail configuration, topic history.
pub mod domain;

/// Newsletter email parsing (RFC 822 / MIME).
pub mod email;

/// Site-specific content extractors and shared HTML helpers.
pub mod extract;

/// RSS/Atom feed fetching and normalization.
pub mod feeds;

/// Content fetching: simple fetch, extractor dispatch, and the enhanced
/// fallback cascade (direct, JS render, archive).
pub mod fetch;

/// Gmail newsletter intake over IMAP with XOAUTH2.
pub mod gmail;

/// Library intake: standalone URLs and uploaded documents.
pub mod library;

/// LLM provider abstraction over Anthropic, OpenAI, and Google.
pub mod llm;

/// Notification rules engine, evaluated during ingestion.
pub mod notify;

/// Related-links enrichment via neural search.
pub mod related;

/// Source-URL resolution for news aggregators.
pub mod resolver;

/// Feed refresh scheduling and the ingestion pipeline.
pub mod scheduler;

/// SQLite persistence layer.
pub mod store;

/// LLM-powered article summarization.
pub mod summarize;
