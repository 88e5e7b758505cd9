//! # qgd - source-code grep accelerator
//!
//! qgd preprocesses a project tree into a single compact, compressed,
//! indexed data file, then answers regular-expression queries against that
//! file far faster than a scan of the original tree.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`store`] - Chunked store building and reading (packer, on-disk format)
//! - [`query`] - Query execution (parallel decompression + scan, ordered output)
//! - [`output`] - Search options and match line formatting
//! - [`utils`] - Utility functions (bloom index, encoding, config, progress)
//!
//! ## Quick Start
//!
//! ```ignore
//! use qgd::output::SearchOptions;
//! use qgd::query::search_project;
//! use qgd::store::build_project;
//! use std::path::Path;
//!
//! // Pack a project tree into <project>.qgd
//! build_project(Path::new("/path/to/code"))?;
//!
//! // Run a query against the packed store
//! let options = SearchOptions::new().with(SearchOptions::IGNORE_CASE);
//! search_project(Path::new("/path/to/code"), "fn main", options, std::io::stdout().lock())?;
//! ```
//!
//! ## Data flow
//!
//! Build: file bytes -> UTF-8 normalize -> EOL normalize -> packer queue ->
//! chunk materialization -> bloom index -> LZ4 -> file stream.
//!
//! Query: file stream -> chunk header + compressed payload -> worker pool ->
//! (decompress -> scan -> format) -> ordered emitter -> terminal.

pub mod output;
pub mod query;
pub mod store;
pub mod utils;
