//! Passive developer memory.
//!
//! MemoryPilot watches local developer activity (git commits, source file
//! edits, shell commands), batches the captured events and asks a language
//! model to extract durable memories from them: decisions, patterns, facts,
//! preferences, mistakes and learnings. Memories carry an importance score
//! that grows each time they are recalled and decays while they sit unused.
//! Stored memories are served to AI assistants over
//! [MCP](https://modelcontextprotocol.io/) and to people on the command line.
//!
//! # Architecture
//!
//! - **Producers** ([`watcher`]): independent tasks submitting events to a
//!   bounded queue that drops the newest event when full
//! - **Pipeline** ([`pipeline`]): a single dispatcher batching events by size
//!   and by time, and a daily decay scheduler
//! - **Gateways** ([`extraction`], [`embedding`]): Ollama-backed or disabled,
//!   failures degrade to "no result"
//! - **Storage** ([`db`], [`memory`]): SQLite with
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec) for cosine similarity
//! - **Surfaces** ([`service`], [`tools`], [`cli`]): recall, remember, status
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`agent`]: worker startup and ordered shutdown

pub mod agent;
pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod memory;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod tools;
pub mod watcher;
