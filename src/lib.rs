//! sqlpilot - a natural-language SQL assistant for read-only databases.
//!
//! This library exposes the core modules for use in integration tests.

pub mod agent;
pub mod bind;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod safety;
pub mod server;
