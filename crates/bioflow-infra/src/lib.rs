//! Infrastructure layer for bioflow.
//!
//! Contains implementations of the ports defined in `bioflow-core`: SQLite
//! storage for events, submissions, runs, the workflow catalog and data-model
//! tables, a WES-compatible HTTP engine client, and the config loader.

pub mod config;
pub mod engine;
pub mod sqlite;
