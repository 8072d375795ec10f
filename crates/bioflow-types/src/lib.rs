//! Shared domain types for bioflow.
//!
//! This crate contains the domain types used across the submission pipeline:
//! events, submissions, runs, tasks, workflows, data-model tables, engine
//! DTOs, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod data_model;
pub mod engine;
pub mod error;
pub mod event;
pub mod run;
pub mod submission;
pub mod workflow;
