//! Business logic and port definitions for bioflow.
//!
//! This crate defines the "ports" (repository and collaborator traits) that
//! the infrastructure layer implements, the durable event bus, the
//! submission/run saga handlers and the reference resolver. It depends only
//! on `bioflow-types` -- never on `bioflow-infra` or any database/IO crate.

pub mod data_model;
pub mod engine;
pub mod event;
pub mod memory;
pub mod repository;
pub mod resolver;
pub mod run;
pub mod saga;
pub mod service;
pub mod submission;

#[cfg(test)]
pub(crate) mod test_support;
