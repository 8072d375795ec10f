//! Workflow engine clients.

pub mod wes;

pub use wes::WesEngineClient;
