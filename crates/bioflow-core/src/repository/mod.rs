pub mod event;
pub mod run;
pub mod submission;
pub mod task;
pub mod workflow;
