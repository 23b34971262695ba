//! Record-once, replay-many workflow engine for job applications.
//!
//! A manual run is captured as a [`workflow::WorkflowTemplate`]; later cases
//! that match it are replayed step by step with retries, while the
//! [`governor::RateGovernor`] keeps the pace within daily and spacing limits.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod feed;
pub mod governor;
pub mod matcher;
pub mod orchestrator;
pub mod persistence;
pub mod recorder;
pub mod replay;
pub mod store;
pub mod workflow;
