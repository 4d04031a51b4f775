pub mod classifier;
pub mod collector;
pub mod config;
pub mod error;
pub mod http;
pub mod report;
pub mod rules;
pub mod task_id;
pub mod taskcluster;
pub mod treeherder;
pub mod types;

pub use error::{Result, TriageError};
