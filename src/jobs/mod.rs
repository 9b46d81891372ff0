pub mod manager;

// Re-export common types
pub use manager::{AdapterFactory, JobManager, JobState, JobStatus};
