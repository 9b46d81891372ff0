pub mod adapter;
pub mod cli;
pub mod harvest;
pub mod jobs;
pub mod utils;

// Re-export the types most callers need
pub use adapter::{AdapterError, Locator, RenderAdapter};
pub use harvest::runner::{CompletionReason, Harvester, HarvestRequest, HarvestResult};
pub use harvest::state::Checkpoint;
