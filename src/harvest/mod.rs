pub mod accumulator;
pub mod parser;
pub mod record;
pub mod retry;
pub mod runner;
pub mod segment;
pub mod slots;
pub mod state;
pub mod view;

// Re-export common types
pub use accumulator::Accumulator;
pub use parser::{CardParser, ParseError, ParserRules};
pub use record::{LinkTarget, OutboundLink, PageRef, ParsedRecord, RecordStatus};
pub use runner::{CompletionReason, Harvester, HarvestRequest, HarvestResult};
pub use segment::{Segment, SegmentDiscoverer};
pub use state::{Checkpoint, HarvestState};
pub use view::{LocatorScheme, RenderView};
