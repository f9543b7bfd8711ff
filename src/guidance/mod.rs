pub mod disposal;
pub mod facts;

pub use disposal::{disposal_for_label, DisposalGuide, WasteCategory};
pub use facts::{FactSource, FixedFactSource, RandomFactSource, EDUCATIONAL_FACTS};
