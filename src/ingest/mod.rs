//! Ingestion: one cycle over all sources, and the fetch-parse-persist unit
//! it is built from.

mod orchestrator;
mod persist;

pub use orchestrator::{merge_posts, CycleReport, Orchestrator, UnitReport};
pub use persist::{DealStore, SaveOutcome};
