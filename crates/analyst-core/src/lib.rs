// crates/analyst-core/src/lib.rs
// ============================================================================
// Module: Analyst Core Library
// Description: Public API surface for the analyst refresh engine core.
// Purpose: Expose run models, pure quality and anomaly rules, and run events.
// Dependencies: crate::{core, events}
// ============================================================================

//! ## Overview
//! Analyst core holds the backend-agnostic half of the refresh engine:
//! identifiers, run lifecycle types, dead-letter and quality report models,
//! zero-tolerance quality assessment, anomaly rules, and structured run
//! events. Persistence lives in `analyst-store-sqlite`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod events;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use events::EventLevel;
pub use events::FileRunEventSink;
pub use events::MemoryRunEventSink;
pub use events::NoopRunEventSink;
pub use events::RunEvent;
pub use events::RunEventSink;
pub use events::StderrRunEventSink;
