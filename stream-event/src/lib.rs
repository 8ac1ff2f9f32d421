//! Wire-level step event types for the Cowork task engine and SSE framing.
//!
//! This crate defines the shape of a single turn's event log: a closed `StepKind` set, the
//! `StepEvent` envelope around it, and `ArtifactEvent` for files produced during a turn. It has
//! no dependency on the engine crate, mirroring the teacher's separation of the wire protocol
//! from the orchestration logic that produces it.

pub mod event;
pub mod sse;

pub use event::{ArtifactEvent, ArtifactKind, StepEvent, StepKind};
pub use sse::to_sse_line;
