//! Engine events, observers and cooperative control.
//!
//! One [`ObserverRegistry`] belongs to one engine. Observers are called
//! synchronously on the engine task, so a slow observer stalls the run.

pub mod control;
pub mod events;
pub mod registry;

pub use control::{EngineControl, EngineState};
pub use events::EngineEvent;
pub use registry::{ControlRequest, EngineObserver, ObserverRegistry};
