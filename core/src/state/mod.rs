//! Task execution state.
//!
//! `StateManager` is the single owner of every task's status, result and
//! error. Transitions are validated by `StateTransition`; the whole state can
//! be checkpointed to a snapshot file and restored for resumption.

pub mod lock;
pub mod manager;
pub mod snapshot;
pub mod transitions;
pub mod types;

pub use lock::SnapshotLock;
pub use manager::{StateManager, StatusCounts};
pub use snapshot::{StateSnapshot, SNAPSHOT_VERSION};
pub use transitions::StateTransition;
pub use types::{StateEvent, TaskState, TaskStatus};
