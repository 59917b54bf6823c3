//! Built-in engine observers: console text, JSONL event log, progress bar.

mod jsonl;
mod progress;
mod text;

pub use jsonl::JsonlEventsObserver;
pub use progress::ProgressObserver;
pub use text::TextRendererObserver;
