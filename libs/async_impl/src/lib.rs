//! A self-draining priority queue consumed by a tokio task.

mod handler;
mod queue;

// region:    --- Exports
pub use handler::{CallbackHandler, Discard, FnHandler, Handler};
pub use queue::Queue;
// endregion: --- Exports
