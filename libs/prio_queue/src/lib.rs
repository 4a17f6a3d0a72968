//! Core building blocks for self-draining priority queues: the indexed heap primitive, the
//! ordering policy and the [`DrainingQueue`] contract that every implementation fulfills.

mod cfg;
mod error;
mod heap;
mod item;
mod queue;
#[cfg(feature = "suite")]
pub mod suite;

// region:    --- Exports
pub use cfg::Cfg;
pub use error::{QueueError, QueueResult};
pub use heap::IndexedHeap;
pub use item::{DEFAULT_PRIORITY, Item, Order};
pub use queue::{Callback, DrainingQueue, deliver};
// endregion: --- Exports
