//! Thread based implementations of [`prio_queue::DrainingQueue`].

mod channel_based;
mod condvar_based;
mod startup;
#[cfg(test)]
mod test;

// region:    --- Exports
pub use channel_based::ChanneledQueue;
pub use condvar_based::CondvarQueue;
// endregion: --- Exports
