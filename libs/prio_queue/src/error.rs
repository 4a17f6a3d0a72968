/// Errors surfaced by [`DrainingQueue`](crate::DrainingQueue) implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was stopped; the pushed value was dropped.
    #[error("queue has been stopped")]
    Stopped,
}

pub type QueueResult<T> = Result<T, QueueError>;
