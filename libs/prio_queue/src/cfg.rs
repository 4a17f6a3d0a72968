use crate::Order;

/// Construction parameters shared by all queue implementations.
#[derive(Debug, Clone)]
pub struct Cfg {
    /// Delivery order of the queue. Cannot be changed after start.
    pub order: Order,
    /// Initial capacity of the backing heap. It grows as needed.
    /// # Note
    /// The queue is never capped, producers do not observe back pressure.
    pub capacity: usize,
    /// Name given to the background consumer thread, where the implementation uses one.
    pub thread_name: String,
}

impl Default for Cfg {
    fn default() -> Self {
        Self {
            order: Order::default(),
            capacity: 0,
            thread_name: "prio-queue-consumer".to_string(),
        }
    }
}

impl Cfg {
    pub fn with_order(order: Order) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }
}
