use crate::item::{Item, Order};

/// Binary heap over a plain vector. Each [`Item`] records its own position, which is kept equal
/// to its offset in `items` across every swap.
///
/// The root is the best item according to the [`Order`] chosen at construction; items of equal
/// priority leave in insertion order.
#[derive(Debug)]
pub struct IndexedHeap<T> {
    items: Vec<Item<T>>,
    order: Order,
    next_seq: u64,
}

impl<T> IndexedHeap<T> {
    pub fn new(order: Order) -> Self {
        Self::with_capacity(order, 0)
    }

    pub fn with_capacity(order: Order, capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            order,
            next_seq: 0,
        }
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn peek(&self) -> Option<&Item<T>> {
        self.items.first()
    }

    /// Wraps `value` into an [`Item`] and restores the heap property by sifting it up.
    pub fn push(&mut self, value: T, priority: u64) {
        let mut item = Item::new(value, priority, self.next_seq);
        self.next_seq = self.next_seq.wrapping_add(1);

        let pos = self.items.len();
        item.index = Some(pos);
        self.items.push(item);
        self.sift_up(pos);
    }

    /// Removes the root. The returned item no longer carries a position.
    pub fn pop(&mut self) -> Option<Item<T>> {
        let last = self.items.len().checked_sub(1)?;
        self.swap(0, last);
        let mut item = self.items.pop()?;
        item.index = None;
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(item)
    }

    /// Empties the heap and returns the removed items in storage order, not priority order.
    pub fn take_all(&mut self) -> Vec<Item<T>> {
        let mut items = std::mem::take(&mut self.items);
        for item in &mut items {
            item.index = None;
        }
        items
    }

    fn better(&self, i: usize, j: usize) -> bool {
        self.items[i].rank(&self.items[j], self.order).is_gt()
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.items.swap(i, j);
        self.items[i].index = Some(i);
        self.items[j].index = Some(j);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.better(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.better(right, left) {
                right
            } else {
                left
            };
            if !self.better(child, pos) {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        for (pos, item) in self.items.iter().enumerate() {
            assert_eq!(item.index, Some(pos), "stale index at {pos}");
            if pos > 0 {
                let parent = (pos - 1) / 2;
                assert!(
                    !self.better(pos, parent),
                    "child {pos} ranks above parent {parent}"
                );
            }
        }
    }
}
