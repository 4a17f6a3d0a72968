use std::cmp::Ordering;

/// Priority assigned to items that are pushed without an explicit one.
pub const DEFAULT_PRIORITY: u64 = 0;

/// Direction in which the priority key is evaluated. Fixed for the lifetime of a queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum Order {
    /// Lowest priority value is delivered first.
    #[default]
    #[strum(ascii_case_insensitive, to_string = "ascending", serialize = "asc")]
    Ascending,
    /// Highest priority value is delivered first.
    #[strum(ascii_case_insensitive, to_string = "descending", serialize = "desc")]
    Descending,
}

impl Order {
    /// Compares two priorities so that [`Ordering::Greater`] means `a` should leave the queue
    /// before `b`.
    pub fn compare(self, a: u64, b: u64) -> Ordering {
        match self {
            Order::Ascending => b.cmp(&a),
            Order::Descending => a.cmp(&b),
        }
    }

    /// Returns true if priority `a` is strictly better than `b`.
    pub fn prefers(self, a: u64, b: u64) -> bool {
        self.compare(a, b) == Ordering::Greater
    }
}

/// A value held by the queue together with its heap bookkeeping.
#[derive(Debug)]
pub struct Item<T> {
    pub(crate) value: T,
    pub(crate) priority: u64,
    /// Insertion sequence, used to hand out equal priorities first-in first-out.
    pub(crate) seq: u64,
    /// Position inside the backing vector. `None` once the item left the heap.
    pub(crate) index: Option<usize>,
}

impl<T> Item<T> {
    pub(crate) fn new(value: T, priority: u64, seq: u64) -> Self {
        Self {
            value,
            priority,
            seq,
            index: None,
        }
    }

    pub fn priority(&self) -> u64 {
        self.priority
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Discards the wrapper and hands out the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Ranks `self` against `other` under `order`: [`Ordering::Greater`] means `self` is
    /// delivered first. On equal priority, the earlier insertion wins.
    pub(crate) fn rank(&self, other: &Self, order: Order) -> Ordering {
        order
            .compare(self.priority, other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::{Item, Order};
    use std::{cmp::Ordering, str::FromStr};

    #[test]
    fn ascending_prefers_lower_priority() {
        assert!(Order::Ascending.prefers(1, 5));
        assert!(!Order::Ascending.prefers(5, 1));
        assert!(!Order::Ascending.prefers(3, 3));
    }

    #[test]
    fn descending_prefers_higher_priority() {
        assert!(Order::Descending.prefers(5, 1));
        assert!(!Order::Descending.prefers(1, 5));
        assert!(!Order::Descending.prefers(3, 3));
    }

    /// On equal priority, the earlier insertion ranks higher regardless of the order policy.
    #[test]
    fn rank_breaks_ties_by_sequence() {
        let early = Item::new("early", 7, 1);
        let late = Item::new("late", 7, 2);

        for order in [Order::Ascending, Order::Descending] {
            assert_eq!(early.rank(&late, order), Ordering::Greater);
            assert_eq!(late.rank(&early, order), Ordering::Less);
        }
    }

    #[test]
    fn parse_order() {
        assert_eq!(Order::from_str("ASC").unwrap(), Order::Ascending);
        assert_eq!(Order::from_str("descending").unwrap(), Order::Descending);
        assert!(Order::from_str("sideways").is_err());
        assert_eq!(Order::default(), Order::Ascending);
    }

    #[test]
    fn new_item_has_no_position() {
        let item = Item::new((), 0, 0);
        assert_eq!(item.index(), None);
        assert_eq!(item.priority(), 0);
    }
}
