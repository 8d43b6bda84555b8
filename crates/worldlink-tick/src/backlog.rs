use std::collections::VecDeque;

/// FIFO of deferred work applied a bounded amount at a time.
///
/// Items are applied strictly in the order they were pushed, across as
/// many ticks as the budget requires.
#[derive(Debug)]
pub struct Backlog<T> {
    items: VecDeque<T>,
}

impl<T> Backlog<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.extend(items);
    }

    /// Applies up to `budget` items in order and returns how many ran.
    pub fn drain_budget(&mut self, budget: usize, mut apply: impl FnMut(T)) -> usize {
        let n = budget.min(self.items.len());
        for item in self.items.drain(..n) {
            apply(item);
        }
        n
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Backlog<T> {
    fn default() -> Self {
        Self::new()
    }
}
