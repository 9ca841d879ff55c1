//! Policy-aware FIFO of buffer slots.

use std::collections::VecDeque;

use rivulet_core::policy::OverflowPolicy;

/// Outcome of inserting into a `SlotQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// Full under `Drop`: the incoming item was discarded.
    Dropped,
    /// Full under `Latest`: the newest queued item was evicted for the incoming one.
    Replaced,
    /// Full under `Error`/`Missing`: the caller must terminate the stage.
    Overflow,
}

pub struct SlotQueue<T> {
    items: VecDeque<T>,
    policy: OverflowPolicy,
    bound: Option<usize>,
}

impl<T> SlotQueue<T> {
    pub fn new(policy: OverflowPolicy, capacity: usize) -> Self {
        let bound = policy.bound(capacity);
        Self {
            items: VecDeque::with_capacity(bound.unwrap_or(capacity).min(capacity)),
            policy,
            bound,
        }
    }

    /// Insert `item`. `headroom` is the number of queued items already covered
    /// by downstream demand; those do not count against the bound because the
    /// drain loop is about to deliver them.
    pub fn offer(&mut self, item: T, headroom: usize) -> Offer {
        let Some(bound) = self.bound else {
            self.items.push_back(item);
            return Offer::Accepted;
        };
        if self.items.len() < bound.saturating_add(headroom) {
            self.items.push_back(item);
            return Offer::Accepted;
        }
        match self.policy {
            OverflowPolicy::Drop => Offer::Dropped,
            OverflowPolicy::Latest => {
                self.items.pop_back();
                self.items.push_back(item);
                Offer::Replaced
            }
            OverflowPolicy::Error | OverflowPolicy::Missing => Offer::Overflow,
            OverflowPolicy::Buffer => {
                self.items.push_back(item);
                Offer::Accepted
            }
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// `None` when the queue is unbounded.
    pub fn bound(&self) -> Option<usize> {
        self.bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(q: &mut SlotQueue<u32>, upto: u32) -> Vec<Offer> {
        (1..=upto).map(|i| q.offer(i, 0)).collect()
    }

    #[test]
    fn drop_keeps_the_oldest() {
        let mut q = SlotQueue::new(OverflowPolicy::Drop, 4);
        let offers = fill(&mut q, 6);
        assert_eq!(offers[4], Offer::Dropped);
        let kept: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(kept, vec![1, 2, 3, 4]);
    }

    #[test]
    fn latest_keeps_the_newest_in_one_slot() {
        let mut q = SlotQueue::new(OverflowPolicy::Latest, 128);
        fill(&mut q, 300);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), Some(300));
    }

    #[test]
    fn error_reports_overflow_past_capacity() {
        let mut q = SlotQueue::new(OverflowPolicy::Error, 3);
        let offers = fill(&mut q, 4);
        assert_eq!(&offers[..3], &[Offer::Accepted; 3]);
        assert_eq!(offers[3], Offer::Overflow);
    }

    #[test]
    fn headroom_defers_overflow() {
        let mut q = SlotQueue::new(OverflowPolicy::Error, 2);
        assert_eq!(q.offer(1, 1), Offer::Accepted);
        assert_eq!(q.offer(2, 1), Offer::Accepted);
        assert_eq!(q.offer(3, 1), Offer::Accepted);
        assert_eq!(q.offer(4, 1), Offer::Overflow);
    }

    #[test]
    fn buffer_is_unbounded() {
        let mut q = SlotQueue::new(OverflowPolicy::Buffer, 2);
        assert!(fill(&mut q, 1000).iter().all(|o| *o == Offer::Accepted));
        assert_eq!(q.bound(), None);
    }
}
