//! Bounded FIFO replay memory for the value network agent

use std::collections::VecDeque;

use rand::Rng;

use super::agent::Transition;

/// Fixed-capacity transition memory; the oldest entry is evicted on overflow
#[derive(Debug, Clone)]
pub struct ReplayMemory {
    transitions: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            transitions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.transitions.len() >= self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    /// Draw `batch_size` distinct transitions
    ///
    /// Returns an empty batch when the memory holds fewer than `batch_size`.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<Transition> {
        if self.transitions.len() < batch_size {
            return Vec::new();
        }
        rand::seq::index::sample(rng, self.transitions.len(), batch_size)
            .into_iter()
            .map(|i| self.transitions[i])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the bound, dropping the oldest transitions that no longer fit
    pub fn set_capacity(&mut self, capacity: usize) {
        while self.transitions.len() > capacity {
            self.transitions.pop_front();
        }
        self.capacity = capacity;
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn transition(tag: usize) -> Transition {
        Transition {
            state: [tag as f32, 0.0, 0.0, 0.0],
            action: tag % 2,
            reward: tag as f32,
            next_state: [tag as f32 + 1.0, 0.0, 0.0, 0.0],
            done: false,
        }
    }

    #[test]
    fn test_evicts_oldest_on_overflow() {
        let mut memory = ReplayMemory::new(3);
        for i in 0..5 {
            memory.push(transition(i));
        }
        assert_eq!(memory.len(), 3);

        let mut rng = StdRng::seed_from_u64(0);
        let mut rewards: Vec<f32> = memory
            .sample(3, &mut rng)
            .iter()
            .map(|t| t.reward)
            .collect();
        rewards.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut memory = ReplayMemory::new(100);
        for i in 0..50 {
            memory.push(transition(i));
        }
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let mut tags: Vec<i64> = memory
                .sample(32, &mut rng)
                .iter()
                .map(|t| t.reward as i64)
                .collect();
            tags.sort_unstable();
            tags.dedup();
            assert_eq!(tags.len(), 32);
        }
    }

    #[test]
    fn test_underflow_is_empty_batch() {
        let mut memory = ReplayMemory::new(10);
        memory.push(transition(0));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(memory.sample(4, &mut rng).is_empty());

        memory.clear();
        assert!(memory.is_empty());
    }

    #[test]
    fn test_shrinking_capacity_keeps_newest() {
        let mut memory = ReplayMemory::new(5);
        for i in 0..5 {
            memory.push(transition(i));
        }

        memory.set_capacity(2);
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.capacity(), 2);
        let rewards: Vec<f32> = memory.transitions.iter().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![3.0, 4.0]);

        memory.push(transition(5));
        assert_eq!(memory.len(), 2);

        memory.set_capacity(4);
        memory.push(transition(6));
        assert_eq!(memory.len(), 3);
    }
}
