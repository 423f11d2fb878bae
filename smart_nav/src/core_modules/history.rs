// THEORY:
// `HistoryBuffer` is the one sliding window used for every signal the vehicle
// remembers: lane direction, obstacle flags, sign flags, chosen actions and raw
// decisions. It keeps the last `capacity` observations, evicting the oldest on
// overflow, and can report the majority value of what it holds.

use std::collections::VecDeque;

/// Result of a majority vote over a `HistoryBuffer`.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote<T> {
    /// The winning value.
    pub value: T,
    /// How many entries hold the winning value.
    pub count: usize,
    /// `count / len`, in `(0, 1]`.
    pub confidence: f64,
}

/// Fixed-capacity ring buffer of recent observations, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryBuffer<T> {
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `value`, returning the evicted oldest entry when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        self.entries.push_back(value);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: PartialEq + Clone> HistoryBuffer<T> {
    /// Majority vote; `None` on an empty buffer.
    ///
    /// Among values tied for the highest count, the most recently observed wins.
    pub fn majority(&self) -> Option<Vote<T>> {
        let len = self.entries.len();
        let mut best: Option<(&T, usize)> = None;
        let mut seen: Vec<&T> = Vec::new();

        // Newest first, so the first candidate reaching a count keeps ties.
        for value in self.entries.iter().rev() {
            if seen.contains(&value) {
                continue;
            }
            seen.push(value);
            let count = self.entries.iter().filter(|v| *v == value).count();
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((value, count));
            }
        }

        best.map(|(value, count)| Vote {
            value: value.clone(),
            count,
            confidence: count as f64 / len as f64,
        })
    }

    /// Number of entries equal to `value`.
    pub fn count_of(&self, value: &T) -> usize {
        self.entries.iter().filter(|v| *v == value).count()
    }
}
