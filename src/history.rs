// src/history.rs - Bounded-duration sample history
use std::collections::VecDeque;

/// A value stamped with the frame time (seconds) it was observed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub value: T,
    pub timestamp: f64,
}

/// Samples of the last `window_duration` seconds, oldest first.
///
/// Insertion is expected in chronological order. After
/// [`advance_frame`](Self::advance_frame) every retained sample satisfies
/// `current_frame_time - timestamp <= window_duration`.
#[derive(Debug, Clone)]
pub struct TimeWindowedHistory<T> {
    samples: VecDeque<Sample<T>>,
    window_duration: f64,
    current_frame_time: Option<f64>,
}

impl<T: Clone> TimeWindowedHistory<T> {
    pub fn new(window_duration: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
            current_frame_time: None,
        }
    }

    pub fn add(&mut self, value: T, timestamp: f64) {
        if let Some(last) = self.samples.back() {
            if timestamp < last.timestamp {
                tracing::debug!(
                    timestamp,
                    last = last.timestamp,
                    "history sample inserted out of order"
                );
            }
        }
        self.samples.push_back(Sample { value, timestamp });
    }

    /// Moves the window to end at `current_frame_time` and drops older samples.
    pub fn advance_frame(&mut self, current_frame_time: f64) {
        self.current_frame_time = Some(current_frame_time);
        while let Some(front) = self.samples.front() {
            if current_frame_time - front.timestamp > self.window_duration {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn window_duration(&self) -> f64 {
        self.window_duration
    }

    pub fn current_frame_time(&self) -> Option<f64> {
        self.current_frame_time
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample<T>> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&Sample<T>> {
        self.samples.front()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample<T>> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Newest to oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Sample<T>> {
        self.samples.iter().rev()
    }

    /// Covered time span between the oldest and newest sample.
    pub fn span(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }
}
