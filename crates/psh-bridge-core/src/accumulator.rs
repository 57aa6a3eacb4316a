//! Pending output buffer for interactive sessions.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ordered byte buffer of output not yet delivered to the channel.
///
/// Appends and drains are serialized by an internal lock, so coalesced
/// notifications never lose output.
#[derive(Debug, Default)]
pub struct OutputAccumulator {
    inner: Mutex<Vec<u8>>,
}

impl OutputAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append raw bytes.
    pub fn push(&self, data: &[u8]) {
        self.lock().extend_from_slice(data);
    }

    /// Append a command result followed by the prompt marker, as one append.
    pub fn push_result(&self, result: &str, marker: &str) {
        let mut inner = self.lock();
        inner.extend_from_slice(result.as_bytes());
        inner.extend_from_slice(marker.as_bytes());
    }

    /// Number of pending bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the pending bytes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Take everything if more than `threshold` bytes are pending.
    ///
    /// The comparison is on byte length only.
    #[must_use]
    pub fn drain_if_longer_than(&self, threshold: usize) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        if inner.len() > threshold {
            Some(std::mem::take(&mut *inner))
        } else {
            None
        }
    }

    /// Drop all pending bytes.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "PS > ";

    #[test]
    fn test_result_and_marker_appended_together() {
        let acc = OutputAccumulator::new();
        acc.push_result("2", MARKER);
        assert_eq!(acc.snapshot(), b"2PS > ");
    }

    #[test]
    fn test_marker_alone_is_not_drained() {
        let acc = OutputAccumulator::new();
        acc.push_result("", MARKER);
        assert_eq!(acc.drain_if_longer_than(MARKER.len()), None);
        assert_eq!(acc.len(), MARKER.len());
    }

    #[test]
    fn test_drain_empties_buffer() {
        let acc = OutputAccumulator::new();
        acc.push_result("hello", MARKER);
        acc.push_result("", MARKER);
        let drained = acc.drain_if_longer_than(MARKER.len()).unwrap();
        assert_eq!(drained, b"helloPS > PS > ");
        assert!(acc.is_empty());
    }

    #[test]
    fn test_length_not_content_decides() {
        let acc = OutputAccumulator::new();
        acc.push(b"xxxxxx");
        assert!(acc.drain_if_longer_than(MARKER.len()).is_some());
    }
}
