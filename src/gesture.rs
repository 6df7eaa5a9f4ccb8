//! Tap gesture recognition
//!
//! Classifies a raw stream of tap timestamps into double/triple-tap gestures
//! using a trailing time window. Each recognizer instance is one gesture
//! context (one target pattern, one window length); screens that react to both
//! double and triple taps run two instances side by side.

use std::time::{Duration, Instant};

/// A classified tap gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Two taps within the window
    DoubleTap,
    /// Three taps within the window
    TripleTap,
}

/// Recognizes one tap pattern from raw touch timestamps
///
/// Classification fires on the tap that completes the pattern, not after a
/// trailing idle timeout, so gesture latency is bounded by tap cadence rather
/// than the window length. The window is cleared atomically with
/// classification: a given tap contributes to at most one emitted gesture.
#[derive(Debug)]
pub struct GestureRecognizer {
    window: Duration,
    taps: usize,
    gesture: Gesture,
    history: Vec<Instant>,
}

impl GestureRecognizer {
    /// Recognizer for double taps (e.g. start/stop listening, 300 ms window)
    #[must_use]
    pub fn double_tap(window: Duration) -> Self {
        Self {
            window,
            taps: 2,
            gesture: Gesture::DoubleTap,
            history: Vec::with_capacity(2),
        }
    }

    /// Recognizer for triple taps (e.g. accessibility mode toggle, 1 s window)
    #[must_use]
    pub fn triple_tap(window: Duration) -> Self {
        Self {
            window,
            taps: 3,
            gesture: Gesture::TripleTap,
            history: Vec::with_capacity(3),
        }
    }

    /// Ingest one tap and classify
    ///
    /// Evicts taps older than the window, appends the new one, and emits the
    /// configured gesture once the window holds exactly the pattern's tap
    /// count. Never blocks, never errors.
    pub fn on_touch(&mut self, at: Instant) -> Option<Gesture> {
        self.history
            .retain(|tap| at.duration_since(*tap) < self.window);
        self.history.push(at);

        if self.history.len() == self.taps {
            self.history.clear();
            tracing::debug!(gesture = ?self.gesture, "gesture recognized");
            Some(self.gesture)
        } else {
            None
        }
    }

    /// Discard any pending taps
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Number of taps currently pending in the window
    #[must_use]
    pub fn pending_taps(&self) -> usize {
        self.history.len()
    }

    /// The configured window length
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn double_tap_fires_on_second_tap() {
        let base = Instant::now();
        let mut rec = GestureRecognizer::double_tap(Duration::from_millis(300));

        assert_eq!(rec.on_touch(at(base, 0)), None);
        assert_eq!(rec.on_touch(at(base, 150)), Some(Gesture::DoubleTap));
        assert_eq!(rec.pending_taps(), 0);
    }

    #[test]
    fn slow_taps_do_not_pair() {
        let base = Instant::now();
        let mut rec = GestureRecognizer::double_tap(Duration::from_millis(300));

        assert_eq!(rec.on_touch(at(base, 0)), None);
        // 400 ms later: the first tap has aged out of the window
        assert_eq!(rec.on_touch(at(base, 400)), None);
        assert_eq!(rec.pending_taps(), 1);
    }

    #[test]
    fn triple_tap_fires_once_on_third_tap() {
        let base = Instant::now();
        let mut rec = GestureRecognizer::triple_tap(Duration::from_millis(1000));

        assert_eq!(rec.on_touch(at(base, 0)), None);
        assert_eq!(rec.on_touch(at(base, 150)), None);
        assert_eq!(rec.on_touch(at(base, 400)), Some(Gesture::TripleTap));
    }

    #[test]
    fn taps_are_not_reused_across_gestures() {
        let base = Instant::now();
        let mut rec = GestureRecognizer::double_tap(Duration::from_millis(300));

        assert_eq!(rec.on_touch(at(base, 0)), None);
        assert_eq!(rec.on_touch(at(base, 100)), Some(Gesture::DoubleTap));
        // The cleared taps must not pair with the next one
        assert_eq!(rec.on_touch(at(base, 200)), None);
        assert_eq!(rec.on_touch(at(base, 250)), Some(Gesture::DoubleTap));
    }

    #[test]
    fn gesture_count_bounded_by_half_the_taps() {
        let base = Instant::now();
        let mut rec = GestureRecognizer::double_tap(Duration::from_millis(300));

        for taps in 1..=20_u64 {
            rec.reset();
            let mut emitted = 0;
            for i in 0..taps {
                // 50 ms cadence keeps every tap inside the window
                if rec.on_touch(at(base, i * 50)).is_some() {
                    emitted += 1;
                }
            }
            assert!(emitted <= taps / 2, "{emitted} gestures from {taps} taps");
        }
    }

    #[test]
    fn window_empties_by_eviction() {
        let base = Instant::now();
        let mut rec = GestureRecognizer::triple_tap(Duration::from_millis(1000));

        rec.on_touch(at(base, 0));
        rec.on_touch(at(base, 100));
        // Both earlier taps have aged out; this tap starts a fresh pattern
        assert_eq!(rec.on_touch(at(base, 1500)), None);
        assert_eq!(rec.pending_taps(), 1);
    }

    #[test]
    fn reset_discards_pending_taps() {
        let base = Instant::now();
        let mut rec = GestureRecognizer::triple_tap(Duration::from_millis(1000));

        rec.on_touch(at(base, 0));
        rec.on_touch(at(base, 100));
        rec.reset();
        assert_eq!(rec.on_touch(at(base, 200)), None);
        assert_eq!(rec.on_touch(at(base, 300)), None);
        assert_eq!(rec.on_touch(at(base, 400)), Some(Gesture::TripleTap));
    }
}
