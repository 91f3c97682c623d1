use crate::frame::Frame;

/// Scores above this intensity are classified as motion.
pub const MOTION_THRESHOLD: f64 = 0.15;

/// Motion scorer trait.
///
/// Scorers keep a background model across calls and are fed every frame of one
/// sensor, in delivery order, from a single thread at a time. A scorer instance is
/// private to one sensor.
pub trait MotionScorer: Send {
    /// Scorer identifier.
    fn name(&self) -> &'static str;

    /// Motion intensity of `frame` against the background model, in `[0, 1]`.
    /// Updates the model.
    fn score(&mut self, frame: &Frame) -> f64;

    /// Drop the background model. The next frame becomes the new background.
    fn reset(&mut self);
}

/// Motion classification. Strictly greater than the threshold.
pub fn classify_motion(score: f64) -> bool {
    score > MOTION_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_exclusive() {
        assert!(!classify_motion(0.15));
        assert!(classify_motion(0.150_000_01));
        assert!(!classify_motion(0.0));
        assert!(classify_motion(1.0));
    }

    #[test]
    fn classifies_reference_sequence() {
        let scores = [0.10, 0.20, 0.15, 0.16, 0.0, 1.0, 0.14, 0.151, 0.149, 0.15];
        let expected = [
            false, true, false, true, false, true, false, true, false, false,
        ];
        let classified: Vec<bool> = scores.iter().map(|&s| classify_motion(s)).collect();
        assert_eq!(classified, expected);
    }
}
