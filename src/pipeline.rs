use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::detect::{classify_motion, FaceLocator, FaceRegion, MotionScorer};
use crate::error::SensorError;
use crate::events::Subscribers;
use crate::frame::{Frame, FrameView};

/// Counters since construction. Frames are counted whether or not anyone is
/// subscribed to them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SensorStats {
    pub frames: u64,
    pub motion_frames: u64,
    pub faces: u64,
    pub errors: u64,
}

/// Per-frame processing shared between a sensor and its acquisition thread.
pub(crate) struct Pipeline {
    pub(crate) frames: Subscribers<Frame>,
    pub(crate) motion: Subscribers<bool>,
    pub(crate) faces: Subscribers<FaceRegion>,
    pub(crate) errors: Subscribers<SensorError>,
    scorer: Mutex<Box<dyn MotionScorer>>,
    face_locator: Mutex<Option<Box<dyn FaceLocator>>>,
    last_error: Mutex<Option<SensorError>>,
    in_motion: AtomicBool,
    sequence: AtomicU64,
    frame_count: AtomicU64,
    motion_count: AtomicU64,
    face_count: AtomicU64,
    error_count: AtomicU64,
}

impl Pipeline {
    pub(crate) fn new(
        scorer: Box<dyn MotionScorer>,
        face_locator: Option<Box<dyn FaceLocator>>,
    ) -> Self {
        Self {
            frames: Subscribers::new(),
            motion: Subscribers::new(),
            faces: Subscribers::new(),
            errors: Subscribers::new(),
            scorer: Mutex::new(scorer),
            face_locator: Mutex::new(face_locator),
            last_error: Mutex::new(None),
            in_motion: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
            motion_count: AtomicU64::new(0),
            face_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// Handle one delivered frame: motion first, then face, then the frame itself.
    pub(crate) fn process_frame(&self, view: &FrameView<'_>) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Frame::copy_from(view, sequence);
        self.frame_count.fetch_add(1, Ordering::Relaxed);

        if !self.motion.is_empty() {
            let score = lock(&self.scorer).score(&frame);
            let detected = classify_motion(score);
            if detected {
                self.motion_count.fetch_add(1, Ordering::Relaxed);
            }
            if self.in_motion.swap(detected, Ordering::Relaxed) != detected {
                log::debug!(
                    "frame {}: motion {} (score {:.3})",
                    sequence,
                    if detected { "started" } else { "ended" },
                    score
                );
            }
            self.motion.emit(detected);
        }

        if !self.faces.is_empty() {
            if let Some(region) = self.locate_face(&frame) {
                self.face_count.fetch_add(1, Ordering::Relaxed);
                self.faces.emit(region);
            }
        }

        self.frames.emit(frame);
    }

    fn locate_face(&self, frame: &Frame) -> Option<FaceRegion> {
        let mut locator = lock(&self.face_locator);
        let locator = locator.as_mut()?;
        let region = locator.locate(frame)?;
        if region.fits_within(frame.width(), frame.height()) {
            Some(region)
        } else {
            log::debug!(
                "{}: discarding face region {:?} outside {}x{} frame",
                locator.name(),
                region,
                frame.width(),
                frame.height()
            );
            None
        }
    }

    pub(crate) fn process_error(&self, err: anyhow::Error) {
        self.report(SensorError::acquisition(err));
    }

    /// Record `err` as the last error and emit it.
    pub(crate) fn report(&self, err: SensorError) {
        log::warn!("sensor error ({:?}): {}", err.kind(), err);
        *lock(&self.last_error) = Some(err.clone());
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.errors.emit(err);
    }

    pub(crate) fn last_error(&self) -> Option<SensorError> {
        lock(&self.last_error).clone()
    }

    pub(crate) fn stats(&self) -> SensorStats {
        SensorStats {
            frames: self.frame_count.load(Ordering::Relaxed),
            motion_frames: self.motion_count.load(Ordering::Relaxed),
            faces: self.face_count.load(Ordering::Relaxed),
            errors: self.error_count.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn has_face_locator(&self) -> bool {
        lock(&self.face_locator).is_some()
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::frame::PixelFormat;
    use anyhow::{anyhow, Result};
    use std::sync::Arc;

    struct FixedScorer(f64);

    impl MotionScorer for FixedScorer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn score(&mut self, _frame: &Frame) -> f64 {
            self.0
        }

        fn reset(&mut self) {}
    }

    struct CornerFace;

    impl FaceLocator for CornerFace {
        fn name(&self) -> &'static str {
            "corner"
        }

        fn locate(&mut self, _frame: &Frame) -> Option<FaceRegion> {
            Some(FaceRegion::new(0, 0, 1, 1))
        }
    }

    fn record<T: Clone + Send + 'static>(
        subscribers: &Subscribers<T>,
        log: &Arc<Mutex<Vec<String>>>,
        label: &'static str,
    ) {
        let log = log.clone();
        subscribers.subscribe(move |_| log.lock().unwrap().push(label.to_string()));
    }

    #[test]
    fn emits_motion_then_face_then_frame() -> Result<()> {
        let pipeline = Pipeline::new(Box::new(FixedScorer(0.5)), Some(Box::new(CornerFace)));
        let order = Arc::new(Mutex::new(Vec::new()));
        record(&pipeline.frames, &order, "frame");
        record(&pipeline.faces, &order, "face");
        record(&pipeline.motion, &order, "motion");

        let pixels = [7u8; 4];
        pipeline.process_frame(&FrameView::new(&pixels, 2, 2, PixelFormat::Gray8)?);

        assert_eq!(order.lock().unwrap().as_slice(), ["motion", "face", "frame"]);
        let stats = pipeline.stats();
        assert_eq!((stats.frames, stats.motion_frames, stats.faces), (1, 1, 1));
        Ok(())
    }

    #[test]
    fn frames_are_numbered_in_delivery_order() -> Result<()> {
        let pipeline = Pipeline::new(Box::new(FixedScorer(0.0)), None);
        let sequences = Arc::new(Mutex::new(Vec::new()));
        let sink = sequences.clone();
        pipeline
            .frames
            .subscribe(move |frame: Frame| sink.lock().unwrap().push(frame.sequence()));

        let pixels = [0u8; 4];
        for _ in 0..3 {
            pipeline.process_frame(&FrameView::new(&pixels, 2, 2, PixelFormat::Gray8)?);
        }
        assert_eq!(sequences.lock().unwrap().as_slice(), [1, 2, 3]);
        assert!(!pipeline.has_face_locator());
        Ok(())
    }

    #[test]
    fn acquisition_error_is_recorded_and_emitted() {
        let pipeline = Pipeline::new(Box::new(FixedScorer(0.0)), None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        pipeline
            .errors
            .subscribe(move |err: SensorError| sink.lock().unwrap().push(err.kind()));

        pipeline.process_error(anyhow!("stream interrupted"));

        assert_eq!(seen.lock().unwrap().as_slice(), [ErrorKind::AcquisitionFault]);
        let last = pipeline.last_error().expect("last error recorded");
        assert_eq!(last.message(), "stream interrupted");
        assert_eq!(pipeline.stats().errors, 1);
    }
}
