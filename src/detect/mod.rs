mod background;
mod face;
mod motion;

pub use background::{BackgroundModelScorer, BackgroundModelSettings};
pub use face::{FaceLocator, FaceRegion};
pub use motion::{classify_motion, MotionScorer, MOTION_THRESHOLD};
