use crate::frame::Frame;

/// Face bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True when the region lies entirely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x
            .checked_add(self.width)
            .is_some_and(|right| right <= width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= height)
    }
}

/// Face locator trait.
///
/// No locator ships with this crate. When one is installed on a sensor it runs
/// on every frame after the motion step, from the acquisition thread.
pub trait FaceLocator: Send {
    fn name(&self) -> &'static str;

    /// Locate the most prominent face, if any.
    fn locate(&mut self, frame: &Frame) -> Option<FaceRegion>;
}
