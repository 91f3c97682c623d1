//! Background-model motion scorer.
//!
//! Keeps a luma background that drifts toward the live scene by one intensity
//! level per update. Each frame is compared pixel by pixel against the
//! background; pixels whose difference reaches `difference_threshold` are marked
//! as changed. Isolated changed pixels are removed with a 3x3 opening (erosion
//! then dilation) before counting. The score is the fraction of changed pixels.

use super::motion::MotionScorer;
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct BackgroundModelSettings {
    /// Minimum per-pixel luma difference counted as change.
    pub difference_threshold: u8,
    /// Background is nudged toward the scene every N frames.
    pub frames_per_background_update: u32,
    /// Remove isolated changed pixels before scoring.
    pub suppress_noise: bool,
}

impl Default for BackgroundModelSettings {
    fn default() -> Self {
        Self {
            difference_threshold: 15,
            frames_per_background_update: 2,
            suppress_noise: true,
        }
    }
}

pub struct BackgroundModelScorer {
    settings: BackgroundModelSettings,
    background: Option<Background>,
    frames_since_update: u32,
}

struct Background {
    luma: Vec<u8>,
    width: usize,
    height: usize,
}

impl BackgroundModelScorer {
    pub fn new(settings: BackgroundModelSettings) -> Self {
        Self {
            settings,
            background: None,
            frames_since_update: 0,
        }
    }
}

impl Default for BackgroundModelScorer {
    fn default() -> Self {
        Self::new(BackgroundModelSettings::default())
    }
}

impl MotionScorer for BackgroundModelScorer {
    fn name(&self) -> &'static str {
        "background-model"
    }

    fn score(&mut self, frame: &Frame) -> f64 {
        let luma = frame.to_luma();
        let width = frame.width() as usize;
        let height = frame.height() as usize;

        let background = match self.background.as_mut() {
            Some(bg) if bg.width == width && bg.height == height => bg,
            _ => {
                if self.background.is_some() {
                    log::debug!("BackgroundModelScorer: frame size changed, resetting model");
                }
                self.background = Some(Background {
                    luma,
                    width,
                    height,
                });
                self.frames_since_update = 0;
                return 0.0;
            }
        };

        self.frames_since_update += 1;
        if self.frames_since_update >= self.settings.frames_per_background_update {
            self.frames_since_update = 0;
            for (bg, &px) in background.luma.iter_mut().zip(&luma) {
                if px > *bg {
                    *bg += 1;
                } else if px < *bg {
                    *bg -= 1;
                }
            }
        }

        let threshold = self.settings.difference_threshold;
        let mut changed: Vec<bool> = luma
            .iter()
            .zip(&background.luma)
            .map(|(&px, &bg)| px.abs_diff(bg) >= threshold)
            .collect();

        if self.settings.suppress_noise && width >= 3 && height >= 3 {
            changed = dilate(&erode(&changed, width, height), width, height);
        }

        let count = changed.iter().filter(|&&c| c).count();
        (count as f64 / (width * height) as f64).clamp(0.0, 1.0)
    }

    fn reset(&mut self) {
        self.background = None;
        self.frames_since_update = 0;
    }
}

/// 3x3 erosion. Border pixels only consider their in-bounds neighbours.
fn erode(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    morph(mask, width, height, |set, total| set == total)
}

/// 3x3 dilation.
fn dilate(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    morph(mask, width, height, |set, _| set > 0)
}

fn morph(mask: &[bool], width: usize, height: usize, keep: fn(usize, usize) -> bool) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut set = 0;
            let mut total = 0;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    total += 1;
                    if mask[ny * width + nx] {
                        set += 1;
                    }
                }
            }
            out[y * width + x] = keep(set, total);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use anyhow::Result;

    fn gray(width: u32, height: u32, fill: impl Fn(usize, usize) -> u8) -> Result<Frame> {
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height as usize {
            for x in 0..width as usize {
                pixels.push(fill(x, y));
            }
        }
        Frame::new(pixels, width, height, PixelFormat::Gray8)
    }

    #[test]
    fn first_frame_becomes_background() -> Result<()> {
        let mut scorer = BackgroundModelScorer::default();
        assert_eq!(scorer.score(&gray(8, 8, |_, _| 100)?), 0.0);
        assert_eq!(scorer.score(&gray(8, 8, |_, _| 100)?), 0.0);
        Ok(())
    }

    #[test]
    fn half_frame_change_scores_half() -> Result<()> {
        let mut scorer = BackgroundModelScorer::default();
        scorer.score(&gray(8, 8, |_, _| 100)?);
        let score = scorer.score(&gray(8, 8, |x, _| if x < 4 { 200 } else { 100 })?);
        assert!((score - 0.5).abs() < 1e-9, "score {}", score);
        Ok(())
    }

    #[test]
    fn isolated_pixel_is_suppressed() -> Result<()> {
        let mut scorer = BackgroundModelScorer::default();
        scorer.score(&gray(8, 8, |_, _| 100)?);
        let score = scorer.score(&gray(8, 8, |x, y| if (x, y) == (3, 3) { 255 } else { 100 })?);
        assert_eq!(score, 0.0);

        let mut noisy = BackgroundModelScorer::new(BackgroundModelSettings {
            suppress_noise: false,
            ..BackgroundModelSettings::default()
        });
        noisy.score(&gray(8, 8, |_, _| 100)?);
        let score = noisy.score(&gray(8, 8, |x, y| if (x, y) == (3, 3) { 255 } else { 100 })?);
        assert!((score - 1.0 / 64.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn small_differences_are_ignored() -> Result<()> {
        let mut scorer = BackgroundModelScorer::default();
        scorer.score(&gray(8, 8, |_, _| 100)?);
        assert_eq!(scorer.score(&gray(8, 8, |_, _| 110)?), 0.0);
        Ok(())
    }

    #[test]
    fn background_adapts_to_persistent_change() -> Result<()> {
        let mut scorer = BackgroundModelScorer::default();
        scorer.score(&gray(6, 6, |_, _| 100)?);
        let changed = gray(6, 6, |_, _| 130)?;
        assert_eq!(scorer.score(&changed), 1.0);
        let mut last = 1.0;
        for _ in 0..200 {
            last = scorer.score(&changed);
        }
        assert_eq!(last, 0.0);
        Ok(())
    }

    #[test]
    fn size_change_resets_model() -> Result<()> {
        let mut scorer = BackgroundModelScorer::default();
        scorer.score(&gray(8, 8, |_, _| 0)?);
        assert_eq!(scorer.score(&gray(4, 4, |_, _| 255)?), 0.0);
        scorer.reset();
        assert_eq!(scorer.score(&gray(4, 4, |_, _| 0)?), 0.0);
        Ok(())
    }
}
