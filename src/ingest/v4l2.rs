//! V4L2 capture backend for `LocalCamera`.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::CaptureSettings;
use crate::frame::{FrameView, PixelFormat};

const STREAM_BUFFERS: u32 = 4;

/// An open V4L2 device with a running mmap stream.
pub(crate) struct V4l2Device {
    state: DeviceState,
    width: u32,
    height: u32,
    format: PixelFormat,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Device {
    pub(crate) fn open(path: &Path, settings: &CaptureSettings) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(path)
            .with_context(|| format!("open v4l2 device {}", path.display()))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Device: failed to set format on {}: {}",
                    path.display(),
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = pixel_format_for(&format.fourcc.repr)?;

        if settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Device: failed to set fps on {}: {}",
                    path.display(),
                    err
                );
            }
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Device: streaming {} ({}x{} {:?})",
            path.display(),
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            state,
            width: format.width,
            height: format.height,
            format: pixel_format,
        })
    }

    /// Dequeue the next buffer. The view borrows the mmap buffer.
    pub(crate) fn capture(&mut self) -> Result<FrameView<'_>> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let (buf, _meta) = self
            .state
            .with_mut(|fields| fields.stream.next())
            .context("capture v4l2 frame")?;
        let expected = format
            .frame_len(width, height)
            .ok_or_else(|| anyhow!("v4l2 frame dimensions overflow"))?;
        // Drivers may pad the buffer past the image payload.
        let payload = buf
            .get(..expected)
            .ok_or_else(|| anyhow!("short v4l2 buffer: {} < {}", buf.len(), expected))?;
        FrameView::new(payload, width, height, format)
    }
}

fn pixel_format_for(fourcc: &[u8; 4]) -> Result<PixelFormat> {
    match fourcc {
        b"RGB3" => Ok(PixelFormat::Rgb24),
        b"GREY" => Ok(PixelFormat::Gray8),
        b"NV12" => Ok(PixelFormat::Nv12),
        other => Err(anyhow!(
            "unsupported v4l2 pixel format {}",
            String::from_utf8_lossy(other)
        )),
    }
}
