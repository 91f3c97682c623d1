//! Local capture devices.
//!
//! Devices are addressed by their position in the enumerated device list, sorted
//! by device node number. The index is resolved when the camera is connected, not
//! when it is constructed, so a device plugged in after construction is found.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Device;
use super::{CaptureSettings, FrameGrabber};
use crate::frame::FrameView;

/// One enumerated local capture device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDeviceInfo {
    /// Position in the enumeration; this is what `SourceDescriptor::Local` refers to.
    pub index: usize,
    pub path: PathBuf,
    pub name: String,
}

/// Enumerate local capture devices.
///
/// Without the ingest-v4l2 feature no backend is compiled in and the list is
/// always empty.
pub fn list_local_devices() -> Result<Vec<LocalDeviceInfo>> {
    #[cfg(feature = "ingest-v4l2")]
    {
        let mut nodes = v4l::context::enum_devices();
        nodes.sort_by_key(|node| node.index());
        Ok(nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| LocalDeviceInfo {
                index,
                path: node.path().to_path_buf(),
                name: node.name().unwrap_or_else(|| "unknown".to_string()),
            })
            .collect())
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        log::debug!("local capture backend not compiled in (ingest-v4l2)");
        Ok(Vec::new())
    }
}

/// Local camera grabber, bound to an enumeration index.
pub struct LocalCamera {
    index: usize,
    settings: CaptureSettings,
    #[cfg(feature = "ingest-v4l2")]
    device: Option<V4l2Device>,
}

impl LocalCamera {
    pub fn new(index: usize, settings: CaptureSettings) -> Self {
        Self {
            index,
            settings,
            #[cfg(feature = "ingest-v4l2")]
            device: None,
        }
    }

    fn resolve(&self) -> Result<LocalDeviceInfo> {
        let devices = list_local_devices()?;
        let count = devices.len();
        devices.into_iter().nth(self.index).ok_or_else(|| {
            anyhow!(
                "no local camera at index {} ({} device(s) found)",
                self.index,
                count
            )
        })
    }
}

impl FrameGrabber for LocalCamera {
    fn name(&self) -> String {
        format!("local camera #{}", self.index)
    }

    fn connect(&mut self) -> Result<()> {
        let info = self.resolve()?;
        #[cfg(feature = "ingest-v4l2")]
        {
            self.device = Some(V4l2Device::open(&info.path, &self.settings)?);
            log::info!("LocalCamera: opened {} ({})", info.path.display(), info.name);
            Ok(())
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            let _ = &self.settings;
            Err(anyhow!(
                "cannot open {}: local capture requires the ingest-v4l2 feature",
                info.path.display()
            ))
        }
    }

    fn next_frame(&mut self) -> Result<FrameView<'_>> {
        #[cfg(feature = "ingest-v4l2")]
        {
            self.device
                .as_mut()
                .ok_or_else(|| anyhow!("local camera #{} not connected", self.index))?
                .capture()
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow!("local camera #{} not connected", self.index))
        }
    }

    fn disconnect(&mut self) {
        #[cfg(feature = "ingest-v4l2")]
        {
            self.device = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_index_fails_at_connect() {
        let mut camera = LocalCamera::new(usize::MAX, CaptureSettings::default());
        let err = camera.connect().expect_err("no device at this index");
        assert!(err.to_string().contains("no local camera"));
    }

    #[test]
    fn unconnected_camera_has_no_frames() {
        let mut camera = LocalCamera::new(0, CaptureSettings::default());
        assert!(camera.next_frame().is_err());
    }

    #[test]
    fn devices_are_indexed_in_order() -> Result<()> {
        let devices = list_local_devices()?;
        for (position, device) in devices.iter().enumerate() {
            assert_eq!(device.index, position);
        }
        Ok(())
    }
}
