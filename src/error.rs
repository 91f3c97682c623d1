//! Sensor error notifications.
//!
//! Every fault the sensor observes is converted into a `SensorError` at the
//! boundary between the video source and the core. The same value is returned
//! from the failing operation (when there is one), recorded as the sensor's last
//! error, and emitted on the error channel.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Fixed message for any failure to open or start the video source.
pub const CONNECTION_UNAVAILABLE: &str = "camera connection unavailable";

/// Shared underlying cause. Cloned into every error subscriber.
pub type SharedCause = Arc<dyn StdError + Send + Sync + 'static>;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device or stream could not be opened or started.
    SourceUnavailable,
    /// The source faulted after it was started (e.g. stream interruption).
    AcquisitionFault,
    /// Construction input could not be turned into a video source.
    ConfigurationFault,
    /// The sensor was shut down.
    Closed,
}

/// One-shot error notification. Carries no retry state.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct SensorError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<SharedCause>,
}

impl SensorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, cause: Option<anyhow::Error>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: cause.map(share),
        }
    }

    pub fn source_unavailable(cause: anyhow::Error) -> Self {
        Self::new(ErrorKind::SourceUnavailable, CONNECTION_UNAVAILABLE, Some(cause))
    }

    /// Acquisition faults carry the source's own description as the message.
    pub fn acquisition(cause: anyhow::Error) -> Self {
        let message = format!("{:#}", cause);
        Self::new(ErrorKind::AcquisitionFault, message, Some(cause))
    }

    pub fn configuration(cause: anyhow::Error) -> Self {
        let message = format!("{:#}", cause);
        Self::new(ErrorKind::ConfigurationFault, message, Some(cause))
    }

    pub fn closed() -> Self {
        Self::new(ErrorKind::Closed, "sensor has been shut down", None)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

fn share(err: anyhow::Error) -> SharedCause {
    let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
    Arc::from(boxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn source_unavailable_uses_fixed_message_and_keeps_cause() {
        let err = SensorError::source_unavailable(anyhow!("no local camera at index 3"));
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert_eq!(err.to_string(), CONNECTION_UNAVAILABLE);
        let cause = err.source().expect("cause attached");
        assert!(cause.to_string().contains("index 3"));
    }

    #[test]
    fn acquisition_fault_carries_source_description() {
        let err = SensorError::acquisition(anyhow!("mjpeg stream ended").context("read frame"));
        assert_eq!(err.kind(), ErrorKind::AcquisitionFault);
        assert_eq!(err.message(), "read frame: mjpeg stream ended");
    }

    #[test]
    fn closed_has_no_cause() {
        let err = SensorError::closed();
        assert_eq!(err.kind(), ErrorKind::Closed);
        assert!(err.cause().is_none());
    }
}
