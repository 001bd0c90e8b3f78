use crate::device::Device;

/// Coarse failure classes of a fill call.
///
/// Callers that only care about retry policy can match on this instead of
/// the full [`FillError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The buffer set itself is malformed. Never retried.
    InvalidArgument,
    /// The memory resource could not provide scratch metadata.
    Allocation,
    /// Enqueued device work failed, or could not be enqueued.
    Execution,
    /// The fill configuration is unusable.
    Configuration,
    /// The requested backend is not present on this machine.
    Unavailable,
}

/// Errors raised by the multi-buffer fill.
#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("buffer {index} declares {len} elements but has a null address")]
    NullBuffer { index: usize, len: usize },

    #[error("total work count overflows u64 at buffer {index}")]
    WorkOverflow { index: usize },

    #[error("scratch allocation of {bytes} bytes failed: {reason}")]
    Allocation { bytes: usize, reason: String },

    #[error("device execution failed: {0}")]
    Execution(String),

    #[error("invalid fill configuration: {0}")]
    InvalidConfig(String),

    #[error("stream on {stream} cannot run work for a backend on {backend}")]
    DeviceMismatch { backend: Device, stream: Device },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl FillError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FillError::NullBuffer { .. } | FillError::WorkOverflow { .. } => {
                ErrorKind::InvalidArgument
            }
            FillError::Allocation { .. } => ErrorKind::Allocation,
            FillError::Execution(_) => ErrorKind::Execution,
            FillError::InvalidConfig(_) | FillError::DeviceMismatch { .. } => {
                ErrorKind::Configuration
            }
            FillError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// Whether the failure was detected before any device work was enqueued.
    pub fn is_synchronous(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            FillError::NullBuffer { index: 3, len: 8 }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(FillError::WorkOverflow { index: 1 }.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            FillError::Allocation { bytes: 24, reason: "budget".into() }.kind(),
            ErrorKind::Allocation
        );
        assert_eq!(FillError::Execution("fault".into()).kind(), ErrorKind::Execution);
        assert_eq!(FillError::InvalidConfig("x".into()).kind(), ErrorKind::Configuration);
        let e = FillError::DeviceMismatch { backend: Device::Cuda(0), stream: Device::Cuda(1) };
        assert_eq!(e.kind(), ErrorKind::Configuration);
        assert_eq!(e.to_string(), "stream on cuda:1 cannot run work for a backend on cuda:0");
    }

    #[test]
    fn test_display() {
        let e = FillError::NullBuffer { index: 2, len: 5 };
        assert_eq!(e.to_string(), "buffer 2 declares 5 elements but has a null address");
        assert!(e.is_synchronous());
        assert!(!FillError::Execution("x".into()).is_synchronous());
    }
}
