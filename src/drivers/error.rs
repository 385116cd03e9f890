use thiserror::Error;
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("transport fault: {0}")]
    Transport(String),
    // 只有进程内的链路会关闭
    #[allow(dead_code)]
    #[error("transport closed")]
    TransportClosed,
    #[error("sampler fault: {0}")]
    Sampler(String),
    #[error("failed to read calibration: {0}")]
    StorageRead(String),
    #[error("failed to persist calibration: {0}")]
    StorageWrite(String),
    #[error("invalid calibration profile: {0}")]
    InvalidProfile(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
impl From<serialport::Error> for LinkError {
    fn from(value: serialport::Error) -> Self {
        LinkError::Sampler(value.to_string())
    }
}
impl LinkError {
    /// Configuration-time errors abort startup; everything else is handled per cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::ChannelMismatch { .. } | LinkError::Config(_))
    }
}
