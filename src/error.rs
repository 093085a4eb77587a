#[derive(Debug, thiserror::Error)]
pub enum FlowtapError {
    #[error("{0}")]
    InsufficientPermission(String),
    #[error("capture device error: {0}")]
    CaptureDevice(String),
    #[error("input error: {0}")]
    Input(#[source] std::io::Error),
    #[error("invalid frame record on line {line}: {detail}")]
    FrameRecord { line: usize, detail: String },
    #[error("serialization error: {0}")]
    Serialization(#[source] std::io::Error),
    #[error("fatal: {0}")]
    Fatal(String),
}
