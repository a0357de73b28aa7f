use crate::shared::frame::Frame;

/// Properties of an opened source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub description: String,
}

/// Interface for pulling RGB frames from a camera or a recording.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>>;

    /// Next frame, or `Ok(None)` once the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the underlying device. Safe to call more than once.
    fn close(&mut self);
}
