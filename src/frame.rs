//! Frame handoff type.
//!
//! A `Frame` is an opaque pixel buffer produced by the ingestion layer and
//! consumed by the detector. Pixel format is the camera's concern; the bridge
//! only carries dimensions and a monotonically increasing capture index.

/// One captured frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, in whatever layout the source produced.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture sequence number, starting at 1 for the first frame.
    pub index: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Self {
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}
