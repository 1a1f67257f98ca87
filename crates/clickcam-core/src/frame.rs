//! Encoded video frames.

use bytes::Bytes;

/// One encoded image, as produced by the capture process.
///
/// Backed by [`Bytes`], so cloning for each subscriber shares the same
/// allocation. The contents are never inspected or mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameBuffer(Bytes);

impl FrameBuffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the shared byte handle.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for FrameBuffer {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for FrameBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }
}

impl From<&'static [u8]> for FrameBuffer {
    fn from(slice: &'static [u8]) -> Self {
        Self(Bytes::from_static(slice))
    }
}

impl AsRef<[u8]> for FrameBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
