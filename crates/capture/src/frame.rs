use std::sync::Arc;
use std::time::Instant;

/// One raw captured image delivered by the camera.
///
/// Pixels are packed 4-channel 8-bit, BGR-ordered (BGRA). The backing store
/// is shared, so cloning a frame is cheap and the conversion stage can hold
/// it without copying.
#[derive(Clone)]
pub struct Frame {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Bytes per row as reported by the driver; at least `width * 4`.
    pub stride: u32,
    /// Driver sequence number, monotonically increasing per capture tick.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    /// Number of bytes a full frame at this geometry must carry.
    pub fn expected_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_len_uses_stride_not_width() {
        let frame = Frame {
            data: Arc::from(vec![0u8; 0]),
            width: 640,
            height: 480,
            stride: 2608,
            sequence: 0,
            captured_at: Instant::now(),
        };
        assert_eq!(frame.expected_len(), 2608 * 480);
    }
}
