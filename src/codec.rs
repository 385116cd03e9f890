// src/codec.rs
//! Wire format for one channel vector: `channel_count` little-endian `u32`s,
//! concatenated. No header, length prefix or checksum; a 9 channel frame is 36 bytes.
use crate::drivers::LinkError;
use crate::types::ChannelVector;
const FIELD_BYTES: usize = 4;
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCodec {
    channel_count: usize,
}
impl FrameCodec {
    pub fn new(channel_count: usize) -> Self {
        Self { channel_count }
    }
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }
    pub fn frame_len(&self) -> usize {
        self.channel_count * FIELD_BYTES
    }
    pub fn encode(&self, values: &[u32]) -> Result<Vec<u8>, LinkError> {
        if values.len() != self.channel_count {
            return Err(LinkError::ChannelMismatch {
                expected: self.channel_count,
                actual: values.len(),
            });
        }
        let mut frame = Vec::with_capacity(self.frame_len());
        for value in values {
            frame.extend_from_slice(&value.to_le_bytes());
        }
        Ok(frame)
    }
    /// Rejects any payload that is not exactly `frame_len()` bytes.
    pub fn decode(&self, frame: &[u8]) -> Result<ChannelVector, LinkError> {
        if frame.len() != self.frame_len() {
            return Err(LinkError::MalformedFrame {
                expected: self.frame_len(),
                actual: frame.len(),
            });
        }
        Ok(frame
            .chunks_exact(FIELD_BYTES)
            .map(|field| u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
            .collect())
    }
}
