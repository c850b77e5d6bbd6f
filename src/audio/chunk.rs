use std::time::Duration;

/// Interval between two chunks
pub const CHUNK_CADENCE: Duration = Duration::from_millis(100);

/// Upper bound on how stale the pipeline's view of the session may get
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 16-bit PCM
pub const BYTES_PER_SAMPLE: usize = 2;

/// Number of bytes in one 100ms chunk for the given format
///
/// `sample_rate / 10` samples per channel, interleaved, 16-bit.
pub fn chunk_len(sample_rate: u32, channels: u16) -> usize {
    (sample_rate / 10) as usize * channels as usize * BYTES_PER_SAMPLE
}

/// One cadence tick worth of raw audio (16-bit LE PCM, interleaved)
///
/// Moved into the sink on hand-off; the producer keeps no reference to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Position in the stream (0-indexed)
    pub sequence: u64,
    /// Milliseconds since the pipeline started
    pub timestamp_ms: u64,
}

impl AudioChunk {
    /// Duration covered by the chunk's samples
    pub fn duration(&self) -> Duration {
        let frame_bytes = self.channels as usize * BYTES_PER_SAMPLE;
        if frame_bytes == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.data.len() / frame_bytes;
        Duration::from_micros(frames as u64 * 1_000_000 / self.sample_rate as u64)
    }

    /// Decode the buffer into samples
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }
}
