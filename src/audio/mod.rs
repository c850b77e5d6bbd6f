pub mod chunk;
pub mod pipeline;
pub mod sink;
pub mod source;

pub use chunk::{chunk_len, AudioChunk, BYTES_PER_SAMPLE, CHUNK_CADENCE, POLL_INTERVAL};
pub use pipeline::{AudioPipeline, PipelineConfig, PipelineHandle, PipelineReport, StreamControl};
pub use sink::{AudioSink, RawPcmSink, WavFileSink};
pub use source::{AudioSource, SilenceSource, SourceKind, ToneSource, WavLoopSource};
