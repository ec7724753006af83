/*!
    Shared types for the medley pipeline crates.

    This crate defines the vocabulary of the pipeline — the types that cross
    crate boundaries. It has no dependency on FFmpeg, making it lightweight
    and enabling consumers to depend on it without pulling in codec bindings.

    # Core Types

    - [`Rational`] - Rational numbers for time bases and frame rates
    - [`Pts`] and [`MediaDuration`] - Timestamps in time_base units
    - [`Packet`] - Compressed packet data
    - [`VideoFrame`] and [`AudioFrame`] - Decoded frame data

    # Queues and Pipeline Control

    - [`Queue`] - Bounded blocking FIFO connecting pipeline stages
    - [`Item`] and [`PipelineSignal`] - Queue elements carrying data,
      flush requests, or end-of-stream markers
    - [`Drain`] - Terminal stage that consumes a queue to completion

    # Stream Information

    - [`StreamTiming`] - Per-stream time base and real-time projection
    - [`MediaInfo`] - Facts discovered when a source is opened

    # Shared Transport State

    - [`SharedState`] - Flags and sync fields shared by every stage
    - [`Terminator`] - The single cancellation entry point

    # Listener Interface

    - [`EventSink`] - Host-facing callbacks with no-op defaults

    # Error Handling

    - [`Error`] and [`Result`] - Common error types
*/

mod drain;
mod error;
mod events;
mod format;
mod frame;
mod packet;
mod queue;
mod rational;
mod signal;
mod state;
mod stream;
mod timestamp;

pub use drain::Drain;
pub use error::{Error, Result};
pub use events::{EventSink, NullEvents};
pub use format::{AudioCodec, PixelFormat, SampleFormat};
pub use frame::{AudioFrame, VideoFrame};
pub use packet::{Packet, StreamKind};
pub use queue::Queue;
pub use rational::Rational;
pub use signal::{Item, PipelineSignal};
pub use state::{AtomicF32, SharedState, Terminator};
pub use stream::{is_camera_uri, AudioStreamInfo, MediaInfo, StreamTiming, VideoStreamInfo};
pub use timestamp::{MediaDuration, Pts, NOPTS};

/// Queue of compressed packets flowing between reader, decoders and writer.
pub type PacketQueue = Queue<Item<Packet>>;
/// Queue of decoded-then-filtered video frames headed for display.
pub type VideoFrameQueue = Queue<Item<VideoFrame>>;
/// Queue of decoded-then-filtered audio frames headed for the sound device.
pub type AudioFrameQueue = Queue<Item<AudioFrame>>;
