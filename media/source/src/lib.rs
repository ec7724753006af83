/*!
    Demuxing reader for the medley pipeline.

    The [`Reader`] opens a media URI, discovers the best video and audio
    streams, and drives the demuxer's read loop from a dedicated worker
    thread. Each packet is routed to the downstream packet queues in one of
    two modes:

    - **split mode**: video packets to the video queue, audio packets to
      the audio queue (normal playback, with optional post-decode
      recording handled by the decoders)
    - **muxed mode**: every packet to the writer queue (hidden playback,
      where the pipeline only records)

    Blocking demuxer I/O is guarded by an interrupt callback with a five
    second deadline, re-armed at the start of every iteration, so an
    unreachable network source cannot hang the pipeline.
*/

mod interrupt;
mod probe;
mod reader;

pub use reader::{CodecConfig, Reader};

/// Demuxer I/O deadline. An iteration that makes no progress for this long
/// aborts the blocking call and closes the reader.
pub const READ_TIMEOUT_SECS: i64 = 5;
