/*!
    Decoder stages for the medley pipeline.

    A decoder consumes compressed packets from one queue and produces raw
    frames on another, still in the codec library's native frame form — the
    filter stage downstream is the last FFmpeg-aware hop and converts to
    plain frames. When recording in post-decode mode, every consumed packet
    is re-emitted unchanged on the writer queue.

    Hardware acceleration is opt-in by device-type name (`"cuda"`,
    `"vaapi"`, `"videotoolbox"`, ...). A mismatch between the stream's
    decoder and the requested device is a construction failure; frames that
    surface in the device's pixel format are transferred into system memory
    before being pushed downstream.
*/

use ffmpeg_next as ffmpeg;

use media_types::{Item, Queue};

mod audio;
mod hw;
mod video;

pub use audio::AudioDecoder;
pub use video::VideoDecoder;

/**
    A decoded video frame still in FFmpeg form, owned by the pipeline.
*/
pub struct DecodedVideo(pub ffmpeg::frame::Video);

/**
    A decoded audio frame still in FFmpeg form, owned by the pipeline.
*/
pub struct DecodedAudio(pub ffmpeg::frame::Audio);

// SAFETY: an AVFrame owns its (reference-counted) buffers and is freely
// movable between threads; each frame has exactly one owner at a time as
// it travels through the queues.
unsafe impl Send for DecodedVideo {}
unsafe impl Sync for DecodedVideo {}
unsafe impl Send for DecodedAudio {}
unsafe impl Sync for DecodedAudio {}

/// Queue carrying decoded video frames from decoder to filter.
pub type DecodedVideoQueue = Queue<Item<DecodedVideo>>;
/// Queue carrying decoded audio frames from decoder to filter.
pub type DecodedAudioQueue = Queue<Item<DecodedAudio>>;
