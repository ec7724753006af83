/*!
    Threaded media playback and event-driven recording.

    medley plays a media URI — a file on disk or a live RTSP/HTTP camera
    stream — through a pipeline of worker threads connected by bounded
    queues:

    ```text
    Reader ──► video pkts ──► VideoDecoder ──► VideoFilter ──► Display
           └─► audio pkts ──► AudioDecoder ──► AudioFilter ──► Audio
           └─► writer pkts ─────────────────────────────────► Writer
    ```

    Live streams can be persisted to a container file on command, with a
    rolling pre-roll cache so recordings start a configurable number of
    seconds *before* the toggle.

    The [`Player`] owns construction, seeking, and teardown; hosts observe
    playback through an [`EventSink`] listener and steer it through the
    player's control methods. See the member crates for the individual
    stages.
*/

mod audio;
mod display;
mod player;

pub use audio::Audio;
pub use display::Display;
pub use player::{Player, PlayerConfig};

pub use media_types::{
    is_camera_uri, AudioCodec, AudioFrame, Error, EventSink, MediaInfo, NullEvents, PixelFormat,
    Result, SampleFormat, VideoFrame,
};
