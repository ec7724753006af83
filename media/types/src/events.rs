/*!
    Host-facing listener interface.

    The pipeline reports everything through a single listener trait with
    no-op defaults, so hosts implement only what they care about. A shared
    `Arc<dyn EventSink>` is handed to every stage; absent listeners cost a
    virtual call to an empty body.
*/

use crate::{AudioFrame, VideoFrame};

/**
    Playback and recording event listener.

    Methods may be invoked from any pipeline thread, including the sound
    device's callback thread, and must return promptly.
*/
#[allow(unused_variables)]
pub trait EventSink: Send + Sync {
    /// Playback progress as a fraction of the media duration.
    fn progress(&self, pct: f32, uri: &str) {}

    /// A video frame was presented.
    fn render(&self, frame: &VideoFrame, uri: &str) {}

    /// An audio frame was handed to the sound device.
    fn audio_frame(&self, frame: &AudioFrame, uri: &str) {}

    /// Advisory message (timeouts, transient decode errors, ...).
    fn info(&self, msg: &str, uri: &str) {}

    /// Fatal pipeline error; `request_reconnect` echoes the player config.
    fn error(&self, msg: &str, uri: &str, request_reconnect: bool) {}

    /// The pipeline finished construction and playback began.
    fn media_playing_started(&self, uri: &str) {}

    /// The pipeline was torn down completely.
    fn media_playing_stopped(&self, uri: &str) {}

    /// A video packet was discarded because the decoder fell behind.
    fn packet_drop(&self, uri: &str) {}
}

/// Listener that ignores every event.
pub struct NullEvents;

impl EventSink for NullEvents {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn null_events_accepts_everything() {
        let sink: Arc<dyn EventSink> = Arc::new(NullEvents);
        sink.progress(0.5, "clip.mp4");
        sink.info("note", "clip.mp4");
        sink.error("bad", "clip.mp4", true);
        sink.media_playing_started("clip.mp4");
        sink.media_playing_stopped("clip.mp4");
        sink.packet_drop("clip.mp4");
    }
}
