/*!
    Recording writer for the medley pipeline.

    The writer persists compressed packets to a container file while the
    shared `recording` flag is set, remuxing without re-encoding: output
    streams copy the input codec parameters verbatim. The container is
    picked from the source audio codec (µ-law/A-law ⇒ `.mov`, AAC ⇒
    `.mp4`); any other audio codec disables audio recording and falls back
    to `.mp4` with video only.

    Packets written to a file are renumbered: each stream's pts/dts restart
    at zero and advance by packet duration, which normalizes timelines
    across file splits.

    A [`RollingCache`] of recent packets backs event-driven recording: when
    the flag toggles on, the cache drains into the fresh file first so the
    recording starts up to `cache_seconds` before the toggle.

    Write failures are logged and never tear down the pipeline; a recording
    that goes wrong must not take playback with it.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use parking_lot::Mutex;

use media_source::CodecConfig;
use media_types::{
    AudioCodec, Error, Item, Packet, PacketQueue, PipelineSignal, Result, SharedState, StreamKind,
};
use tracing::{info, warn};

mod cache;

pub use cache::RollingCache;

/// Per-output-stream bookkeeping: where packets go and the running pts
/// counter used for renumbering.
struct StreamSlot {
    out_index: usize,
    next_pts: i64,
    input_tb: ffmpeg::Rational,
    output_tb: ffmpeg::Rational,
}

impl StreamSlot {
    /// Take the pts for the next written packet and advance the counter
    /// by the packet's duration. Zero-duration packets advance by zero.
    fn claim_pts(&mut self, duration: i64) -> i64 {
        let pts = self.next_pts;
        self.next_pts += duration.max(0);
        pts
    }
}

/**
    The writer stage.

    Consumes one packet queue (multiplexed by the reader in muxed mode, or
    by both decoders in post-decode mode) and maintains the pre-roll cache
    on every iteration, recording or not. The first end-of-stream signal
    closes any open file and ends the stage.
*/
pub struct Writer {
    state: Arc<SharedState>,
    input: Arc<PacketQueue>,
    filename: Arc<Mutex<String>>,
    active: Arc<AtomicBool>,
    octx: Option<ffmpeg::format::context::Output>,
    video_config: Option<CodecConfig>,
    audio_config: Option<CodecConfig>,
    audio_codec: AudioCodec,
    disable_video: bool,
    disable_audio: bool,
    video_slot: Option<StreamSlot>,
    audio_slot: Option<StreamSlot>,
    cache: RollingCache,
    metadata: Vec<(String, String)>,
    current_path: String,
}

// SAFETY: the output format context is owned by the writer and touched
// only by its worker thread.
unsafe impl Send for Writer {}

impl Writer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<SharedState>,
        input: Arc<PacketQueue>,
        filename: Arc<Mutex<String>>,
        active: Arc<AtomicBool>,
        video_config: Option<CodecConfig>,
        audio_config: Option<CodecConfig>,
        audio_codec: AudioCodec,
        disable_video: bool,
        disable_audio: bool,
        metadata: Vec<(String, String)>,
    ) -> Self {
        let cache = RollingCache::new(
            video_config.as_ref().map(|c| c.timing()),
            audio_config.as_ref().map(|c| c.timing()),
            state.cache_seconds,
        );
        Self {
            state,
            input,
            filename,
            active,
            octx: None,
            video_config,
            audio_config,
            audio_codec,
            disable_video,
            disable_audio,
            video_slot: None,
            audio_slot: None,
            cache,
            metadata,
            current_path: String::new(),
        }
    }

    /// Drive the write loop until end of stream.
    pub fn run(&mut self) {
        while self.write() {}
    }

    /**
        One writer iteration. Returns false once end of stream was seen.
    */
    pub fn write(&mut self) -> bool {
        let item = self.input.pop();
        match item {
            Item::Signal(PipelineSignal::Eos) => {
                // Either producer may signal first; the first one ends the
                // stage and later signals are never read.
                self.close();
                false
            }
            Item::Signal(PipelineSignal::Flush) => true,
            Item::Data(pkt) => {
                if self.state.is_recording() {
                    if self.octx.is_none() {
                        match self.open() {
                            Ok(()) => self.write_cached(),
                            Err(e) => warn!("error opening recording: {e}"),
                        }
                    }
                    if self.octx.is_some() {
                        self.write_packet(&pkt);
                    }
                } else if self.octx.is_some() {
                    self.close();
                }
                self.cache.push(pkt);
                true
            }
        }
    }

    /// Whether a file is currently open. Exposed to the supervisor through
    /// the shared `active` flag as well, for file-break sequencing.
    pub fn is_open(&self) -> bool {
        self.octx.is_some()
    }

    fn container_extension(&mut self) -> &'static str {
        if self.audio_config.is_none() || self.disable_audio {
            return ".mp4";
        }
        match self.audio_codec.container_extension() {
            Some(ext) => ext,
            None => {
                warn!(
                    "audio codec {:?} is not supported, audio recording is disabled",
                    self.audio_codec
                );
                self.disable_audio = true;
                ".mp4"
            }
        }
    }

    fn open(&mut self) -> Result<()> {
        let extension = self.container_extension();
        let base = self.filename.lock().clone();
        let path = format!("{base}{extension}");

        let mut octx = ffmpeg::format::output(&path)
            .map_err(|e| Error::codec(format!("open output {path}: {e}")))?;

        self.video_slot = None;
        self.audio_slot = None;
        if !self.disable_video {
            if let Some(config) = &self.video_config {
                let slot = add_output_stream(&mut octx, config)?;
                self.video_slot = Some(slot);
            }
        }
        if !self.disable_audio {
            if let Some(config) = &self.audio_config {
                let slot = add_output_stream(&mut octx, config)?;
                self.audio_slot = Some(slot);
            }
        }

        if !self.metadata.is_empty() {
            let mut dict = ffmpeg::Dictionary::new();
            for (key, value) in &self.metadata {
                dict.set(key, value);
            }
            octx.set_metadata(dict);
        }

        octx.write_header()
            .map_err(|e| Error::codec(format!("write header {path}: {e}")))?;

        // The muxer may have renegotiated the stream time bases.
        for slot in [&mut self.video_slot, &mut self.audio_slot]
            .into_iter()
            .flatten()
        {
            if let Some(stream) = octx.stream(slot.out_index) {
                slot.output_tb = stream.time_base();
            }
        }

        info!("recording to {path}");
        self.current_path = path;
        self.octx = Some(octx);
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    /// Drain the pre-roll cache into the freshly opened file.
    fn write_cached(&mut self) {
        let mut pending = Vec::new();
        self.cache.drain(&mut |pkt| pending.push(pkt));
        for pkt in &pending {
            self.write_packet(pkt);
        }
    }

    fn write_packet(&mut self, pkt: &Packet) {
        let slot = match pkt.stream {
            StreamKind::Video if !self.disable_video => self.video_slot.as_mut(),
            StreamKind::Audio if !self.disable_audio => self.audio_slot.as_mut(),
            _ => None,
        };
        let (Some(slot), Some(octx)) = (slot, self.octx.as_mut()) else {
            return;
        };

        let mut av_pkt = ffmpeg::Packet::copy(&pkt.data);
        av_pkt.set_stream(slot.out_index);
        let pts = slot.claim_pts(pkt.duration.0);
        av_pkt.set_pts(Some(pts));
        av_pkt.set_dts(Some(pts));
        av_pkt.set_duration(pkt.duration.0);
        if pkt.is_key_frame {
            av_pkt.set_flags(ffmpeg::packet::Flags::KEY);
        }
        av_pkt.rescale_ts(slot.input_tb, slot.output_tb);

        if let Err(e) = av_pkt.write_interleaved(octx) {
            warn!("packet write error on {}: {e}", self.current_path);
        }
    }

    /// Finalize the open file, if any: trailer, close, reset counters.
    fn close(&mut self) {
        if let Some(mut octx) = self.octx.take() {
            if let Err(e) = octx.write_trailer() {
                warn!("writer close error on {}: {e}", self.current_path);
            }
            info!("closed recording {}", self.current_path);
        }
        self.video_slot = None;
        self.audio_slot = None;
        self.active.store(false, Ordering::Release);
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        // A file left open by an abrupt teardown still gets its trailer.
        self.close();
    }
}

fn add_output_stream(
    octx: &mut ffmpeg::format::context::Output,
    config: &CodecConfig,
) -> Result<StreamSlot> {
    let mut ost = octx
        .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
        .map_err(|e| Error::codec(format!("add output stream: {e}")))?;
    ost.set_parameters(config.parameters());
    // Codec tags are container-specific; keep the muxer free to pick.
    unsafe {
        (*ost.parameters().as_mut_ptr()).codec_tag = 0;
    }
    let timing = config.timing();
    let input_tb = ffmpeg::Rational::new(timing.time_base.num, timing.time_base.den);
    Ok(StreamSlot {
        out_index: ost.index(),
        next_pts: 0,
        input_tb,
        output_tb: input_tb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> StreamSlot {
        StreamSlot {
            out_index: 0,
            next_pts: 0,
            input_tb: ffmpeg::Rational::new(1, 1000),
            output_tb: ffmpeg::Rational::new(1, 1000),
        }
    }

    #[test]
    fn renumbering_accumulates_durations() {
        let mut slot = slot();
        assert_eq!(slot.claim_pts(100), 0);
        assert_eq!(slot.claim_pts(100), 100);
        assert_eq!(slot.claim_pts(50), 200);
        assert_eq!(slot.next_pts, 250);
    }

    #[test]
    fn zero_duration_advances_by_zero() {
        let mut slot = slot();
        assert_eq!(slot.claim_pts(0), 0);
        assert_eq!(slot.claim_pts(0), 0);
        assert_eq!(slot.claim_pts(100), 0);
        assert_eq!(slot.claim_pts(0), 100);
    }

    #[test]
    fn negative_duration_is_clamped() {
        let mut slot = slot();
        assert_eq!(slot.claim_pts(-100), 0);
        assert_eq!(slot.next_pts, 0);
    }
}
