/*!
    The reader stage.
*/

use std::os::raw::c_void;
use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use ffmpeg::{ffi, format};

use media_types::{
    Error, EventSink, Item, MediaDuration, MediaInfo, Packet, PacketQueue, PipelineSignal, Pts,
    Result, SharedState, StreamKind, StreamTiming, Terminator,
};
use tracing::warn;

use crate::interrupt::{interrupt_callback, InterruptFlag};
use crate::READ_TIMEOUT_SECS;

/**
    Codec parameters of one input stream, handed to the decoders and the
    writer so they never touch the format context themselves.
*/
pub struct CodecConfig {
    parameters: ffmpeg::codec::Parameters,
    timing: StreamTiming,
}

impl CodecConfig {
    /// Fresh copy of the stream's codec parameters.
    pub fn parameters(&self) -> ffmpeg::codec::Parameters {
        self.parameters.clone()
    }

    pub fn timing(&self) -> StreamTiming {
        self.timing
    }
}

// SAFETY: the wrapped AVCodecParameters is owned by this config, copied out
// of the stream at construction, and only read afterwards.
unsafe impl Send for CodecConfig {}

/**
    The reader stage: owns the demuxer and feeds the downstream queues.

    Constructed on the supervising thread so stream facts are available
    before the pipeline is wired, then moved onto its worker thread where
    [`Reader::run`] loops until end of stream, timeout or termination.
*/
pub struct Reader {
    uri: String,
    input: format::context::Input,
    interrupt: Box<InterruptFlag>,
    info: Arc<MediaInfo>,
    state: Arc<SharedState>,
    events: Arc<dyn EventSink>,
    clear_hook: Option<Arc<dyn Fn() + Send + Sync>>,
    terminator: Option<Arc<Terminator>>,
    video_pkts: Option<Arc<PacketQueue>>,
    audio_pkts: Option<Arc<PacketQueue>>,
    writer_pkts: Option<Arc<PacketQueue>>,
}

// SAFETY: the format context is created here and used exclusively by the
// reader's worker thread after construction; queries from other threads go
// through the plain-data MediaInfo snapshot instead.
unsafe impl Send for Reader {}

impl Reader {
    /**
        Open `uri` and discover its streams.

        Installs a `timeout` option and an interrupt callback so that both
        the open itself and every subsequent read are bounded by the
        five-second I/O deadline.
    */
    pub fn open(
        uri: &str,
        state: Arc<SharedState>,
        events: Arc<dyn EventSink>,
        disable_video: bool,
        disable_audio: bool,
    ) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::codec(e.to_string()))?;

        let mut options = ffmpeg::Dictionary::new();
        options.set("timeout", &(READ_TIMEOUT_SECS * 1_000_000).to_string());
        let mut input = format::input_with_dictionary(&uri, options)
            .map_err(|e| Error::codec(format!("open {uri}: {e}")))?;

        let interrupt = Box::new(InterruptFlag::new());
        unsafe {
            (*input.as_mut_ptr()).interrupt_callback = ffi::AVIOInterruptCB {
                callback: Some(interrupt_callback),
                opaque: &*interrupt as *const InterruptFlag as *mut c_void,
            };
        }

        let info = Arc::new(crate::probe::probe(&input, uri, disable_video, disable_audio));

        Ok(Self {
            uri: uri.to_string(),
            input,
            interrupt,
            info,
            state,
            events,
            clear_hook: None,
            terminator: None,
            video_pkts: None,
            audio_pkts: None,
            writer_pkts: None,
        })
    }

    /// Stream facts discovered at open.
    pub fn info(&self) -> Arc<MediaInfo> {
        Arc::clone(&self.info)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /**
        Wire the reader into the pipeline. Split mode publishes to the
        video/audio queues; passing a writer queue selects muxed mode where
        every packet goes to the writer unchanged.
    */
    pub fn connect(
        &mut self,
        video_pkts: Option<Arc<PacketQueue>>,
        audio_pkts: Option<Arc<PacketQueue>>,
        writer_pkts: Option<Arc<PacketQueue>>,
        clear_hook: Arc<dyn Fn() + Send + Sync>,
        terminator: Arc<Terminator>,
    ) {
        self.video_pkts = video_pkts;
        self.audio_pkts = audio_pkts;
        self.writer_pkts = writer_pkts;
        self.clear_hook = Some(clear_hook);
        self.terminator = Some(terminator);
    }

    /// Codec parameters of the selected video stream.
    pub fn video_codec_config(&self) -> Option<CodecConfig> {
        let video = self.info.video.as_ref()?;
        let stream = self.input.stream(video.timing.index)?;
        Some(CodecConfig {
            parameters: stream.parameters(),
            timing: video.timing,
        })
    }

    /// Codec parameters of the selected audio stream.
    pub fn audio_codec_config(&self) -> Option<CodecConfig> {
        let audio = self.info.audio.as_ref()?;
        let stream = self.input.stream(audio.timing.index)?;
        Some(CodecConfig {
            parameters: stream.parameters(),
            timing: audio.timing,
        })
    }

    /// Drive the read loop until the stream ends or the pipeline stops.
    pub fn run(&mut self) {
        while self.read() {}
    }

    /**
        One reader iteration: re-arm the I/O deadline, service a pending
        seek, read one packet and route it. Returns false once the reader
        is done.
    */
    pub fn read(&mut self) -> bool {
        self.interrupt.arm();
        let mut pkt = ffmpeg::Packet::empty();

        let result = if let Some(target) = self.state.seek_target() {
            self.run_clear_hook();
            self.seek_input(target);
            let result = pkt.read(&mut self.input);
            self.run_clear_hook();
            self.state.clear_seek();
            result
        } else {
            pkt.read(&mut self.input)
        };

        match result {
            Ok(()) => {
                if self.state.is_closed() {
                    return false;
                }
                self.route(&pkt);
                !self.state.is_closed()
            }
            Err(ffmpeg::Error::Eof) => {
                self.finish();
                false
            }
            Err(_) if self.interrupt.triggered() => {
                self.events.info("Reader terminated by timeout", &self.uri);
                self.finish();
                false
            }
            Err(e) => {
                warn!(uri = %self.uri, "read error: {e}");
                match &self.terminator {
                    Some(terminator) => terminator.terminate(),
                    None => self.state.set_closed(),
                }
                false
            }
        }
    }

    /// Seek on the video stream, or audio when there is no video. The
    /// direction flag is backward when the target precedes the last pts
    /// this reader observed.
    fn seek_input(&mut self, target: Pts) {
        let (kind, timing) = match (&self.info.video, &self.info.audio) {
            (Some(v), _) => (StreamKind::Video, v.timing),
            (None, Some(a)) => (StreamKind::Audio, a.timing),
            (None, None) => return,
        };
        let mut flags: std::os::raw::c_int = 0;
        if let Some(last) = self.state.last_pts(kind) {
            if target < last {
                flags |= ffi::AVSEEK_FLAG_BACKWARD as std::os::raw::c_int;
            }
        }
        let ret = unsafe {
            ffi::av_seek_frame(
                self.input.as_mut_ptr(),
                timing.index as i32,
                target.0,
                flags,
            )
        };
        if ret < 0 {
            warn!(uri = %self.uri, "seek to pts {} failed ({ret})", target.0);
        }
    }

    fn route(&mut self, pkt: &ffmpeg::Packet) {
        let index = pkt.stream();
        let video_index = self.info.video.as_ref().map(|v| v.timing.index);
        let audio_index = self.info.audio.as_ref().map(|a| a.timing.index);

        if let Some(writer) = self.writer_pkts.clone() {
            // Muxed mode: the writer receives everything it can store.
            if Some(index) == video_index {
                writer.push(Item::Data(self.convert(pkt, StreamKind::Video)));
            } else if Some(index) == audio_index {
                writer.push(Item::Data(self.convert(pkt, StreamKind::Audio)));
            }
            return;
        }

        if Some(index) == video_index {
            self.state
                .set_last_pts(StreamKind::Video, pkt.pts().map(Pts));
            if let Some(video) = self.video_pkts.clone() {
                // Backpressure policy: drop video rather than block the
                // demuxer, so audio keeps flowing.
                if video.is_full() {
                    self.events.packet_drop(&self.uri);
                } else {
                    video.push(Item::Data(self.convert(pkt, StreamKind::Video)));
                }
            }
        } else if Some(index) == audio_index {
            self.state
                .set_last_pts(StreamKind::Audio, pkt.pts().map(Pts));
            if let Some(audio) = self.audio_pkts.clone() {
                audio.push(Item::Data(self.convert(pkt, StreamKind::Audio)));
            }
        }
    }

    fn convert(&self, pkt: &ffmpeg::Packet, kind: StreamKind) -> Packet {
        let timing = match kind {
            StreamKind::Video => self.info.video.as_ref().map(|v| v.timing),
            StreamKind::Audio => self.info.audio.as_ref().map(|a| a.timing),
        }
        .expect("routed packet always has stream info");
        Packet {
            data: pkt.data().map(<[u8]>::to_vec).unwrap_or_default(),
            pts: pkt.pts().map(Pts),
            dts: pkt.dts().map(Pts),
            duration: MediaDuration(pkt.duration()),
            time_base: timing.time_base,
            is_key_frame: pkt.is_key(),
            stream: kind,
        }
    }

    /// Graceful end of input: every consumer gets an end-of-stream signal
    /// and already-queued packets are left to drain.
    fn finish(&mut self) {
        self.state.set_closed();
        self.state.clear_seek();
        for queue in [&self.video_pkts, &self.audio_pkts, &self.writer_pkts]
            .into_iter()
            .flatten()
        {
            queue.push(Item::Signal(PipelineSignal::Eos));
        }
    }

    fn run_clear_hook(&self) {
        if let Some(hook) = &self.clear_hook {
            hook();
        }
    }
}
