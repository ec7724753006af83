/*!
    The player supervisor.

    [`Player::play`] assembles the whole pipeline — queues, reader, writer,
    decoders, filters, sound device, display — spawns one worker thread per
    stage, and tears everything down in reverse dependency order when the
    stream ends, the user quits, or construction fails. Control methods
    (`seek`, `toggle_paused`, `toggle_recording`, `terminate`, ...) may be
    called from any thread while playback runs.
*/

use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ffmpeg_next as ffmpeg;
use parking_lot::Mutex;

use media_decode::{AudioDecoder, DecodedAudioQueue, DecodedVideoQueue, VideoDecoder};
use media_filter::{AudioFilter, AudioFilterConfig, VideoFilter, VideoFilterConfig};
use media_sink::Writer;
use media_source::Reader;
use media_types::{
    is_camera_uri, AudioCodec, AudioFrameQueue, Error, EventSink, Item, MediaInfo, PacketQueue,
    PipelineSignal, Pts, Result, SharedState, Terminator, VideoFrameQueue,
};
use tracing::warn;

use crate::audio::Audio;
use crate::display::Display;

/// Compressed-packet queue depth between reader and decoders/writer.
const PACKET_QUEUE_SIZE: usize = 128;
/// Frame queues hold a single frame so decode stays in lockstep with
/// presentation.
const FRAME_QUEUE_SIZE: usize = 1;

/**
    Static playback configuration, fixed before `play()`.
*/
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Treat the source as a live camera stream: enables recording,
    /// latency trimming, and disables seeking and pause.
    pub live_stream: bool,
    /// Create no window; frames reach the render listener only.
    pub headless: bool,
    /// Suppress decoded playback entirely; packets route straight to the
    /// writer.
    pub hidden: bool,
    pub disable_video: bool,
    pub disable_audio: bool,
    /// Hardware decoder device-type name ("cuda", "vaapi", ...); empty
    /// for software decoding.
    pub hw_device_type: String,
    /// Filter-graph description for the video path; empty for identity.
    pub video_filter: String,
    /// Filter-graph description for the audio path; empty for identity.
    pub audio_filter: String,
    pub audio_driver_index: usize,
    /// Pre-roll cache span for recording.
    pub buffer_size_in_seconds: i64,
    /// When positive, seek to this fraction before playback starts.
    pub file_start_from_seek: f32,
    /// Echoed to the error listener so hosts can decide to reconnect.
    pub request_reconnect: bool,
    /// Initial volume, 0..=100.
    pub volume: i32,
    pub mute: bool,
    /// Silence the codec backend's own logging.
    pub quiet_backend_log: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            live_stream: true,
            headless: true,
            hidden: false,
            disable_video: false,
            disable_audio: false,
            hw_device_type: String::new(),
            video_filter: String::new(),
            audio_filter: String::new(),
            audio_driver_index: 0,
            buffer_size_in_seconds: 1,
            file_start_from_seek: -1.0,
            request_reconnect: true,
            volume: 100,
            mute: false,
            quiet_backend_log: true,
        }
    }
}

/// Handles shared with a running pipeline, published by `play()` and
/// dropped at teardown.
struct Runtime {
    state: Arc<SharedState>,
    terminator: Arc<Terminator>,
    info: Arc<MediaInfo>,
    clear_hook: Arc<dyn Fn() + Send + Sync>,
    one_shot: Arc<AtomicBool>,
    has_display: bool,
    video_pkts: Arc<PacketQueue>,
    audio_pkts: Arc<PacketQueue>,
    writer_filename: Arc<Mutex<String>>,
    writer_active: Arc<AtomicBool>,
}

/**
    A single-URI media player.

    Construct, adjust the [`PlayerConfig`], then call [`Player::play`]
    (blocking) or [`Player::start`] (detached). The instance may be shared
    across threads; every control method is safe to call whether or not a
    pipeline is currently running.
*/
pub struct Player {
    uri: String,
    config: PlayerConfig,
    events: Arc<dyn EventSink>,
    crashed: AtomicBool,
    volume: AtomicI32,
    mute: AtomicBool,
    metadata: Mutex<Vec<(String, String)>>,
    runtime: Mutex<Option<Arc<Runtime>>>,
}

impl Player {
    pub fn new(uri: impl Into<String>, config: PlayerConfig, events: Arc<dyn EventSink>) -> Self {
        let volume = config.volume.clamp(0, 100);
        let mute = config.mute;
        Self {
            uri: uri.into(),
            config,
            events,
            crashed: AtomicBool::new(false),
            volume: AtomicI32::new(volume),
            mute: AtomicBool::new(mute),
            metadata: Mutex::new(Vec::new()),
            runtime: Mutex::new(None),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Whether pipeline construction failed on the last `play()`.
    pub fn crashed(&self) -> bool {
        self.crashed.load(Ordering::Relaxed)
    }

    /**
        Run the pipeline to completion on the calling thread.

        Construction failures are reported through the error listener (with
        `request_reconnect` echoed from the config) rather than returned;
        `media_playing_stopped` always fires after teardown.
    */
    pub fn play(&self) {
        if self.config.quiet_backend_log {
            ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Quiet);
        }

        let state = Arc::new(SharedState::new(
            self.config.live_stream,
            self.config.buffer_size_in_seconds,
        ));
        state.set_volume(self.volume.load(Ordering::Relaxed) as f32 / 100.0);
        state.set_muted(self.mute.load(Ordering::Relaxed));

        let mut stages = StageHandles::default();
        let setup = self.setup(&state, &mut stages);

        let mut display = None;
        match setup {
            Ok(built_display) => {
                self.events.media_playing_started(&self.uri);
                display = built_display;
            }
            Err(e) => {
                self.crashed.store(true, Ordering::Relaxed);
                self.events
                    .error(&e.to_string(), &self.uri, self.config.request_reconnect);
                if let Some(runtime) = self.runtime.lock().as_ref() {
                    runtime.terminator.terminate();
                }
            }
        }

        // Windowed display runs on this thread; headless display already
        // runs on its worker.
        if let Some(mut display) = display {
            display.run();
        }

        stages.join_all();

        // Give the sound device up to a second to observe end of stream
        // before dropping it.
        if let Some(audio) = stages.audio.take() {
            for _ in 0..200 {
                if audio.is_closed() {
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
            drop(audio);
        }

        *self.runtime.lock() = None;

        let events = Arc::clone(&self.events);
        let uri = self.uri.clone();
        thread::spawn(move || events.media_playing_stopped(&uri));
    }

    /// Run `play()` on a detached thread.
    pub fn start(self: &Arc<Self>) {
        let player = Arc::clone(self);
        thread::spawn(move || player.play());
    }

    /// Request asynchronous termination of a running pipeline.
    pub fn terminate(&self) {
        let Some(runtime) = self.runtime.lock().clone() else {
            return;
        };
        thread::spawn(move || runtime.terminator.terminate());
    }

    /**
        Seek to a fraction of the media duration.

        While paused, the downstream queues are cleared immediately and the
        display is armed to present exactly one frame at the new position.
    */
    pub fn seek(&self, pct: f32) {
        let Some(runtime) = self.runtime.lock().clone() else {
            return;
        };
        if runtime.state.is_closed() {
            return;
        }
        let Some(timing) = runtime.info.primary_timing() else {
            return;
        };
        let target_ms =
            runtime.info.start_time_ms as f64 + pct as f64 * runtime.info.duration_ms as f64;
        let target = Pts((target_ms / (timing.time_base.to_f64() * 1000.0)) as i64);
        runtime.state.request_seek(target);

        if runtime.state.is_paused() {
            (runtime.clear_hook)();
            if runtime.has_display {
                runtime.one_shot.store(true, Ordering::Relaxed);
            } else {
                self.events.progress(pct, &self.uri);
            }
        }
    }

    pub fn width(&self) -> i32 {
        self.with_info(|info| info.width()).unwrap_or(-1)
    }

    pub fn height(&self) -> i32 {
        self.with_info(|info| info.height()).unwrap_or(-1)
    }

    /// Media duration in milliseconds; zero when unknown or not playing.
    pub fn duration(&self) -> i64 {
        self.with_info(|info| info.duration_ms).unwrap_or(0)
    }

    pub fn has_video(&self) -> bool {
        self.with_info(|info| info.has_video()).unwrap_or(false)
    }

    pub fn has_audio(&self) -> bool {
        self.with_info(|info| info.has_audio()).unwrap_or(false)
    }

    pub fn audio_codec_name(&self) -> String {
        self.with_info(|info| {
            info.audio
                .as_ref()
                .map_or_else(|| "unknown".to_string(), |a| a.codec_name.clone())
        })
        .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn is_paused(&self) -> bool {
        self.with_state(|state| state.is_paused()).unwrap_or(false)
    }

    pub fn is_recording(&self) -> bool {
        self.with_state(|state| state.is_recording())
            .unwrap_or(false)
    }

    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Relaxed)
    }

    pub fn toggle_paused(&self) {
        if let Some(runtime) = self.runtime.lock().as_ref() {
            runtime.state.toggle_paused();
        }
    }

    /// Set the recording base filename and flip the recording flag.
    pub fn toggle_recording(&self, filename: &str) {
        if let Some(runtime) = self.runtime.lock().as_ref() {
            *runtime.writer_filename.lock() = filename.to_string();
            runtime.state.toggle_recording();
        }
    }

    /**
        Close the current recording file and continue into a new one.

        The current file gets its trailer, and the next packet reopens
        under the new base filename. Runs on a detached thread because the
        close completes asynchronously on the writer's worker.
    */
    pub fn start_file_break(&self, filename: &str) {
        let Some(runtime) = self.runtime.lock().clone() else {
            return;
        };
        *runtime.writer_filename.lock() = filename.to_string();
        thread::spawn(move || {
            if !runtime.state.is_recording() {
                return;
            }
            runtime.state.set_recording(false);
            while runtime.writer_active.load(Ordering::Acquire) {
                if runtime.state.is_terminated() {
                    return;
                }
                thread::sleep(Duration::from_millis(10));
            }
            runtime.state.set_recording(true);
        });
    }

    /// Discard everything buffered in the packet queues.
    pub fn clear_buffer(&self) {
        if let Some(runtime) = self.runtime.lock().as_ref() {
            runtime.video_pkts.clear();
            runtime.audio_pkts.clear();
        }
    }

    pub fn set_volume(&self, volume: i32) {
        let volume = volume.clamp(0, 100);
        self.volume.store(volume, Ordering::Relaxed);
        if let Some(runtime) = self.runtime.lock().as_ref() {
            runtime.state.set_volume(volume as f32 / 100.0);
        }
    }

    pub fn get_volume(&self) -> i32 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Relaxed);
        if let Some(runtime) = self.runtime.lock().as_ref() {
            runtime.state.set_muted(mute);
        }
    }

    /// Metadata written into subsequently opened recording files.
    pub fn set_metadata(&self, key: &str, value: &str) {
        let mut metadata = self.metadata.lock();
        if let Some(entry) = metadata.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            metadata.push((key.to_string(), value.to_string()));
        }
    }

    /// HTML summary of the opened streams.
    pub fn stream_info(&self) -> String {
        self.with_info(|info| info.stream_summary())
            .unwrap_or_else(|| "no stream info available".to_string())
    }

    pub fn is_camera_stream(&self) -> bool {
        is_camera_uri(&self.uri)
    }

    /// Version report for the codec backend libraries.
    pub fn ffmpeg_versions() -> String {
        fn fmt(name: &str, version: u32) -> String {
            format!(
                "{name} {}.{}.{}",
                version >> 16,
                (version >> 8) & 0xff,
                version & 0xff
            )
        }
        [
            fmt("avcodec", ffmpeg::codec::version()),
            fmt("avfilter", ffmpeg::filter::version()),
            fmt("avformat", ffmpeg::format::version()),
            fmt("avutil", ffmpeg::util::version()),
        ]
        .join(" ")
    }

    /// Hardware decoder device types compiled into the backend.
    pub fn hardware_decoders() -> Vec<String> {
        let mut result = Vec::new();
        let mut device_type = ffmpeg::ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;
        unsafe {
            loop {
                device_type = ffmpeg::ffi::av_hwdevice_iterate_types(device_type);
                if device_type == ffmpeg::ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                    break;
                }
                let name = ffmpeg::ffi::av_hwdevice_get_type_name(device_type);
                if !name.is_null() {
                    result.push(CStr::from_ptr(name).to_string_lossy().into_owned());
                }
            }
        }
        result
    }

    /// Names of the available sound drivers.
    pub fn audio_drivers() -> Vec<String> {
        sdl2::audio::drivers().map(str::to_string).collect()
    }

    fn with_info<T>(&self, f: impl FnOnce(&MediaInfo) -> T) -> Option<T> {
        self.runtime.lock().as_ref().map(|rt| f(&rt.info))
    }

    fn with_state<T>(&self, f: impl FnOnce(&SharedState) -> T) -> Option<T> {
        self.runtime.lock().as_ref().map(|rt| f(&rt.state))
    }

    /**
        Build the pipeline and spawn every worker. Returns the display
        stage for windowed mode (it runs on the caller's thread).
    */
    fn setup(&self, state: &Arc<SharedState>, stages: &mut StageHandles) -> Result<Option<Display>> {
        let config = &self.config;

        let video_pkts = Arc::new(PacketQueue::bounded(PACKET_QUEUE_SIZE));
        let audio_pkts = Arc::new(PacketQueue::bounded(PACKET_QUEUE_SIZE));
        let writer_pkts = Arc::new(PacketQueue::bounded(PACKET_QUEUE_SIZE));
        let decoded_video = Arc::new(DecodedVideoQueue::bounded(FRAME_QUEUE_SIZE));
        let decoded_audio = Arc::new(DecodedAudioQueue::bounded(FRAME_QUEUE_SIZE));
        let filtered_video = Arc::new(VideoFrameQueue::bounded(FRAME_QUEUE_SIZE));
        let filtered_audio = Arc::new(AudioFrameQueue::bounded(FRAME_QUEUE_SIZE));

        let mut reader = Reader::open(
            &self.uri,
            Arc::clone(state),
            Arc::clone(&self.events),
            config.disable_video,
            config.disable_audio,
        )?;
        let info = reader.info();

        let use_video = info.has_video() && !config.disable_video && !config.hidden;
        let use_audio = info.has_audio() && !config.disable_audio && !config.hidden;
        let muxed_recording = config.live_stream && config.hidden;

        let terminator = Arc::new(Terminator::new(
            Arc::clone(state),
            use_video.then(|| Arc::clone(&video_pkts)),
            use_audio.then(|| Arc::clone(&audio_pkts)),
            muxed_recording.then(|| Arc::clone(&writer_pkts)),
        ));

        let clear_hook: Arc<dyn Fn() + Send + Sync> = {
            let state = Arc::clone(state);
            let video_pkts = Arc::clone(&video_pkts);
            let audio_pkts = Arc::clone(&audio_pkts);
            let decoded_video = Arc::clone(&decoded_video);
            let decoded_audio = Arc::clone(&decoded_audio);
            let filtered_video = Arc::clone(&filtered_video);
            let filtered_audio = Arc::clone(&filtered_audio);
            Arc::new(move || {
                if state.is_closed() {
                    return;
                }
                audio_pkts.clear();
                video_pkts.clear();
                if use_audio {
                    decoded_audio.clear();
                    audio_pkts.push(Item::Signal(PipelineSignal::Flush));
                    filtered_audio.clear();
                }
                if use_video {
                    decoded_video.clear();
                    video_pkts.push(Item::Signal(PipelineSignal::Flush));
                    filtered_video.clear();
                }
            })
        };

        let one_shot = Arc::new(AtomicBool::new(false));
        let writer_filename = Arc::new(Mutex::new(String::new()));
        let writer_active = Arc::new(AtomicBool::new(false));

        let runtime = Arc::new(Runtime {
            state: Arc::clone(state),
            terminator: Arc::clone(&terminator),
            info: Arc::clone(&info),
            clear_hook: Arc::clone(&clear_hook),
            one_shot: Arc::clone(&one_shot),
            has_display: use_video,
            video_pkts: Arc::clone(&video_pkts),
            audio_pkts: Arc::clone(&audio_pkts),
            writer_filename: Arc::clone(&writer_filename),
            writer_active: Arc::clone(&writer_active),
        });
        *self.runtime.lock() = Some(runtime);

        let video_config = reader.video_codec_config();
        let audio_config = reader.audio_codec_config();

        reader.connect(
            use_video.then(|| Arc::clone(&video_pkts)),
            use_audio.then(|| Arc::clone(&audio_pkts)),
            muxed_recording.then(|| Arc::clone(&writer_pkts)),
            Arc::clone(&clear_hook),
            Arc::clone(&terminator),
        );

        // Recording is a live-stream concern; file playback never writes.
        if config.live_stream {
            let audio_codec = info
                .audio
                .as_ref()
                .map_or(AudioCodec::Other, |a| a.codec);
            let mut writer = Writer::new(
                Arc::clone(state),
                Arc::clone(&writer_pkts),
                Arc::clone(&writer_filename),
                Arc::clone(&writer_active),
                reader.video_codec_config(),
                reader.audio_codec_config(),
                audio_codec,
                config.disable_video,
                config.disable_audio,
                self.metadata.lock().clone(),
            );
            stages.writer = Some(spawn_stage("writer", move || writer.run()));
        }

        if config.file_start_from_seek > 0.0 {
            self.initial_seek(&info, state, config.file_start_from_seek);
        }

        if use_video {
            let codec_config = video_config
                .ok_or_else(|| Error::codec("video stream has no codec parameters"))?;
            let hw_device =
                (!config.hw_device_type.is_empty()).then_some(config.hw_device_type.as_str());
            let mut decoder = VideoDecoder::new(
                &codec_config,
                hw_device,
                Arc::clone(state),
                Arc::clone(&video_pkts),
                Arc::clone(&decoded_video),
            )?;
            if config.live_stream {
                decoder.set_writer_queue(Arc::clone(&writer_pkts));
            }
            let filter_config = VideoFilterConfig {
                width: decoder.width(),
                height: decoder.height(),
                pixel_format: decoder.pixel_format(),
                time_base: codec_config.timing().time_base,
                aspect_ratio: decoder.aspect_ratio(),
            };
            let mut filter = VideoFilter::new(
                filter_config,
                &config.video_filter,
                Arc::clone(state),
                Arc::clone(&decoded_video),
                Arc::clone(&filtered_video),
            )?;
            stages.video_decoder = Some(spawn_stage("video-decoder", move || decoder.run()));
            stages.video_filter = Some(spawn_stage("video-filter", move || filter.run()));
        }

        if use_audio {
            let codec_config = audio_config
                .ok_or_else(|| Error::codec("audio stream has no codec parameters"))?;
            let mut decoder = AudioDecoder::new(
                &codec_config,
                Arc::clone(state),
                Arc::clone(&audio_pkts),
                Arc::clone(&decoded_audio),
            )?;
            if config.live_stream {
                decoder.set_writer_queue(Arc::clone(&writer_pkts));
            }
            let filter_config = AudioFilterConfig {
                sample_rate: decoder.rate(),
                sample_format: decoder.sample_format(),
                channel_layout: decoder.channel_layout(),
                time_base: codec_config.timing().time_base,
            };
            let mut filter = AudioFilter::new(
                filter_config,
                &config.audio_filter,
                Arc::clone(state),
                Arc::clone(&decoded_audio),
                Arc::clone(&filtered_audio),
            )?;
            stages.audio_decoder = Some(spawn_stage("audio-decoder", move || decoder.run()));
            stages.audio_filter = Some(spawn_stage("audio-filter", move || filter.run()));
        }

        stages.reader = Some(spawn_stage("reader", move || reader.run()));

        if use_audio {
            let stream = info.audio.as_ref().expect("audio stream verified");
            let audio = Audio::new(
                Arc::clone(state),
                stream,
                Arc::clone(&self.events),
                Arc::clone(&filtered_audio),
                Arc::clone(&audio_pkts),
                &self.uri,
                info.duration_ms,
                config.audio_driver_index,
                !use_video,
            )?;
            stages.audio = Some(audio);
        }

        if use_video {
            let display = Display::new(
                Arc::clone(state),
                Arc::clone(&info),
                Arc::clone(&self.events),
                Arc::clone(&filtered_video),
                terminator,
                clear_hook,
                one_shot,
                config.headless,
            );
            if config.headless {
                let mut display = display;
                stages.display = Some(spawn_stage("display", move || display.run()));
                return Ok(None);
            }
            return Ok(Some(display));
        }

        Ok(None)
    }

    /// Pre-playback seek; the display one-shot does not exist yet, so the
    /// target is simply staged for the reader's first iteration.
    fn initial_seek(&self, info: &MediaInfo, state: &SharedState, pct: f32) {
        let Some(timing) = info.primary_timing() else {
            return;
        };
        let target_ms = info.start_time_ms as f64 + pct as f64 * info.duration_ms as f64;
        state.request_seek(Pts((target_ms / (timing.time_base.to_f64() * 1000.0)) as i64));
    }
}

/// Worker handles in teardown order.
#[derive(Default)]
struct StageHandles {
    display: Option<JoinHandle<()>>,
    audio_filter: Option<JoinHandle<()>>,
    audio_decoder: Option<JoinHandle<()>>,
    video_filter: Option<JoinHandle<()>>,
    video_decoder: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    audio: Option<Audio>,
}

impl StageHandles {
    /// Join workers in reverse dependency order: consumers first, so
    /// producers never block on a queue nobody drains.
    fn join_all(&mut self) {
        for handle in [
            &mut self.display,
            &mut self.audio_filter,
            &mut self.audio_decoder,
            &mut self.video_filter,
            &mut self.video_decoder,
            &mut self.reader,
            &mut self.writer,
        ] {
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    warn!("pipeline worker panicked");
                }
            }
        }
    }
}

fn spawn_stage(name: &str, work: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("medley-{name}"))
        .spawn(work)
        .expect("spawning a pipeline worker")
}
