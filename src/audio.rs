/*!
    Audio output stage.

    Feeds an SDL playback device with signed 16-bit samples pulled from
    the filtered-audio queue. The device owns the callback thread and
    invokes [`AudioFeeder::callback`] at unpredictable times; the
    implementation must fill the buffer and return promptly, carrying any
    unconsumed part of a frame over to the next invocation.

    On live streams the callback sheds latency before every pop by
    trimming the audio packet queue down to its freshest element.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};

use media_types::{
    AudioFrame, AudioFrameQueue, AudioStreamInfo, Error, EventSink, Item, PacketQueue,
    PipelineSignal, Pts, Result, SampleFormat, SharedState, StreamKind,
};
use tracing::{error, info};

/**
    The audio stage handle: keeps the device alive and reports when the
    callback has observed end of stream.
*/
pub struct Audio {
    device: AudioDevice<AudioFeeder>,
    closed: Arc<AtomicBool>,
}

impl Audio {
    /**
        Open a playback device for the stream and start pulling.

        The device sample count comes from the codec's declared frame
        size; when that is zero (and the codec is not one of the
        variable-frame-size family) the first queued frame is awaited for
        up to a second and its sample count used instead.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<SharedState>,
        stream: &AudioStreamInfo,
        events: Arc<dyn EventSink>,
        frames: Arc<AudioFrameQueue>,
        audio_pkts: Arc<PacketQueue>,
        uri: &str,
        duration_ms: i64,
        audio_driver_index: usize,
        report_progress: bool,
    ) -> Result<Self> {
        let sdl = sdl2::init().map_err(Error::codec)?;
        if audio_driver_index > 0 {
            if let Some(name) = sdl2::audio::drivers().nth(audio_driver_index) {
                sdl2::hint::set("SDL_AUDIODRIVER", name);
            }
        }
        let audio_subsystem = sdl.audio().map_err(Error::codec)?;
        info!(
            "using SDL audio driver {}",
            audio_subsystem.current_audio_driver()
        );

        let samples = negotiate_samples(stream, &frames);
        let desired = AudioSpecDesired {
            freq: Some(stream.sample_rate as i32),
            channels: Some(stream.channels.min(255) as u8),
            samples: (samples > 0).then_some(samples),
        };

        let closed = Arc::new(AtomicBool::new(false));
        let feeder = AudioFeeder {
            state,
            events,
            frames,
            audio_pkts,
            timing: stream.timing,
            duration_ms,
            uri: uri.to_string(),
            pending: Vec::new(),
            pending_pos: 0,
            scratch: Vec::new(),
            closed: Arc::clone(&closed),
            last_progress: -1,
            report_progress,
        };

        let device = audio_subsystem
            .open_playback(None, &desired, move |_spec| feeder)
            .map_err(Error::codec)?;
        device.resume();

        Ok(Self { device, closed })
    }

    /// Whether the callback has wound down (end of stream or teardown).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Audio {
    fn drop(&mut self) {
        self.device.pause();
    }
}

/**
    Derive the device sample count: the codec's frame size, or the first
    decoded frame's sample count when the codec leaves it open.
*/
fn negotiate_samples(stream: &AudioStreamInfo, frames: &AudioFrameQueue) -> u16 {
    let mut samples = stream.frame_size;
    if samples == 0 && !stream.codec.has_variable_frame_size() {
        for _ in 0..100 {
            if !frames.is_empty() {
                break;
            }
            sleep(Duration::from_millis(10));
        }
        if let Some(Item::Data(frame)) = frames.front() {
            samples = frame.samples as u32;
        }
    }
    samples.min(u16::MAX as u32) as u16
}

/**
    The device callback. Runs on the sound subsystem's thread.
*/
pub struct AudioFeeder {
    state: Arc<SharedState>,
    events: Arc<dyn EventSink>,
    frames: Arc<AudioFrameQueue>,
    audio_pkts: Arc<PacketQueue>,
    timing: media_types::StreamTiming,
    duration_ms: i64,
    uri: String,
    /// Samples converted but not yet delivered to the device.
    pending: Vec<i16>,
    pending_pos: usize,
    /// Mix buffer matching the device buffer length, reused across calls.
    scratch: Vec<i16>,
    closed: Arc<AtomicBool>,
    /// Progress dedup at 0.1% resolution.
    last_progress: i32,
    report_progress: bool,
}

impl AudioCallback for AudioFeeder {
    type Channel = i16;

    fn callback(&mut self, out: &mut [i16]) {
        // A panic must never cross into the C caller.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.fill(out);
        }));
        if result.is_err() {
            error!("audio callback panicked");
            out.fill(0);
            self.closed.store(true, Ordering::Release);
        }
    }
}

impl AudioFeeder {
    fn fill(&mut self, out: &mut [i16]) {
        out.fill(0);

        if self.state.is_terminated() {
            self.frames.clear();
            self.closed.store(true, Ordering::Release);
            return;
        }
        if self.state.is_paused() {
            return;
        }

        if self.scratch.len() != out.len() {
            self.scratch = vec![0; out.len()];
        } else {
            self.scratch.fill(0);
        }
        let mut filled = 0;

        while filled < out.len() && !self.closed.load(Ordering::Acquire) {
            if self.pending_pos < self.pending.len() {
                let take = (self.pending.len() - self.pending_pos).min(out.len() - filled);
                self.scratch[filled..filled + take]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
                self.pending_pos += take;
                filled += take;
                continue;
            }

            if self.state.live_stream {
                self.audio_pkts.remove_latency();
            }

            match self.frames.pop() {
                Item::Signal(PipelineSignal::Eos) => {
                    self.closed.store(true, Ordering::Release);
                    break;
                }
                Item::Signal(PipelineSignal::Flush) => continue,
                Item::Data(frame) => {
                    if self.state.is_terminated() {
                        self.closed.store(true, Ordering::Release);
                        return;
                    }
                    if self.state.seek_in_progress() {
                        return;
                    }
                    if let Some(pts) = frame.pts {
                        let rts = self.timing.real_time_ms(pts);
                        self.state.update_rt(StreamKind::Audio, rts);
                    }
                    self.pending = convert_to_s16(&frame);
                    self.pending_pos = 0;
                    self.events.audio_frame(&frame, &self.uri);
                    if self.report_progress {
                        self.update_progress(frame.pts);
                    }
                }
            }
        }

        if !self.state.is_muted() {
            let volume = self.state.volume();
            for (dst, src) in out.iter_mut().zip(self.scratch.iter()) {
                *dst = (*src as f32 * volume) as i16;
            }
        }
    }

    fn update_progress(&mut self, pts: Option<Pts>) {
        let Some(pts) = pts else {
            return;
        };
        if self.duration_ms <= 0 {
            return;
        }
        let pct = self.timing.real_time_ms(pts) as f32 / self.duration_ms as f32;
        let step = (1000.0 * pct) as i32;
        if step != self.last_progress {
            self.events.progress(pct, &self.uri);
            self.last_progress = step;
        }
    }
}

/**
    Convert an interleaved frame of any supported sample format to
    interleaved signed 16-bit samples at the same rate and layout.
*/
fn convert_to_s16(frame: &AudioFrame) -> Vec<i16> {
    let bytes = frame.format.bytes_per_sample();
    let usable = frame.data.len() - frame.data.len() % bytes;
    let data = &frame.data[..usable];

    match frame.format {
        SampleFormat::S16 => data
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect(),
        SampleFormat::U8 => data
            .iter()
            .map(|&sample| ((sample as i16) - 128) << 8)
            .collect(),
        SampleFormat::S32 => data
            .chunks_exact(4)
            .map(|c| (i32::from_ne_bytes([c[0], c[1], c[2], c[3]]) >> 16) as i16)
            .collect(),
        SampleFormat::F32 => data
            .chunks_exact(4)
            .map(|c| {
                let sample = f32::from_ne_bytes([c[0], c[1], c[2], c[3]]);
                (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            })
            .collect(),
        SampleFormat::F64 => data
            .chunks_exact(8)
            .map(|c| {
                let sample = f64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]);
                (sample.clamp(-1.0, 1.0) * i16::MAX as f64) as i16
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::Rational;

    fn frame(format: SampleFormat, data: Vec<u8>, samples: usize) -> AudioFrame {
        AudioFrame {
            data,
            samples,
            sample_rate: 48000,
            channels: 1,
            format,
            pts: Some(Pts(0)),
            time_base: Rational::new(1, 48000),
        }
    }

    #[test]
    fn s16_passes_through() {
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        let out = convert_to_s16(&frame(SampleFormat::S16, data, samples.len()));
        assert_eq!(out, samples);
    }

    #[test]
    fn u8_recenters_and_scales() {
        let out = convert_to_s16(&frame(SampleFormat::U8, vec![128, 255, 0], 3));
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 127 << 8);
        assert_eq!(out[2], -128 << 8);
    }

    #[test]
    fn s32_truncates_to_high_word() {
        let samples = [0i32, 1 << 16, -(1 << 16), i32::MAX];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        let out = convert_to_s16(&frame(SampleFormat::S32, data, samples.len()));
        assert_eq!(out, vec![0, 1, -1, i16::MAX]);
    }

    #[test]
    fn f32_scales_and_clamps() {
        let samples = [0.0f32, 0.5, -0.5, 2.0, -2.0];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        let out = convert_to_s16(&frame(SampleFormat::F32, data, samples.len()));
        assert_eq!(out[0], 0);
        assert_eq!(out[1], (0.5 * i16::MAX as f32) as i16);
        assert_eq!(out[2], -(0.5 * i16::MAX as f32) as i16);
        assert_eq!(out[3], i16::MAX);
        assert_eq!(out[4], -i16::MAX);
    }

    #[test]
    fn f64_scales_and_clamps() {
        let samples = [0.25f64, -1.5];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        let out = convert_to_s16(&frame(SampleFormat::F64, data, samples.len()));
        assert_eq!(out[0], (0.25 * i16::MAX as f64) as i16);
        assert_eq!(out[1], -i16::MAX);
    }

    #[test]
    fn trailing_partial_sample_is_ignored() {
        let out = convert_to_s16(&frame(SampleFormat::S16, vec![0, 0, 7], 1));
        assert_eq!(out.len(), 1);
    }
}
