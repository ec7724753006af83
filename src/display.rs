/*!
    Video display stage.

    Renders filtered frames to an SDL window and polls UI events. All SDL
    video calls happen on the thread that runs [`Display::run`]: the
    calling thread in windowed mode, a worker in headless mode — where no
    window is created at all and frames only reach the render listener.

    The window and texture are sized from the first frame rather than the
    stream parameters, so filters are free to change dimensions and pixel
    format mid-stream; both are reallocated whenever a frame disagrees
    with the current texture.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};

use media_types::{
    EventSink, Item, MediaInfo, PipelineSignal, PixelFormat, Pts, SharedState, StreamKind,
    Terminator, VideoFrame, VideoFrameQueue,
};
use tracing::{error, warn};

/// Seek step for the arrow keys, in seconds.
const ARROW_SEEK_SECS: i64 = 10;

/// Idle sleep used when paused or when no video stream is present.
const IDLE_SLEEP: Duration = Duration::from_millis(100);

pub struct Display {
    state: Arc<SharedState>,
    info: Arc<MediaInfo>,
    events: Arc<dyn EventSink>,
    frames: Arc<VideoFrameQueue>,
    terminator: Arc<Terminator>,
    clear_hook: Arc<dyn Fn() + Send + Sync>,
    /// Armed by a seek while paused: render exactly one frame to refresh
    /// the paused display, then fall back to repainting.
    one_shot: Arc<AtomicBool>,
    headless: bool,
    last_frame: Option<VideoFrame>,
}

/// Window-thread resources that only exist in windowed mode.
struct Surface<'a> {
    canvas: &'a mut Canvas<Window>,
    creator: &'a TextureCreator<WindowContext>,
    texture: Option<(Texture<'a>, u32, u32, PixelFormat)>,
}

#[allow(clippy::too_many_arguments)]
impl Display {
    pub fn new(
        state: Arc<SharedState>,
        info: Arc<MediaInfo>,
        events: Arc<dyn EventSink>,
        frames: Arc<VideoFrameQueue>,
        terminator: Arc<Terminator>,
        clear_hook: Arc<dyn Fn() + Send + Sync>,
        one_shot: Arc<AtomicBool>,
        headless: bool,
    ) -> Self {
        Self {
            state,
            info,
            events,
            frames,
            terminator,
            clear_hook,
            one_shot,
            headless,
            last_frame: None,
        }
    }

    /// Drive the render loop to completion.
    pub fn run(&mut self) {
        if self.headless {
            self.run_headless();
        } else if let Err(e) = self.run_windowed() {
            error!("display error: {e}");
            self.terminator.terminate();
            // keep consuming so upstream stages can wind down
            self.run_headless();
        }
    }

    fn run_headless(&mut self) {
        loop {
            if !self.render_step(None) {
                break;
            }
        }
    }

    fn run_windowed(&mut self) -> Result<(), String> {
        let sdl = sdl2::init()?;
        let video = sdl.video()?;
        let window = video
            .window("medley", 640, 480)
            .position_centered()
            .build()
            .map_err(|e| e.to_string())?;
        let mut canvas = window
            .into_canvas()
            .accelerated()
            .target_texture()
            .build()
            .map_err(|e| e.to_string())?;
        let creator = canvas.texture_creator();
        let mut event_pump = sdl.event_pump()?;
        let mut surface = Surface {
            canvas: &mut canvas,
            creator: &creator,
            texture: None,
        };

        loop {
            self.poll(&mut event_pump);
            if !self.render_step(Some(&mut surface)) {
                break;
            }
        }
        Ok(())
    }

    /**
        One render iteration. Returns false once the stage is done.
    */
    fn render_step(&mut self, mut surface: Option<&mut Surface<'_>>) -> bool {
        if self.state.is_terminated() {
            self.frames.clear();
            return false;
        }

        if !self.info.has_video() {
            sleep(IDLE_SLEEP);
            return true;
        }

        if self.state.is_paused() && !self.one_shot.load(Ordering::Relaxed) {
            if let Some(frame) = &self.last_frame {
                self.show_frame(frame, surface.as_deref_mut());
            }
            sleep(IDLE_SLEEP);
            return true;
        }

        match self.frames.pop() {
            Item::Signal(PipelineSignal::Eos) => false,
            Item::Signal(PipelineSignal::Flush) => true,
            Item::Data(frame) => {
                if self.state.seek_in_progress() {
                    return true;
                }
                if !self.state.live_stream {
                    self.wait(frame.pts);
                }
                self.show_frame(&frame, surface.as_deref_mut());
                self.last_frame = Some(frame);
                self.one_shot.store(false, Ordering::Relaxed);
                true
            }
        }
    }

    /**
        Align presentation to the wall clock: against the audio consumer's
        last real time when audio exists, against the frame-to-frame delta
        otherwise. Sleeps are bounded to (0, 1000) ms so a bad timestamp
        can never stall the display.
    */
    fn wait(&self, pts: Option<Pts>) {
        let (Some(video), Some(pts)) = (self.info.video.as_ref(), pts) else {
            return;
        };
        let rts = video.timing.real_time_ms(pts);

        let diff = if self.info.has_audio() {
            let last_audio = self.state.last_rt(StreamKind::Audio);
            if last_audio == i64::MAX {
                return;
            }
            rts - last_audio
        } else {
            match self.last_frame.as_ref().and_then(|f| f.pts) {
                Some(last) => rts - video.timing.real_time_ms(last),
                None => return,
            }
        };

        if diff > 0 && diff < 1000 {
            sleep(Duration::from_millis(diff as u64));
        }
    }

    fn show_frame(&self, frame: &VideoFrame, surface: Option<&mut Surface<'_>>) {
        self.events.render(frame, &self.info.uri);
        if let Some(pts) = frame.pts {
            if let Some(video) = self.info.video.as_ref() {
                let rts = video.timing.real_time_ms(pts);
                self.state.update_rt(StreamKind::Video, rts);
                if self.info.duration_ms > 0 {
                    let pct = rts as f32 / self.info.duration_ms as f32;
                    self.events.progress(pct, &self.info.uri);
                }
            }
        }

        let Some(surface) = surface else {
            return;
        };
        if let Err(e) = present(frame, surface) {
            warn!("display error: {e}");
        }
    }

    fn poll(&mut self, pump: &mut sdl2::EventPump) {
        for event in pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => self.terminator.terminate(),
                Event::KeyDown {
                    keycode: Some(Keycode::R),
                    ..
                } => {
                    if self.state.live_stream {
                        self.state.toggle_recording();
                    }
                }
                Event::KeyDown {
                    keycode: Some(Keycode::Space),
                    ..
                } => {
                    if !self.state.live_stream {
                        self.state.toggle_paused();
                    }
                }
                Event::KeyDown {
                    keycode: Some(Keycode::Left),
                    ..
                } => self.arrow_seek(-ARROW_SEEK_SECS),
                Event::KeyDown {
                    keycode: Some(Keycode::Right),
                    ..
                } => self.arrow_seek(ARROW_SEEK_SECS),
                _ => {}
            }
        }
    }

    /// Seek relative to the last displayed frame; file playback only.
    fn arrow_seek(&self, seconds: i64) {
        if self.state.is_closed() || self.state.live_stream {
            return;
        }
        let Some(video) = self.info.video.as_ref() else {
            return;
        };
        let Some(last_pts) = self.last_frame.as_ref().and_then(|f| f.pts) else {
            return;
        };
        let step = seconds * video.timing.time_base.ticks_per_second();
        self.state.request_seek(Pts(last_pts.0 + step));
        if self.state.is_paused() {
            (self.clear_hook)();
            self.one_shot.store(true, Ordering::Relaxed);
        }
    }
}

/// Upload a frame into the (re)allocated texture and present it.
fn present(frame: &VideoFrame, surface: &mut Surface<'_>) -> Result<(), String> {
    let needs_texture = match &surface.texture {
        Some((_, w, h, fmt)) => *w != frame.width || *h != frame.height || *fmt != frame.format,
        None => true,
    };
    if needs_texture {
        let window = surface.canvas.window_mut();
        window
            .set_size(frame.width, frame.height)
            .map_err(|e| e.to_string())?;
        window.set_position(
            sdl2::video::WindowPos::Centered,
            sdl2::video::WindowPos::Centered,
        );
        let sdl_format = match frame.format {
            PixelFormat::Rgb24 => PixelFormatEnum::RGB24,
            PixelFormat::Rgba => PixelFormatEnum::RGBA32,
            PixelFormat::Yuv420p => PixelFormatEnum::IYUV,
            PixelFormat::Nv12 => PixelFormatEnum::NV12,
        };
        let texture = surface
            .creator
            .create_texture_streaming(sdl_format, frame.width, frame.height)
            .map_err(|e| e.to_string())?;
        surface.texture = Some((texture, frame.width, frame.height, frame.format));
    }

    let (texture, ..) = surface.texture.as_mut().expect("texture just ensured");
    match frame.format {
        PixelFormat::Yuv420p => {
            let offsets = frame.plane_offsets();
            let chroma_stride = frame.stride / 2;
            texture
                .update_yuv(
                    None,
                    &frame.data[offsets[0]..offsets[1]],
                    frame.stride,
                    &frame.data[offsets[1]..offsets[2]],
                    chroma_stride,
                    &frame.data[offsets[2]..],
                    chroma_stride,
                )
                .map_err(|e| e.to_string())?;
        }
        // packed and semi-planar formats upload as one contiguous buffer
        _ => texture
            .update(None, &frame.data, frame.stride)
            .map_err(|e| e.to_string())?,
    }

    surface
        .canvas
        .set_draw_color(sdl2::pixels::Color::BLACK);
    surface.canvas.clear();
    surface.canvas.copy(texture, None, None)?;
    surface.canvas.present();
    Ok(())
}
