/*!
    Shared transport state and cancellation.
*/

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use crate::{PacketQueue, PipelineSignal, Pts, StreamKind, NOPTS};

/// Atomic f32 stored as its bit pattern, for lock-free volume control.
pub struct AtomicF32 {
    inner: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.inner.load(ordering))
    }

    pub fn store(&self, value: f32, ordering: Ordering) {
        self.inner.store(value.to_bits(), ordering);
    }
}

/**
    Transport state shared by every pipeline stage.

    All fields are last-write-wins atomics: the UI flips `paused` or
    `recording`, the reader publishes `last_*_pts`, the consumers publish
    `last_*_rts`, and every stage polls `terminated` once per iteration.
    A stale read only perturbs A/V sync by a frame, never correctness.
*/
pub struct SharedState {
    terminated: AtomicBool,
    closed: AtomicBool,
    paused: AtomicBool,
    recording: AtomicBool,
    mute: AtomicBool,
    seek_pts: AtomicI64,
    last_video_pts: AtomicI64,
    last_audio_pts: AtomicI64,
    last_video_rts: AtomicI64,
    last_audio_rts: AtomicI64,
    volume: AtomicF32,
    /// Whether the source is a live camera stream (set before sharing).
    pub live_stream: bool,
    /// Pre-roll cache span in seconds.
    pub cache_seconds: i64,
}

impl SharedState {
    pub fn new(live_stream: bool, cache_seconds: i64) -> Self {
        Self {
            terminated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            mute: AtomicBool::new(false),
            seek_pts: AtomicI64::new(NOPTS),
            last_video_pts: AtomicI64::new(NOPTS),
            last_audio_pts: AtomicI64::new(NOPTS),
            // Real times start at MAX so sync waits are skipped until the
            // audio consumer has actually presented something.
            last_video_rts: AtomicI64::new(i64::MAX),
            last_audio_rts: AtomicI64::new(i64::MAX),
            volume: AtomicF32::new(1.0),
            live_stream,
            cache_seconds,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn set_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// First caller wins; returns true exactly once.
    pub(crate) fn begin_terminate(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, value: bool) {
        self.paused.store(value, Ordering::Relaxed);
    }

    pub fn toggle_paused(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn set_recording(&self, value: bool) {
        self.recording.store(value, Ordering::Relaxed);
    }

    pub fn toggle_recording(&self) -> bool {
        !self.recording.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, value: bool) {
        self.mute.store(value, Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, value: f32) {
        self.volume.store(value.clamp(0.0, 1.0), Ordering::Relaxed);
    }

    /// Pending seek target, if a seek has been requested.
    pub fn seek_target(&self) -> Option<Pts> {
        Pts::from_raw(self.seek_pts.load(Ordering::Relaxed))
    }

    pub fn request_seek(&self, target: Pts) {
        self.seek_pts.store(target.0, Ordering::Relaxed);
    }

    pub fn clear_seek(&self) {
        self.seek_pts.store(NOPTS, Ordering::Relaxed);
    }

    pub fn seek_in_progress(&self) -> bool {
        self.seek_pts.load(Ordering::Relaxed) != NOPTS
    }

    pub fn set_last_pts(&self, stream: StreamKind, pts: Option<Pts>) {
        let cell = match stream {
            StreamKind::Video => &self.last_video_pts,
            StreamKind::Audio => &self.last_audio_pts,
        };
        cell.store(Pts::to_raw(pts), Ordering::Relaxed);
    }

    pub fn last_pts(&self, stream: StreamKind) -> Option<Pts> {
        let cell = match stream {
            StreamKind::Video => &self.last_video_pts,
            StreamKind::Audio => &self.last_audio_pts,
        };
        Pts::from_raw(cell.load(Ordering::Relaxed))
    }

    /// Publish the real time of the most recently presented frame.
    pub fn update_rt(&self, stream: StreamKind, real_time_ms: i64) {
        let cell = match stream {
            StreamKind::Video => &self.last_video_rts,
            StreamKind::Audio => &self.last_audio_rts,
        };
        cell.store(real_time_ms, Ordering::Relaxed);
    }

    pub fn last_rt(&self, stream: StreamKind) -> i64 {
        let cell = match stream {
            StreamKind::Video => &self.last_video_rts,
            StreamKind::Audio => &self.last_audio_rts,
        };
        cell.load(Ordering::Relaxed)
    }
}

static_assertions::assert_impl_all!(SharedState: Send, Sync);

/**
    The single cancellation entry point for a running pipeline.

    Terminating clears the packet queues (waking any blocked pusher) and
    delivers an end-of-stream signal on each, so every stage unblocks and
    winds down on its next iteration. Idempotent: only the first call does
    any work.
*/
pub struct Terminator {
    state: Arc<SharedState>,
    video_pkts: Option<Arc<PacketQueue>>,
    audio_pkts: Option<Arc<PacketQueue>>,
    writer_pkts: Option<Arc<PacketQueue>>,
}

impl Terminator {
    pub fn new(
        state: Arc<SharedState>,
        video_pkts: Option<Arc<PacketQueue>>,
        audio_pkts: Option<Arc<PacketQueue>>,
        writer_pkts: Option<Arc<PacketQueue>>,
    ) -> Self {
        Self {
            state,
            video_pkts,
            audio_pkts,
            writer_pkts,
        }
    }

    pub fn terminate(&self) {
        if !self.state.begin_terminate() {
            return;
        }
        self.state.set_closed();
        for queue in [&self.video_pkts, &self.audio_pkts, &self.writer_pkts]
            .into_iter()
            .flatten()
        {
            queue.clear();
            queue.push(crate::Item::Signal(PipelineSignal::Eos));
        }
    }
}

static_assertions::assert_impl_all!(Terminator: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Item;

    #[test]
    fn atomic_f32_round_trips() {
        let v = AtomicF32::new(0.5);
        assert_eq!(v.load(Ordering::Relaxed), 0.5);
        v.store(0.25, Ordering::Relaxed);
        assert_eq!(v.load(Ordering::Relaxed), 0.25);
    }

    #[test]
    fn seek_target_life_cycle() {
        let state = SharedState::new(false, 1);
        assert_eq!(state.seek_target(), None);
        assert!(!state.seek_in_progress());

        state.request_seek(Pts(9000));
        assert!(state.seek_in_progress());
        assert_eq!(state.seek_target(), Some(Pts(9000)));

        state.clear_seek();
        assert_eq!(state.seek_target(), None);
    }

    #[test]
    fn toggles_report_new_value() {
        let state = SharedState::new(false, 1);
        assert!(state.toggle_paused());
        assert!(state.is_paused());
        assert!(!state.toggle_paused());

        assert!(state.toggle_recording());
        assert!(state.is_recording());
    }

    #[test]
    fn volume_is_clamped() {
        let state = SharedState::new(false, 1);
        state.set_volume(1.8);
        assert_eq!(state.volume(), 1.0);
        state.set_volume(-0.3);
        assert_eq!(state.volume(), 0.0);
    }

    #[test]
    fn last_rt_defaults_to_max() {
        let state = SharedState::new(true, 1);
        assert_eq!(state.last_rt(StreamKind::Audio), i64::MAX);
        state.update_rt(StreamKind::Audio, 1500);
        assert_eq!(state.last_rt(StreamKind::Audio), 1500);
        assert_eq!(state.last_rt(StreamKind::Video), i64::MAX);
    }

    #[test]
    fn terminate_clears_and_signals_queues() {
        let state = Arc::new(SharedState::new(false, 1));
        let video = Arc::new(PacketQueue::bounded(4));
        let audio = Arc::new(PacketQueue::bounded(4));
        video.push(Item::Signal(PipelineSignal::Flush));

        let terminator = Terminator::new(
            Arc::clone(&state),
            Some(Arc::clone(&video)),
            Some(Arc::clone(&audio)),
            None,
        );
        terminator.terminate();

        assert!(state.is_terminated());
        assert!(state.is_closed());
        assert_eq!(video.len(), 1);
        assert!(video.pop().is_eos());
        assert!(audio.pop().is_eos());
    }

    #[test]
    fn terminate_is_idempotent() {
        let state = Arc::new(SharedState::new(false, 1));
        let video = Arc::new(PacketQueue::bounded(4));
        let terminator =
            Terminator::new(Arc::clone(&state), Some(Arc::clone(&video)), None, None);

        terminator.terminate();
        terminator.terminate();
        terminator.terminate();

        // exactly one Eos was delivered
        assert_eq!(video.len(), 1);
    }
}
