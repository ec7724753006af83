/*!
    Rolling pre-roll cache.

    The cache keeps the most recent compressed packets so that when
    recording toggles on, the output file starts approximately
    `cache_seconds` before the toggle. For continuously recording streams
    this also guarantees overlap across file transitions.

    The one structural invariant: the first video packet in the cache is
    always a key frame, so a drained cache always starts at a decoding
    entry point.
*/

use media_types::{Packet, Pts, Queue, StreamKind, StreamTiming};

/**
    Per-stream rolling caches with time-window trimming.

    Interior mutability comes from the queues; the cache itself is only
    ever touched by the writer's worker thread.
*/
pub struct RollingCache {
    video: Queue<Packet>,
    audio: Queue<Packet>,
    video_timing: Option<StreamTiming>,
    audio_timing: Option<StreamTiming>,
    cache_ms: i64,
}

impl RollingCache {
    pub fn new(
        video_timing: Option<StreamTiming>,
        audio_timing: Option<StreamTiming>,
        cache_seconds: i64,
    ) -> Self {
        Self {
            video: Queue::unbounded(),
            audio: Queue::unbounded(),
            video_timing,
            audio_timing,
            cache_ms: cache_seconds.max(0) * 1000,
        }
    }

    pub fn video_len(&self) -> usize {
        self.video.len()
    }

    pub fn audio_len(&self) -> usize {
        self.audio.len()
    }

    pub fn first_video(&self) -> Option<Packet> {
        self.video.front()
    }

    pub fn first_audio(&self) -> Option<Packet> {
        self.audio.front()
    }

    /**
        Append a packet, trimming the caches to the configured window.

        Video trimming only happens when a new key frame arrives, because
        the cache head must stay on a key frame. Audio is trimmed in
        lockstep with video; on audio-only sources it is trimmed by time
        span directly.
    */
    pub fn push(&self, pkt: Packet) {
        match pkt.stream {
            StreamKind::Video => {
                if pkt.is_key_frame {
                    self.trim_for_key_frame(&pkt);
                }
                self.video.push(pkt);
            }
            StreamKind::Audio => {
                if self.video_timing.is_none() {
                    self.trim_audio_by_span(&pkt);
                }
                self.audio.push(pkt);
            }
        }
    }

    fn video_rt(&self, pts: Option<Pts>) -> i64 {
        match (self.video_timing, pts) {
            (Some(timing), Some(pts)) => timing.real_time_ms(pts),
            _ => -1,
        }
    }

    fn audio_rt(&self, pts: Option<Pts>) -> i64 {
        match (self.audio_timing, pts) {
            (Some(timing), Some(pts)) => timing.real_time_ms(pts),
            _ => -1,
        }
    }

    /**
        Walk key frames from the back of the cache until the span between
        the arriving key frame and the retained one reaches the window,
        then cut everything earlier and bring the audio cache along.
    */
    fn trim_for_key_frame(&self, new_pkt: &Packet) {
        let Some(timing) = self.video_timing else {
            return;
        };
        let Some(pts) = new_pkt.pts else {
            return;
        };
        let stream_time = timing.real_time_ms(pts);
        if self.video.is_empty() {
            return;
        }

        let mut search_index = self.video.len() - 1;
        let Some(mut key_index) = self.video.find_last_key_frame(search_index) else {
            return;
        };
        let mut key_time = self.video_rt(self.video.get(key_index).and_then(|p| p.pts));
        let mut cache_duration = stream_time - key_time;
        while cache_duration < self.cache_ms && key_index > 0 {
            let Some(found) = self.video.find_last_key_frame(search_index) else {
                break;
            };
            key_index = found;
            key_time = self.video_rt(self.video.get(key_index).and_then(|p| p.pts));
            cache_duration = stream_time - key_time;
            if key_index > 0 {
                search_index = key_index - 1;
            }
        }

        self.align_audio_to(key_time);
        self.video.erase_front(key_index);

        // Re-assert the invariant in case the cut landed ahead of the
        // first key frame.
        if let Some(first_key) = self.video.find_first_key_frame(0) {
            if first_key > 0 {
                let key_time = self.video_rt(self.video.get(first_key).and_then(|p| p.pts));
                self.align_audio_to(key_time);
                self.video.erase_front(first_key);
            }
        }
    }

    /// Drop audio packets older than the given video real time.
    fn align_audio_to(&self, key_time: i64) {
        let Some(timing) = self.audio_timing else {
            return;
        };
        if key_time < 0 {
            return;
        }
        let audio_pts = timing.pts_from_real_time(key_time);
        if let Some(index) = self.audio.find_pts(audio_pts) {
            self.audio.erase_front(index);
        }
    }

    /// Audio-only sources trim by time span instead of key frames.
    fn trim_audio_by_span(&self, new_pkt: &Packet) {
        let Some(timing) = self.audio_timing else {
            return;
        };
        let Some(pts) = new_pkt.pts else {
            return;
        };
        let stream_time = timing.real_time_ms(pts);
        while let Some(front) = self.audio.front() {
            let start = self.audio_rt(front.pts);
            if start >= 0 && stream_time - start > self.cache_ms {
                self.audio.erase_front(1);
            } else {
                break;
            }
        }
    }

    /**
        Emit the cached packets in A/V-interleaved order without consuming
        them: compare front real times, emit the earlier, and after each
        video packet emit every audio packet at or before its real time.
        When one cache runs out the other is flushed.
    */
    pub fn drain(&self, write: &mut dyn FnMut(Packet)) {
        let video_len = self.video.len();
        let audio_len = self.audio.len();
        let mut vi = 0;
        let mut ai = 0;

        while vi < video_len && ai < audio_len {
            let video_pkt = self.video.get(vi).expect("video index in range");
            let video_rt = self.video_rt(video_pkt.pts);
            let audio_rt = self.audio_rt(self.audio.get(ai).and_then(|p| p.pts));

            if video_rt > audio_rt && audio_rt != -1 {
                while ai < audio_len {
                    let audio_pkt = self.audio.get(ai).expect("audio index in range");
                    if self.audio_rt(audio_pkt.pts) > video_rt {
                        break;
                    }
                    write(audio_pkt);
                    ai += 1;
                }
            } else {
                write(video_pkt);
                vi += 1;
            }
        }

        while vi < video_len {
            write(self.video.get(vi).expect("video index in range"));
            vi += 1;
        }
        while ai < audio_len {
            write(self.audio.get(ai).expect("audio index in range"));
            ai += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::{MediaDuration, Rational};

    const TB_MS: Rational = Rational { num: 1, den: 1000 };

    fn timing(index: usize) -> StreamTiming {
        StreamTiming {
            index,
            time_base: TB_MS,
            start_time: 0,
        }
    }

    fn video(pts: i64, key: bool) -> Packet {
        Packet {
            data: Vec::new(),
            pts: Some(Pts(pts)),
            dts: Some(Pts(pts)),
            duration: MediaDuration(100),
            time_base: TB_MS,
            is_key_frame: key,
            stream: StreamKind::Video,
        }
    }

    fn audio(pts: i64) -> Packet {
        Packet {
            data: Vec::new(),
            pts: Some(Pts(pts)),
            dts: Some(Pts(pts)),
            duration: MediaDuration(20),
            time_base: TB_MS,
            is_key_frame: false,
            stream: StreamKind::Audio,
        }
    }

    /// One key frame per second, nine deltas between. Time base is
    /// 1/1000 so pts values read as milliseconds.
    fn fill_gop_stream(cache: &RollingCache, seconds: i64) {
        for s in 0..seconds {
            for f in 0..10 {
                let pts = s * 1000 + f * 100;
                cache.push(video(pts, f == 0));
            }
        }
    }

    #[test]
    fn head_is_always_a_key_frame() {
        let cache = RollingCache::new(Some(timing(0)), None, 2);
        fill_gop_stream(&cache, 8);
        let front = cache.first_video().unwrap();
        assert!(front.is_key_frame);
    }

    #[test]
    fn trims_to_configured_window() {
        let cache = RollingCache::new(Some(timing(0)), None, 5);
        fill_gop_stream(&cache, 10);
        // The last key frame pushed sits at t=9000; the retained head is
        // the newest key frame at least five seconds older.
        let front = cache.first_video().unwrap();
        assert!(front.is_key_frame);
        assert_eq!(front.pts, Some(Pts(4000)));
        // window covers t=4000..=9900
        assert_eq!(cache.video_len(), 60);
    }

    #[test]
    fn zero_window_keeps_only_the_newest_key_frame_group() {
        let cache = RollingCache::new(Some(timing(0)), None, 0);
        fill_gop_stream(&cache, 4);
        // Each arriving key frame cuts the cache back to the key frame
        // before it, so at most one complete group precedes the newest.
        let front = cache.first_video().unwrap();
        assert!(front.is_key_frame);
        assert_eq!(front.pts, Some(Pts(2000)));
        assert_eq!(cache.video_len(), 20);
    }

    #[test]
    fn audio_follows_video_trim() {
        let cache = RollingCache::new(Some(timing(0)), Some(timing(1)), 2);
        for s in 0..6 {
            for f in 0..10 {
                let pts = s * 1000 + f * 100;
                cache.push(video(pts, f == 0));
                cache.push(audio(pts));
            }
        }
        let video_head = cache.first_video().unwrap().pts.unwrap();
        let audio_head = cache.first_audio().unwrap().pts.unwrap();
        assert!(video_head.0 <= 3000);
        // audio never precedes the retained key frame
        assert!(audio_head >= video_head);
    }

    #[test]
    fn audio_only_trims_by_span() {
        let cache = RollingCache::new(None, Some(timing(0)), 3);
        for ms in (0..10_000).step_by(20) {
            cache.push(audio(ms));
        }
        let front = cache.first_audio().unwrap().pts.unwrap();
        // span from the newest packet (t=9980) stays within three seconds
        assert!(9980 - front.0 <= 3000);
        assert!(cache.audio_len() <= 3000 / 20 + 1);
    }

    #[test]
    fn drain_interleaves_by_real_time() {
        let cache = RollingCache::new(Some(timing(0)), Some(timing(1)), 10);
        cache.push(video(0, true));
        cache.push(audio(0));
        cache.push(audio(40));
        cache.push(video(100, false));
        cache.push(audio(80));
        cache.push(audio(120));

        let mut order = Vec::new();
        cache.drain(&mut |pkt| {
            order.push((pkt.stream, pkt.pts.unwrap().0));
        });

        assert_eq!(
            order,
            vec![
                (StreamKind::Video, 0),
                (StreamKind::Audio, 0),
                (StreamKind::Audio, 40),
                (StreamKind::Audio, 80),
                // audio at 100ms boundary drains before the next video
                (StreamKind::Video, 100),
                (StreamKind::Audio, 120),
            ]
        );
    }

    #[test]
    fn drain_flushes_remainder_when_one_side_empties() {
        let cache = RollingCache::new(Some(timing(0)), Some(timing(1)), 10);
        cache.push(video(0, true));
        cache.push(video(100, false));
        cache.push(video(200, false));
        cache.push(audio(0));

        let mut count = 0;
        cache.drain(&mut |_| count += 1);
        assert_eq!(count, 4);
    }

    #[test]
    fn drain_does_not_consume() {
        let cache = RollingCache::new(Some(timing(0)), None, 10);
        cache.push(video(0, true));
        cache.push(video(100, false));

        let mut first = 0;
        cache.drain(&mut |_| first += 1);
        let mut second = 0;
        cache.drain(&mut |_| second += 1);
        assert_eq!(first, 2);
        assert_eq!(second, 2);
    }

    #[test]
    fn video_without_key_frames_is_never_trimmed() {
        let cache = RollingCache::new(Some(timing(0)), None, 1);
        for ms in (0..5000).step_by(100) {
            cache.push(video(ms, false));
        }
        // no key frame ever arrived, so nothing was eligible for the cut
        assert_eq!(cache.video_len(), 50);
    }
}
