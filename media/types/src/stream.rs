/*!
    Stream metadata and the real-time projection.
*/

use std::fmt::Write as _;

use crate::{AudioCodec, Pts, Rational};

/**
    Timing facts for one elementary stream: the demuxer-assigned index,
    the time base relating pts to seconds, and the stream start pts.
*/
#[derive(Clone, Copy, Debug)]
pub struct StreamTiming {
    pub index: usize,
    pub time_base: Rational,
    /// First pts of the stream; zero when the container reports none.
    pub start_time: i64,
}

impl StreamTiming {
    /**
        Project a pts onto wall-clock milliseconds relative to stream start.
    */
    pub fn real_time_ms(&self, pts: Pts) -> i64 {
        let factor = 1000.0 * self.time_base.to_f64();
        (factor * (pts.0 - self.start_time) as f64) as i64
    }

    /**
        Inverse projection: the pts corresponding to a millisecond offset
        from stream start.
    */
    pub fn pts_from_real_time(&self, real_time_ms: i64) -> Pts {
        let factor = 1000.0 * self.time_base.to_f64();
        Pts((real_time_ms as f64 / factor) as i64 + self.start_time)
    }
}

/**
    Facts about a video stream discovered at open time.
*/
#[derive(Clone, Debug)]
pub struct VideoStreamInfo {
    pub timing: StreamTiming,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub codec_name: String,
    pub pixel_format_name: String,
}

/**
    Facts about an audio stream discovered at open time.
*/
#[derive(Clone, Debug)]
pub struct AudioStreamInfo {
    pub timing: StreamTiming,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per packet as declared by the codec; zero when variable.
    pub frame_size: u32,
    pub codec: AudioCodec,
    pub codec_name: String,
    pub sample_format_name: String,
    pub channel_layout_name: String,
}

/**
    Everything the pipeline needs to know about an opened source.

    Built once by the reader and shared read-only with every stage.
*/
#[derive(Clone, Debug)]
pub struct MediaInfo {
    pub uri: String,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
    /// Container duration in milliseconds; zero when unknown (live).
    pub duration_ms: i64,
    /// Container start time in milliseconds.
    pub start_time_ms: i64,
    pub video_disabled: bool,
    pub audio_disabled: bool,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn width(&self) -> i32 {
        self.video.as_ref().map_or(-1, |v| v.width as i32)
    }

    pub fn height(&self) -> i32 {
        self.video.as_ref().map_or(-1, |v| v.height as i32)
    }

    /// Timing of the stream that drives seeking: video when present,
    /// audio otherwise.
    pub fn primary_timing(&self) -> Option<StreamTiming> {
        self.video
            .as_ref()
            .map(|v| v.timing)
            .or_else(|| self.audio.as_ref().map(|a| a.timing))
    }

    /**
        Human-readable stream summary as an HTML fragment, for hosts that
        surface stream parameters in a details pane.
    */
    pub fn stream_summary(&self) -> String {
        let mut out = String::new();
        if let Some(video) = &self.video {
            let _ = write!(
                out,
                "<h4>Video Stream Parameters</h4>\
                 Video Codec: {}<br>\
                 Pixel Format: {}<br>\
                 Resolution: {} x {}<br>\
                 Frame Rate: {:.2}",
                video.codec_name,
                video.pixel_format_name,
                video.width,
                video.height,
                video.frame_rate.to_f64(),
            );
            if self.video_disabled {
                out.push_str("<br><b>* Video has been disabled</b>");
            }
        } else {
            out.push_str("<br><b>No Video Stream Found</b>");
        }
        if let Some(audio) = &self.audio {
            let _ = write!(
                out,
                "<h4>Audio Stream Parameters</h4>\
                 Audio Codec: {}<br>\
                 Sample Format: {}<br>\
                 Channel Layout: {}<br>\
                 Channels: {}<br>\
                 Sample Rate: {}<br>\
                 Time Base: {} : {}",
                audio.codec_name,
                audio.sample_format_name,
                audio.channel_layout_name,
                audio.channels,
                audio.sample_rate,
                audio.timing.time_base.num,
                audio.timing.time_base.den,
            );
            if self.audio_disabled {
                out.push_str("<br><b>* Audio has been disabled</b>");
            }
        } else {
            out.push_str("<br><b>No Audio Stream Found</b>");
        }
        out
    }
}

/**
    Whether a URI names a live camera stream rather than a file.

    Recognition is deliberately case-sensitive over this exact scheme list.
*/
pub fn is_camera_uri(uri: &str) -> bool {
    const SCHEMES: [&str; 6] = [
        "rtsp://", "http://", "https://", "RTSP://", "HTTP://", "HTTPS://",
    ];
    SCHEMES.iter().any(|scheme| uri.starts_with(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(num: i32, den: i32, start: i64) -> StreamTiming {
        StreamTiming {
            index: 0,
            time_base: Rational::new(num, den),
            start_time: start,
        }
    }

    #[test]
    fn real_time_projection() {
        let t = timing(1, 90000, 0);
        assert_eq!(t.real_time_ms(Pts(90000)), 1000);
        assert_eq!(t.real_time_ms(Pts(45000)), 500);
    }

    #[test]
    fn real_time_respects_start_offset() {
        let t = timing(1, 1000, 500);
        assert_eq!(t.real_time_ms(Pts(1500)), 1000);
        assert_eq!(t.real_time_ms(Pts(500)), 0);
    }

    #[test]
    fn projection_round_trips() {
        let t = timing(1, 90000, 1234);
        for pts in [0i64, 1234, 90000, 12_345_678] {
            let projected = t.real_time_ms(Pts(pts));
            let back = t.pts_from_real_time(projected);
            // one millisecond of quantization is 90 ticks at this base,
            // plus a tick of floating-point slack
            assert!((back.0 - pts).abs() <= 91, "pts {pts} came back as {}", back.0);
        }
    }

    #[test]
    fn camera_uri_recognition() {
        assert!(is_camera_uri("rtsp://cam/1"));
        assert!(is_camera_uri("RTSP://cam/1"));
        assert!(is_camera_uri("http://host/stream"));
        assert!(is_camera_uri("HTTPS://host/stream"));
        assert!(!is_camera_uri("clip.mp4"));
        assert!(!is_camera_uri("/videos/rtsp://odd-name.mp4"));
        // mixed case is not recognized
        assert!(!is_camera_uri("Rtsp://cam/1"));
    }

    #[test]
    fn summary_mentions_missing_streams() {
        let info = MediaInfo {
            uri: "clip.mp4".into(),
            video: None,
            audio: None,
            duration_ms: 0,
            start_time_ms: 0,
            video_disabled: false,
            audio_disabled: false,
        };
        let summary = info.stream_summary();
        assert!(summary.contains("No Video Stream Found"));
        assert!(summary.contains("No Audio Stream Found"));
    }

    #[test]
    fn summary_includes_stream_parameters() {
        let info = MediaInfo {
            uri: "clip.mp4".into(),
            video: Some(VideoStreamInfo {
                timing: timing(1, 90000, 0),
                width: 1920,
                height: 1080,
                frame_rate: Rational::new(30, 1),
                codec_name: "h264".into(),
                pixel_format_name: "yuv420p".into(),
            }),
            audio: Some(AudioStreamInfo {
                timing: timing(1, 48000, 0),
                sample_rate: 48000,
                channels: 2,
                frame_size: 1024,
                codec: AudioCodec::Aac,
                codec_name: "aac".into(),
                sample_format_name: "fltp".into(),
                channel_layout_name: "stereo".into(),
            }),
            duration_ms: 30000,
            start_time_ms: 0,
            video_disabled: false,
            audio_disabled: true,
        };
        let summary = info.stream_summary();
        assert!(summary.contains("h264"));
        assert!(summary.contains("1920 x 1080"));
        assert!(summary.contains("aac"));
        assert!(summary.contains("* Audio has been disabled"));
        assert!(!summary.contains("* Video has been disabled"));
    }

    #[test]
    fn primary_timing_prefers_video() {
        let video_timing = timing(1, 90000, 0);
        let audio_timing = timing(1, 48000, 0);
        let mut info = MediaInfo {
            uri: "x".into(),
            video: Some(VideoStreamInfo {
                timing: video_timing,
                width: 640,
                height: 480,
                frame_rate: Rational::new(30, 1),
                codec_name: "h264".into(),
                pixel_format_name: "yuv420p".into(),
            }),
            audio: Some(AudioStreamInfo {
                timing: audio_timing,
                sample_rate: 48000,
                channels: 2,
                frame_size: 0,
                codec: AudioCodec::Other,
                codec_name: "pcm_s16le".into(),
                sample_format_name: "s16".into(),
                channel_layout_name: "stereo".into(),
            }),
            duration_ms: 0,
            start_time_ms: 0,
            video_disabled: false,
            audio_disabled: false,
        };
        assert_eq!(info.primary_timing().unwrap().time_base.den, 90000);
        info.video = None;
        assert_eq!(info.primary_timing().unwrap().time_base.den, 48000);
    }
}
