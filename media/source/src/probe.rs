/*!
    Stream discovery for a freshly opened input.
*/

use std::ffi::CStr;

use ffmpeg_next as ffmpeg;
use ffmpeg::{ffi, format::context::Input, media};

use media_types::{
    AudioCodec, AudioStreamInfo, MediaInfo, Rational, StreamTiming, VideoStreamInfo, NOPTS,
};

fn safe_rational(r: ffmpeg::Rational) -> Rational {
    if r.denominator() == 0 {
        Rational::new(0, 1)
    } else {
        Rational::new(r.numerator(), r.denominator())
    }
}

fn stream_timing(stream: &ffmpeg::format::stream::Stream) -> StreamTiming {
    let start = stream.start_time();
    StreamTiming {
        index: stream.index(),
        time_base: safe_rational(stream.time_base()),
        start_time: if start == NOPTS { 0 } else { start },
    }
}

unsafe fn name_or(ptr: *const std::os::raw::c_char, fallback: &str) -> String {
    if ptr.is_null() {
        fallback.to_string()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn audio_codec_kind(id: ffmpeg::codec::Id) -> AudioCodec {
    use ffmpeg::codec::Id;
    match id {
        Id::PCM_MULAW => AudioCodec::PcmMulaw,
        Id::PCM_ALAW => AudioCodec::PcmAlaw,
        Id::AAC => AudioCodec::Aac,
        Id::VORBIS => AudioCodec::Vorbis,
        Id::OPUS => AudioCodec::Opus,
        _ => AudioCodec::Other,
    }
}

fn channel_layout_name(channels: u16) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        n => format!("{n} channels"),
    }
}

fn video_info(stream: &ffmpeg::format::stream::Stream) -> VideoStreamInfo {
    let parameters = stream.parameters();
    // Dimensions and pixel format live on the codec parameters, which the
    // safe wrapper keeps opaque.
    let (width, height, pixel_format_name, codec_name) = unsafe {
        let par = parameters.as_ptr();
        let pix_fmt: ffi::AVPixelFormat = std::mem::transmute((*par).format);
        (
            (*par).width.max(0) as u32,
            (*par).height.max(0) as u32,
            name_or(ffi::av_get_pix_fmt_name(pix_fmt), "invalid"),
            name_or(ffi::avcodec_get_name((*par).codec_id), "invalid"),
        )
    };
    VideoStreamInfo {
        timing: stream_timing(stream),
        width,
        height,
        frame_rate: safe_rational(stream.avg_frame_rate()),
        codec_name,
        pixel_format_name,
    }
}

fn audio_info(stream: &ffmpeg::format::stream::Stream) -> AudioStreamInfo {
    let parameters = stream.parameters();
    let (sample_rate, channels, frame_size, sample_format_name, codec_name) = unsafe {
        let par = parameters.as_ptr();
        let sample_fmt: ffi::AVSampleFormat = std::mem::transmute((*par).format);
        (
            (*par).sample_rate.max(0) as u32,
            (*par).ch_layout.nb_channels.max(0) as u16,
            (*par).frame_size.max(0) as u32,
            name_or(ffi::av_get_sample_fmt_name(sample_fmt), "invalid"),
            name_or(ffi::avcodec_get_name((*par).codec_id), "invalid"),
        )
    };
    AudioStreamInfo {
        timing: stream_timing(stream),
        sample_rate,
        channels,
        frame_size,
        codec: audio_codec_kind(parameters.id()),
        codec_name,
        sample_format_name,
        channel_layout_name: channel_layout_name(channels),
    }
}

pub(crate) fn probe(
    input: &Input,
    uri: &str,
    disable_video: bool,
    disable_audio: bool,
) -> MediaInfo {
    let video = input.streams().best(media::Type::Video).map(|s| video_info(&s));
    let audio = input.streams().best(media::Type::Audio).map(|s| audio_info(&s));

    // Container duration and start time arrive in AV_TIME_BASE (µs) units.
    let duration = input.duration();
    let duration_ms = if duration == NOPTS { 0 } else { duration / 1000 };
    let start = unsafe { (*input.as_ptr()).start_time };
    let start_time_ms = if start == NOPTS { 0 } else { start / 1000 };

    MediaInfo {
        uri: uri.to_string(),
        video,
        audio,
        duration_ms,
        start_time_ms,
        video_disabled: disable_video,
        audio_disabled: disable_audio,
    }
}
