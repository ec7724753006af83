/*!
    FFmpeg frame to plain frame conversion.
*/

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{Pixel, Sample};

use media_types::{AudioFrame, Error, PixelFormat, Pts, Rational, Result, SampleFormat, VideoFrame};

/// Append `rows` rows of `row_bytes` each from a possibly padded plane.
fn pack_plane(out: &mut Vec<u8>, plane: &[u8], stride: usize, row_bytes: usize, rows: usize) {
    for row in 0..rows {
        let start = row * stride;
        out.extend_from_slice(&plane[start..start + row_bytes]);
    }
}

/**
    Copy a filtered video frame into a packed plain frame.

    Only formats the display surface can upload are representable; a graph
    producing anything else is a configuration error.
*/
pub(crate) fn video_frame(
    frame: &ffmpeg::frame::Video,
    time_base: Rational,
) -> Result<VideoFrame> {
    let format = match frame.format() {
        Pixel::YUV420P | Pixel::YUVJ420P => PixelFormat::Yuv420p,
        Pixel::NV12 => PixelFormat::Nv12,
        Pixel::RGB24 => PixelFormat::Rgb24,
        Pixel::RGBA => PixelFormat::Rgba,
        other => {
            return Err(Error::unsupported_format(format!(
                "unsupported pixel format: {other:?}"
            )))
        }
    };

    let width = frame.width();
    let height = frame.height();
    if width == 0 || height == 0 {
        return Err(Error::invalid_data("video frame has zero dimensions"));
    }
    let (w, h) = (width as usize, height as usize);
    let chroma_w = w.div_ceil(2);
    let chroma_h = h.div_ceil(2);

    let mut data = Vec::with_capacity(format.buffer_size(width, height));
    let stride;
    match format {
        PixelFormat::Yuv420p => {
            stride = w;
            pack_plane(&mut data, frame.data(0), frame.stride(0), w, h);
            pack_plane(&mut data, frame.data(1), frame.stride(1), chroma_w, chroma_h);
            pack_plane(&mut data, frame.data(2), frame.stride(2), chroma_w, chroma_h);
        }
        PixelFormat::Nv12 => {
            stride = w;
            pack_plane(&mut data, frame.data(0), frame.stride(0), w, h);
            pack_plane(&mut data, frame.data(1), frame.stride(1), chroma_w * 2, chroma_h);
        }
        PixelFormat::Rgb24 => {
            stride = w * 3;
            pack_plane(&mut data, frame.data(0), frame.stride(0), stride, h);
        }
        PixelFormat::Rgba => {
            stride = w * 4;
            pack_plane(&mut data, frame.data(0), frame.stride(0), stride, h);
        }
    }

    Ok(VideoFrame {
        data,
        width,
        height,
        stride,
        format,
        pts: frame.pts().map(Pts),
        time_base,
    })
}

fn sample_format(sample: Sample) -> Option<SampleFormat> {
    match sample {
        Sample::U8(_) => Some(SampleFormat::U8),
        Sample::I16(_) => Some(SampleFormat::S16),
        Sample::I32(_) => Some(SampleFormat::S32),
        Sample::F32(_) => Some(SampleFormat::F32),
        Sample::F64(_) => Some(SampleFormat::F64),
        _ => None,
    }
}

/**
    Copy a filtered audio frame into a plain interleaved frame.

    Planar layouts are interleaved sample by sample; packed layouts copy
    straight through.
*/
pub(crate) fn audio_frame(
    frame: &ffmpeg::frame::Audio,
    time_base: Rational,
) -> Result<AudioFrame> {
    let samples = frame.samples();
    if samples == 0 {
        return Err(Error::invalid_data("audio frame has zero samples"));
    }
    let format = sample_format(frame.format()).ok_or_else(|| {
        Error::unsupported_format(format!("unsupported sample format: {:?}", frame.format()))
    })?;
    let channels = frame.channels();
    let bytes = format.bytes_per_sample();
    let total = samples * channels as usize * bytes;

    let data = if frame.is_planar() && channels > 1 {
        let mut out = vec![0u8; total];
        for ch in 0..channels as usize {
            let plane = frame.data(ch);
            for s in 0..samples {
                let src = s * bytes;
                let dst = (s * channels as usize + ch) * bytes;
                out[dst..dst + bytes].copy_from_slice(&plane[src..src + bytes]);
            }
        }
        out
    } else {
        frame.data(0)[..total].to_vec()
    };

    Ok(AudioFrame {
        data,
        samples,
        sample_rate: frame.rate(),
        channels,
        format,
        pts: frame.pts().map(Pts),
        time_base,
    })
}
