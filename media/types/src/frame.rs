/*!
    Decoded frame types.
*/

use crate::{PixelFormat, Pts, Rational, SampleFormat};

/**
    A decoded video frame.

    Pixel data is tightly packed plane-after-plane; `stride` is the byte
    width of one luma (or packed RGB) row. Chroma strides follow from the
    pixel format.
*/
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// Packed pixel data, planes concatenated.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Byte width of one row of the first plane.
    pub stride: usize,
    pub format: PixelFormat,
    /// Presentation timestamp, if the stream carried one.
    pub pts: Option<Pts>,
    /// Time base for interpreting the timestamp.
    pub time_base: Rational,
}

impl VideoFrame {
    /**
        Offset of the start of each plane within `data`.

        Yuv420p yields three planes, Nv12 two, packed RGB one.
    */
    pub fn plane_offsets(&self) -> Vec<usize> {
        let luma = self.stride * self.height as usize;
        match self.format {
            PixelFormat::Yuv420p => {
                let chroma = luma / 4;
                vec![0, luma, luma + chroma]
            }
            PixelFormat::Nv12 => vec![0, luma],
            PixelFormat::Rgb24 | PixelFormat::Rgba => vec![0],
        }
    }
}

/**
    A decoded audio frame.

    Samples are interleaved: for stereo, `[L0, R0, L1, R1, ...]`.
*/
#[derive(Clone, Debug)]
pub struct AudioFrame {
    /// Interleaved sample data, native endianness.
    pub data: Vec<u8>,
    /// Samples per channel.
    pub samples: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    /// Presentation timestamp, if the stream carried one.
    pub pts: Option<Pts>,
    /// Time base for interpreting the timestamp.
    pub time_base: Rational,
}

impl AudioFrame {
    /// Samples across all channels.
    pub fn total_samples(&self) -> usize {
        self.samples * self.channels as usize
    }

    /// Expected byte length of `data` given the sample count and format.
    pub fn expected_data_len(&self) -> usize {
        self.total_samples() * self.format.bytes_per_sample()
    }
}

static_assertions::assert_impl_all!(VideoFrame: Send, Sync);
static_assertions::assert_impl_all!(AudioFrame: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv420p_plane_offsets() {
        let frame = VideoFrame {
            data: vec![0u8; 6 * 4 * 3 / 2],
            width: 6,
            height: 4,
            stride: 6,
            format: PixelFormat::Yuv420p,
            pts: None,
            time_base: Rational::new(1, 1000),
        };
        assert_eq!(frame.plane_offsets(), vec![0, 24, 30]);
    }

    #[test]
    fn nv12_plane_offsets() {
        let frame = VideoFrame {
            data: vec![0u8; 4 * 4 * 3 / 2],
            width: 4,
            height: 4,
            stride: 4,
            format: PixelFormat::Nv12,
            pts: None,
            time_base: Rational::new(1, 1000),
        };
        assert_eq!(frame.plane_offsets(), vec![0, 16]);
    }

    #[test]
    fn rgb_has_single_plane() {
        let frame = VideoFrame {
            data: vec![0u8; 4 * 4 * 3],
            width: 4,
            height: 4,
            stride: 12,
            format: PixelFormat::Rgb24,
            pts: None,
            time_base: Rational::new(1, 1000),
        };
        assert_eq!(frame.plane_offsets(), vec![0]);
    }

    #[test]
    fn audio_sample_accounting() {
        let frame = AudioFrame {
            data: vec![0u8; 1024 * 2 * 2],
            samples: 1024,
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::S16,
            pts: Some(Pts(0)),
            time_base: Rational::new(1, 48000),
        };
        assert_eq!(frame.total_samples(), 2048);
        assert_eq!(frame.expected_data_len(), 4096);
        assert_eq!(frame.data.len(), frame.expected_data_len());
    }
}
