/*!
    Pixel, sample and codec format types.
*/

/**
    Video pixel formats carried by decoded frames.

    Restricted to the formats the display surface can upload directly,
    plus the packed RGB variants filters commonly produce.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (the common decoder output)
    Yuv420p,
    /// Semi-planar YUV 4:2:0, 12bpp (the common hardware decoder output)
    Nv12,
    /// Packed RGB, 24bpp
    Rgb24,
    /// Packed RGBA, 32bpp
    Rgba,
}

impl PixelFormat {
    /**
        Total byte size of a packed frame at the given dimensions.
    */
    pub const fn buffer_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Yuv420p | Self::Nv12 => pixels * 3 / 2,
            Self::Rgb24 => pixels * 3,
            Self::Rgba => pixels * 4,
        }
    }

    /**
        Returns true if the format stores chroma in separate planes.
    */
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::Yuv420p | Self::Nv12)
    }
}

/**
    Audio sample formats carried by decoded frames. Data is always
    interleaved by the time it reaches a frame, whatever the codec's
    native plane layout was.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SampleFormat {
    /// Unsigned 8-bit integer
    U8,
    /// Signed 16-bit integer
    S16,
    /// Signed 32-bit integer
    S32,
    /// 32-bit floating point, range [-1.0, 1.0]
    F32,
    /// 64-bit floating point
    F64,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/**
    The audio codecs the pipeline must distinguish.

    Recording container selection keys off the source audio codec, and the
    sound device start-up treats the variable-frame-size codecs specially.
    Every other codec behaves identically downstream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AudioCodec {
    PcmMulaw,
    PcmAlaw,
    Aac,
    Vorbis,
    Opus,
    Other,
}

impl AudioCodec {
    /**
        Container extension for recordings carrying this audio codec, or
        None when the codec cannot be stored and audio must be disabled.
    */
    pub const fn container_extension(self) -> Option<&'static str> {
        match self {
            Self::PcmMulaw | Self::PcmAlaw => Some(".mov"),
            Self::Aac => Some(".mp4"),
            _ => None,
        }
    }

    /**
        Returns true for codecs whose frame size is inherently variable,
        where waiting for a first decoded frame to learn the sample count
        would be pointless.
    */
    pub const fn has_variable_frame_size(self) -> bool {
        matches!(self, Self::Vorbis | Self::Opus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_buffer_sizes() {
        assert_eq!(PixelFormat::Yuv420p.buffer_size(640, 480), 640 * 480 * 3 / 2);
        assert_eq!(PixelFormat::Nv12.buffer_size(640, 480), 640 * 480 * 3 / 2);
        assert_eq!(PixelFormat::Rgb24.buffer_size(2, 2), 12);
        assert_eq!(PixelFormat::Rgba.buffer_size(2, 2), 16);
    }

    #[test]
    fn pixel_planarity() {
        assert!(PixelFormat::Yuv420p.is_planar());
        assert!(PixelFormat::Nv12.is_planar());
        assert!(!PixelFormat::Rgb24.is_planar());
    }

    #[test]
    fn sample_sizes() {
        assert_eq!(SampleFormat::U8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::F32.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::F64.bytes_per_sample(), 8);
    }

    #[test]
    fn container_mapping() {
        assert_eq!(AudioCodec::PcmMulaw.container_extension(), Some(".mov"));
        assert_eq!(AudioCodec::PcmAlaw.container_extension(), Some(".mov"));
        assert_eq!(AudioCodec::Aac.container_extension(), Some(".mp4"));
        assert_eq!(AudioCodec::Opus.container_extension(), None);
        assert_eq!(AudioCodec::Other.container_extension(), None);
    }

    #[test]
    fn variable_frame_size_codecs() {
        assert!(AudioCodec::Vorbis.has_variable_frame_size());
        assert!(AudioCodec::Opus.has_variable_frame_size());
        assert!(!AudioCodec::Aac.has_variable_frame_size());
    }
}
