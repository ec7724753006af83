/*!
    Compressed packet type.
*/

use crate::{MediaDuration, Pts, Rational};

/**
    Which elementary stream a packet or frame belongs to.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

/**
    A compressed media packet.

    One demuxed unit of a single stream together with its timing. Packets
    own their buffer: moving a packet transfers it, cloning copies it.
    They are the currency between the reader, the decoders and the writer.
*/
#[derive(Clone, Debug)]
pub struct Packet {
    /// Compressed payload.
    pub data: Vec<u8>,
    /// Presentation timestamp in `time_base` units.
    pub pts: Option<Pts>,
    /// Decode timestamp (differs from pts in the presence of B-frames).
    pub dts: Option<Pts>,
    /// Duration of the packet's content in `time_base` units.
    pub duration: MediaDuration,
    /// Time base for interpreting the timestamps.
    pub time_base: Rational,
    /// Whether the packet is a decoding entry point.
    pub is_key_frame: bool,
    /// Stream the packet was demuxed from.
    pub stream: StreamKind,
}

impl Packet {
    pub fn is_video(&self) -> bool {
        self.stream == StreamKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.stream == StreamKind::Audio
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

static_assertions::assert_impl_all!(Packet: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn video_packet(pts: i64, key: bool) -> Packet {
        Packet {
            data: vec![0u8; 16],
            pts: Some(Pts(pts)),
            dts: Some(Pts(pts)),
            duration: MediaDuration(3000),
            time_base: Rational::new(1, 90000),
            is_key_frame: key,
            stream: StreamKind::Video,
        }
    }

    #[test]
    fn stream_kind_checks() {
        let pkt = video_packet(0, true);
        assert!(pkt.is_video());
        assert!(!pkt.is_audio());
    }

    #[test]
    fn clone_copies_buffer() {
        let pkt = video_packet(100, false);
        let copy = pkt.clone();
        assert_eq!(copy.data, pkt.data);
        assert_eq!(copy.pts, pkt.pts);
        // independent buffers
        assert_ne!(copy.data.as_ptr(), pkt.data.as_ptr());
    }

    #[test]
    fn size_reports_payload_length() {
        assert_eq!(video_packet(0, true).size(), 16);
    }
}
