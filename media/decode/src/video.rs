/*!
    Video decoder stage.
*/

use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, ffi};

use media_source::CodecConfig;
use media_types::{
    Error, Item, Packet, PacketQueue, PipelineSignal, Result, SharedState, StreamTiming,
};
use tracing::warn;

use crate::hw::{transfer_frame, HwAccel};
use crate::{DecodedVideo, DecodedVideoQueue};

/**
    Video decoder stage.

    Pops packets, pushes decoded frames, and re-emits consumed packets to
    the writer queue when post-decode recording is wired. One instance is
    driven by one worker thread via [`VideoDecoder::run`].
*/
pub struct VideoDecoder {
    decoder: ffmpeg::decoder::Video,
    timing: StreamTiming,
    state: Arc<SharedState>,
    pkts: Arc<PacketQueue>,
    frames: Arc<DecodedVideoQueue>,
    writer_pkts: Option<Arc<PacketQueue>>,
    hw: Option<HwAccel>,
    scratch: ffmpeg::frame::Video,
}

// SAFETY: the codec context is owned by this decoder and touched only by
// its worker thread once construction completes.
unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    /**
        Open a decoder for the stream described by `config`.

        `hw_device` selects hardware acceleration by device-type name; any
        mismatch with the stream's decoder is a construction failure and
        surfaces to the supervisor.
    */
    pub fn new(
        config: &CodecConfig,
        hw_device: Option<&str>,
        state: Arc<SharedState>,
        pkts: Arc<PacketQueue>,
        frames: Arc<DecodedVideoQueue>,
    ) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::codec(e.to_string()))?;

        let parameters = config.parameters();
        let codec_id = parameters.id();
        let mut ctx = codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::codec(e.to_string()))?;

        let hw = match hw_device {
            Some(name) if !name.is_empty() => Some(HwAccel::attach(&mut ctx, codec_id, name)?),
            _ => None,
        };

        let decoder = ctx
            .decoder()
            .video()
            .map_err(|e| Error::codec(format!("video decoder open: {e}")))?;

        Ok(Self {
            decoder,
            timing: config.timing(),
            state,
            pkts,
            frames,
            writer_pkts: None,
            hw,
            scratch: ffmpeg::frame::Video::empty(),
        })
    }

    /// Enable post-decode recording: consumed packets are re-emitted here.
    pub fn set_writer_queue(&mut self, writer_pkts: Arc<PacketQueue>) {
        self.writer_pkts = Some(writer_pkts);
    }

    pub fn timing(&self) -> StreamTiming {
        self.timing
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    pub fn pixel_format(&self) -> ffmpeg::format::Pixel {
        self.decoder.format()
    }

    pub fn aspect_ratio(&self) -> ffmpeg::Rational {
        self.decoder.aspect_ratio()
    }

    /// Drive the decode loop until end of stream or termination.
    pub fn run(&mut self) {
        while self.decode() {}
    }

    /**
        One decoder iteration. Returns false once the stage is done.
    */
    pub fn decode(&mut self) -> bool {
        let item = self.pkts.pop();

        if self.state.is_terminated() {
            self.frames.clear();
            self.frames.push(Item::Signal(PipelineSignal::Eos));
            self.emit_writer_eos();
            return false;
        }

        match item {
            Item::Signal(PipelineSignal::Flush) => {
                self.decoder.flush();
                true
            }
            Item::Signal(PipelineSignal::Eos) => {
                self.frames.push(Item::Signal(PipelineSignal::Eos));
                self.emit_writer_eos();
                false
            }
            Item::Data(pkt) => {
                if self.state.seek_in_progress() {
                    // mid-seek packets are stale; drop them
                    return true;
                }
                if let Err(e) = self.decode_packet(&pkt) {
                    warn!("video decode error: {e}");
                }
                if let Some(writer) = &self.writer_pkts {
                    writer.push(Item::Data(pkt));
                }
                true
            }
        }
    }

    fn decode_packet(&mut self, pkt: &Packet) -> Result<()> {
        let mut av_pkt = if pkt.data.is_empty() {
            ffmpeg::Packet::empty()
        } else {
            ffmpeg::Packet::copy(&pkt.data)
        };
        av_pkt.set_pts(pkt.pts.map(|p| p.0));
        av_pkt.set_dts(pkt.dts.map(|p| p.0));
        av_pkt.set_duration(pkt.duration.0);

        self.decoder
            .send_packet(&av_pkt)
            .map_err(|e| Error::codec(e.to_string()))?;
        self.receive_frames()
    }

    fn receive_frames(&mut self) -> Result<()> {
        loop {
            match self.decoder.receive_frame(&mut self.scratch) {
                Ok(()) => {
                    let frame =
                        std::mem::replace(&mut self.scratch, ffmpeg::frame::Video::empty());
                    let frame = match &self.hw {
                        Some(hw) if hw.is_hw_frame(&frame) => {
                            transfer_frame(&frame).map_err(|e| Error::codec(e.to_string()))?
                        }
                        _ => frame,
                    };
                    self.frames.push(Item::Data(DecodedVideo(frame)));
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffi::AVERROR(ffi::EAGAIN) => {
                    break;
                }
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(Error::codec(e.to_string())),
            }
        }
        Ok(())
    }

    fn emit_writer_eos(&self) {
        if let Some(writer) = &self.writer_pkts {
            writer.push(Item::Signal(PipelineSignal::Eos));
        }
    }
}

impl std::fmt::Debug for VideoDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDecoder")
            .field("width", &self.decoder.width())
            .field("height", &self.decoder.height())
            .field("hw", &self.hw.is_some())
            .finish_non_exhaustive()
    }
}
