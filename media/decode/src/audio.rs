/*!
    Audio decoder stage.
*/

use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, ffi};

use media_source::CodecConfig;
use media_types::{
    Error, Item, Packet, PacketQueue, PipelineSignal, Result, SharedState, StreamTiming,
};
use tracing::warn;

use crate::{DecodedAudio, DecodedAudioQueue};

/**
    Audio decoder stage.

    Same protocol as the video decoder, minus hardware acceleration —
    audio codecs decode in system memory.
*/
pub struct AudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    timing: StreamTiming,
    state: Arc<SharedState>,
    pkts: Arc<PacketQueue>,
    frames: Arc<DecodedAudioQueue>,
    writer_pkts: Option<Arc<PacketQueue>>,
    scratch: ffmpeg::frame::Audio,
}

// SAFETY: the codec context is owned by this decoder and touched only by
// its worker thread once construction completes.
unsafe impl Send for AudioDecoder {}

impl AudioDecoder {
    pub fn new(
        config: &CodecConfig,
        state: Arc<SharedState>,
        pkts: Arc<PacketQueue>,
        frames: Arc<DecodedAudioQueue>,
    ) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::codec(e.to_string()))?;

        let ctx = codec::context::Context::from_parameters(config.parameters())
            .map_err(|e| Error::codec(e.to_string()))?;
        let decoder = ctx
            .decoder()
            .audio()
            .map_err(|e| Error::codec(format!("audio decoder open: {e}")))?;

        Ok(Self {
            decoder,
            timing: config.timing(),
            state,
            pkts,
            frames,
            writer_pkts: None,
            scratch: ffmpeg::frame::Audio::empty(),
        })
    }

    /// Enable post-decode recording: consumed packets are re-emitted here.
    pub fn set_writer_queue(&mut self, writer_pkts: Arc<PacketQueue>) {
        self.writer_pkts = Some(writer_pkts);
    }

    pub fn timing(&self) -> StreamTiming {
        self.timing
    }

    pub fn rate(&self) -> u32 {
        self.decoder.rate()
    }

    pub fn channels(&self) -> u16 {
        self.decoder.channels()
    }

    pub fn sample_format(&self) -> ffmpeg::format::Sample {
        self.decoder.format()
    }

    pub fn channel_layout(&self) -> ffmpeg::ChannelLayout {
        let layout = self.decoder.channel_layout();
        if layout.is_empty() {
            ffmpeg::ChannelLayout::default(i32::from(self.decoder.channels()))
        } else {
            layout
        }
    }

    /// Drive the decode loop until end of stream or termination.
    pub fn run(&mut self) {
        while self.decode() {}
    }

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
                    return true;
                }
                if let Err(e) = self.decode_packet(&pkt) {
                    warn!("audio decode error: {e}");
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
                        std::mem::replace(&mut self.scratch, ffmpeg::frame::Audio::empty());
                    self.frames.push(Item::Data(DecodedAudio(frame)));
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

impl std::fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecoder")
            .field("rate", &self.decoder.rate())
            .field("channels", &self.decoder.channels())
            .finish_non_exhaustive()
    }
}
