/*!
    Audio filter stage.
*/

use std::ffi::CStr;
use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use ffmpeg::ffi;

use media_decode::DecodedAudioQueue;
use media_types::{
    AudioFrameQueue, Error, Item, PipelineSignal, Rational, Result, SharedState,
};
use tracing::warn;

use crate::convert;

/**
    Buffer-source parameters for an audio graph, taken from the opened
    decoder. The channel layout must already be defaulted from the channel
    count when the stream leaves it unspecified.
*/
#[derive(Clone, Copy, Debug)]
pub struct AudioFilterConfig {
    pub sample_rate: u32,
    pub sample_format: ffmpeg::format::Sample,
    pub channel_layout: ffmpeg::ChannelLayout,
    pub time_base: Rational,
}

/**
    Audio filter stage: decoded frames in, plain interleaved frames out.
*/
pub struct AudioFilter {
    graph: ffmpeg::filter::Graph,
    time_base: Rational,
    state: Arc<SharedState>,
    input: Arc<DecodedAudioQueue>,
    output: Arc<AudioFrameQueue>,
}

// SAFETY: the filter graph is owned by this stage and touched only by its
// worker thread once construction completes.
unsafe impl Send for AudioFilter {}

impl AudioFilter {
    /**
        Build a graph running `description` between an abuffer source
        shaped like the decoder output and an abuffer sink. An empty
        description becomes the `anull` pass-through.
    */
    pub fn new(
        config: AudioFilterConfig,
        description: &str,
        state: Arc<SharedState>,
        input: Arc<DecodedAudioQueue>,
        output: Arc<AudioFrameQueue>,
    ) -> Result<Self> {
        let graph = build_graph(&config, description)
            .map_err(|e| Error::codec(format!("audio filter constructor: {e}")))?;
        Ok(Self {
            graph,
            time_base: config.time_base,
            state,
            input,
            output,
        })
    }

    /// Drive the filter loop until end of stream or termination.
    pub fn run(&mut self) {
        while self.filter() {}
    }

    pub fn filter(&mut self) -> bool {
        let item = self.input.pop();

        if self.state.is_terminated() {
            self.output.clear();
            self.output.push(Item::Signal(PipelineSignal::Eos));
            return false;
        }

        match item {
            Item::Signal(signal) => {
                self.output.push(Item::Signal(signal));
                signal != PipelineSignal::Eos
            }
            Item::Data(frame) => {
                if self.state.seek_in_progress() {
                    return true;
                }
                if let Err(e) = self.run_graph(&frame.0) {
                    warn!("audio filter error: {e}");
                }
                true
            }
        }
    }

    fn run_graph(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()> {
        self.graph
            .get("in")
            .expect("graph has a source")
            .source()
            .add(frame)
            .map_err(|e| Error::codec(e.to_string()))?;

        loop {
            let mut filtered = ffmpeg::frame::Audio::empty();
            match self
                .graph
                .get("out")
                .expect("graph has a sink")
                .sink()
                .frame(&mut filtered)
            {
                Ok(()) => {
                    let plain = convert::audio_frame(&filtered, self.time_base)?;
                    self.output.push(Item::Data(plain));
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
}

fn build_graph(
    config: &AudioFilterConfig,
    description: &str,
) -> std::result::Result<ffmpeg::filter::Graph, ffmpeg::Error> {
    let mut graph = ffmpeg::filter::Graph::new();

    let sample_fmt = unsafe {
        let name = ffi::av_get_sample_fmt_name(config.sample_format.into());
        if name.is_null() {
            return Err(ffmpeg::Error::InvalidData);
        }
        CStr::from_ptr(name).to_string_lossy().into_owned()
    };
    let args = format!(
        "time_base={}/{}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
        config.time_base.num,
        config.time_base.den,
        config.sample_rate,
        sample_fmt,
        config.channel_layout.bits(),
    );

    let abuffer = ffmpeg::filter::find("abuffer").ok_or(ffmpeg::Error::FilterNotFound)?;
    let abuffersink = ffmpeg::filter::find("abuffersink").ok_or(ffmpeg::Error::FilterNotFound)?;
    graph.add(&abuffer, "in", &args)?;
    graph.add(&abuffersink, "out", "")?;

    let spec = if description.is_empty() {
        "anull"
    } else {
        description
    };
    graph.output("in", 0)?.input("out", 0)?.parse(spec)?;
    graph.validate()?;
    Ok(graph)
}
