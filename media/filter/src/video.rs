/*!
    Video filter stage.
*/

use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use ffmpeg::ffi;

use media_decode::DecodedVideoQueue;
use media_types::{
    Error, Item, PipelineSignal, Rational, Result, SharedState, VideoFrameQueue,
};
use tracing::warn;

use crate::convert;

/**
    Buffer-source parameters for a video graph, taken from the opened
    decoder so filters see exactly what the codec produces.
*/
#[derive(Clone, Copy, Debug)]
pub struct VideoFilterConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_format: ffmpeg::format::Pixel,
    pub time_base: Rational,
    pub aspect_ratio: ffmpeg::Rational,
}

/**
    Video filter stage: decoded frames in, plain packed frames out.
*/
pub struct VideoFilter {
    graph: ffmpeg::filter::Graph,
    time_base: Rational,
    state: Arc<SharedState>,
    input: Arc<DecodedVideoQueue>,
    output: Arc<VideoFrameQueue>,
}

// SAFETY: the filter graph is owned by this stage and touched only by its
// worker thread once construction completes.
unsafe impl Send for VideoFilter {}

impl VideoFilter {
    /**
        Build a graph running `description` between a buffer source shaped
        like the decoder output and a buffer sink. An empty description
        becomes the `null` pass-through.
    */
    pub fn new(
        config: VideoFilterConfig,
        description: &str,
        state: Arc<SharedState>,
        input: Arc<DecodedVideoQueue>,
        output: Arc<VideoFrameQueue>,
    ) -> Result<Self> {
        let graph = build_graph(&config, description)
            .map_err(|e| Error::codec(format!("video filter constructor: {e}")))?;
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

    /**
        One filter iteration. Returns false once the stage is done.
    */
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
                    warn!("video filter error: {e}");
                }
                true
            }
        }
    }

    fn run_graph(&mut self, frame: &ffmpeg::frame::Video) -> Result<()> {
        self.graph
            .get("in")
            .expect("graph has a source")
            .source()
            .add(frame)
            .map_err(|e| Error::codec(e.to_string()))?;

        loop {
            let mut filtered = ffmpeg::frame::Video::empty();
            match self
                .graph
                .get("out")
                .expect("graph has a sink")
                .sink()
                .frame(&mut filtered)
            {
                Ok(()) => {
                    let plain = convert::video_frame(&filtered, self.time_base)?;
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
    config: &VideoFilterConfig,
    description: &str,
) -> std::result::Result<ffmpeg::filter::Graph, ffmpeg::Error> {
    let mut graph = ffmpeg::filter::Graph::new();

    let aspect = if config.aspect_ratio.denominator() == 0 {
        ffmpeg::Rational::new(0, 1)
    } else {
        config.aspect_ratio
    };
    let args = format!(
        "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect={}/{}",
        config.width,
        config.height,
        ffi::AVPixelFormat::from(config.pixel_format) as i32,
        config.time_base.num,
        config.time_base.den,
        aspect.numerator(),
        aspect.denominator(),
    );

    let buffer = ffmpeg::filter::find("buffer").ok_or(ffmpeg::Error::FilterNotFound)?;
    let buffersink = ffmpeg::filter::find("buffersink").ok_or(ffmpeg::Error::FilterNotFound)?;
    graph.add(&buffer, "in", &args)?;
    graph.add(&buffersink, "out", "")?;

    let spec = if description.is_empty() {
        "null"
    } else {
        description
    };
    graph.output("in", 0)?.input("out", 0)?.parse(spec)?;
    graph.validate()?;
    Ok(graph)
}
