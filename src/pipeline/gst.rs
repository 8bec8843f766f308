//! # GStreamer backend.
//!
//! ```text
//! sender:   v4l2src ─► capsfilter(UYVY 720x576@25) ─► videoconvert ─► v4l2h264enc
//!             ─► capsfilter(h264 main/4) ─► rtph264pay ─► udpsink
//!
//! receiver: udpsrc(application/x-rtp) ─► rtp{codec}depay ─► {codec}parse ─► tee
//!             tee.src_%u ─► queue-display ─► avdec_{codec} ─► videoconvert ─► fbdevsink
//!             tee.src_%u ─► queue-record-N ─► {codec}parse ─► mp4mux ─► filesink   (recording)
//! ```
//!
//! The frame probe is a buffer probe on the entry stage's src pad. Bus messages are
//! translated in a bus sync handler on the streaming threads and forwarded through the
//! graph's [`StatusSender`]; the handler drops them afterwards, nothing else reads the bus.

use gstreamer as gst;
use gstreamer::prelude::*;

use crate::config::{Codec, ReceiverConfig, SenderConfig, StreamProfile};
use crate::error::{BranchError, BuildError};
use crate::pipeline::{
    BRANCH_STAGES, Branch, BranchSpec, FrameProbe, Graph, GraphContext, GraphState, MediaBackend,
    QosStats, StatusKind, StatusSender,
};

const SENDER_BITRATE: i32 = 1_000_000;
const SENDER_MTU: u32 = 1450;

/// Builds GStreamer pipelines.
pub struct GstBackend {
    _init: (),
}

impl GstBackend {
    /// Initializes GStreamer. Safe to call more than once.
    pub fn new() -> Result<Self, gst::glib::Error> {
        gst::init()?;
        Ok(Self { _init: () })
    }
}

impl MediaBackend for GstBackend {
    type Graph = GstGraph;

    fn build(&mut self, profile: &StreamProfile, ctx: GraphContext) -> Result<GstGraph, BuildError> {
        let pipeline = gst::Pipeline::with_name(profile.name());
        let (entry, tee, codec) = match profile {
            StreamProfile::Sender(cfg) => (build_sender(&pipeline, cfg)?, None, Codec::H264),
            StreamProfile::Receiver(cfg) => {
                let (entry, tee) = build_receiver(&pipeline, cfg)?;
                (entry, Some(tee), cfg.codec)
            }
        };
        install_frame_probe(&entry, ctx.probe)?;
        forward_bus(&pipeline, ctx.status)?;

        Ok(GstGraph {
            pipeline,
            tee,
            codec,
            state: GraphState::Null,
        })
    }
}

fn make(factory: &str, name: &str) -> Result<gst::Element, BuildError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|_| BuildError::CapabilityMissing {
            factory: factory.to_string(),
        })
}

fn add(pipeline: &gst::Pipeline, elements: &[&gst::Element]) -> Result<(), BuildError> {
    pipeline
        .add_many(elements.iter().copied())
        .map_err(|_| BuildError::Link {
            from: pipeline.name().to_string(),
            to: elements
                .iter()
                .map(|e| e.name().to_string())
                .collect::<Vec<_>>()
                .join(","),
        })
}

fn link_chain(chain: &[&gst::Element]) -> Result<(), BuildError> {
    for pair in chain.windows(2) {
        pair[0].link(pair[1]).map_err(|_| BuildError::Link {
            from: pair[0].name().to_string(),
            to: pair[1].name().to_string(),
        })?;
    }
    Ok(())
}

fn link_pads(src: &gst::Pad, sink: &gst::Pad) -> Result<(), BuildError> {
    src.link(sink).map(|_| ()).map_err(|_| BuildError::Link {
        from: src.name().to_string(),
        to: sink
            .parent()
            .map_or_else(|| sink.name().to_string(), |p| p.name().to_string()),
    })
}

fn static_pad(element: &gst::Element, name: &str) -> Result<gst::Pad, BuildError> {
    element.static_pad(name).ok_or_else(|| BuildError::Link {
        from: element.name().to_string(),
        to: name.to_string(),
    })
}

fn build_sender(pipeline: &gst::Pipeline, cfg: &SenderConfig) -> Result<gst::Element, BuildError> {
    let source = make("v4l2src", "source")?;
    let raw_caps = make("capsfilter", "capsfilter")?;
    let convert = make("videoconvert", "converter")?;
    let encoder = make("v4l2h264enc", "encoder")?;
    let encoded_caps = make("capsfilter", "encoder-capsfilter")?;
    let payloader = make("rtph264pay", "payloader")?;
    let sink = make("udpsink", "sink")?;

    source.set_property("device", cfg.device.display().to_string());
    source.set_property_from_str("norm", "PAL");
    raw_caps.set_property(
        "caps",
        gst::Caps::builder("video/x-raw")
            .field("format", "UYVY")
            .field("width", 720i32)
            .field("height", 576i32)
            .field("framerate", gst::Fraction::new(25, 1))
            .build(),
    );
    encoder.set_property(
        "extra-controls",
        gst::Structure::builder("controls")
            .field("video_bitrate", SENDER_BITRATE)
            .build(),
    );
    encoded_caps.set_property(
        "caps",
        gst::Caps::builder("video/x-h264")
            .field("profile", "main")
            .field("level", "4")
            .build(),
    );
    payloader.set_property("config-interval", -1i32);
    payloader.set_property("mtu", SENDER_MTU);
    payloader.set_property_from_str("aggregate-mode", "zero-latency");
    sink.set_property("host", cfg.address.to_string());
    sink.set_property("port", i32::from(cfg.port));
    sink.set_property("sync", false);

    let chain = [
        &source,
        &raw_caps,
        &convert,
        &encoder,
        &encoded_caps,
        &payloader,
        &sink,
    ];
    add(pipeline, &chain)?;
    link_chain(&chain)?;
    Ok(source)
}

fn build_receiver(
    pipeline: &gst::Pipeline,
    cfg: &ReceiverConfig,
) -> Result<(gst::Element, gst::Element), BuildError> {
    let tag = cfg.codec.tag();
    let source = make("udpsrc", "udp-source")?;
    let depay = make(&format!("rtp{tag}depay"), "rtp-depay")?;
    let parser = make(&format!("{tag}parse"), "parser")?;
    let tee = make("tee", "tee")?;
    let queue = make("queue", "queue-display")?;
    let decoder = make(&format!("avdec_{tag}"), "decoder")?;
    let convert = make("videoconvert", "video-convert")?;
    let sink = make("fbdevsink", "video-sink")?;

    source.set_property("port", i32::from(cfg.port));
    source.set_property(
        "caps",
        gst::Caps::builder("application/x-rtp")
            .field("media", "video")
            .field("clock-rate", 90_000i32)
            .field("encoding-name", cfg.codec.encoding_name())
            .field("payload", i32::from(cfg.payload_type))
            .build(),
    );

    add(
        pipeline,
        &[
            &source, &depay, &parser, &tee, &queue, &decoder, &convert, &sink,
        ],
    )?;
    link_chain(&[&source, &depay, &parser, &tee])?;

    let display_pad = tee
        .request_pad_simple("src_%u")
        .ok_or_else(|| BuildError::Link {
            from: "tee".into(),
            to: "queue-display".into(),
        })?;
    link_pads(&display_pad, &static_pad(&queue, "sink")?)?;
    link_chain(&[&queue, &decoder, &convert, &sink])?;
    Ok((source, tee))
}

fn install_frame_probe(entry: &gst::Element, probe: FrameProbe) -> Result<(), BuildError> {
    let pad = static_pad(entry, "src")?;
    pad.add_probe(gst::PadProbeType::BUFFER, move |_, _| {
        probe.mark();
        gst::PadProbeReturn::Ok
    });
    Ok(())
}

fn forward_bus(pipeline: &gst::Pipeline, status: StatusSender) -> Result<(), BuildError> {
    let bus = pipeline.bus().ok_or_else(|| BuildError::Link {
        from: pipeline.name().to_string(),
        to: "bus".into(),
    })?;
    bus.set_sync_handler(move |_, msg| {
        if let Some(kind) = translate(msg) {
            let source = msg
                .src()
                .map(|s| s.name().to_string())
                .unwrap_or_default();
            status.post(source, kind);
        }
        gst::BusSyncReply::Drop
    });
    Ok(())
}

fn translate(msg: &gst::Message) -> Option<StatusKind> {
    use gst::MessageView;

    match msg.view() {
        MessageView::Eos(_) => Some(StatusKind::EndOfStream),
        MessageView::Error(e) => Some(StatusKind::Error {
            message: e.error().to_string(),
            debug: e.debug().map(|d| d.to_string()),
        }),
        MessageView::Warning(w) => Some(StatusKind::Warning {
            message: w.error().to_string(),
            debug: w.debug().map(|d| d.to_string()),
        }),
        MessageView::StateChanged(s) => Some(StatusKind::StateChanged {
            old: graph_state(s.old()),
            new: graph_state(s.current()),
        }),
        MessageView::Qos(q) => {
            let (live, running_time, stream_time, timestamp, duration) = q.get();
            let (processed, dropped) = q.stats();
            Some(StatusKind::QualityOfService(QosStats {
                live,
                running_time: running_time.map(|t| t.nseconds()),
                stream_time: stream_time.map(|t| t.nseconds()),
                timestamp: timestamp.map(|t| t.nseconds()),
                duration: duration.map(|t| t.nseconds()),
                processed: u64::try_from(processed.value()).unwrap_or(0),
                dropped: u64::try_from(dropped.value()).unwrap_or(0),
            }))
        }
        _ => None,
    }
}

fn graph_state(state: gst::State) -> GraphState {
    match state {
        gst::State::Ready => GraphState::Ready,
        gst::State::Paused => GraphState::Paused,
        gst::State::Playing => GraphState::Playing,
        _ => GraphState::Null,
    }
}

fn gst_state(state: GraphState) -> gst::State {
    match state {
        GraphState::Null => gst::State::Null,
        GraphState::Ready => gst::State::Ready,
        GraphState::Paused => gst::State::Paused,
        GraphState::Playing => gst::State::Playing,
    }
}

/// A GStreamer pipeline built for one [`StreamProfile`].
pub struct GstGraph {
    pipeline: gst::Pipeline,
    tee: Option<gst::Element>,
    codec: Codec,
    state: GraphState,
}

/// Recording branch hanging off the receiver's tee.
pub struct GstBranch {
    pad: gst::Pad,
    attach_point: String,
    sink_name: String,
    elements: Vec<gst::Element>,
}

impl Branch for GstBranch {
    fn attach_point(&self) -> &str {
        &self.attach_point
    }

    fn sink_name(&self) -> &str {
        &self.sink_name
    }
}

impl GstGraph {
    fn discard(&self, elements: &[gst::Element]) {
        for e in elements {
            let _ = e.set_state(gst::State::Null);
            let _ = self.pipeline.remove(e);
        }
    }
}

impl Graph for GstGraph {
    type Branch = GstBranch;

    fn set_state(&mut self, state: GraphState) -> Result<(), BuildError> {
        self.pipeline
            .set_state(gst_state(state))
            .map_err(|_| BuildError::StateChange { target: state })?;
        self.state = state;
        Ok(())
    }

    fn state(&self) -> GraphState {
        self.state
    }

    fn attach_branch(&mut self, spec: &BranchSpec) -> Result<GstBranch, BranchError> {
        let tee = self.tee.clone().ok_or(BranchError::NoDuplicationPoint)?;
        let [queue_name, parser_name, mux_name, sink_name] =
            BRANCH_STAGES.map(|prefix| spec.stage_name(prefix));

        let queue = make("queue", &queue_name)?;
        let parser = make(&format!("{}parse", self.codec.tag()), &parser_name)?;
        let mux = make("mp4mux", &mux_name)?;
        let sink = make("filesink", &sink_name)?;
        sink.set_property("location", spec.location.display().to_string());

        let elements = vec![queue, parser, mux, sink];
        let refs: Vec<&gst::Element> = elements.iter().collect();
        add(&self.pipeline, &refs)?;
        if let Err(e) = link_chain(&refs) {
            self.discard(&elements);
            return Err(e.into());
        }

        let Some(pad) = tee.request_pad_simple("src_%u") else {
            self.discard(&elements);
            return Err(BranchError::AttachPointUnavailable);
        };
        let linked = static_pad(&elements[0], "sink").and_then(|sink| link_pads(&pad, &sink));
        if let Err(e) = linked {
            tee.release_request_pad(&pad);
            self.discard(&elements);
            return Err(e.into());
        }

        Ok(GstBranch {
            attach_point: pad.name().to_string(),
            pad,
            sink_name,
            elements,
        })
    }

    fn activate_branch(&mut self, branch: &GstBranch) -> Result<(), BranchError> {
        for e in &branch.elements {
            e.sync_state_with_parent().map_err(|_| {
                BranchError::Build(BuildError::StateChange { target: self.state })
            })?;
        }
        Ok(())
    }

    fn begin_drain(&mut self, branch: &GstBranch) {
        let sent = branch
            .elements
            .first()
            .and_then(|queue| queue.static_pad("sink"))
            .is_some_and(|pad| pad.send_event(gst::event::Eos::new()));
        if !sent {
            tracing::warn!(branch = %branch.sink_name, "end-of-stream not accepted by recording branch");
        }
    }

    fn detach_branch(&mut self, branch: GstBranch) {
        if let Some(sink) = branch.elements.first().and_then(|q| q.static_pad("sink")) {
            let _ = branch.pad.unlink(&sink);
        }
        self.discard(&branch.elements);
        if let Some(tee) = &self.tee {
            tee.release_request_pad(&branch.pad);
        }
    }

    fn teardown(self) {
        drop(self);
    }
}

impl Drop for GstGraph {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
    }
}
