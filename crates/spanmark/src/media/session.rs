//! Playback controller: one session per opened video.
//!
//! Commands (`play`, `pause`, `seek`, `step`, `set_direction`) only record
//! intent and forward it to the decode pipeline. `update()` is the single
//! synchronization point: it pumps the pipeline's event channel, then acts on
//! whatever arrived. Call it exactly once per rendered frame.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};

use super::error::{PipelineError, PlaybackError};
use super::pipeline::{
    ContextKind, DecodePipeline, Direction, PipelineEvent, PipelineState, SeekRequest,
    duration_from_secs, secs,
};
use super::ring::FrameRing;
use super::texture::{GpuShare, TextureBridge, bridge_for};
use super::types::{DecodedFrame, TextureHandle};
use super::video::{FfmpegPipeline, PipelineOptions};

/// Polls allowed for the pipeline to become ready during `open`.
pub const OPEN_RETRY_LIMIT: usize = 1000;

/// Stepping backward this close to the start rewinds to zero instead.
pub const STEP_BACK_FLOOR_SECS: f64 = 0.2;

/// Transient command state. Several flags can be set at once (paused and
/// ended, for instance), so this is not an enum.
struct PlaybackIntent {
    paused: bool,
    forward: bool,
    /// Latest seek requested while an earlier one was still in flight.
    pending_seek: Option<f64>,
    last_seek: Option<f64>,
    waiting_for_frame: bool,
    end_of_stream: bool,
}

impl Default for PlaybackIntent {
    fn default() -> Self {
        Self {
            paused: true,
            forward: true,
            pending_seek: None,
            last_seek: None,
            waiting_for_frame: false,
            end_of_stream: false,
        }
    }
}

pub struct PlaybackSession {
    path: PathBuf,
    duration: f64,
    position: f64,
    width: u32,
    height: u32,
    texture: TextureHandle,
    intent: PlaybackIntent,
    new_frame: bool,
    /// Contexts the pipeline still needs before it counts as ready.
    pending_contexts: Vec<ContextKind>,
    opening: bool,
    open_error: Option<PipelineError>,
    disconnected: bool,
    frames: FrameRing,
    pipeline: Box<dyn DecodePipeline>,
    events: Receiver<PipelineEvent>,
    bridge: Box<dyn TextureBridge>,
}

impl PlaybackSession {
    /// Open `path` with the ffmpeg pipeline, choosing the texture bridge that
    /// matches where the pipeline leaves decoded pixels.
    pub fn open(
        path: &Path,
        gpu: &GpuShare,
        options: PipelineOptions,
    ) -> Result<Self, PlaybackError> {
        let (pipeline, events) =
            FfmpegPipeline::new(path, options).map_err(|e| PlaybackError::open_failed(path, e))?;
        let bridge = bridge_for(pipeline.frame_memory(), gpu);
        Self::with_pipeline(path, Box::new(pipeline), events, bridge)
    }

    /// Start `pipeline` and poll it until every context it needs has been
    /// negotiated. On failure the partially opened session is torn down.
    pub fn with_pipeline(
        path: impl Into<PathBuf>,
        pipeline: Box<dyn DecodePipeline>,
        events: Receiver<PipelineEvent>,
        bridge: Box<dyn TextureBridge>,
    ) -> Result<Self, PlaybackError> {
        let pending_contexts = pipeline.required_contexts().to_vec();
        let mut session = Self {
            path: path.into(),
            duration: 0.0,
            position: 0.0,
            width: 0,
            height: 0,
            texture: TextureHandle::NONE,
            intent: PlaybackIntent::default(),
            new_frame: false,
            pending_contexts,
            opening: true,
            open_error: None,
            disconnected: false,
            frames: FrameRing::new(),
            pipeline,
            events,
            bridge,
        };

        session.bridge.begin_context_negotiation();
        let ready = session.wait_until_ready();
        session.bridge.end_context_negotiation();
        session.opening = false;

        match ready {
            Ok(()) => {
                log::info!("Opened video: {}", session.path.display());
                Ok(session)
            }
            Err(reason) => {
                log::error!("Failed to open {}: {reason}", session.path.display());
                Err(PlaybackError::open_failed(session.path.clone(), reason))
            }
        }
    }

    fn wait_until_ready(&mut self) -> Result<(), String> {
        self.pipeline
            .set_state(PipelineState::Playing)
            .map_err(|e| e.to_string())?;
        self.intent.waiting_for_frame = true;

        for _ in 0..OPEN_RETRY_LIMIT {
            self.update();
            if let Some(err) = self.open_error.take() {
                return Err(err.to_string());
            }
            if self.pending_contexts.is_empty() {
                return Ok(());
            }
        }
        Err(format!(
            "pipeline still waiting for {:?} after {OPEN_RETRY_LIMIT} polls",
            self.pending_contexts
        ))
    }

    /// Pump pending pipeline events, then refresh position, texture and any
    /// deferred seek/pause bookkeeping.
    pub fn update(&mut self) {
        self.pump_events();

        if self.intent.end_of_stream {
            self.pause(true);
            return;
        }

        if self.duration <= 0.0 {
            if let Some(duration) = self.pipeline.query_duration() {
                self.duration = secs(duration);
            }
        }
        if let Some(position) = self.pipeline.query_position() {
            self.position = secs(position);
        }

        if !self.new_frame {
            return;
        }
        self.new_frame = false;

        if self.intent.waiting_for_frame {
            self.intent.waiting_for_frame = false;
            let reissued = self
                .intent
                .pending_seek
                .take()
                .is_some_and(|target| self.issue_seek(target));
            if !reissued {
                // Pausing was held back until a post-seek frame existed.
                if self.intent.paused {
                    self.pause(true);
                }
                self.set_direction(true);
            }
        }

        self.present_newest();
    }

    fn pump_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(PipelineEvent::Frame(frame)) => self.on_frame(&frame),
                Ok(PipelineEvent::EndOfStream) => self.on_end_of_stream(),
                Ok(PipelineEvent::Error(err)) => self.on_pipeline_error(err),
                Ok(PipelineEvent::NeedContext(kind)) => self.on_need_context(kind),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        self.disconnected = true;
                        self.on_pipeline_error(PipelineError::Disconnected);
                    }
                    break;
                }
            }
        }
    }

    fn on_frame(&mut self, frame: &DecodedFrame) {
        // Hold the last pre-EOS frame on screen.
        if self.intent.end_of_stream {
            return;
        }
        self.frames.push(frame);
        self.new_frame = true;
    }

    fn on_end_of_stream(&mut self) {
        if self.intent.end_of_stream {
            return;
        }

        if self.intent.forward {
            log::info!("End of stream: {}", self.path.display());
            let end = self
                .pipeline
                .query_duration()
                .unwrap_or_else(|| duration_from_secs(self.duration));
            if let Err(e) = self.pipeline.seek(SeekRequest::To(end)) {
                log::warn!("Failed to park pipeline at end of stream: {e}");
            }
            self.intent.end_of_stream = true;
            self.set_pipeline_state(PipelineState::Paused);
        } else {
            // Reverse playback ran out of frames at the start.
            log::debug!("Reverse playback reached the start, restoring forward range");
            let request = SeekRequest::Range {
                direction: Direction::Forward,
                start: Duration::ZERO,
                stop: None,
            };
            if let Err(e) = self.pipeline.seek(request) {
                log::warn!("Failed to restore forward range: {e}");
            }
            self.intent.forward = true;
        }
    }

    fn on_pipeline_error(&mut self, err: PipelineError) {
        if self.opening {
            self.open_error.get_or_insert(err);
        } else {
            log::error!("{}: {}", self.path.display(), PlaybackError::Pipeline(err));
        }
    }

    fn on_need_context(&mut self, kind: ContextKind) {
        let Some(context) = self.bridge.provide_context(kind) else {
            log::warn!("No {kind:?} context available for the decode pipeline");
            return;
        };
        match self.pipeline.set_context(context) {
            Ok(()) => self.pending_contexts.retain(|k| *k != kind),
            Err(e) => log::warn!("Pipeline refused {kind:?} context: {e}"),
        }
    }

    fn present_newest(&mut self) {
        let Some(frame) = self.frames.peek_newest() else {
            return;
        };
        self.width = frame.width();
        self.height = frame.height();
        match self.bridge.upload(frame) {
            Ok(handle) => self.texture = handle,
            Err(e) => log::warn!("Failed to present frame at {:?}: {e}", frame.pts()),
        }
    }

    fn set_pipeline_state(&mut self, state: PipelineState) {
        if let Err(e) = self.pipeline.set_state(state) {
            log::error!("Failed to set pipeline {state:?}: {e}");
        }
    }

    pub fn play(&mut self) {
        self.pause(false);
    }

    pub fn pause(&mut self, paused: bool) {
        // An ended stream only resumes through a seek.
        if !paused && self.intent.end_of_stream {
            return;
        }

        self.intent.paused = paused;
        if paused {
            if !self.intent.waiting_for_frame {
                self.set_pipeline_state(PipelineState::Paused);
            }
        } else {
            self.set_pipeline_state(PipelineState::Playing);
            self.intent.waiting_for_frame = false;
            self.intent.last_seek = None;
            self.intent.pending_seek = None;
        }
    }

    /// Pause and return to the first frame.
    pub fn stop(&mut self) {
        self.pause(true);
        self.seek(0.0);
    }

    pub fn seek(&mut self, position: f64) {
        self.issue_seek(position);
    }

    /// Returns whether a seek went to the pipeline (or was queued behind the
    /// one in flight).
    fn issue_seek(&mut self, position: f64) -> bool {
        if position.is_nan() {
            return false;
        }
        let position = position.clamp(0.0, self.duration.max(0.0));

        if self.intent.end_of_stream && position >= self.duration {
            return false;
        }

        // Two back-to-back seeks give undefined intermediate frames; keep only
        // the newest request until the in-flight one lands.
        if self.intent.waiting_for_frame && !self.intent.end_of_stream {
            self.intent.pending_seek = Some(position);
            return true;
        }

        if self.intent.last_seek == Some(position) && !self.intent.end_of_stream {
            return false;
        }

        if let Err(e) = self.pipeline.seek(SeekRequest::To(duration_from_secs(position))) {
            log::warn!("{} ({e})", PlaybackError::SeekRejected { target: position });
            return false;
        }
        log::debug!("Seek to {position:.3}s");

        self.intent.end_of_stream = false;
        self.intent.forward = true;
        // A paused pipeline would never deliver the post-seek frame.
        self.set_pipeline_state(PipelineState::Playing);
        self.intent.waiting_for_frame = true;
        self.intent.pending_seek = None;
        self.intent.last_seek = Some(position);
        true
    }

    /// Seek relative to the pipeline's live position rather than the cached one.
    pub fn seek_relative(&mut self, offset: f64) {
        if let Some(position) = self.pipeline.query_position() {
            let target = (secs(position) + offset).clamp(0.0, self.duration.max(0.0));
            self.seek(target);
        }
    }

    pub fn set_direction(&mut self, forward: bool) {
        if let Some(position) = self.pipeline.query_position() {
            let request = if forward {
                SeekRequest::Range {
                    direction: Direction::Forward,
                    start: position,
                    stop: None,
                }
            } else {
                SeekRequest::Range {
                    direction: Direction::Reverse,
                    start: Duration::ZERO,
                    stop: Some(position),
                }
            };
            if let Err(e) = self.pipeline.seek(request) {
                log::warn!("Failed to set playback direction: {e}");
            }
        }
        self.intent.forward = forward;
    }

    pub fn step(&mut self, forward: bool) {
        // No earlier frame to reverse into; rewind instead.
        if !forward && self.position <= STEP_BACK_FLOOR_SECS {
            // The picture may have stepped off an earlier seek to zero.
            self.intent.last_seek = None;
            self.seek(0.0);
            return;
        }

        if forward && self.position >= self.duration {
            return;
        }

        if !forward {
            self.set_direction(false);
        }

        if let Err(e) = self.pipeline.step(1) {
            log::warn!("Frame step rejected: {e}");
            return;
        }
        self.intent.last_seek = None;
        self.set_pipeline_state(PipelineState::Playing);
        self.intent.waiting_for_frame = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream length in seconds, `0.0` until the pipeline reports it.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texture_handle(&self) -> TextureHandle {
        self.texture
    }

    pub fn texture_view(&self) -> Option<&wgpu::TextureView> {
        self.bridge.view()
    }

    pub fn is_paused(&self) -> bool {
        self.intent.paused
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.intent.end_of_stream
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        // Quiesce the decoder before releasing frames it may still be touching.
        self.pause(true);
        self.set_pipeline_state(PipelineState::Null);
        let released = self.frames.drain_all();
        log::debug!(
            "Closed {} ({released} buffered frames released)",
            self.path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crossbeam_channel::Sender;

    use super::*;
    use crate::media::error::BridgeError;
    use crate::media::pipeline::SharedContext;
    use crate::media::ring::FRAME_RING_CAPACITY;
    use crate::media::types::FramePixels;

    const FRAME: Duration = Duration::from_nanos(33_333_333);

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        State(PipelineState),
        Seek(SeekRequest),
        Step(u32),
    }

    #[derive(Default)]
    struct FakeState {
        commands: Vec<Command>,
        position: Duration,
        duration: Option<Duration>,
        reverse: bool,
        reject_seeks: bool,
        /// Frame whose reference count is sampled when the pipeline goes `Null`.
        sampled: Option<DecodedFrame>,
        refs_at_null: Option<usize>,
    }

    struct FakePipeline {
        state: Arc<Mutex<FakeState>>,
        required: Vec<ContextKind>,
    }

    impl DecodePipeline for FakePipeline {
        fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
            let mut s = self.state.lock().unwrap();
            if state == PipelineState::Null {
                s.refs_at_null = s.sampled.as_ref().map(DecodedFrame::ref_count);
            }
            s.commands.push(Command::State(state));
            Ok(())
        }

        fn query_duration(&self) -> Option<Duration> {
            self.state.lock().unwrap().duration
        }

        fn query_position(&self) -> Option<Duration> {
            Some(self.state.lock().unwrap().position)
        }

        fn seek(&mut self, request: SeekRequest) -> Result<(), PipelineError> {
            let mut s = self.state.lock().unwrap();
            if s.reject_seeks {
                return Err(PipelineError::Rejected("busy".into()));
            }
            match request {
                SeekRequest::To(target) => {
                    s.position = target;
                    s.reverse = false;
                }
                SeekRequest::Range {
                    direction, start, stop,
                } => {
                    s.reverse = direction == Direction::Reverse;
                    s.position = if s.reverse { stop.unwrap_or(start) } else { start };
                }
            }
            s.commands.push(Command::Seek(request));
            Ok(())
        }

        fn step(&mut self, frames: u32) -> Result<(), PipelineError> {
            let mut s = self.state.lock().unwrap();
            let delta = FRAME * frames;
            s.position = if s.reverse {
                s.position.saturating_sub(delta)
            } else {
                s.position + delta
            };
            s.commands.push(Command::Step(frames));
            Ok(())
        }

        fn required_contexts(&self) -> &[ContextKind] {
            &self.required
        }
    }

    #[derive(Default)]
    struct BridgeLog {
        uploads: Vec<Duration>,
        negotiations_opened: usize,
        negotiations_closed: usize,
    }

    struct RecordingBridge {
        log: Arc<Mutex<BridgeLog>>,
        handle: TextureHandle,
    }

    impl TextureBridge for RecordingBridge {
        fn upload(&mut self, frame: &DecodedFrame) -> Result<TextureHandle, BridgeError> {
            self.log.lock().unwrap().uploads.push(frame.pts());
            Ok(self.handle)
        }

        fn view(&self) -> Option<&wgpu::TextureView> {
            None
        }

        fn provide_context(&mut self, _kind: ContextKind) -> Option<SharedContext> {
            None
        }

        fn begin_context_negotiation(&mut self) {
            self.log.lock().unwrap().negotiations_opened += 1;
        }

        fn end_context_negotiation(&mut self) {
            self.log.lock().unwrap().negotiations_closed += 1;
        }
    }

    struct Harness {
        session: PlaybackSession,
        state: Arc<Mutex<FakeState>>,
        bridge: Arc<Mutex<BridgeLog>>,
        events: Sender<PipelineEvent>,
    }

    fn try_open(
        required: Vec<ContextKind>,
        before_open: Vec<PipelineEvent>,
    ) -> (
        Result<PlaybackSession, PlaybackError>,
        Arc<Mutex<FakeState>>,
        Arc<Mutex<BridgeLog>>,
        Sender<PipelineEvent>,
    ) {
        let state = Arc::new(Mutex::new(FakeState {
            duration: Some(Duration::from_secs(10)),
            ..FakeState::default()
        }));
        let bridge = Arc::new(Mutex::new(BridgeLog::default()));
        let (tx, rx) = crossbeam_channel::unbounded();
        for event in before_open {
            tx.send(event).unwrap();
        }
        let session = PlaybackSession::with_pipeline(
            "/videos/clip.mp4",
            Box::new(FakePipeline {
                state: state.clone(),
                required,
            }),
            rx,
            Box::new(RecordingBridge {
                log: bridge.clone(),
                handle: TextureHandle::allocate(),
            }),
        );
        (session, state, bridge, tx)
    }

    impl Harness {
        /// Freshly opened; the first frame has not arrived yet.
        fn open() -> Self {
            let (session, state, bridge, events) = try_open(vec![], vec![]);
            Self {
                session: session.expect("fake pipeline opens"),
                state,
                bridge,
                events,
            }
        }

        /// Opened and showing the first frame, paused.
        fn ready() -> Self {
            let mut h = Self::open();
            h.deliver_frame();
            h.session.update();
            h.clear_commands();
            h
        }

        fn deliver_frame(&self) {
            let pts = self.state.lock().unwrap().position;
            self.deliver_frame_at(pts);
        }

        fn deliver_frame_at(&self, pts: Duration) {
            let frame = DecodedFrame::new(4, 2, pts, FramePixels::Host(vec![0; 32]));
            self.events.send(PipelineEvent::Frame(frame)).unwrap();
        }

        fn send(&self, event: PipelineEvent) {
            self.events.send(event).unwrap();
        }

        fn set_position(&self, secs: f64) {
            self.state.lock().unwrap().position = duration_from_secs(secs);
        }

        fn commands(&self) -> Vec<Command> {
            self.state.lock().unwrap().commands.clone()
        }

        fn seeks(&self) -> Vec<SeekRequest> {
            self.commands()
                .into_iter()
                .filter_map(|c| match c {
                    Command::Seek(request) => Some(request),
                    _ => None,
                })
                .collect()
        }

        fn clear_commands(&self) {
            self.state.lock().unwrap().commands.clear();
        }

        fn uploads(&self) -> usize {
            self.bridge.lock().unwrap().uploads.len()
        }
    }

    fn forward_from(start: Duration) -> SeekRequest {
        SeekRequest::Range {
            direction: Direction::Forward,
            start,
            stop: None,
        }
    }

    #[test]
    fn open_starts_pipeline_and_waits_for_first_frame() {
        let h = Harness::open();
        assert_eq!(h.commands().first(), Some(&Command::State(PipelineState::Playing)));
        assert!(h.session.texture_handle().is_none());
        assert!((h.session.duration() - 10.0).abs() < 1e-9);
        assert!(h.session.intent.waiting_for_frame);

        let bridge = h.bridge.lock().unwrap();
        assert_eq!(bridge.negotiations_opened, 1);
        assert_eq!(bridge.negotiations_closed, 1);
    }

    #[test]
    fn first_frame_is_shown_and_pipeline_paused() {
        let mut h = Harness::open();
        h.clear_commands();
        h.deliver_frame();
        h.session.update();

        assert!(!h.session.texture_handle().is_none());
        assert_eq!((h.session.width(), h.session.height()), (4, 2));
        assert!(h.session.is_paused());
        assert!(!h.session.intent.waiting_for_frame);
        assert_eq!(
            h.commands(),
            vec![
                Command::State(PipelineState::Paused),
                Command::Seek(forward_from(Duration::ZERO)),
            ]
        );
    }

    #[test]
    fn open_fails_when_context_never_arrives() {
        let (session, state, bridge, _tx) = try_open(
            vec![ContextKind::Device],
            vec![PipelineEvent::NeedContext(ContextKind::Device)],
        );
        assert!(matches!(session, Err(PlaybackError::OpenFailed { .. })));

        let bridge = bridge.lock().unwrap();
        assert_eq!(bridge.negotiations_closed, 1, "negotiation window closed on failure");
        let state = state.lock().unwrap();
        assert_eq!(
            state.commands.last(),
            Some(&Command::State(PipelineState::Null)),
            "partially opened pipeline torn down"
        );
    }

    #[test]
    fn open_fails_on_early_pipeline_error() {
        let (session, _, _, _tx) = try_open(
            vec![],
            vec![PipelineEvent::Error(PipelineError::Decode("bad codec".into()))],
        );
        match session {
            Err(PlaybackError::OpenFailed { reason, .. }) => assert!(reason.contains("bad codec")),
            _ => panic!("expected OpenFailed"),
        }
    }

    #[test]
    fn seek_converges_to_target() {
        let mut h = Harness::ready();
        for target in [0.0, 2.5, 5.0, 9.99, 10.0, 3.3] {
            h.session.seek(target);
            for _ in 0..3 {
                h.deliver_frame();
                h.session.update();
            }
            assert!(
                (h.session.position() - target).abs() <= FRAME.as_secs_f64(),
                "seek({target}) landed at {}",
                h.session.position()
            );
        }
    }

    #[test]
    fn seek_clamps_into_stream() {
        let mut h = Harness::ready();
        h.session.seek(-3.0);
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::ZERO)]);

        h.deliver_frame();
        h.session.update();
        h.clear_commands();

        h.session.seek(42.0);
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::from_secs(10))]);
    }

    #[test]
    fn rapid_seeks_coalesce_to_latest() {
        let mut h = Harness::open();
        h.clear_commands();

        h.session.seek(3.0);
        h.session.seek(7.0);
        assert!(h.seeks().is_empty(), "no seek issued while a frame is pending");

        h.deliver_frame();
        h.session.update();
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::from_secs(7))]);

        h.deliver_frame();
        h.session.update();
        assert!((h.session.position() - 7.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_seek_to_same_target_is_ignored() {
        let mut h = Harness::ready();
        h.session.seek(4.0);
        h.deliver_frame();
        h.session.update();
        h.clear_commands();

        h.session.seek(4.0);
        assert!(h.commands().is_empty());
    }

    #[test]
    fn coalesced_seek_back_to_issued_target_still_pauses() {
        let mut h = Harness::ready();
        h.session.seek(4.0);
        h.session.seek(7.0);
        h.session.seek(4.0);
        h.clear_commands();

        h.deliver_frame();
        h.session.update();

        assert!(h.session.is_paused());
        assert!(!h.session.intent.waiting_for_frame);
        assert_eq!(h.session.intent.pending_seek, None);
        assert_eq!(
            h.commands(),
            vec![
                Command::State(PipelineState::Paused),
                Command::Seek(forward_from(Duration::from_secs(4))),
            ]
        );
        assert!((h.session.position() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn rejected_seek_keeps_prior_state() {
        let mut h = Harness::ready();
        h.state.lock().unwrap().reject_seeks = true;

        h.session.seek(4.0);

        assert!(h.commands().is_empty());
        assert!(!h.session.intent.waiting_for_frame);
        assert_eq!(h.session.intent.last_seek, None);
        h.session.update();
        assert!(h.session.position().abs() < 1e-9);
    }

    #[test]
    fn seek_relative_reads_live_position() {
        let mut h = Harness::ready();
        // Cached position is still 0; the pipeline has moved on.
        h.set_position(6.0);
        h.session.seek_relative(1.0);
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::from_secs(7))]);
    }

    #[test]
    fn seek_relative_clamps_at_both_ends() {
        let mut h = Harness::ready();
        h.set_position(0.5);
        h.session.seek_relative(-1.0);
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::ZERO)]);

        h.deliver_frame();
        h.session.update();
        h.clear_commands();
        h.set_position(9.5);
        h.session.seek_relative(1.0);
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::from_secs(10))]);
    }

    #[test]
    fn step_forward_at_end_is_noop() {
        let mut h = Harness::ready();
        h.set_position(10.0);
        h.session.update();
        h.clear_commands();

        h.session.step(true);

        assert!(h.commands().is_empty());
        assert!(!h.session.intent.waiting_for_frame);
        assert!(h.session.is_paused());
    }

    #[test]
    fn step_forward_advances_one_frame_and_repauses() {
        let mut h = Harness::ready();
        h.set_position(2.0);
        h.session.update();
        h.clear_commands();

        h.session.step(true);
        assert_eq!(
            h.commands(),
            vec![Command::Step(1), Command::State(PipelineState::Playing)]
        );
        assert!(h.session.intent.waiting_for_frame);

        h.deliver_frame();
        h.session.update();
        assert!(h.session.is_paused());
        assert!(h.commands().contains(&Command::State(PipelineState::Paused)));
        assert!((h.session.position() - (2.0 + FRAME.as_secs_f64())).abs() < 1e-6);
    }

    #[test]
    fn step_backward_near_start_rewinds_forward() {
        let mut h = Harness::ready();
        h.set_position(0.1);
        h.session.update();
        h.clear_commands();

        h.session.step(false);

        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::ZERO)]);
        assert!(h.session.intent.forward);

        h.deliver_frame();
        h.session.update();
        assert!(h.session.position().abs() < 1e-9);
        assert!(h.session.intent.forward);
        assert!(!h.seeks().iter().any(|s| matches!(
            s,
            SeekRequest::Range {
                direction: Direction::Reverse,
                ..
            }
        )));
    }

    #[test]
    fn step_backward_after_home_and_one_step_returns_to_zero() {
        let mut h = Harness::ready();
        h.session.seek(0.0);
        h.deliver_frame();
        h.session.update();

        h.session.step(true);
        h.deliver_frame();
        h.session.update();
        assert!((h.session.position() - FRAME.as_secs_f64()).abs() < 1e-6);
        h.clear_commands();

        h.session.step(false);
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::ZERO)]);

        h.deliver_frame();
        h.session.update();
        assert!(h.session.position().abs() < 1e-9);
        assert!(h.session.is_paused());
        assert!(h.commands().contains(&Command::State(PipelineState::Paused)));
    }

    #[test]
    fn step_backward_reverses_then_restores_forward() {
        let mut h = Harness::ready();
        h.set_position(5.0);
        h.session.update();
        h.clear_commands();

        h.session.step(false);
        assert_eq!(
            h.commands(),
            vec![
                Command::Seek(SeekRequest::Range {
                    direction: Direction::Reverse,
                    start: Duration::ZERO,
                    stop: Some(Duration::from_secs(5)),
                }),
                Command::Step(1),
                Command::State(PipelineState::Playing),
            ]
        );
        assert!(!h.session.intent.forward);

        h.deliver_frame();
        h.session.update();
        assert!(h.session.position() < 5.0);
        assert!(h.session.intent.forward);
        assert!(matches!(
            h.seeks().last(),
            Some(SeekRequest::Range {
                direction: Direction::Forward,
                ..
            })
        ));
    }

    #[test]
    fn forward_end_of_stream_pauses_at_end() {
        let mut h = Harness::ready();
        h.session.play();
        h.set_position(10.0);
        h.deliver_frame();
        h.session.update();
        h.clear_commands();

        h.send(PipelineEvent::EndOfStream);
        h.session.update();

        assert!(h.session.is_end_of_stream());
        assert!(h.session.is_paused());
        assert!((h.session.position() - h.session.duration()).abs() < 1e-6);
        let commands = h.commands();
        assert_eq!(commands[0], Command::Seek(SeekRequest::To(Duration::from_secs(10))));
        assert!(commands.contains(&Command::State(PipelineState::Paused)));
    }

    #[test]
    fn reverse_end_of_stream_restores_forward_without_ending() {
        let mut h = Harness::ready();
        h.set_position(5.0);
        h.session.update();
        h.session.step(false);
        h.clear_commands();

        h.send(PipelineEvent::EndOfStream);
        h.session.update();

        assert!(!h.session.is_end_of_stream());
        assert!(h.session.intent.forward);
        assert_eq!(h.seeks(), vec![forward_from(Duration::ZERO)]);
    }

    #[test]
    fn repeated_end_of_stream_is_ignored() {
        let mut h = Harness::ready();
        h.session.play();
        h.send(PipelineEvent::EndOfStream);
        h.session.update();
        h.clear_commands();

        h.send(PipelineEvent::EndOfStream);
        h.session.update();
        assert!(h.seeks().is_empty());
    }

    #[test]
    fn unpause_after_end_of_stream_is_noop() {
        let mut h = Harness::ready();
        h.session.play();
        h.send(PipelineEvent::EndOfStream);
        h.session.update();
        h.clear_commands();

        h.session.pause(false);
        h.session.play();

        assert!(h.commands().is_empty());
        assert!(h.session.is_paused());
        assert!(h.session.is_end_of_stream());
    }

    #[test]
    fn frames_after_end_of_stream_are_dropped() {
        let mut h = Harness::ready();
        h.session.play();
        h.send(PipelineEvent::EndOfStream);
        h.session.update();
        let uploads = h.uploads();
        let buffered = h.session.frames.len();

        h.deliver_frame();
        h.session.update();

        assert_eq!(h.uploads(), uploads);
        assert_eq!(h.session.frames.len(), buffered);
    }

    #[test]
    fn seek_after_end_of_stream_resumes() {
        let mut h = Harness::ready();
        h.session.play();
        h.send(PipelineEvent::EndOfStream);
        h.session.update();

        h.session.seek(10.0);
        assert!(h.session.is_end_of_stream(), "seek to the end stays ended");

        h.session.seek(2.0);
        assert!(!h.session.is_end_of_stream());
        h.deliver_frame();
        h.session.update();
        assert!((h.session.position() - 2.0).abs() < 1e-6);
        assert!(h.session.is_paused());
    }

    #[test]
    fn pause_while_waiting_is_deferred_until_frame() {
        let mut h = Harness::ready();
        h.session.play();
        h.session.seek(3.0);
        h.clear_commands();

        h.session.pause(true);
        assert!(h.commands().is_empty());
        assert!(h.session.is_paused());

        h.deliver_frame();
        h.session.update();
        assert_eq!(h.commands()[0], Command::State(PipelineState::Paused));
    }

    #[test]
    fn play_forgets_previous_seek() {
        let mut h = Harness::ready();
        h.session.seek(4.0);
        h.deliver_frame();
        h.session.update();

        h.session.play();
        assert_eq!(h.session.intent.last_seek, None);
        assert_eq!(h.session.intent.pending_seek, None);

        h.clear_commands();
        h.session.seek(4.0);
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::from_secs(4))]);
    }

    #[test]
    fn pipeline_error_leaves_session_running() {
        let mut h = Harness::ready();
        h.session.play();
        h.clear_commands();

        h.send(PipelineEvent::Error(PipelineError::Decode("corrupt packet".into())));
        h.session.update();

        assert!(!h.session.is_paused());
        assert!(h.commands().is_empty());
    }

    #[test]
    fn ring_holds_at_most_thirty_frames() {
        let mut h = Harness::ready();
        h.session.play();
        for i in 0..45 {
            h.deliver_frame_at(FRAME * i);
        }
        h.session.update();
        assert_eq!(h.session.frames.len(), FRAME_RING_CAPACITY);
        assert_eq!(
            h.bridge.lock().unwrap().uploads.last(),
            Some(&(FRAME * 44)),
            "only the newest frame is presented"
        );
    }

    #[test]
    fn open_then_seek_five_seconds() {
        let mut h = Harness::open();
        h.deliver_frame();
        h.session.update();

        h.session.seek(5.0);
        let mut polls = 0;
        while h.session.intent.waiting_for_frame && polls < 10 {
            h.deliver_frame();
            h.session.update();
            polls += 1;
        }
        assert!((h.session.position() - 5.0).abs() <= FRAME.as_secs_f64());
        assert!(!h.session.texture_handle().is_none());
    }

    #[test]
    fn stop_pauses_and_rewinds() {
        let mut h = Harness::ready();
        h.session.play();
        h.set_position(6.0);
        h.session.update();
        h.clear_commands();

        h.session.stop();
        assert!(h.session.is_paused());
        assert_eq!(h.seeks(), vec![SeekRequest::To(Duration::ZERO)]);
    }

    #[test]
    fn drop_quiesces_pipeline_before_releasing_frames() {
        let h = Harness::ready();
        let sampled = h.session.frames.peek_newest().unwrap().clone();
        h.state.lock().unwrap().sampled = Some(sampled.clone());
        let state = h.state.clone();
        let Harness { session, .. } = h;

        drop(session);

        let mut state = state.lock().unwrap();
        assert_eq!(
            state.commands.last(),
            Some(&Command::State(PipelineState::Null))
        );
        // ring + sampled + local clone were all alive when the pipeline stopped
        assert_eq!(state.refs_at_null, Some(3));
        state.sampled = None;
        assert_eq!(sampled.ref_count(), 1);
    }
}
