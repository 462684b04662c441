//! Streaming video decode via ffmpeg subprocesses.
//!
//! - `ffprobe` probes metadata (dimensions, fps, duration) synchronously at open
//! - a `spanmark-decode` worker thread runs `ffmpeg -f rawvideo -pix_fmt rgba`
//!   and paces frames against the wall clock while playing
//! - seeks restart ffmpeg with `-ss` before `-i`, which decodes accurately
//! - reverse ranges decode short chunks backwards and emit them newest-first
//! - with `gpu_upload`, frames are written into pooled wgpu textures on the
//!   worker so the UI thread only has to flush and sample them

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};

use super::error::PipelineError;
use super::pipeline::{
    ContextKind, DecodePipeline, Direction, PipelineEvent, PipelineState, SeekRequest,
    SharedContext,
};
use super::ring::FRAME_RING_CAPACITY;
use super::texture::FRAME_TEXTURE_FORMAT;
use super::types::{DecodedFrame, FrameMemory, FramePixels, GpuSurface};

/// Decoded frames that may sit in the event channel before the worker blocks.
const EVENT_QUEUE_DEPTH: usize = 8;
const COMMAND_QUEUE_DEPTH: usize = 64;
/// How often a blocked send re-checks for shutdown.
const SEND_POLL: Duration = Duration::from_millis(50);
/// Frames later than this restart the pacing clock instead of bursting.
const MAX_LATENESS: Duration = Duration::from_millis(250);

const GPU_CONTEXTS: [ContextKind; 2] = [ContextKind::Device, ContextKind::Queue];

/// Check if ffmpeg/ffprobe are available on the system. Cached per process.
pub fn ffmpeg_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| ["ffprobe", "ffmpeg"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }))
}

/// Video metadata from ffprobe.
#[derive(Debug, Clone)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
}

impl VideoMeta {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1.0))
    }

    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Probe video metadata using ffprobe.
pub fn probe_video(path: &Path) -> Result<VideoMeta, String> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| format!("ffprobe failed to execute: {e}"))?;

    if !output.status.success() {
        return Err("ffprobe returned non-zero exit code".to_string());
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| format!("Failed to parse ffprobe JSON: {e}"))?;
    meta_from_probe(&json)
}

fn meta_from_probe(json: &serde_json::Value) -> Result<VideoMeta, String> {
    let streams = json["streams"]
        .as_array()
        .ok_or("No streams in ffprobe output")?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or("No video stream found")?;

    let width = video_stream["width"]
        .as_u64()
        .ok_or("Missing width")? as u32;
    let height = video_stream["height"]
        .as_u64()
        .ok_or("Missing height")? as u32;
    if width == 0 || height == 0 {
        return Err(format!("Invalid frame size {width}x{height}"));
    }

    let fps = parse_frame_rate(
        video_stream["r_frame_rate"]
            .as_str()
            .unwrap_or("30/1"),
    );

    let duration_secs = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| {
            video_stream["duration"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    Ok(VideoMeta {
        width,
        height,
        fps,
        duration_secs,
    })
}

fn parse_frame_rate(rate: &str) -> f64 {
    let fps = if let Some((num, den)) = rate.split_once('/') {
        let n: f64 = num.parse().unwrap_or(30.0);
        let d: f64 = den.parse().unwrap_or(1.0);
        if d > 0.0 { n / d } else { 30.0 }
    } else {
        rate.parse().unwrap_or(30.0)
    };
    if fps.is_finite() && fps > 0.0 { fps } else { 30.0 }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Upload frames into GPU textures on the decode thread (zero-copy bridge).
    pub gpu_upload: bool,
    /// Span decoded at a time while playing backwards.
    pub reverse_chunk: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            gpu_upload: false,
            reverse_chunk: Duration::from_millis(500),
        }
    }
}

enum WorkerCommand {
    State(PipelineState),
    Seek(SeekRequest),
    Step(u32),
    Context(SharedContext),
}

/// Decode pipeline backed by an ffmpeg child process on a worker thread.
pub struct FfmpegPipeline {
    meta: VideoMeta,
    options: PipelineOptions,
    state: PipelineState,
    command_tx: Sender<WorkerCommand>,
    /// Held only until the first start so context requests go out synchronously.
    startup_events: Option<Sender<PipelineEvent>>,
    position_ns: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FfmpegPipeline {
    pub fn new(
        path: &Path,
        options: PipelineOptions,
    ) -> Result<(Self, Receiver<PipelineEvent>), PipelineError> {
        if !ffmpeg_available() {
            return Err(PipelineError::Spawn("ffmpeg/ffprobe not found on PATH".into()));
        }
        if !path.is_file() {
            return Err(PipelineError::Probe(format!("{} is not a file", path.display())));
        }
        let meta = probe_video(path).map_err(PipelineError::Probe)?;
        log::info!(
            "Probed {}: {}x{} @ {:.3} fps, {:.3}s",
            path.display(),
            meta.width,
            meta.height,
            meta.fps,
            meta.duration_secs
        );

        let (command_tx, command_rx) = crossbeam_channel::bounded(COMMAND_QUEUE_DEPTH);
        let (event_tx, event_rx) = crossbeam_channel::bounded(EVENT_QUEUE_DEPTH);
        let position_ns = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = DecodeWorker {
            path: path.to_path_buf(),
            meta: meta.clone(),
            options,
            commands: command_rx,
            events: event_tx.clone(),
            position_ns: position_ns.clone(),
            shutdown: shutdown.clone(),
            state: PipelineState::Paused,
            range: PlayRange::default(),
            source: None,
            parked: None,
            last_emitted: None,
            ended: false,
            step_budget: 0,
            clock: None,
            generation: 0,
            shared_device: None,
            shared_queue: None,
            uploader: None,
        };

        let thread = std::thread::Builder::new()
            .name("spanmark-decode".into())
            .spawn(move || {
                let events = worker.events.clone();
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| worker.run())) {
                    Ok(()) => {}
                    Err(e) => {
                        let msg = if let Some(s) = e.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = e.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "unknown panic".into()
                        };
                        log::error!("Decode thread panicked: {msg}");
                        let _ = events.try_send(PipelineEvent::Error(PipelineError::Decode(msg)));
                    }
                }
            })
            .map_err(|e| PipelineError::Spawn(format!("failed to spawn decode thread: {e}")))?;

        Ok((
            Self {
                meta,
                options,
                state: PipelineState::Null,
                command_tx,
                startup_events: Some(event_tx),
                position_ns,
                shutdown,
                thread: Some(thread),
            },
            event_rx,
        ))
    }

    fn send(&self, command: WorkerCommand) -> Result<(), PipelineError> {
        self.command_tx.try_send(command).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => {
                PipelineError::Rejected("decode command queue is full".into())
            }
            crossbeam_channel::TrySendError::Disconnected(_) => PipelineError::Disconnected,
        })
    }

    fn stop_worker(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.try_send(WorkerCommand::State(PipelineState::Null));
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            log::debug!("Decode worker stopped");
        }
    }
}

impl DecodePipeline for FfmpegPipeline {
    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        if state == self.state {
            return Ok(());
        }
        if state == PipelineState::Null {
            self.stop_worker();
            self.state = state;
            return Ok(());
        }
        if self.thread.is_none() {
            return Err(PipelineError::Disconnected);
        }

        if let Some(events) = self.startup_events.take() {
            for kind in self.required_contexts() {
                let _ = events.try_send(PipelineEvent::NeedContext(*kind));
            }
        }
        self.send(WorkerCommand::State(state))?;
        self.state = state;
        Ok(())
    }

    fn query_duration(&self) -> Option<Duration> {
        (self.meta.duration_secs > 0.0).then(|| Duration::from_secs_f64(self.meta.duration_secs))
    }

    fn query_position(&self) -> Option<Duration> {
        if self.thread.is_none() {
            return None;
        }
        Some(Duration::from_nanos(self.position_ns.load(Ordering::Relaxed)))
    }

    fn seek(&mut self, request: SeekRequest) -> Result<(), PipelineError> {
        let range = PlayRange::from(request);
        self.send(WorkerCommand::Seek(request))?;
        // Report the target right away, as a flushing seek does.
        let position = range.entry_point(self.query_duration().unwrap_or(Duration::ZERO));
        self.position_ns
            .store(position.as_nanos() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn step(&mut self, frames: u32) -> Result<(), PipelineError> {
        self.send(WorkerCommand::Step(frames))
    }

    fn required_contexts(&self) -> &[ContextKind] {
        if self.options.gpu_upload {
            &GPU_CONTEXTS
        } else {
            &[]
        }
    }

    fn set_context(&mut self, context: SharedContext) -> Result<(), PipelineError> {
        if !self.options.gpu_upload {
            return Err(PipelineError::Rejected(format!(
                "host-memory pipeline does not use a {:?} context",
                context.kind()
            )));
        }
        self.send(WorkerCommand::Context(context))
    }

    fn frame_memory(&self) -> FrameMemory {
        if self.options.gpu_upload {
            FrameMemory::Gpu
        } else {
            FrameMemory::Host
        }
    }
}

impl Drop for FfmpegPipeline {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// The span the worker is currently playing.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PlayRange {
    direction: Direction,
    start: Duration,
    stop: Option<Duration>,
}

impl Default for PlayRange {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            start: Duration::ZERO,
            stop: None,
        }
    }
}

impl From<SeekRequest> for PlayRange {
    fn from(request: SeekRequest) -> Self {
        match request {
            SeekRequest::To(target) => Self {
                direction: Direction::Forward,
                start: target,
                stop: None,
            },
            SeekRequest::Range {
                direction,
                start,
                stop,
            } => Self {
                direction,
                start,
                stop,
            },
        }
    }
}

impl PlayRange {
    /// Where playback of this range begins.
    fn entry_point(&self, duration: Duration) -> Duration {
        match self.direction {
            Direction::Forward => self.start,
            Direction::Reverse => self.stop.unwrap_or(duration),
        }
    }
}

struct RawFrame {
    pts: Duration,
    data: Vec<u8>,
}

fn frame_pts(start: Duration, interval: Duration, index: u32) -> Duration {
    start + interval * index
}

fn is_repeat(last: Option<Duration>, pts: Duration, interval: Duration) -> bool {
    last.is_some_and(|last| last.abs_diff(pts) < interval / 2)
}

/// Next chunk `[from, from + len)` to decode when walking backwards from
/// `chunk_end` towards `floor`. Frames within half an interval of `chunk_end`
/// are excluded so the frame at `chunk_end` itself is not shown twice.
fn plan_reverse_chunk(
    chunk_end: Duration,
    floor: Duration,
    chunk: Duration,
    interval: Duration,
) -> Option<(Duration, Duration)> {
    if chunk_end <= floor {
        return None;
    }
    let from = chunk_end.saturating_sub(chunk.max(interval)).max(floor);
    let len = (chunk_end - from).saturating_sub(interval / 2);
    Some((from, len))
}

fn spawn_ffmpeg(
    path: &Path,
    meta: &VideoMeta,
    start: Duration,
    length: Option<Duration>,
) -> Result<(Child, ChildStdout), PipelineError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "quiet", "-nostdin"]);
    if !start.is_zero() {
        cmd.args(["-ss", &format!("{:.6}", start.as_secs_f64())]);
    }
    cmd.arg("-i").arg(path);
    if let Some(length) = length {
        cmd.args(["-t", &format!("{:.6}", length.as_secs_f64())]);
    }
    cmd.args([
        "-an", "-sn",
        "-r", &format!("{}", meta.fps),
        "-f", "rawvideo",
        "-pix_fmt", "rgba",
        "-s", &format!("{}x{}", meta.width, meta.height),
        "pipe:1",
    ]);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| PipelineError::Spawn(format!("failed to spawn ffmpeg: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PipelineError::Spawn("ffmpeg: no stdout pipe".into()))?;
    Ok((child, stdout))
}

/// Reads one frame; `Ok(None)` on a clean end of output.
fn read_frame(stdout: &mut ChildStdout, frame_size: usize) -> Result<Option<Vec<u8>>, PipelineError> {
    let mut data = vec![0u8; frame_size];
    match stdout.read_exact(&mut data) {
        Ok(()) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(PipelineError::Decode(format!("failed to read frame: {e}"))),
    }
}

struct ForwardSource {
    child: Child,
    stdout: ChildStdout,
    start: Duration,
    stop: Option<Duration>,
    interval: Duration,
    frame_size: usize,
    index: u32,
}

impl ForwardSource {
    fn open(path: &Path, meta: &VideoMeta, start: Duration, stop: Option<Duration>) -> Result<Self, PipelineError> {
        let (child, stdout) = spawn_ffmpeg(path, meta, start, None)?;
        Ok(Self {
            child,
            stdout,
            start,
            stop,
            interval: meta.frame_interval(),
            frame_size: meta.frame_size(),
            index: 0,
        })
    }

    fn next(&mut self) -> Result<Option<RawFrame>, PipelineError> {
        let pts = frame_pts(self.start, self.interval, self.index);
        if self.stop.is_some_and(|stop| pts >= stop) {
            return Ok(None);
        }
        match read_frame(&mut self.stdout, self.frame_size)? {
            Some(data) => {
                self.index += 1;
                Ok(Some(RawFrame { pts, data }))
            }
            None => {
                let status = self.child.wait().ok();
                if self.index == 0 && status.is_some_and(|s| !s.success()) {
                    return Err(PipelineError::Decode(format!(
                        "ffmpeg produced no frames from {:.3}s",
                        self.start.as_secs_f64()
                    )));
                }
                Ok(None)
            }
        }
    }
}

impl Drop for ForwardSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct ReverseSource {
    path: PathBuf,
    meta: VideoMeta,
    floor: Duration,
    chunk_end: Duration,
    chunk: Duration,
    /// Ascending by pts; popped from the back.
    pending: Vec<RawFrame>,
}

impl ReverseSource {
    fn next(&mut self) -> Result<Option<RawFrame>, PipelineError> {
        loop {
            if let Some(frame) = self.pending.pop() {
                return Ok(Some(frame));
            }
            let Some((from, len)) =
                plan_reverse_chunk(self.chunk_end, self.floor, self.chunk, self.meta.frame_interval())
            else {
                return Ok(None);
            };
            self.pending = decode_segment(&self.path, &self.meta, from, len)?;
            self.chunk_end = from;
        }
    }
}

fn decode_segment(
    path: &Path,
    meta: &VideoMeta,
    from: Duration,
    len: Duration,
) -> Result<Vec<RawFrame>, PipelineError> {
    if len.is_zero() {
        return Ok(Vec::new());
    }
    let (mut child, mut stdout) = spawn_ffmpeg(path, meta, from, Some(len))?;
    let interval = meta.frame_interval();
    let mut frames = Vec::new();
    let result = loop {
        match read_frame(&mut stdout, meta.frame_size()) {
            Ok(Some(data)) => {
                let pts = frame_pts(from, interval, frames.len() as u32);
                frames.push(RawFrame { pts, data });
            }
            Ok(None) => break Ok(frames),
            Err(e) => break Err(e),
        }
    };
    let _ = child.kill();
    let _ = child.wait();
    log::debug!(
        "Decoded reverse chunk at {:.3}s (+{:.3}s)",
        from.as_secs_f64(),
        len.as_secs_f64()
    );
    result
}

enum FrameSource {
    Forward(ForwardSource),
    Reverse(ReverseSource),
}

impl FrameSource {
    fn open(path: &Path, meta: &VideoMeta, range: &PlayRange, chunk: Duration) -> Result<Self, PipelineError> {
        match range.direction {
            Direction::Forward => Ok(FrameSource::Forward(ForwardSource::open(
                path,
                meta,
                range.start,
                range.stop,
            )?)),
            Direction::Reverse => Ok(FrameSource::Reverse(ReverseSource {
                path: path.to_path_buf(),
                meta: meta.clone(),
                floor: range.start,
                chunk_end: range
                    .stop
                    .unwrap_or_else(|| Duration::from_secs_f64(meta.duration_secs.max(0.0))),
                chunk,
                pending: Vec::new(),
            })),
        }
    }

    fn next(&mut self) -> Result<Option<RawFrame>, PipelineError> {
        match self {
            FrameSource::Forward(source) => source.next(),
            FrameSource::Reverse(source) => source.next(),
        }
    }
}

/// Writes frames into a small pool of reusable textures.
struct GpuUploader {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pool: Vec<GpuSurface>,
    width: u32,
    height: u32,
}

impl GpuUploader {
    fn upload(&mut self, data: &[u8]) -> GpuSurface {
        let surface = match self.pool.iter().find(|s| !s.in_use()) {
            Some(free) => free.clone(),
            None => {
                let surface = GpuSurface::new(self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("decoded-frame"),
                    size: wgpu::Extent3d {
                        width: self.width,
                        height: self.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: FRAME_TEXTURE_FORMAT,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                }));
                // Ring plus a few frames in flight; anything beyond is one-off.
                if self.pool.len() < FRAME_RING_CAPACITY + EVENT_QUEUE_DEPTH {
                    self.pool.push(surface.clone());
                }
                surface
            }
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: surface.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        surface
    }
}

struct DecodeWorker {
    path: PathBuf,
    meta: VideoMeta,
    options: PipelineOptions,
    commands: Receiver<WorkerCommand>,
    events: Sender<PipelineEvent>,
    position_ns: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    state: PipelineState,
    range: PlayRange,
    source: Option<FrameSource>,
    /// Frame decoded but not yet shown when playback was interrupted.
    parked: Option<RawFrame>,
    last_emitted: Option<Duration>,
    /// End of the current range was reported; wait for a new seek.
    ended: bool,
    step_budget: u32,
    /// Wall-clock anchor for pacing: (when, pts shown then).
    clock: Option<(Instant, Duration)>,
    generation: u64,
    shared_device: Option<wgpu::Device>,
    shared_queue: Option<wgpu::Queue>,
    uploader: Option<GpuUploader>,
}

impl DecodeWorker {
    fn run(mut self) {
        log::debug!("Decode worker started for {}", self.path.display());
        while !self.shutdown.load(Ordering::Relaxed) {
            if self.is_idle() {
                match self.commands.recv() {
                    Ok(command) => {
                        if !self.apply(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
                continue;
            }

            if !self.drain_commands() {
                break;
            }
            if self.is_idle() {
                continue;
            }

            match self.next_frame() {
                Ok(Some(frame)) => {
                    // A range restarted at the shown frame decodes it again first.
                    if is_repeat(self.last_emitted, frame.pts, self.meta.frame_interval()) {
                        continue;
                    }
                    if self.step_budget > 0 {
                        self.step_budget -= 1;
                        self.clock = Some((Instant::now(), frame.pts));
                    } else if !self.wait_until_due(frame.pts) {
                        if !self.shutdown.load(Ordering::Relaxed) && self.source.is_some() {
                            self.parked = Some(frame);
                        }
                        continue;
                    }
                    self.emit(frame);
                }
                Ok(None) => {
                    self.ended = true;
                    self.source = None;
                    log::debug!("Decode range exhausted ({:?})", self.range.direction);
                    self.send_event(PipelineEvent::EndOfStream);
                }
                Err(e) => {
                    log::warn!("Decode failed: {e}");
                    self.ended = true;
                    self.source = None;
                    self.send_event(PipelineEvent::Error(e));
                }
            }
        }
        self.source = None;
        log::debug!("Decode worker exiting");
    }

    fn is_idle(&self) -> bool {
        if self.ended {
            return true;
        }
        if self.options.gpu_upload && self.uploader.is_none() {
            return true;
        }
        self.state != PipelineState::Playing && self.step_budget == 0
    }

    /// Apply queued commands without blocking. Returns false on shutdown.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if !self.apply(command) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn apply(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::State(PipelineState::Null) => return false,
            WorkerCommand::State(state) => {
                if state != PipelineState::Playing {
                    self.clock = None;
                }
                self.state = state;
            }
            WorkerCommand::Seek(request) => {
                // An explicit jump always shows its target, even if it is on screen.
                if matches!(request, SeekRequest::To(_)) {
                    self.last_emitted = None;
                }
                self.range = PlayRange::from(request);
                self.generation += 1;
                self.source = None;
                self.parked = None;
                self.ended = false;
                self.step_budget = 0;
                self.clock = None;
                log::debug!("Worker seek: {:?}", self.range);
            }
            WorkerCommand::Step(frames) => {
                if !self.ended {
                    self.step_budget = self.step_budget.saturating_add(frames);
                }
            }
            WorkerCommand::Context(context) => {
                match context {
                    SharedContext::Device(device) => self.shared_device = Some(device),
                    SharedContext::Queue(queue) => self.shared_queue = Some(queue),
                }
                if let (Some(device), Some(queue)) = (&self.shared_device, &self.shared_queue) {
                    self.uploader = Some(GpuUploader {
                        device: device.clone(),
                        queue: queue.clone(),
                        pool: Vec::new(),
                        width: self.meta.width,
                        height: self.meta.height,
                    });
                    log::info!("Decode worker uploading frames on the GPU");
                }
            }
        }
        true
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, PipelineError> {
        if let Some(frame) = self.parked.take() {
            return Ok(Some(frame));
        }
        if self.source.is_none() {
            self.source = Some(FrameSource::open(
                &self.path,
                &self.meta,
                &self.range,
                self.options.reverse_chunk,
            )?);
        }
        match self.source.as_mut() {
            Some(source) => source.next(),
            None => Ok(None),
        }
    }

    /// Sleep until `pts` is due, still serving commands. Returns false if a
    /// command (seek, pause, shutdown) means the frame should not be shown now.
    fn wait_until_due(&mut self, pts: Duration) -> bool {
        let Some((anchor_at, anchor_pts)) = self.clock else {
            self.clock = Some((Instant::now(), pts));
            return true;
        };
        let offset = if pts >= anchor_pts {
            pts - anchor_pts
        } else {
            anchor_pts - pts
        };
        let due = anchor_at + offset;
        let generation = self.generation;

        loop {
            let now = Instant::now();
            if now >= due {
                if now - due > MAX_LATENESS {
                    self.clock = Some((now, pts));
                }
                return true;
            }
            match self.commands.recv_timeout(due - now) {
                Ok(command) => {
                    if !self.apply(command) {
                        self.shutdown.store(true, Ordering::Relaxed);
                        return false;
                    }
                    if self.generation != generation || self.state != PipelineState::Playing {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return true,
                Err(RecvTimeoutError::Disconnected) => {
                    self.shutdown.store(true, Ordering::Relaxed);
                    return false;
                }
            }
        }
    }

    fn emit(&mut self, frame: RawFrame) {
        self.last_emitted = Some(frame.pts);
        self.position_ns
            .store(frame.pts.as_nanos() as u64, Ordering::Relaxed);
        let pixels = match self.uploader.as_mut() {
            Some(uploader) => FramePixels::Gpu(uploader.upload(&frame.data)),
            None => FramePixels::Host(frame.data),
        };
        let decoded = DecodedFrame::new(self.meta.width, self.meta.height, frame.pts, pixels);
        self.send_event(PipelineEvent::Frame(decoded));
    }

    fn send_event(&self, mut event: PipelineEvent) {
        loop {
            match self.events.send_timeout(event, SEND_POLL) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    event = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}
