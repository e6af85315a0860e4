//! Capture cycle driver.
//!
//! One tokio task owns all recorder state and serializes everything that
//! touches it:
//!
//! 1. Commands from the [`Recorder`](crate::Recorder) handle (lifecycle
//!    calls, manual cycles, subscriptions).
//! 2. Periodic ticks while recording.
//! 3. Completion of the single in-flight encode.
//!
//! A cycle draws the current frame synchronously, then parks its encode
//! future in the in-flight slot. While the slot is occupied, further ticks
//! and manual requests are dropped rather than queued. When the encode
//! settles the blob goes through the [`AdmissionController`] and the
//! outcome is published on the [`EventBus`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::admission::{AdmissionController, Candidate, Decision, Fingerprint};
use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::events::{BlobEvent, ErrorEvent, EventBus, EventKind, RecorderEvent, Subscriber};
use crate::source::{FrameEncoder, FrameSource, RasterFrame};
use crate::state::{Operation, RecordingState};

type EncodeResult = Result<Option<Bytes>, RecorderError>;

// ── Commands ─────────────────────────────────────────────────────

/// Requests sent from the handle to the driver task.
pub(crate) enum Command {
    Subscribe(Subscriber),
    Start { timeslice: Option<Duration> },
    Stop,
    Pause,
    Resume,
    RequestData,
    Stats(oneshot::Sender<RecorderStats>),
}

/// Counters and live parameters of a running recorder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecorderStats {
    pub state: RecordingState,
    /// Frames emitted since construction.
    pub admitted: u64,
    /// Frames suppressed (rate or duplicate) since construction.
    pub suppressed: u64,
    /// Samples currently in the bitrate window.
    pub history_len: usize,
    /// Quality frames are encoded at.
    pub quality: f32,
    /// Whether an encode is outstanding.
    pub cycle_in_flight: bool,
    /// Live `dataavailable` subscribers.
    pub data_subscribers: usize,
}

// ── In-flight cycle ──────────────────────────────────────────────

struct InFlightCycle {
    operation: Operation,
    /// Handed to the duplicate filter for its low-fidelity re-encode.
    frame: Arc<RasterFrame>,
    started: Instant,
    encode: BoxFuture<'static, EncodeResult>,
}

// ── CaptureDriver ────────────────────────────────────────────────

pub(crate) struct CaptureDriver<S, E> {
    config: RecorderConfig,
    source: S,
    encoder: Arc<E>,
    controller: AdmissionController,
    bus: EventBus,
    state: RecordingState,
    state_tx: watch::Sender<RecordingState>,
    commands: mpsc::Receiver<Command>,
    ticker: Option<Interval>,
    in_flight: Option<InFlightCycle>,
    /// `stop` was accepted while a cycle was outstanding; emit `stop` once
    /// it settles.
    stopping: bool,
    /// Origin of the millisecond clock fed to the admission controller.
    epoch: Instant,
    recording_since: Option<Instant>,
    sequence: u64,
}

impl<S, E> CaptureDriver<S, E>
where
    S: FrameSource,
    E: FrameEncoder,
{
    pub(crate) fn new(
        config: RecorderConfig,
        source: S,
        encoder: E,
        commands: mpsc::Receiver<Command>,
        state_tx: watch::Sender<RecordingState>,
    ) -> Self {
        Self {
            controller: config.admission_controller(),
            config,
            source,
            encoder: Arc::new(encoder),
            bus: EventBus::new(),
            state: RecordingState::Inactive,
            state_tx,
            commands,
            ticker: None,
            in_flight: None,
            stopping: false,
            epoch: Instant::now(),
            recording_since: None,
            sequence: 0,
        }
    }

    /// Run until every handle has been dropped.
    pub(crate) async fn run(mut self) {
        loop {
            // Completions first, so a command always observes every cycle
            // that had already finished.
            tokio::select! {
                biased;

                Some((cycle, result)) = settle(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.complete(cycle, result);
                }
                _ = next_tick(&mut self.ticker), if self.ticker.is_some() => self.on_tick(),
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
            }
        }

        // Let an outstanding cycle deliver its frame before exiting.
        self.drain().await;
        debug!("capture driver exited");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Subscribe(sub) => self.bus.add(sub),
            Command::Start { timeslice } => self.start(timeslice).await,
            Command::Stop => self.stop(),
            Command::Pause => {
                self.transition(Operation::Pause, RecordingState::pause, RecorderEvent::Pause)
            }
            Command::Resume => {
                self.transition(Operation::Resume, RecordingState::resume, RecorderEvent::Resume)
            }
            Command::RequestData => self.request_data(),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    async fn start(&mut self, timeslice: Option<Duration>) {
        // A previous session's final cycle must finish (and emit `stop`)
        // before the new session's `start`.
        if self.stopping {
            self.drain().await;
        }

        let mut next = self.state;
        if let Err(e) = next.start() {
            return self.fail(Operation::Start, e);
        }
        let geometry = match self.source.geometry() {
            Ok(g) => g,
            Err(e) => {
                warn!("cannot start: {e}");
                return self.fail(Operation::Start, e);
            }
        };

        self.state = next;
        self.controller.reset();
        self.sequence = 0;
        self.recording_since = Some(Instant::now());
        self.publish_state();

        info!(
            width = geometry.width,
            height = geometry.height,
            frame_rate = geometry.frame_rate,
            target_bps = self.config.target_bps,
            "recording started"
        );
        self.bus.dispatch(RecorderEvent::Start);

        if let Some(slice) = timeslice.filter(|d| !d.is_zero()) {
            let period = slice.max(geometry.frame_interval());
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(?period, "periodic capture enabled");
            self.ticker = Some(ticker);
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.state.stop() {
            return self.fail(Operation::Stop, e);
        }
        self.ticker = None;
        self.publish_state();

        // The outstanding cycle, if any, doubles as the final one.
        if self.in_flight.is_none() {
            self.begin_cycle(Operation::Stop);
        }
        if self.in_flight.is_some() {
            self.stopping = true;
        } else {
            self.finish_stop();
        }
    }

    fn finish_stop(&mut self) {
        self.controller.reset();
        self.recording_since = None;
        info!(
            admitted = self.controller.admitted_count(),
            suppressed = self.controller.suppressed_count(),
            "recording stopped"
        );
        self.bus.dispatch(RecorderEvent::Stop);
    }

    fn transition(
        &mut self,
        operation: Operation,
        apply: fn(&mut RecordingState) -> Result<(), RecorderError>,
        event: RecorderEvent,
    ) {
        match apply(&mut self.state) {
            Ok(()) => {
                self.publish_state();
                debug!(state = %self.state, "{operation}");
                self.bus.dispatch(event);
            }
            Err(e) => self.fail(operation, e),
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.state);
    }

    fn fail(&mut self, operation: Operation, error: RecorderError) {
        if error.is_invalid_state() {
            debug!(state = %self.state, "{error}");
        }
        self.bus.dispatch(RecorderEvent::Error(ErrorEvent::new(operation, error)));
    }

    fn stats(&self) -> RecorderStats {
        RecorderStats {
            state: self.state,
            admitted: self.controller.admitted_count(),
            suppressed: self.controller.suppressed_count(),
            history_len: self.controller.history().len(),
            quality: self.config.quality.current,
            cycle_in_flight: self.in_flight.is_some(),
            data_subscribers: self.bus.subscriber_count(EventKind::DataAvailable),
        }
    }

    // ── Capture cycles ───────────────────────────────────────────

    fn request_data(&mut self) {
        if let Err(e) = self.state.check_request_data() {
            return self.fail(Operation::RequestData, e);
        }
        self.begin_cycle(Operation::RequestData);
    }

    fn on_tick(&mut self) {
        if self.state.is_recording() {
            self.begin_cycle(Operation::Tick);
        }
    }

    fn begin_cycle(&mut self, operation: Operation) {
        if !self.bus.has_subscribers(EventKind::DataAvailable) {
            trace!(%operation, "no dataavailable subscribers; skipping cycle");
            return;
        }
        if self.in_flight.is_some() {
            trace!(%operation, "cycle already in flight; dropping");
            return;
        }

        let frame = match self.source.draw() {
            Ok(f) => Arc::new(f),
            Err(e) => {
                warn!(%operation, "draw failed: {e}");
                return self.fail(operation, e);
            }
        };

        let encoder = Arc::clone(&self.encoder);
        let mime_type = self.config.mime_type;
        let quality = self.config.quality.current;
        let encode = {
            let frame = Arc::clone(&frame);
            async move { encoder.encode(&frame, mime_type, quality).await }.boxed()
        };

        self.in_flight = Some(InFlightCycle {
            operation,
            frame,
            started: Instant::now(),
            encode,
        });
    }

    fn complete(&mut self, cycle: InFlightCycle, result: EncodeResult) {
        trace!(operation = %cycle.operation, elapsed = ?cycle.started.elapsed(), "encode settled");
        match result {
            Ok(Some(payload)) => self.admit(&cycle, payload),
            Ok(None) => debug!(operation = %cycle.operation, "encoder produced no output"),
            Err(e) => {
                warn!(operation = %cycle.operation, "encode failed: {e}");
                self.fail(cycle.operation, e);
            }
        }

        if self.stopping {
            self.stopping = false;
            self.finish_stop();
        }
    }

    fn admit(&mut self, cycle: &InFlightCycle, payload: Bytes) {
        let candidate = Candidate::new(self.now_ms(), payload).with_frame(Arc::clone(&cycle.frame));
        let encoder = &self.encoder;
        let mime_type = self.config.mime_type;
        let min_quality = self.config.quality.min;
        let decision = self.controller.admit(&candidate, |frame| {
            encoder
                .fingerprint(frame, mime_type, min_quality)
                .map(|low| Fingerprint::of(&low))
        });

        match decision {
            Decision::Admitted { estimate } => {
                let blob = BlobEvent {
                    data: candidate.payload,
                    mime_type,
                    sequence: self.sequence,
                    timecode: self
                        .recording_since
                        .map(|since| since.elapsed())
                        .unwrap_or_default(),
                    bits_per_second: estimate.bits_per_second(),
                };
                trace!(sequence = blob.sequence, size = blob.data.len(), "frame admitted");
                self.sequence += 1;
                self.bus.dispatch(RecorderEvent::DataAvailable(blob));
            }
            Decision::Suppressed(reason) => trace!(?reason, "frame suppressed"),
            Decision::Empty => trace!("empty frame dropped"),
        }
    }

    async fn drain(&mut self) {
        if let Some((cycle, result)) = settle(&mut self.in_flight).await {
            self.complete(cycle, result);
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

// ── Select helpers ───────────────────────────────────────────────

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Await the in-flight encode and vacate the slot. Cancel-safe: if the
/// returned future is dropped early the encode stays in the slot.
async fn settle(slot: &mut Option<InFlightCycle>) -> Option<(InFlightCycle, EncodeResult)> {
    let result = (&mut slot.as_mut()?.encode).await;
    slot.take().map(|cycle| (cycle, result))
}
