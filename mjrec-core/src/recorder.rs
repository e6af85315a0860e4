//! Public recorder handle.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{RecorderConfig, RecorderOptions};
use crate::driver::{CaptureDriver, Command, RecorderStats};
use crate::error::RecorderError;
use crate::events::{EventKind, EventStream, subscription};
use crate::mime::MimeType;
use crate::source::{Capabilities, FrameEncoder, FrameSource};
use crate::state::RecordingState;

const COMMAND_QUEUE: usize = 64;

/// Records a live video feed as a sequence of independently encoded
/// still images.
///
/// Lifecycle calls return as soon as the command is queued. Their outcome,
/// including "wrong state" failures, is reported through events; the
/// `Err` side of these methods only signals that the driver is gone.
///
/// ```no_run
/// # use mjrec_core::{EventKind, PatternSource, Recorder, RecorderEvent, ZstdFrameEncoder};
/// # use std::time::Duration;
/// # async fn demo() -> Result<(), mjrec_core::RecorderError> {
/// let recorder = Recorder::new(PatternSource::new(320, 240, 30.0), ZstdFrameEncoder::new())?;
/// let mut events = recorder.subscribe(&[EventKind::DataAvailable]).await?;
/// recorder.start(Some(Duration::from_millis(100))).await?;
/// while let Some(RecorderEvent::DataAvailable(blob)) = events.recv().await {
///     println!("frame {} ({} bytes)", blob.sequence, blob.data.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Recorder {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<RecordingState>,
    config: RecorderConfig,
    task: JoinHandle<()>,
}

impl Recorder {
    /// Recorder with default options.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S, E>(source: S, encoder: E) -> Result<Self, RecorderError>
    where
        S: FrameSource,
        E: FrameEncoder,
    {
        Self::with_options(source, encoder, &RecorderOptions::default())
    }

    /// Validate `options` and spawn the capture driver.
    ///
    /// Fails with [`RecorderError::UnsupportedMimeType`] or
    /// [`RecorderError::InvalidConfig`] before anything is spawned.
    pub fn with_options<S, E>(
        source: S,
        encoder: E,
        options: &RecorderOptions,
    ) -> Result<Self, RecorderError>
    where
        S: FrameSource,
        E: FrameEncoder,
    {
        let config = RecorderConfig::from_options(options)?;
        Ok(Self::with_config(source, encoder, config))
    }

    pub fn with_config<S, E>(source: S, encoder: E, config: RecorderConfig) -> Self
    where
        S: FrameSource,
        E: FrameEncoder,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state_rx) = watch::channel(RecordingState::Inactive);
        let driver = CaptureDriver::new(config.clone(), source, encoder, cmd_rx, state_tx);
        debug!(mime_type = %config.mime_type, target_bps = config.target_bps, "spawning capture driver");
        let task = tokio::spawn(driver.run());

        Self {
            commands: cmd_tx,
            state: state_rx,
            config,
            task,
        }
    }

    /// Whether `mime_type` can be recorded.
    pub fn is_type_supported(mime_type: &str) -> bool {
        MimeType::is_type_supported(mime_type)
    }

    /// Whether recording is impossible in the environment described by
    /// `capabilities`.
    pub fn not_supported(capabilities: &Capabilities) -> bool {
        capabilities.not_supported()
    }

    /// State as of the last command the driver processed.
    pub fn state(&self) -> RecordingState {
        *self.state.borrow()
    }

    /// Resolve once the driver reaches `target`.
    pub async fn wait_for_state(&self, target: RecordingState) -> Result<(), RecorderError> {
        let mut rx = self.state.clone();
        rx.wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| RecorderError::ChannelClosed)
    }

    pub fn mime_type(&self) -> MimeType {
        self.config.mime_type
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Listen for `kinds`. The stream ends when the recorder shuts down.
    pub async fn subscribe(&self, kinds: &[EventKind]) -> Result<EventStream, RecorderError> {
        let (sub, stream) = subscription(kinds);
        self.send(Command::Subscribe(sub)).await?;
        Ok(stream)
    }

    /// Listen for every event kind.
    pub async fn subscribe_all(&self) -> Result<EventStream, RecorderError> {
        self.subscribe(&EventKind::ALL).await
    }

    /// Begin recording. With a non-zero `timeslice`, frames are captured
    /// every `max(timeslice, frame interval)`; otherwise only on
    /// [`request_data`](Self::request_data).
    pub async fn start(&self, timeslice: Option<Duration>) -> Result<(), RecorderError> {
        self.send(Command::Start { timeslice }).await
    }

    /// Capture one final frame, then stop.
    pub async fn stop(&self) -> Result<(), RecorderError> {
        self.send(Command::Stop).await
    }

    pub async fn pause(&self) -> Result<(), RecorderError> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<(), RecorderError> {
        self.send(Command::Resume).await
    }

    /// Capture one frame now. Allowed while recording or paused.
    pub async fn request_data(&self) -> Result<(), RecorderError> {
        self.send(Command::RequestData).await
    }

    pub async fn stats(&self) -> Result<RecorderStats, RecorderError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats(tx)).await?;
        rx.await.map_err(|_| RecorderError::ChannelClosed)
    }

    /// Drop the handle and wait for the driver to finish any outstanding
    /// cycle. Subscribers see their streams end afterwards.
    pub async fn shutdown(self) -> Result<(), RecorderError> {
        let Self { commands, task, .. } = self;
        drop(commands);
        task.await
            .map_err(|e| RecorderError::Other(format!("capture driver panicked: {e}")))
    }

    async fn send(&self, cmd: Command) -> Result<(), RecorderError> {
        self.commands.send(cmd).await?;
        Ok(())
    }
}
