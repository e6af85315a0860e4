//! Recording session core logic.
//!
//! Drives one recorder over the synthetic source for the configured
//! duration and persists every emitted frame. Stops early when the stop
//! handle is cleared (Ctrl-C).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use mjrec_core::{BlobEvent, Operation, Recorder, RecorderEvent, ZstdFrameEncoder};

use crate::config::MjrecConfig;

/// Name of the per-session frame index inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.jsonl";

/// One line of `manifest.jsonl`.
#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    sequence: u64,
    timecode_ms: u64,
    size_bytes: usize,
    mime_type: &'a str,
    bits_per_second: Option<f64>,
    file: &'a str,
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionSummary {
    pub frames: u64,
    pub bytes: u64,
    pub suppressed: u64,
    pub errors: u64,
}

/// Scheduled pause/resume, driven from the session loop.
#[derive(Debug, Clone, Copy)]
enum PauseStep {
    Pause(Instant),
    Resume(Instant),
    Done,
}

impl PauseStep {
    fn at(&self) -> Option<Instant> {
        match *self {
            PauseStep::Pause(at) | PauseStep::Resume(at) => Some(at),
            PauseStep::Done => None,
        }
    }
}

// ── RecordingSession ─────────────────────────────────────────────

pub struct RecordingSession {
    config: MjrecConfig,
    running: Arc<AtomicBool>,
}

impl RecordingSession {
    pub fn new(config: MjrecConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that stops the session from another task when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Record until the duration elapses or the session is stopped.
    ///
    /// 1. Creates the output directory and a fresh manifest.
    /// 2. Starts the recorder with the configured timeslice.
    /// 3. Writes each `dataavailable` blob to `frame-<seq>.<ext>`.
    /// 4. Pauses and resumes on the configured schedule.
    /// 5. Stops the recorder, drains the trailing frame, and shuts down.
    pub async fn run(&self) -> Result<SessionSummary, Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);

        let out_dir = &self.config.output.directory;
        tokio::fs::create_dir_all(out_dir).await?;
        let mut manifest = File::create(manifest_path(out_dir)).await?;

        let recorder = Recorder::with_options(
            self.config.source.pattern(),
            ZstdFrameEncoder::new(),
            &self.config.recorder.to_options(),
        )?;
        let mut events = recorder.subscribe_all().await?;
        recorder.start(self.config.recorder.timeslice()).await?;

        let started = Instant::now();
        let deadline = self.config.output.duration().map(|d| started + d);
        let mut pause = match self.config.output.pause_window() {
            Some((after, _)) => PauseStep::Pause(started + after),
            None => PauseStep::Done,
        };
        let mut stopping = false;
        let mut summary = SessionSummary::default();

        loop {
            let pause_at = pause.at();
            tokio::select! {
                event = events.recv() => match event {
                    Some(RecorderEvent::DataAvailable(blob)) => {
                        self.write_frame(out_dir, &blob, &mut manifest).await?;
                        summary.frames += 1;
                        summary.bytes += blob.data.len() as u64;
                    }
                    Some(RecorderEvent::Error(e)) => {
                        warn!(operation = %e.operation, "{}", e.error);
                        summary.errors += 1;
                        // No `stop` event will follow either of these.
                        if matches!(e.operation, Operation::Start | Operation::Stop) {
                            break;
                        }
                    }
                    Some(RecorderEvent::Stop) | None => break,
                    Some(other) => debug!(kind = ?other.kind(), "recorder event"),
                },
                _ = sleep_until(deadline.unwrap_or(started)), if deadline.is_some() && !stopping => {
                    info!("duration reached");
                    recorder.stop().await?;
                    stopping = true;
                }
                _ = Self::wait_for_stop(&self.running), if !stopping => {
                    info!("stop requested");
                    recorder.stop().await?;
                    stopping = true;
                }
                _ = sleep_until(pause_at.unwrap_or(started)), if pause_at.is_some() && !stopping => {
                    pause = match pause {
                        PauseStep::Pause(at) => {
                            recorder.pause().await?;
                            let resume_after = self
                                .config
                                .output
                                .pause_window()
                                .map(|(_, len)| len)
                                .unwrap_or_default();
                            PauseStep::Resume(at + resume_after)
                        }
                        PauseStep::Resume(_) => {
                            recorder.resume().await?;
                            PauseStep::Done
                        }
                        PauseStep::Done => PauseStep::Done,
                    };
                }
            }
        }

        manifest.flush().await?;
        let stats = recorder.stats().await?;
        summary.suppressed = stats.suppressed;
        recorder.shutdown().await?;

        self.running.store(false, Ordering::SeqCst);
        info!(
            frames = summary.frames,
            bytes = summary.bytes,
            suppressed = summary.suppressed,
            errors = summary.errors,
            "recording session finished"
        );
        Ok(summary)
    }

    /// Signal the session to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn write_frame(
        &self,
        out_dir: &Path,
        blob: &BlobEvent,
        manifest: &mut File,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let name = frame_file_name(blob);
        tokio::fs::write(out_dir.join(&name), &blob.data).await?;

        let entry = ManifestEntry {
            sequence: blob.sequence,
            timecode_ms: blob.timecode.as_millis() as u64,
            size_bytes: blob.data.len(),
            mime_type: blob.mime_type.as_str(),
            bits_per_second: blob.bits_per_second,
            file: &name,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        manifest.write_all(line.as_bytes()).await?;
        debug!(sequence = blob.sequence, size = blob.data.len(), "wrote {name}");
        Ok(())
    }

    /// Resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

/// `frame-000042.jpg`
pub fn frame_file_name(blob: &BlobEvent) -> String {
    format!("frame-{:06}.{}", blob.sequence, blob.mime_type.extension())
}

/// Path of the manifest for an output directory.
pub fn manifest_path(out_dir: &Path) -> PathBuf {
    out_dir.join(MANIFEST_FILE)
}

// ── Tests ────────────────────────────────────────────────────────
