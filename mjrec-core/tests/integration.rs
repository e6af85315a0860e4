//! Integration tests: full recorder lifecycle driven through the public
//! handle, with scripted collaborators and paused tokio time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mjrec_core::{
    EventKind, EventStream, FrameEncoder, FrameGeometry, FrameSource, MimeType, Operation,
    PatternSource, RasterFrame, RateSpan, Recorder, RecorderError, RecorderEvent,
    RecorderOptions, RecordingState, ZstdFrameEncoder,
};
use tokio::sync::Semaphore;
use tokio::time::{advance, timeout};

// ── Helpers ──────────────────────────────────────────────────────

/// Encoder that emits blobs of pre-scripted sizes, then 100-byte blobs.
#[derive(Clone, Default)]
struct ScriptedEncoder {
    sizes: Arc<Mutex<VecDeque<usize>>>,
    calls: Arc<Mutex<u8>>,
}

impl ScriptedEncoder {
    fn with_sizes(sizes: &[usize]) -> Self {
        Self {
            sizes: Arc::new(Mutex::new(sizes.iter().copied().collect())),
            ..Default::default()
        }
    }
}

#[async_trait]
impl FrameEncoder for ScriptedEncoder {
    async fn encode(
        &self,
        _frame: &RasterFrame,
        _mime_type: MimeType,
        _quality: f32,
    ) -> Result<Option<Bytes>, RecorderError> {
        let size = self.sizes.lock().unwrap().pop_front().unwrap_or(100);
        let mut calls = self.calls.lock().unwrap();
        *calls = calls.wrapping_add(1);
        Ok(Some(Bytes::from(vec![*calls; size])))
    }

    fn fingerprint(
        &self,
        frame: &RasterFrame,
        _mime_type: MimeType,
        _quality: f32,
    ) -> Result<Vec<u8>, RecorderError> {
        Ok(frame.data.clone())
    }
}

/// Encoder whose every encode waits for a permit.
struct GatedEncoder {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl FrameEncoder for GatedEncoder {
    async fn encode(
        &self,
        _frame: &RasterFrame,
        _mime_type: MimeType,
        _quality: f32,
    ) -> Result<Option<Bytes>, RecorderError> {
        self.gate
            .acquire()
            .await
            .map_err(|e| RecorderError::Encode(e.to_string()))?
            .forget();
        Ok(Some(Bytes::from_static(b"gated frame")))
    }

    fn fingerprint(
        &self,
        _frame: &RasterFrame,
        _mime_type: MimeType,
        _quality: f32,
    ) -> Result<Vec<u8>, RecorderError> {
        Ok(Vec::new())
    }
}

struct FailingEncoder;

#[async_trait]
impl FrameEncoder for FailingEncoder {
    async fn encode(
        &self,
        _frame: &RasterFrame,
        _mime_type: MimeType,
        _quality: f32,
    ) -> Result<Option<Bytes>, RecorderError> {
        Err(RecorderError::Encode("scripted failure".into()))
    }

    fn fingerprint(
        &self,
        _frame: &RasterFrame,
        _mime_type: MimeType,
        _quality: f32,
    ) -> Result<Vec<u8>, RecorderError> {
        Err(RecorderError::Fingerprint("scripted failure".into()))
    }
}

/// Source that reports geometry but cannot draw.
struct BlankSource;

impl FrameSource for BlankSource {
    fn geometry(&self) -> Result<FrameGeometry, RecorderError> {
        Ok(FrameGeometry {
            width: 16,
            height: 16,
            frame_rate: 30.0,
        })
    }

    fn draw(&mut self) -> Result<RasterFrame, RecorderError> {
        Err(RecorderError::Draw("surface lost".into()))
    }
}

fn moving_source() -> PatternSource {
    PatternSource::new(32, 8, 10.0)
}

fn window_options() -> RecorderOptions {
    RecorderOptions {
        video_bits_per_second: Some(80_000.0),
        lookback_time: Some(1000.0),
        rate_span: RateSpan::Window,
        ..Default::default()
    }
}

/// Next event, failing the test if none arrives within a (virtual) minute.
async fn next_event(events: &mut EventStream) -> RecorderEvent {
    timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

async fn next_kind(events: &mut EventStream) -> EventKind {
    next_event(events).await.kind()
}

/// Wait until the driver has processed everything queued before this call.
async fn sync(recorder: &Recorder) -> mjrec_core::RecorderStats {
    recorder.stats().await.unwrap()
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_start_pause_resume_stop_events() {
    let recorder = Recorder::new(moving_source(), ScriptedEncoder::default()).unwrap();
    let mut events = recorder
        .subscribe(&[
            EventKind::Start,
            EventKind::Pause,
            EventKind::Resume,
            EventKind::Stop,
        ])
        .await
        .unwrap();
    assert_eq!(recorder.state(), RecordingState::Inactive);

    recorder.start(None).await.unwrap();
    assert_eq!(next_kind(&mut events).await, EventKind::Start);
    assert_eq!(recorder.state(), RecordingState::Recording);

    recorder.pause().await.unwrap();
    assert_eq!(next_kind(&mut events).await, EventKind::Pause);
    assert_eq!(recorder.state(), RecordingState::Paused);

    recorder.resume().await.unwrap();
    assert_eq!(next_kind(&mut events).await, EventKind::Resume);

    recorder.stop().await.unwrap();
    assert_eq!(next_kind(&mut events).await, EventKind::Stop);
    recorder.wait_for_state(RecordingState::Inactive).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wrong_state_calls_emit_errors() {
    let recorder = Recorder::new(moving_source(), ScriptedEncoder::default()).unwrap();
    let mut errors = recorder.subscribe(&[EventKind::Error]).await.unwrap();

    recorder.stop().await.unwrap();
    recorder.pause().await.unwrap();
    recorder.resume().await.unwrap();
    recorder.start(None).await.unwrap();
    recorder.start(None).await.unwrap();

    let mut failed = Vec::new();
    for _ in 0..4 {
        match next_event(&mut errors).await {
            RecorderEvent::Error(e) => {
                assert!(e.is_invalid_state());
                failed.push(e.operation);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(
        failed,
        vec![
            Operation::Stop,
            Operation::Pause,
            Operation::Resume,
            Operation::Start
        ]
    );
    assert_eq!(sync(&recorder).await.state, RecordingState::Recording);
}

#[tokio::test(start_paused = true)]
async fn test_request_data_while_inactive() {
    let recorder = Recorder::new(moving_source(), ScriptedEncoder::default()).unwrap();
    let mut events = recorder.subscribe_all().await.unwrap();

    recorder.request_data().await.unwrap();
    let stats = sync(&recorder).await;

    match events.try_recv() {
        Some(RecorderEvent::Error(e)) => {
            assert_eq!(e.operation, Operation::RequestData);
            assert_eq!(e.error.to_string(), "wrong state for requestData");
        }
        other => panic!("expected one error event, got {other:?}"),
    }
    assert!(events.try_recv().is_none());
    assert_eq!(stats.history_len, 0);
    assert_eq!(stats.admitted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_runs_one_final_cycle() {
    let recorder = Recorder::new(moving_source(), ScriptedEncoder::default()).unwrap();
    let mut events = recorder.subscribe_all().await.unwrap();

    recorder.start(None).await.unwrap();
    recorder.stop().await.unwrap();

    assert_eq!(next_kind(&mut events).await, EventKind::Start);
    match next_event(&mut events).await {
        RecorderEvent::DataAvailable(blob) => {
            assert_eq!(blob.sequence, 0);
            assert_eq!(blob.mime_type, MimeType::Jpeg);
            assert_eq!(blob.data.len(), 100);
        }
        other => panic!("expected trailing frame, got {other:?}"),
    }
    assert_eq!(next_kind(&mut events).await, EventKind::Stop);
    assert_eq!(recorder.state(), RecordingState::Inactive);

    let stats = sync(&recorder).await;
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.history_len, 0, "stop resets the window");
    assert!(events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_reuses_in_flight_cycle() {
    let gate = Arc::new(Semaphore::new(0));
    let encoder = GatedEncoder {
        gate: Arc::clone(&gate),
    };
    let recorder = Recorder::new(moving_source(), encoder).unwrap();
    let mut events = recorder.subscribe_all().await.unwrap();

    recorder.start(None).await.unwrap();
    recorder.request_data().await.unwrap();
    recorder.request_data().await.unwrap();
    recorder.stop().await.unwrap();
    let stats = sync(&recorder).await;
    assert!(stats.cycle_in_flight);
    assert_eq!(stats.state, RecordingState::Inactive);

    assert_eq!(next_kind(&mut events).await, EventKind::Start);
    assert!(events.try_recv().is_none(), "stop waits for the outstanding cycle");

    gate.add_permits(8);
    assert_eq!(next_kind(&mut events).await, EventKind::DataAvailable);
    assert_eq!(next_kind(&mut events).await, EventKind::Stop);
    assert!(events.try_recv().is_none());
    assert_eq!(sync(&recorder).await.admitted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop_waits_for_trailing_frame() {
    let gate = Arc::new(Semaphore::new(0));
    let encoder = GatedEncoder {
        gate: Arc::clone(&gate),
    };
    let recorder = Recorder::new(moving_source(), encoder).unwrap();
    let mut events = recorder.subscribe_all().await.unwrap();

    recorder.start(None).await.unwrap();
    recorder.stop().await.unwrap();
    gate.add_permits(1);
    recorder.start(None).await.unwrap();

    let kinds = [
        next_kind(&mut events).await,
        next_kind(&mut events).await,
        next_kind(&mut events).await,
        next_kind(&mut events).await,
    ];
    assert_eq!(
        kinds,
        [
            EventKind::Start,
            EventKind::DataAvailable,
            EventKind::Stop,
            EventKind::Start
        ]
    );
}

// ── Admission through the driver ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_bitrate_cap_suppresses_burst() {
    let encoder = ScriptedEncoder::with_sizes(&[2000, 2000, 2000, 20_000]);
    let recorder = Recorder::with_options(moving_source(), encoder, &window_options()).unwrap();
    let mut frames = recorder.subscribe(&[EventKind::DataAvailable]).await.unwrap();

    recorder.start(None).await.unwrap();

    let mut rates = Vec::new();
    for step in [0, 100, 100] {
        advance(Duration::from_millis(step)).await;
        recorder.request_data().await.unwrap();
        match next_event(&mut frames).await {
            RecorderEvent::DataAvailable(blob) => rates.push(blob.bits_per_second),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(rates, vec![None, Some(32_000.0), Some(48_000.0)]);

    advance(Duration::from_millis(50)).await;
    recorder.request_data().await.unwrap();
    let stats = sync(&recorder).await;
    assert!(!stats.cycle_in_flight);
    assert_eq!(stats.admitted, 3);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.history_len, 3);
    assert!(frames.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_default_options_cap_on_elapsed_span() {
    let encoder = ScriptedEncoder::with_sizes(&[1000, 1000, 20_000]);
    let recorder = Recorder::new(moving_source(), encoder).unwrap();
    let mut frames = recorder.subscribe(&[EventKind::DataAvailable]).await.unwrap();

    recorder.start(None).await.unwrap();

    let mut rates = Vec::new();
    for step in [0, 100] {
        advance(Duration::from_millis(step)).await;
        recorder.request_data().await.unwrap();
        match next_event(&mut frames).await {
            RecorderEvent::DataAvailable(blob) => rates.push(blob.bits_per_second),
            other => panic!("unexpected event {other:?}"),
        }
    }
    // 8000 * 2000 B / 100 ms
    assert_eq!(rates, vec![None, Some(160_000.0)]);

    // 8000 * 22000 B / 150 ms is far over the 250 kbit/s default.
    advance(Duration::from_millis(50)).await;
    recorder.request_data().await.unwrap();
    let stats = sync(&recorder).await;
    assert!(!stats.cycle_in_flight);
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.history_len, 2);
    assert_eq!(stats.quality, 0.7, "encode quality is fixed");
    assert!(frames.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_frames_pruned() {
    let options = RecorderOptions {
        prune_consecutive_equal_frames: true,
        ..Default::default()
    };
    let source = PatternSource::new(32, 8, 10.0).with_motion_every(0);
    let recorder = Recorder::with_options(source, ZstdFrameEncoder::new(), &options).unwrap();
    let mut frames = recorder.subscribe(&[EventKind::DataAvailable]).await.unwrap();

    recorder.start(None).await.unwrap();
    for _ in 0..3 {
        recorder.request_data().await.unwrap();
        sync(&recorder).await;
        advance(Duration::from_millis(200)).await;
    }
    let stats = sync(&recorder).await;

    assert_eq!(next_kind(&mut frames).await, EventKind::DataAvailable);
    assert!(frames.try_recv().is_none());
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.suppressed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_equal_size_pair_with_same_raster_pruned() {
    let options = RecorderOptions {
        prune_consecutive_equal_frames: true,
        ..Default::default()
    };
    // Scripted blobs are 100 bytes with different content on every call;
    // only the low-fidelity comparison of the rasters can match them.
    let still = PatternSource::new(32, 8, 10.0).with_motion_every(0);
    let recorder = Recorder::with_options(still, ScriptedEncoder::default(), &options).unwrap();
    let mut frames = recorder.subscribe(&[EventKind::DataAvailable]).await.unwrap();

    recorder.start(None).await.unwrap();
    for _ in 0..2 {
        recorder.request_data().await.unwrap();
        sync(&recorder).await;
        advance(Duration::from_millis(200)).await;
    }
    let stats = sync(&recorder).await;
    assert_eq!(next_kind(&mut frames).await, EventKind::DataAvailable);
    assert!(frames.try_recv().is_none());
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.suppressed, 1);

    // A moving scene defeats the comparison.
    let recorder =
        Recorder::with_options(moving_source(), ScriptedEncoder::default(), &options).unwrap();
    let _frames = recorder.subscribe(&[EventKind::DataAvailable]).await.unwrap();
    recorder.start(None).await.unwrap();
    for _ in 0..2 {
        recorder.request_data().await.unwrap();
        sync(&recorder).await;
        advance(Duration::from_millis(200)).await;
    }
    let stats = sync(&recorder).await;
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.suppressed, 0);
}

// ── Periodic capture ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timeslice_drives_cycles() {
    let recorder = Recorder::new(moving_source(), ZstdFrameEncoder::new()).unwrap();
    let mut frames = recorder.subscribe(&[EventKind::DataAvailable]).await.unwrap();

    recorder.start(Some(Duration::from_millis(250))).await.unwrap();

    let mut timecodes = Vec::new();
    for expected in 0..3u64 {
        match next_event(&mut frames).await {
            RecorderEvent::DataAvailable(blob) => {
                assert_eq!(blob.sequence, expected);
                timecodes.push(blob.timecode);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(timecodes.windows(2).all(|w| w[0] < w[1]));
    assert!(timecodes[0] >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_paused_recorder_skips_ticks_but_honors_request_data() {
    let recorder = Recorder::new(moving_source(), ZstdFrameEncoder::new()).unwrap();
    let mut frames = recorder.subscribe(&[EventKind::DataAvailable]).await.unwrap();

    recorder.start(Some(Duration::from_millis(100))).await.unwrap();
    recorder.pause().await.unwrap();

    assert!(
        timeout(Duration::from_secs(2), frames.recv()).await.is_err(),
        "no periodic frames while paused"
    );

    recorder.request_data().await.unwrap();
    assert_eq!(next_kind(&mut frames).await, EventKind::DataAvailable);

    recorder.resume().await.unwrap();
    assert_eq!(next_kind(&mut frames).await, EventKind::DataAvailable);
}

#[tokio::test(start_paused = true)]
async fn test_no_data_subscribers_skips_capture() {
    let source = moving_source();
    let recorder = Recorder::new(source, ZstdFrameEncoder::new()).unwrap();
    let mut lifecycle = recorder
        .subscribe(&[EventKind::Start, EventKind::Stop])
        .await
        .unwrap();

    recorder.start(Some(Duration::from_millis(100))).await.unwrap();
    advance(Duration::from_secs(1)).await;
    recorder.request_data().await.unwrap();
    let stats = sync(&recorder).await;
    assert_eq!(stats.data_subscribers, 0);
    assert_eq!(stats.admitted + stats.suppressed, 0);
    assert!(!stats.cycle_in_flight);

    recorder.stop().await.unwrap();
    assert_eq!(next_kind(&mut lifecycle).await, EventKind::Start);
    assert_eq!(next_kind(&mut lifecycle).await, EventKind::Stop);
}

// ── Failures ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_encode_failure_is_reported_and_recoverable() {
    let recorder = Recorder::new(moving_source(), FailingEncoder).unwrap();
    let mut events = recorder
        .subscribe(&[EventKind::DataAvailable, EventKind::Error])
        .await
        .unwrap();

    recorder.start(None).await.unwrap();
    recorder.request_data().await.unwrap();

    match next_event(&mut events).await {
        RecorderEvent::Error(e) => {
            assert_eq!(e.operation, Operation::RequestData);
            assert!(matches!(*e.error, RecorderError::Encode(_)));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(sync(&recorder).await.state, RecordingState::Recording);
}

#[tokio::test(start_paused = true)]
async fn test_draw_failure_abandons_cycle() {
    let recorder = Recorder::new(BlankSource, ScriptedEncoder::default()).unwrap();
    let mut events = recorder
        .subscribe(&[EventKind::DataAvailable, EventKind::Error])
        .await
        .unwrap();

    recorder.start(None).await.unwrap();
    recorder.request_data().await.unwrap();

    match next_event(&mut events).await {
        RecorderEvent::Error(e) => assert!(matches!(*e.error, RecorderError::Draw(_))),
        other => panic!("unexpected event {other:?}"),
    }
    let stats = sync(&recorder).await;
    assert!(!stats.cycle_in_flight);
    assert_eq!(stats.state, RecordingState::Recording);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_source_blocks_start() {
    let recorder = Recorder::new(PatternSource::new(0, 0, 30.0), ZstdFrameEncoder::new()).unwrap();
    let mut events = recorder.subscribe_all().await.unwrap();

    recorder.start(None).await.unwrap();
    match next_event(&mut events).await {
        RecorderEvent::Error(e) => {
            assert_eq!(e.operation, Operation::Start);
            assert!(matches!(*e.error, RecorderError::SourceUnavailable(_)));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(sync(&recorder).await.state, RecordingState::Inactive);
}

// ── Construction and shutdown ────────────────────────────────────

#[tokio::test]
async fn test_unsupported_mime_type_rejected() {
    let options = RecorderOptions {
        mime_type: Some("video/webm".into()),
        ..Default::default()
    };
    let err = Recorder::with_options(moving_source(), ZstdFrameEncoder::new(), &options)
        .unwrap_err();
    assert_eq!(err.to_string(), "NotSupportedError: mimeType video/webm unknown");

    assert!(Recorder::is_type_supported("image/webp"));
    assert!(!Recorder::is_type_supported("video/webm"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_streams() {
    let recorder = Recorder::new(moving_source(), ScriptedEncoder::default()).unwrap();
    let mut events = recorder.subscribe_all().await.unwrap();
    recorder.start(None).await.unwrap();
    assert_eq!(next_kind(&mut events).await, EventKind::Start);

    recorder.shutdown().await.unwrap();
    assert!(events.recv().await.is_none());
}
