//! Session state machine.
//!
//! Owns the lifecycle of the single voice session:
//!
//! ```text
//! Idle -> Connecting -> Open -> Closing -> Idle
//!            |           |
//!            +-> Error <-+-> (teardown) -> Idle
//! ```
//!
//! [`SessionMachine`] holds the collaborators and callbacks; the per-session
//! resources live in a caller-owned [`SessionContext`]. Every operation takes
//! `&mut SessionContext`, so events are handled one at a time and in arrival
//! order. Playback scheduling relies on that ordering.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::capture::{
    AudioBackend, CaptureConfig, CaptureHandle, DEFAULT_FRAME_SIZE, DEFAULT_QUEUE_CAPACITY,
    MicrophoneStream, start_capture,
};
use crate::core::codec::{AudioFormat, bytes_to_samples, decode_transport, parse_pcm_rate};
use crate::core::instructions::{DEFAULT_KNOWLEDGE, build_system_instruction};
use crate::core::playback::PlaybackScheduler;
use crate::core::realtime::gemini::{
    DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_VOICE, GEMINI_INPUT_SAMPLE_RATE,
    GEMINI_OUTPUT_SAMPLE_RATE,
};
use crate::core::realtime::{
    InboundMessage, InlineAudio, NoticeCallback, QUOTA_NOTICE, RealtimeError, RealtimeResult,
    RealtimeTransport, ResponseModality, SessionNotice, SessionSetup, SessionState,
    StateChangeCallback, ToolCallRequest, TranscriptCallback, TranscriptRole, TranscriptUpdate,
    TransportEvent, TransportLink,
};
use crate::core::tools::{DEFAULT_TOOL_TIMEOUT, ToolCallBridge, ToolRegistry};
use crate::core::transcript::TranscriptAccumulator;

/// Default bound on reaching `Open` after `start`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const OPEN_NOTICE: &str = "Connected. Go ahead and speak.";

// =============================================================================
// Settings
// =============================================================================

/// Everything the state machine needs to know about a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub input_sample_rate: u32,
    /// Rate assumed for model audio whose MIME tag carries none
    pub output_sample_rate: u32,
    pub frame_size: usize,
    pub capture_queue_capacity: usize,
    /// When false no output device is opened and model audio is discarded
    pub speaker_enabled: bool,
    /// Bound from `start` until the remote side accepts the setup
    pub connect_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            voice: DEFAULT_GEMINI_VOICE.to_string(),
            system_instruction: build_system_instruction(DEFAULT_KNOWLEDGE, ""),
            input_sample_rate: GEMINI_INPUT_SAMPLE_RATE,
            output_sample_rate: GEMINI_OUTPUT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            capture_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            speaker_enabled: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl SessionSettings {
    pub fn input_format(&self) -> AudioFormat {
        AudioFormat::mono(self.input_sample_rate)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            format: self.input_format(),
            frame_size: self.frame_size,
            queue_capacity: self.capture_queue_capacity,
        }
    }
}

// =============================================================================
// Session Context
// =============================================================================

/// Resources of the current session. Owned by the caller, never shared.
#[derive(Default)]
pub struct SessionContext {
    state: SessionState,
    session_id: Option<String>,
    link: Option<TransportLink>,
    microphone: Option<Box<dyn MicrophoneStream>>,
    capture: Option<CaptureHandle>,
    scheduler: Option<PlaybackScheduler>,
    transcript: TranscriptAccumulator,
    open_deadline: Option<Instant>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn transcript(&self) -> &TranscriptAccumulator {
        &self.transcript
    }

    pub fn is_microphone_held(&self) -> bool {
        self.microphone.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn active_playback_count(&self) -> usize {
        self.scheduler.as_ref().map_or(0, |s| s.active_count())
    }

    pub fn frames_sent(&self) -> u64 {
        self.capture.as_ref().map_or(0, |c| c.frames_sent())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("connected", &self.link.is_some())
            .field("microphone_held", &self.microphone.is_some())
            .field("capturing", &self.capture.is_some())
            .finish()
    }
}

// =============================================================================
// Session Machine
// =============================================================================

/// Drives one voice session at a time.
pub struct SessionMachine {
    settings: SessionSettings,
    transport: Arc<dyn RealtimeTransport>,
    audio: Arc<dyn AudioBackend>,
    bridge: ToolCallBridge,
    transcript_callback: Option<TranscriptCallback>,
    state_callback: Option<StateChangeCallback>,
    notice_callback: Option<NoticeCallback>,
}

impl SessionMachine {
    pub fn new(
        settings: SessionSettings,
        transport: Arc<dyn RealtimeTransport>,
        audio: Arc<dyn AudioBackend>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let bridge = ToolCallBridge::new(tools, settings.tool_timeout);
        Self {
            settings,
            transport,
            audio,
            bridge,
            transcript_callback: None,
            state_callback: None,
            notice_callback: None,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn on_transcript(&mut self, callback: TranscriptCallback) {
        self.transcript_callback = Some(callback);
    }

    pub fn on_state_change(&mut self, callback: StateChangeCallback) {
        self.state_callback = Some(callback);
    }

    pub fn on_notice(&mut self, callback: NoticeCallback) {
        self.notice_callback = Some(callback);
    }

    /// Acquire the microphone and connect.
    ///
    /// Fails with `SessionActive` unless the session is `Idle`, without
    /// touching any device. On success the session is `Connecting`; it becomes
    /// `Open` when the transport reports the setup was accepted.
    pub async fn start(&self, ctx: &mut SessionContext) -> RealtimeResult<()> {
        if ctx.state != SessionState::Idle {
            tracing::warn!(state = %ctx.state, "Start requested while a session is active");
            return Err(RealtimeError::SessionActive(ctx.state));
        }

        let deadline = Instant::now() + self.settings.connect_timeout;
        ctx.session_id = Some(Uuid::new_v4().to_string());
        ctx.transcript.clear();
        self.set_state(ctx, SessionState::Connecting).await;

        let input_format = self.settings.input_format();
        match self
            .audio
            .acquire_microphone(input_format, self.settings.frame_size)
            .await
        {
            Ok(microphone) => ctx.microphone = Some(microphone),
            Err(e) => {
                tracing::warn!(error = %e, "Microphone unavailable");
                self.notify(SessionNotice::error(e.user_notice())).await;
                self.set_state(ctx, SessionState::Idle).await;
                ctx.session_id = None;
                return Err(e);
            }
        }

        if let Err(e) = self.connect(ctx, deadline).await {
            self.fail(ctx, e.clone()).await;
            return Err(e);
        }

        ctx.open_deadline = Some(deadline);
        Ok(())
    }

    async fn connect(&self, ctx: &mut SessionContext, deadline: Instant) -> RealtimeResult<()> {
        if self.settings.speaker_enabled {
            let clock = self
                .audio
                .open_output(self.settings.output_sample_rate)
                .await?;
            ctx.scheduler = Some(PlaybackScheduler::new(clock));
        }

        let setup = self.session_setup();
        tracing::info!(
            session_id = ?ctx.session_id,
            provider = self.transport.provider_name(),
            tools = setup.tools.len(),
            "Connecting realtime session"
        );

        let link = tokio::time::timeout_at(deadline, self.transport.connect(setup))
            .await
            .map_err(|_| {
                RealtimeError::Timeout(format!(
                    "connection not established within {}ms",
                    self.settings.connect_timeout.as_millis()
                ))
            })??;

        ctx.link = Some(link);
        Ok(())
    }

    /// The configuration declared to the remote side.
    pub fn session_setup(&self) -> SessionSetup {
        SessionSetup {
            model: self.settings.model.clone(),
            voice: self.settings.voice.clone(),
            system_instruction: self.settings.system_instruction.clone(),
            tools: self.bridge.registry().declarations(),
            response_modality: ResponseModality::Audio,
            output_transcription: true,
            input_transcription: true,
            input_format: self.settings.input_format(),
        }
    }

    /// Wait for the next transport event.
    ///
    /// Returns `None` when there is no connection. While `Connecting` the wait
    /// is bounded by the open deadline and yields a `Timeout` error event once
    /// it passes. A transport that went away without a close frame yields
    /// `Closed`.
    pub async fn next_event(&self, ctx: &mut SessionContext) -> Option<TransportEvent> {
        let state = ctx.state;
        let deadline = ctx.open_deadline;
        let link = ctx.link.as_mut()?;

        let event = match (state, deadline) {
            (SessionState::Connecting, Some(deadline)) => {
                tokio::select! {
                    event = link.events.recv() => event,
                    _ = tokio::time::sleep_until(deadline) => {
                        return Some(TransportEvent::Error(RealtimeError::Timeout(format!(
                            "setup not accepted within {}ms",
                            self.settings.connect_timeout.as_millis()
                        ))));
                    }
                }
            }
            _ => link.events.recv().await,
        };

        Some(event.unwrap_or(TransportEvent::Closed { reason: None }))
    }

    /// Apply one transport event.
    pub async fn handle_event(&self, ctx: &mut SessionContext, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.handle_open(ctx).await,
            TransportEvent::Message(message) => self.handle_message(ctx, message).await,
            TransportEvent::Closed { reason } => self.handle_closed(ctx, reason).await,
            TransportEvent::Error(error) => self.handle_error(ctx, error).await,
        }
    }

    /// End the session from any state. Always leaves it `Idle`.
    pub async fn stop(&self, ctx: &mut SessionContext) {
        if ctx.state == SessionState::Idle {
            self.teardown(ctx).await;
            return;
        }

        tracing::info!(session_id = ?ctx.session_id, state = %ctx.state, "Stopping session");
        self.set_state(ctx, SessionState::Closing).await;
        self.teardown(ctx).await;
        self.set_state(ctx, SessionState::Idle).await;
        ctx.session_id = None;
    }

    /// Handle events until the session is `Idle` or `shutdown` fires.
    ///
    /// `shutdown` also interrupts an event that is still being handled, such
    /// as a slow tool batch; its pending results are dropped and the session
    /// is stopped.
    pub async fn run_until(&self, ctx: &mut SessionContext, shutdown: &CancellationToken) {
        while ctx.state != SessionState::Idle {
            let next = tokio::select! {
                _ = shutdown.cancelled() => None,
                event = self.next_event(ctx) => Some(event),
            };

            let event = match next {
                None => break,
                Some(None) => return,
                Some(Some(event)) => event,
            };

            let interrupted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => true,
                _ = self.handle_event(ctx, event) => false,
            };
            if interrupted {
                break;
            }
        }

        if shutdown.is_cancelled() {
            self.stop(ctx).await;
        }
    }

    // =========================================================================
    // Event Handlers
    // =========================================================================

    async fn handle_open(&self, ctx: &mut SessionContext) {
        if ctx.state != SessionState::Connecting {
            tracing::debug!(state = %ctx.state, "Ignoring open event");
            return;
        }

        let outbound = ctx.link.as_ref().map(|link| link.outbound.clone());
        let config = self.settings.capture_config();
        let result = match (outbound, ctx.microphone.as_mut()) {
            (Some(outbound), Some(microphone)) => {
                start_capture(microphone.as_mut(), outbound, &config)
            }
            _ => Err(RealtimeError::NotConnected),
        };

        match result {
            Ok(capture) => {
                ctx.capture = Some(capture);
                ctx.open_deadline = None;
                self.set_state(ctx, SessionState::Open).await;
                self.notify(SessionNotice::info(OPEN_NOTICE)).await;
            }
            Err(e) => self.fail(ctx, e).await,
        }
    }

    async fn handle_message(&self, ctx: &mut SessionContext, message: InboundMessage) {
        if ctx.state != SessionState::Open {
            tracing::debug!(state = %ctx.state, "Dropping message outside an open session");
            return;
        }

        if !message.tool_calls.is_empty() {
            self.answer_tool_calls(ctx, message.tool_calls).await;
        }

        for chunk in &message.audio {
            self.play_chunk(ctx, chunk);
        }

        if let Some(text) = message.input_transcript.as_deref() {
            self.append_transcript(ctx, TranscriptRole::User, text).await;
        }
        if let Some(text) = message.output_transcript.as_deref() {
            self.append_transcript(ctx, TranscriptRole::Model, text).await;
        }

        if message.interrupted
            && let Some(scheduler) = &ctx.scheduler
        {
            let stopped = scheduler.stop_all();
            tracing::debug!(stopped, "Model interrupted, playback cleared");
        }

        if message.turn_complete
            && let Some(update) = ctx.transcript.flush()
        {
            self.emit_transcript(update).await;
        }
    }

    async fn handle_closed(&self, ctx: &mut SessionContext, reason: Option<String>) {
        match ctx.state {
            SessionState::Idle => {}
            SessionState::Connecting => {
                let reason = reason.unwrap_or_else(|| "no reason given".to_string());
                self.fail(
                    ctx,
                    RealtimeError::ConnectionError(format!(
                        "closed before setup completed: {}",
                        reason
                    )),
                )
                .await;
            }
            _ => {
                tracing::info!(session_id = ?ctx.session_id, reason = ?reason, "Session closed");
                self.set_state(ctx, SessionState::Closing).await;
                self.teardown(ctx).await;
                self.set_state(ctx, SessionState::Idle).await;
                ctx.session_id = None;
            }
        }
    }

    async fn handle_error(&self, ctx: &mut SessionContext, error: RealtimeError) {
        match ctx.state {
            SessionState::Open if error.is_quota() => {
                tracing::warn!(session_id = ?ctx.session_id, error = %error, "Remote quota exceeded");
                self.notify(SessionNotice::warning(QUOTA_NOTICE)).await;
            }
            state if state.is_active() => self.fail(ctx, error).await,
            _ => tracing::debug!(state = %ctx.state, error = %error, "Ignoring late error"),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn answer_tool_calls(&self, ctx: &SessionContext, calls: Vec<ToolCallRequest>) {
        let count = calls.len();
        let results = self.bridge.dispatch(calls).await;

        let Some(link) = ctx.link.as_ref() else {
            return;
        };
        match link.outbound.send_tool_results(results).await {
            Ok(()) => tracing::debug!(count, "Answered tool calls"),
            Err(e) => tracing::warn!(count, error = %e, "Could not send tool results"),
        }
    }

    fn play_chunk(&self, ctx: &SessionContext, chunk: &InlineAudio) {
        let Some(scheduler) = &ctx.scheduler else {
            return;
        };

        let sample_rate =
            parse_pcm_rate(&chunk.mime_type).unwrap_or(self.settings.output_sample_rate);
        let buffer = match decode_transport(&chunk.data)
            .and_then(|bytes| bytes_to_samples(&bytes, sample_rate, 1))
        {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!(
                    mime_type = %chunk.mime_type,
                    error = %e,
                    "Dropping undecodable audio chunk"
                );
                return;
            }
        };

        if buffer.is_empty() {
            return;
        }
        if let Err(e) = scheduler.schedule(buffer) {
            tracing::warn!(error = %e, "Failed to schedule audio chunk");
        }
    }

    async fn append_transcript(&self, ctx: &mut SessionContext, role: TranscriptRole, text: &str) {
        let previous = ctx.transcript.current().map(|entry| entry.role);
        if previous.is_some_and(|r| r != role)
            && let Some(update) = ctx.transcript.flush()
        {
            self.emit_transcript(update).await;
        }
        if let Some(update) = ctx.transcript.append(role, text) {
            self.emit_transcript(update).await;
        }
    }

    async fn emit_transcript(&self, update: TranscriptUpdate) {
        if let Some(callback) = &self.transcript_callback {
            callback(update).await;
        }
    }

    async fn notify(&self, notice: SessionNotice) {
        if let Some(callback) = &self.notice_callback {
            callback(notice).await;
        }
    }

    async fn set_state(&self, ctx: &mut SessionContext, state: SessionState) {
        if ctx.state == state {
            return;
        }
        tracing::info!(
            session_id = ?ctx.session_id,
            from = %ctx.state,
            to = %state,
            "Session state changed"
        );
        ctx.state = state;
        if let Some(callback) = &self.state_callback {
            callback(state).await;
        }
    }

    async fn fail(&self, ctx: &mut SessionContext, error: RealtimeError) {
        tracing::error!(session_id = ?ctx.session_id, error = %error, "Session failed");
        self.set_state(ctx, SessionState::Error).await;
        self.teardown(ctx).await;
        self.notify(SessionNotice::error(error.user_notice())).await;
        self.set_state(ctx, SessionState::Idle).await;
        ctx.session_id = None;
    }

    /// Release everything the session holds. The microphone goes first.
    async fn teardown(&self, ctx: &mut SessionContext) {
        ctx.open_deadline = None;

        if let Some(mut microphone) = ctx.microphone.take() {
            microphone.stop();
            tracing::debug!("Microphone released");
        }

        if let Some(mut capture) = ctx.capture.take() {
            capture.stop().await;
        }

        if let Some(scheduler) = ctx.scheduler.take() {
            let stopped = scheduler.stop_all();
            if stopped > 0 {
                tracing::debug!(stopped, "Playback stopped");
            }
        }

        if let Some(link) = ctx.link.take() {
            link.outbound.close();
        }

        if let Some(update) = ctx.transcript.flush() {
            self.emit_transcript(update).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::playback::OutputClock;
    use async_trait::async_trait;

    struct DenyingBackend;

    #[async_trait]
    impl AudioBackend for DenyingBackend {
        async fn acquire_microphone(
            &self,
            _format: AudioFormat,
            _frame_size: usize,
        ) -> RealtimeResult<Box<dyn MicrophoneStream>> {
            Err(RealtimeError::PermissionDenied("user refused".to_string()))
        }

        async fn open_output(&self, _sample_rate: u32) -> RealtimeResult<Arc<dyn OutputClock>> {
            Err(RealtimeError::AudioDevice("unused".to_string()))
        }
    }

    struct UnreachableTransport;

    #[async_trait]
    impl RealtimeTransport for UnreachableTransport {
        async fn connect(&self, _setup: SessionSetup) -> RealtimeResult<TransportLink> {
            Err(RealtimeError::ConnectionError("unreachable".to_string()))
        }

        fn provider_name(&self) -> &'static str {
            "unreachable"
        }
    }

    fn machine() -> SessionMachine {
        SessionMachine::new(
            SessionSettings::default(),
            Arc::new(UnreachableTransport),
            Arc::new(DenyingBackend),
            Arc::new(ToolRegistry::new()),
        )
    }

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.input_sample_rate, 16_000);
        assert_eq!(settings.output_sample_rate, 24_000);
        assert_eq!(settings.frame_size, 4096);
        assert_eq!(settings.voice, "Puck");
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.tool_timeout, Duration::from_secs(15));
        assert_eq!(settings.input_format().mime_type(), "audio/pcm;rate=16000");
    }

    #[test]
    fn test_session_setup_requests_audio_and_transcripts() {
        let setup = machine().session_setup();
        assert_eq!(setup.response_modality, ResponseModality::Audio);
        assert!(setup.output_transcription);
        assert!(setup.input_transcription);
        assert!(setup.tools.is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_returns_to_idle() {
        let machine = machine();
        let mut ctx = SessionContext::new();

        let err = machine.start(&mut ctx).await.unwrap_err();
        assert!(matches!(err, RealtimeError::PermissionDenied(_)));
        assert_eq!(ctx.state(), SessionState::Idle);
        assert!(!ctx.is_microphone_held());
        assert!(ctx.session_id().is_none());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let machine = machine();
        let mut ctx = SessionContext::new();
        machine.stop(&mut ctx).await;
        machine.stop(&mut ctx).await;
        assert_eq!(ctx.state(), SessionState::Idle);
        assert!(machine.next_event(&mut ctx).await.is_none());
    }
}
