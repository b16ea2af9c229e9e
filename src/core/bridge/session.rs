//! Bridge session: one phone call's pair of legs.
//!
//! The telephony receive loop runs on the caller's task inside
//! [`BridgeSession::run`]. The first `start` event spawns the AI task, which
//! resolves a signed URL, dials the AI leg, sends the initiation payload and
//! then runs the AI receive loop. Whichever leg ends first fires the shared
//! cancellation token, and `run` tears both legs down.

use std::ops::ControlFlow;
use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::leg::{InboundFrame, InboundStream, Leg, LegSender};
use super::state::{AiLegState, SessionState};
use super::variables::{SessionDefaults, SessionVariables};
use crate::core::convai::{
    AiLegConnector, AudioChunk, ClientEvent, CredentialError, ServerEvent, SignedUrlResolver,
    UserAudioChunk,
};
use crate::core::telephony::{StreamStart, TelephonyEvent, TelephonyOutbound};
use crate::errors::{BridgeError, BridgeResult, ProtocolError};

/// Collaborators and defaults shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    pub resolver: Arc<dyn SignedUrlResolver>,
    pub connector: Arc<dyn AiLegConnector>,
    pub defaults: SessionDefaults,
    /// Agent dialled when the call does not name one
    pub default_agent_id: Option<String>,
}

impl SessionContext {
    pub fn new(
        resolver: Arc<dyn SignedUrlResolver>,
        connector: Arc<dyn AiLegConnector>,
        defaults: SessionDefaults,
        default_agent_id: Option<String>,
    ) -> Self {
        Self {
            resolver,
            connector,
            defaults,
            default_agent_id,
        }
    }
}

/// State shared between the telephony loop and the AI task.
struct SessionCore {
    state: Arc<SessionState>,
    telephony: LegSender,
    ai: RwLock<Option<LegSender>>,
    shutdown: CancellationToken,
}

impl SessionCore {
    /// Forward one caller audio chunk if the AI leg is open.
    fn forward_caller_audio(&self, payload: &str) -> BridgeResult<()> {
        let ai = self.ai.read().clone();
        let Some(ai) = ai else {
            trace!(
                session_id = %self.state.session_id(),
                "AI leg not open, dropping caller audio"
            );
            return Ok(());
        };
        if self.state.ai_leg() != AiLegState::Open {
            return Ok(());
        }

        let audio = BASE64_STANDARD
            .decode(payload)
            .map_err(|e| ProtocolError::InvalidField {
                field: "media.payload",
                reason: e.to_string(),
            })?;

        ai.send_json(&UserAudioChunk::new(BASE64_STANDARD.encode(audio)));
        Ok(())
    }

    /// Publish the dialled AI leg. Fails once the session started closing.
    fn attach_ai_leg(&self, sender: LegSender) -> bool {
        let mut ai = self.ai.write();
        if !self.state.mark_ai_open() {
            return false;
        }
        *ai = Some(sender);
        true
    }

    fn close_ai_leg(&self) {
        let ai = self.ai.write().take();
        if let Some(ai) = ai
            && ai.close()
        {
            info!(session_id = %self.state.session_id(), "Closed AI leg");
        }
        self.state.mark_ai_closed();
    }

    fn fail_setup(&self, err: &BridgeError) {
        error!(
            session_id = %self.state.session_id(),
            call_id = %self.state.call_id().unwrap_or_default(),
            "Failed to establish AI leg: {}", err
        );
        self.state.mark_ai_closed();
        self.shutdown.cancel();
    }

    fn handle_ai_text(&self, text: &str, ai: &LegSender) -> BridgeResult<()> {
        let session_id = self.state.session_id();
        let event = ServerEvent::parse(text)?;

        match event {
            ServerEvent::Audio(chunk) => {
                let Some(stream_sid) = self.state.telephony_target() else {
                    trace!(%session_id, "No telephony target, dropping agent audio");
                    return Ok(());
                };
                if let AudioChunk::AudioEvent {
                    event_id: Some(event_id),
                    ..
                } = &chunk
                {
                    trace!(%session_id, %event_id, "Relaying agent audio");
                }
                self.telephony
                    .send_json(&TelephonyOutbound::media(stream_sid, chunk.into_payload()));
            }
            ServerEvent::Interruption => {
                let Some(stream_sid) = self.state.telephony_target() else {
                    return Ok(());
                };
                debug!(%session_id, %stream_sid, "Agent interrupted, clearing playback");
                self.telephony.send_json(&TelephonyOutbound::clear(stream_sid));
            }
            ServerEvent::Ping { event_id } => {
                trace!(%session_id, %event_id, "Answering keepalive");
                ai.send_json(&ClientEvent::Pong { event_id });
            }
            ServerEvent::ConversationMetadata {
                conversation_id,
                agent_output_audio_format,
            } => {
                info!(
                    %session_id,
                    %conversation_id,
                    output_format = agent_output_audio_format.as_deref().unwrap_or("unknown"),
                    "Conversation started"
                );
                self.state.set_conversation_id(conversation_id);
            }
            ServerEvent::AgentResponse { text } => {
                info!(%session_id, agent_response = %text, "Agent response");
            }
            ServerEvent::UserTranscript { text } => {
                info!(%session_id, user_transcript = %text, "Caller transcript");
            }
            ServerEvent::Unknown => {
                debug!(%session_id, "Ignoring unrecognized AI event");
            }
        }

        Ok(())
    }

    /// AI receive loop. Ends the session when the leg ends.
    async fn relay_ai_events(&self, mut inbound: InboundStream, ai: LegSender) {
        let shutdown = self.shutdown.clone();
        let session_id = self.state.session_id();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = inbound.next() => match frame {
                    Some(Ok(InboundFrame::Text(text))) => match self.handle_ai_text(&text, &ai) {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            warn!(%session_id, "AI leg failed: {}", e);
                            break;
                        }
                        Err(e) => warn!(%session_id, "Dropping AI frame: {}", e),
                    },
                    Some(Ok(InboundFrame::Binary(len))) => {
                        debug!(%session_id, len, "Ignoring binary frame on AI leg");
                    }
                    Some(Ok(InboundFrame::Control)) => {}
                    Some(Ok(InboundFrame::Close)) | None => {
                        info!(%session_id, "AI leg closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(%session_id, "AI leg failed: {}", e);
                        break;
                    }
                },
            }
        }

        self.state.mark_ai_closed();
        self.shutdown.cancel();
    }
}

async fn open_ai_leg(context: &SessionContext, variables: &SessionVariables) -> BridgeResult<Leg> {
    let agent_id = variables
        .agent_id(context.default_agent_id.as_deref())
        .ok_or(CredentialError::MissingAgentId)?;
    let signed_url = context.resolver.resolve_signed_url(agent_id).await?;
    context.connector.connect(&signed_url).await
}

/// AI task: dial, initiate, then relay until either leg ends.
async fn connect_ai_leg(
    core: Arc<SessionCore>,
    context: Arc<SessionContext>,
    variables: SessionVariables,
) {
    let shutdown = core.shutdown.clone();

    let result = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!(session_id = %core.state.session_id(), "Session closed while dialling AI leg");
            core.state.mark_ai_closed();
            return;
        }
        result = open_ai_leg(&context, &variables) => result,
    };

    let Leg { inbound, outbound } = match result {
        Ok(leg) => leg,
        Err(e) => {
            core.fail_setup(&e);
            return;
        }
    };

    // Queued before the leg is published so it precedes any caller audio
    let initiation =
        ClientEvent::ConversationInitiationClientData(variables.to_initiation(&context.defaults));
    outbound.send_json(&initiation);

    if !core.attach_ai_leg(outbound.clone()) {
        debug!(session_id = %core.state.session_id(), "Session closing, discarding AI leg");
        outbound.close();
        core.state.mark_ai_closed();
        return;
    }

    info!(
        session_id = %core.state.session_id(),
        call_id = %core.state.call_id().unwrap_or_default(),
        stream_sid = %core.state.stream_id().unwrap_or_default(),
        "Bridge session active"
    );

    core.relay_ai_events(inbound, outbound).await;
}

/// Coordinator for one call.
pub struct BridgeSession {
    core: Arc<SessionCore>,
    context: Arc<SessionContext>,
    ai_task: Option<JoinHandle<()>>,
}

impl BridgeSession {
    pub fn new(telephony: LegSender, context: Arc<SessionContext>) -> Self {
        Self {
            core: Arc::new(SessionCore {
                state: Arc::new(SessionState::new()),
                telephony,
                ai: RwLock::new(None),
                shutdown: CancellationToken::new(),
            }),
            context,
            ai_task: None,
        }
    }

    pub fn state(&self) -> Arc<SessionState> {
        self.core.state.clone()
    }

    /// Run the telephony receive loop, then tear the session down.
    pub async fn run(mut self, mut inbound: InboundStream) {
        let shutdown = self.core.shutdown.clone();
        let session_id = self.core.state.session_id();
        info!(%session_id, "Bridge session started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = inbound.next() => match frame {
                    Some(Ok(InboundFrame::Text(text))) => match self.handle_telephony_text(&text) {
                        Ok(ControlFlow::Continue(())) => {}
                        Ok(ControlFlow::Break(())) => break,
                        Err(e) if e.is_fatal() => {
                            warn!(%session_id, "Telephony leg failed: {}", e);
                            break;
                        }
                        Err(e) => warn!(%session_id, "Dropping telephony frame: {}", e),
                    },
                    Some(Ok(InboundFrame::Binary(len))) => {
                        debug!(%session_id, len, "Ignoring binary frame on telephony leg");
                    }
                    Some(Ok(InboundFrame::Control)) => {}
                    Some(Ok(InboundFrame::Close)) | None => {
                        info!(%session_id, "Telephony leg closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(%session_id, "Telephony leg failed: {}", e);
                        break;
                    }
                },
            }
        }

        self.teardown().await;
    }

    fn handle_telephony_text(&mut self, text: &str) -> BridgeResult<ControlFlow<()>> {
        let session_id = self.core.state.session_id();

        match TelephonyEvent::parse(text)? {
            TelephonyEvent::Start { start } => self.handle_start(start),
            TelephonyEvent::Media { media } => self.core.forward_caller_audio(&media.payload)?,
            TelephonyEvent::Stop => {
                info!(%session_id, "Telephony stream stopped");
                return Ok(ControlFlow::Break(()));
            }
            other => debug!(%session_id, event = other.name(), "Ignoring telephony event"),
        }

        Ok(ControlFlow::Continue(()))
    }

    fn handle_start(&mut self, start: StreamStart) {
        let session_id = self.core.state.session_id();
        if !self
            .core
            .state
            .capture_start(&start.stream_sid, start.call_sid.as_deref())
        {
            warn!(
                %session_id,
                stream_sid = %start.stream_sid,
                "Ignoring duplicate start event"
            );
            return;
        }

        info!(
            %session_id,
            stream_sid = %start.stream_sid,
            call_id = start.call_sid.as_deref().unwrap_or_default(),
            "Telephony stream started"
        );

        let variables = SessionVariables::from_custom_parameters(&start.custom_parameters);
        self.ai_task = Some(tokio::spawn(connect_ai_leg(
            self.core.clone(),
            self.context.clone(),
            variables,
        )));
    }

    async fn teardown(mut self) {
        let state = self.core.state.clone();
        state.begin_closing();
        // Before cancelling, so the AI loop cannot address one more frame to this leg
        state.mark_telephony_closed();
        self.core.shutdown.cancel();
        self.core.close_ai_leg();

        if let Some(task) = self.ai_task.take()
            && let Err(e) = task.await
        {
            warn!(session_id = %state.session_id(), "AI task ended abnormally: {}", e);
        }

        self.core.telephony.close();
        state.mark_closed();

        info!(
            session_id = %state.session_id(),
            call_id = %state.call_id().unwrap_or_default(),
            stream_sid = %state.stream_id().unwrap_or_default(),
            conversation_id = %state.conversation_id().unwrap_or_default(),
            "Bridge session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::channel::mpsc::{UnboundedSender, unbounded};
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tokio::sync::{Notify, mpsc};
    use tokio::time::timeout;

    use crate::core::bridge::leg::OutboundFrame;
    use crate::core::bridge::state::{SessionPhase, TelephonyLegState};

    type FrameTx = UnboundedSender<Result<InboundFrame, BridgeError>>;

    struct MockResolver {
        fail: bool,
        calls: AtomicUsize,
        agents: Mutex<Vec<String>>,
    }

    impl MockResolver {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicUsize::new(0),
                agents: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SignedUrlResolver for MockResolver {
        async fn resolve_signed_url(&self, agent_id: &str) -> Result<String, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.agents.lock().push(agent_id.to_string());
            if self.fail {
                return Err(CredentialError::UpstreamUnavailable(
                    "HTTP 500 Internal Server Error".to_string(),
                ));
            }
            Ok("wss://agents.test/convai?token=t".to_string())
        }
    }

    struct MockConnector {
        leg: Mutex<Option<Leg>>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl MockConnector {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiLegConnector for MockConnector {
        async fn connect(&self, _signed_url: &str) -> BridgeResult<Leg> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.leg
                .lock()
                .take()
                .ok_or_else(|| BridgeError::Setup("leg already used".to_string()))
        }
    }

    fn channel_leg(name: &'static str) -> (Leg, FrameTx, mpsc::Receiver<OutboundFrame>) {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = mpsc::channel(64);
        (Leg::from_parts(name, in_rx.boxed(), out_tx), in_tx, out_rx)
    }

    struct Harness {
        telephony_in: FrameTx,
        telephony_out: mpsc::Receiver<OutboundFrame>,
        ai_in: FrameTx,
        ai_out: mpsc::Receiver<OutboundFrame>,
        state: Arc<SessionState>,
        resolver: Arc<MockResolver>,
        connector: Arc<MockConnector>,
        task: JoinHandle<()>,
    }

    struct HarnessOptions {
        resolver_fails: bool,
        gate: Option<Arc<Notify>>,
        default_agent_id: Option<String>,
    }

    impl Default for HarnessOptions {
        fn default() -> Self {
            Self {
                resolver_fails: false,
                gate: None,
                default_agent_id: Some("agent_default".to_string()),
            }
        }
    }

    impl Harness {
        fn start(options: HarnessOptions) -> Self {
            let (telephony, telephony_in, telephony_out) = channel_leg("telephony");
            let (ai, ai_in, ai_out) = channel_leg("ai");

            let resolver = Arc::new(MockResolver::new(options.resolver_fails));
            let connector = Arc::new(MockConnector {
                leg: Mutex::new(Some(ai)),
                gate: options.gate,
                calls: AtomicUsize::new(0),
            });
            let context = Arc::new(SessionContext::new(
                resolver.clone(),
                connector.clone(),
                SessionDefaults::default(),
                options.default_agent_id,
            ));

            let session = BridgeSession::new(telephony.outbound, context);
            let state = session.state();
            let task = tokio::spawn(session.run(telephony.inbound));

            Self {
                telephony_in,
                telephony_out,
                ai_in,
                ai_out,
                state,
                resolver,
                connector,
                task,
            }
        }

        fn send_telephony(&self, frame: Value) {
            self.telephony_in
                .unbounded_send(Ok(InboundFrame::Text(frame.to_string())))
                .unwrap();
        }

        fn send_ai(&self, frame: Value) {
            self.ai_in
                .unbounded_send(Ok(InboundFrame::Text(frame.to_string())))
                .unwrap();
        }

        async fn activate(&mut self, params: Value) {
            self.send_telephony(start_frame("SID1", params));
            wait_for(|| self.state.phase() == SessionPhase::Active).await;
            let init = recv_json(&mut self.ai_out).await;
            assert_eq!(init["type"], "conversation_initiation_client_data");
        }

        async fn finished(self) -> Arc<SessionState> {
            timeout(Duration::from_secs(2), self.task)
                .await
                .expect("session did not finish")
                .unwrap();
            self.state
        }
    }

    fn start_frame(stream_sid: &str, params: Value) -> Value {
        json!({
            "event": "start",
            "streamSid": stream_sid,
            "start": {
                "streamSid": stream_sid,
                "callSid": "CA1",
                "customParameters": params
            }
        })
    }

    fn media_frame(payload: &str) -> Value {
        json!({"event": "media", "media": {"track": "inbound", "payload": payload}})
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<OutboundFrame>) -> OutboundFrame {
        match timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(frame)) => frame,
            other => panic!("Expected a frame, got {other:?}"),
        }
    }

    async fn recv_json(rx: &mut mpsc::Receiver<OutboundFrame>) -> Value {
        match recv_frame(rx).await {
            OutboundFrame::Text(text) => serde_json::from_str(&text).unwrap(),
            OutboundFrame::Close => panic!("Expected a text frame, got close"),
        }
    }

    async fn assert_quiet(rx: &mut mpsc::Receiver<OutboundFrame>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Ok(frame) = rx.try_recv() {
            panic!("Expected no frame, got {frame:?}");
        }
    }

    #[tokio::test]
    async fn test_start_opens_ai_leg_and_sends_initiation_first() {
        let mut h = Harness::start(HarnessOptions::default());
        h.send_telephony(start_frame(
            "SID1",
            json!({"name": "Ada", "caller_id": "+15550100", "first_message": "Hi Ada"}),
        ));

        let init = recv_json(&mut h.ai_out).await;
        assert_eq!(init["type"], "conversation_initiation_client_data");
        assert_eq!(init["dynamic_variables"]["name"], "Ada");
        assert_eq!(init["dynamic_variables"]["caller_id"], "+15550100");
        assert_eq!(
            init["conversation_config_override"]["agent"]["first_message"],
            "Hi Ada"
        );

        wait_for(|| h.state.phase() == SessionPhase::Active).await;
        assert_eq!(h.state.stream_id().as_deref(), Some("SID1"));
        assert_eq!(h.state.call_id().as_deref(), Some("CA1"));
        assert_eq!(h.resolver.agents.lock().as_slice(), ["agent_default"]);
    }

    #[tokio::test]
    async fn test_agent_id_override_from_start() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({"agent_id": "agent_custom"})).await;
        assert_eq!(h.resolver.agents.lock().as_slice(), ["agent_custom"]);
    }

    #[tokio::test]
    async fn test_media_before_start_is_dropped() {
        let mut h = Harness::start(HarnessOptions::default());
        h.send_telephony(media_frame("QUJD"));
        h.send_telephony(json!({"event": "connected", "protocol": "Call"}));

        assert_quiet(&mut h.ai_out).await;
        assert_eq!(h.connector.calls(), 0);
        assert_eq!(h.state.phase(), SessionPhase::Initializing);
    }

    #[tokio::test]
    async fn test_media_while_ai_connecting_is_dropped() {
        let gate = Arc::new(Notify::new());
        let mut h = Harness::start(HarnessOptions {
            gate: Some(gate.clone()),
            ..Default::default()
        });

        h.send_telephony(start_frame("SID1", json!({})));
        wait_for(|| h.connector.calls() == 1).await;
        h.send_telephony(media_frame("QUJD"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.state.phase(), SessionPhase::AwaitingAiConnection);
        assert!(!h.task.is_finished());

        gate.notify_one();
        let first = recv_json(&mut h.ai_out).await;
        assert_eq!(first["type"], "conversation_initiation_client_data");
        assert_quiet(&mut h.ai_out).await;
    }

    #[tokio::test]
    async fn test_caller_audio_forwarded_when_active() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.send_telephony(media_frame("QUJD"));
        assert_eq!(
            recv_json(&mut h.ai_out).await,
            json!({"user_audio_chunk": "QUJD"})
        );
    }

    #[tokio::test]
    async fn test_invalid_base64_is_dropped() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.send_telephony(media_frame("not base64!!"));
        assert_quiet(&mut h.ai_out).await;
        assert_eq!(h.state.phase(), SessionPhase::Active);

        h.send_telephony(media_frame("QUJD"));
        assert_eq!(recv_json(&mut h.ai_out).await["user_audio_chunk"], "QUJD");
    }

    #[tokio::test]
    async fn test_agent_audio_addressed_to_stream() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.send_ai(json!({"type": "audio", "audio": {"chunk": "AAAA"}}));
        h.send_ai(json!({
            "type": "audio",
            "audio_event": {"audio_base_64": "BBBB", "event_id": 7}
        }));

        assert_eq!(
            recv_json(&mut h.telephony_out).await,
            json!({"event": "media", "streamSid": "SID1", "media": {"payload": "AAAA"}})
        );
        assert_eq!(
            recv_json(&mut h.telephony_out).await,
            json!({"event": "media", "streamSid": "SID1", "media": {"payload": "BBBB"}})
        );
    }

    #[tokio::test]
    async fn test_interruption_clears_playback() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.send_ai(json!({"type": "interruption", "interruption_event": {"event_id": 3}}));
        assert_eq!(
            recv_json(&mut h.telephony_out).await,
            json!({"event": "clear", "streamSid": "SID1"})
        );
    }

    #[tokio::test]
    async fn test_ping_yields_exactly_one_pong() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.send_ai(json!({"type": "agent_response", "agent_response_event": {"agent_response": "Hello"}}));
        h.send_ai(json!({"type": "ping", "ping_event": {"event_id": "abc123", "ping_ms": 20}}));
        h.send_ai(json!({"type": "interruption"}));

        assert_eq!(
            recv_json(&mut h.ai_out).await,
            json!({"type": "pong", "event_id": "abc123"})
        );
        assert_quiet(&mut h.ai_out).await;
    }

    #[tokio::test]
    async fn test_conversation_id_recorded() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.send_ai(json!({
            "type": "conversation_initiation_metadata",
            "conversation_initiation_metadata_event": {
                "conversation_id": "conv_42",
                "agent_output_audio_format": "ulaw_8000"
            }
        }));
        wait_for(|| h.state.conversation_id().is_some()).await;
        assert_eq!(h.state.conversation_id().as_deref(), Some("conv_42"));
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.telephony_in
            .unbounded_send(Ok(InboundFrame::Text("{not json".to_string())))
            .unwrap();
        h.ai_in
            .unbounded_send(Ok(InboundFrame::Text("[]".to_string())))
            .unwrap();
        h.send_ai(json!({"type": "audio"}));
        h.send_ai(json!({"type": "vad_score", "vad_score_event": {"vad_score": 0.9}}));

        assert_quiet(&mut h.telephony_out).await;
        assert_eq!(h.state.phase(), SessionPhase::Active);

        h.send_telephony(media_frame("QUJD"));
        assert_eq!(recv_json(&mut h.ai_out).await["user_audio_chunk"], "QUJD");
    }

    #[tokio::test]
    async fn test_duplicate_start_is_ignored() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.send_telephony(start_frame("SID2", json!({})));
        h.send_ai(json!({"type": "interruption"}));

        assert_eq!(
            recv_json(&mut h.telephony_out).await,
            json!({"event": "clear", "streamSid": "SID1"})
        );
        assert_eq!(h.resolver.calls(), 1);
        assert_eq!(h.connector.calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_closes_both_legs() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.send_telephony(json!({"event": "stop", "stop": {"callSid": "CA1"}}));
        assert_eq!(recv_frame(&mut h.ai_out).await, OutboundFrame::Close);
        assert_eq!(recv_frame(&mut h.telephony_out).await, OutboundFrame::Close);

        // Frames after stop are never read, on either leg
        let _ = h
            .telephony_in
            .unbounded_send(Ok(InboundFrame::Text(media_frame("QUJD").to_string())));
        let _ = h.ai_in.unbounded_send(Ok(InboundFrame::Text(
            json!({"type": "ping", "ping_event": {"event_id": 5}}).to_string(),
        )));
        let _ = h.ai_in.unbounded_send(Ok(InboundFrame::Text(
            json!({"type": "audio", "audio": {"chunk": "AAAA"}}).to_string(),
        )));

        timeout(Duration::from_secs(2), h.task)
            .await
            .expect("session did not finish")
            .unwrap();
        assert_eq!(h.state.phase(), SessionPhase::Closed);
        assert_eq!(h.state.ai_leg(), AiLegState::Closed);
        assert_quiet(&mut h.ai_out).await;
        assert_quiet(&mut h.telephony_out).await;
    }

    #[tokio::test]
    async fn test_credential_failure_closes_telephony_without_dialling() {
        let mut h = Harness::start(HarnessOptions {
            resolver_fails: true,
            ..Default::default()
        });
        h.send_telephony(start_frame("SID1", json!({})));

        assert_eq!(recv_frame(&mut h.telephony_out).await, OutboundFrame::Close);
        let connector = h.connector.clone();
        let resolver = h.resolver.clone();
        let state = h.finished().await;

        assert_eq!(resolver.calls(), 1);
        assert_eq!(connector.calls(), 0);
        assert_eq!(state.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn test_missing_agent_id_is_setup_failure() {
        let mut h = Harness::start(HarnessOptions {
            default_agent_id: None,
            ..Default::default()
        });
        h.send_telephony(start_frame("SID1", json!({"name": "Ada"})));

        assert_eq!(recv_frame(&mut h.telephony_out).await, OutboundFrame::Close);
        let resolver = h.resolver.clone();
        let state = h.finished().await;

        assert_eq!(resolver.calls(), 0);
        assert_eq!(state.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn test_ai_close_ends_session() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.ai_in.unbounded_send(Ok(InboundFrame::Close)).unwrap();
        assert_eq!(recv_frame(&mut h.telephony_out).await, OutboundFrame::Close);

        let state = h.finished().await;
        assert_eq!(state.phase(), SessionPhase::Closed);
        assert_eq!(state.telephony_leg(), TelephonyLegState::Closed);
    }

    #[tokio::test]
    async fn test_telephony_transport_error_tears_down_ai_leg() {
        let mut h = Harness::start(HarnessOptions::default());
        h.activate(json!({})).await;

        h.telephony_in
            .unbounded_send(Err(BridgeError::transport("telephony", "connection reset")))
            .unwrap();
        assert_eq!(recv_frame(&mut h.ai_out).await, OutboundFrame::Close);

        let state = h.finished().await;
        assert_eq!(state.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn test_hangup_while_dialling() {
        let gate = Arc::new(Notify::new());
        let h = Harness::start(HarnessOptions {
            gate: Some(gate),
            ..Default::default()
        });
        h.send_telephony(start_frame("SID1", json!({})));
        wait_for(|| h.connector.calls() == 1).await;

        h.telephony_in.unbounded_send(Ok(InboundFrame::Close)).unwrap();
        let state = h.finished().await;
        assert_eq!(state.phase(), SessionPhase::Closed);
        assert_eq!(state.ai_leg(), AiLegState::Closed);
    }

    #[tokio::test]
    async fn test_no_agent_audio_after_telephony_closed() {
        let (telephony_tx, mut telephony_rx) = mpsc::channel(8);
        let (ai_tx, _ai_rx) = mpsc::channel(8);
        let core = SessionCore {
            state: Arc::new(SessionState::new()),
            telephony: LegSender::new("telephony", telephony_tx),
            ai: RwLock::new(None),
            shutdown: CancellationToken::new(),
        };
        let ai = LegSender::new("ai", ai_tx);
        core.state.capture_start("SID1", None);

        core.handle_ai_text(r#"{"type":"audio","audio":{"chunk":"AAAA"}}"#, &ai)
            .unwrap();
        assert!(telephony_rx.try_recv().is_ok());

        core.state.mark_telephony_closed();
        core.handle_ai_text(r#"{"type":"audio","audio":{"chunk":"AAAA"}}"#, &ai)
            .unwrap();
        core.handle_ai_text(r#"{"type":"interruption"}"#, &ai)
            .unwrap();
        assert!(telephony_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bad_frames_are_recoverable_errors() {
        let (telephony_tx, _telephony_rx) = mpsc::channel(8);
        let (ai_tx, mut ai_rx) = mpsc::channel(8);
        let core = SessionCore {
            state: Arc::new(SessionState::new()),
            telephony: LegSender::new("telephony", telephony_tx),
            ai: RwLock::new(None),
            shutdown: CancellationToken::new(),
        };
        let ai = LegSender::new("ai", ai_tx);
        core.state.capture_start("SID1", None);
        assert!(core.attach_ai_leg(ai.clone()));

        let err = core.handle_ai_text(r#"{"type":"audio"}"#, &ai).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert!(!err.is_fatal());

        let err = core.forward_caller_audio("not base64!!").unwrap_err();
        match err {
            BridgeError::Protocol(ProtocolError::InvalidField { field, .. }) => {
                assert_eq!(field, "media.payload");
            }
            other => panic!("Expected InvalidField, got {other:?}"),
        }
        assert!(ai_rx.try_recv().is_err());
        assert!(core.forward_caller_audio("QUJD").is_ok());
        assert!(ai_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_agent_audio_read_during_teardown_is_not_forwarded() {
        let (telephony, _telephony_in, mut telephony_out) = channel_leg("telephony");
        let (ai_tx, _ai_rx) = mpsc::channel(8);
        let context = Arc::new(SessionContext::new(
            Arc::new(MockResolver::new(false)),
            Arc::new(MockConnector {
                leg: Mutex::new(None),
                gate: None,
                calls: AtomicUsize::new(0),
            }),
            SessionDefaults::default(),
            None,
        ));
        let mut session = BridgeSession::new(telephony.outbound, context);
        assert!(session.core.state.capture_start("SID1", None));

        // AI loop that still reads one frame after the token fires
        let core = session.core.clone();
        session.ai_task = Some(tokio::spawn(async move {
            core.shutdown.cancelled().await;
            let ai = LegSender::new("ai", ai_tx);
            core.handle_ai_text(r#"{"type":"audio","audio":{"chunk":"AAAA"}}"#, &ai)
                .unwrap();
            core.handle_ai_text(r#"{"type":"interruption"}"#, &ai)
                .unwrap();
        }));

        session.teardown().await;
        assert_eq!(recv_frame(&mut telephony_out).await, OutboundFrame::Close);
        assert!(telephony_out.try_recv().is_err());
    }
}
