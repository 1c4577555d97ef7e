//! Manages the telephony WebSocket lifecycle for a single call.
//!
//! The socket task owns one [`CallSession`] and drives it from three sources:
//! the pending AI connect, the telephony socket, and the AI socket once it is
//! open. Each input yields directives that are executed in order before the
//! next input is read.

use super::provider::RealtimeLink;
use crate::{handlers::ApiError, state::AppState};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use callbridge_core::{Directive, observer::CloseReason, session::CallSession};
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use std::{collections::VecDeque, fmt::Display, sync::Arc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Axum handler that upgrades the carrier's media-stream request.
///
/// The shared secret is checked before the upgrade is accepted.
pub async fn media_stream_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state.config.secret_matches(&headers) {
        warn!("Rejected media stream: shared secret mismatch");
        return ApiError::Forbidden.into_response();
    }
    match ws {
        Ok(ws) => ws.on_upgrade(|socket| handle_socket(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

#[instrument(name = "call_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(session_id));
    info!("Telephony media stream connected.");

    let (socket_tx, socket_rx) = socket.split();
    let telephony_tx = socket_tx
        .with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));
    let telephony_rx = socket_rx
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });

    run_call_session(telephony_tx, telephony_rx, state).await;
    info!("Telephony media stream finished.");
}

/// Runs one call until its session closes.
///
/// `telephony_tx` accepts serialized frames for the caller; `telephony_rx`
/// yields the caller's text frames and ends when the socket closes.
pub async fn run_call_session<Tx, Rx, E>(
    mut telephony_tx: Tx,
    mut telephony_rx: Rx,
    state: Arc<AppState>,
) where
    Tx: Sink<String> + Unpin,
    Tx::Error: Display,
    Rx: Stream<Item = Result<String, E>> + Unpin,
    E: Display,
{
    let mut session = CallSession::new(state.session_config.clone(), state.observer.clone());

    let connector = state.connector.clone();
    let connect_timeout = state.config.ai_connect_timeout;
    let mut connecting = Box::pin(tokio::time::timeout(connect_timeout, async move {
        connector.connect().await
    }));
    let mut connect_pending = true;
    let mut ai: Option<RealtimeLink> = None;

    while !session.is_closed() {
        let directives = tokio::select! {
            result = &mut connecting, if connect_pending => {
                connect_pending = false;
                match result {
                    Ok(Ok(link)) => {
                        ai = Some(link);
                        session.on_ai_open()
                    }
                    Ok(Err(e)) => {
                        warn!(error = ?e, "Failed to open realtime connection.");
                        session.on_ai_closed(CloseReason::AiError)
                    }
                    Err(_) => {
                        warn!(timeout_secs = connect_timeout.as_secs_f32(), "Realtime connection timed out.");
                        session.on_ai_closed(CloseReason::AiTimeout)
                    }
                }
            }
            frame = telephony_rx.next() => match frame {
                Some(Ok(text)) => session.on_telephony_message(&text),
                Some(Err(e)) => {
                    warn!(error = %e, "Telephony socket error.");
                    session.on_telephony_closed(CloseReason::TelephonyError)
                }
                None => {
                    info!("Telephony socket closed.");
                    session.on_telephony_closed(CloseReason::TelephonyClosed)
                }
            },
            frame = next_ai_frame(&mut ai) => match frame {
                Some(Ok(text)) => session.on_ai_message(&text),
                Some(Err(e)) => {
                    warn!(error = ?e, "Realtime socket error.");
                    session.on_ai_closed(CloseReason::AiError)
                }
                None => {
                    info!("Realtime socket closed.");
                    session.on_ai_closed(CloseReason::AiClosed)
                }
            },
        };

        execute(directives, &mut session, &mut telephony_tx, &mut ai).await;
    }
}

/// Waits for the next AI frame; never resolves while the connection is not open.
async fn next_ai_frame(ai: &mut Option<RealtimeLink>) -> Option<anyhow::Result<String>> {
    match ai {
        Some(link) => link.stream.next().await,
        None => future::pending().await,
    }
}

/// Executes directives in order. A failed send is fed back to the session as
/// an error on that side, and its close directives replace whatever was queued.
async fn execute<Tx>(
    directives: Vec<Directive>,
    session: &mut CallSession,
    telephony_tx: &mut Tx,
    ai: &mut Option<RealtimeLink>,
) where
    Tx: Sink<String> + Unpin,
    Tx::Error: Display,
{
    let mut queue = VecDeque::from(directives);
    while let Some(directive) = queue.pop_front() {
        match directive {
            Directive::SendToAi(text) => {
                let Some(link) = ai.as_mut() else {
                    debug!("Realtime connection is not open; dropping frame.");
                    continue;
                };
                if let Err(e) = link.sink.send(text).await {
                    warn!(error = ?e, "Failed to send to realtime service.");
                    *ai = None;
                    replace_queue(&mut queue, session.on_ai_closed(CloseReason::AiError));
                }
            }
            Directive::SendToTelephony(text) => {
                if let Err(e) = telephony_tx.send(text).await {
                    warn!(error = %e, "Failed to send to telephony socket.");
                    replace_queue(
                        &mut queue,
                        session.on_telephony_closed(CloseReason::TelephonyError),
                    );
                }
            }
            Directive::CloseAi => {
                if let Some(mut link) = ai.take() {
                    if let Err(e) = link.sink.close().await {
                        debug!(error = ?e, "Realtime connection did not close cleanly.");
                    }
                }
            }
            Directive::CloseTelephony => {
                if let Err(e) = telephony_tx.close().await {
                    debug!(error = %e, "Telephony socket did not close cleanly.");
                }
            }
        }
    }
}

/// Swaps pending work for the close directives of a failure. An empty set means
/// the session was already closed, so the pending close directives still run.
fn replace_queue(queue: &mut VecDeque<Directive>, closing: Vec<Directive>) {
    if !closing.is_empty() {
        queue.clear();
        queue.extend(closing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, DEFAULT_STREAM_SECRET_HEADER},
        models::MEDIA_STREAM_PATH,
        ws::provider::{RealtimeConnector, RealtimeLink},
    };
    use async_trait::async_trait;
    use axum::{
        extract::FromRequestParts,
        http::{HeaderValue, Request, StatusCode},
    };
    use callbridge_core::{generic_types::SessionConfig, observer::TracingObserver};
    use serde_json::{Value, json};
    use std::{
        pin::Pin,
        sync::Mutex,
        task::{Context, Poll},
        time::Duration,
    };
    use tokio::sync::{mpsc, oneshot};
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(String),
        Closed,
    }

    type Log = Arc<Mutex<Vec<Sent>>>;

    struct RecordingSink {
        log: Log,
        broken: bool,
    }

    impl Sink<String> for RecordingSink {
        type Error = anyhow::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: String) -> Result<(), Self::Error> {
            if self.broken {
                anyhow::bail!("broken pipe");
            }
            self.log.lock().unwrap().push(Sent::Text(item));
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.log.lock().unwrap().push(Sent::Closed);
            Poll::Ready(Ok(()))
        }
    }

    /// Hands out a prepared link once its gate opens, or fails if none was prepared.
    struct ScriptedConnector {
        link: Mutex<Option<RealtimeLink>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl RealtimeConnector for ScriptedConnector {
        async fn connect(&self) -> anyhow::Result<RealtimeLink> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.await?;
            }
            self.link
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    struct Harness {
        telephony_in: mpsc::UnboundedSender<Result<String, anyhow::Error>>,
        ai_in: mpsc::UnboundedSender<anyhow::Result<String>>,
        telephony_log: Log,
        ai_log: Log,
        gate: Option<oneshot::Sender<()>>,
        task: tokio::task::JoinHandle<()>,
    }

    struct Options {
        gated: bool,
        link_available: bool,
        ai_sink_broken: bool,
        connect_timeout: Duration,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                gated: false,
                link_available: true,
                ai_sink_broken: false,
                connect_timeout: Duration::from_secs(5),
            }
        }
    }

    fn spawn_call(options: Options) -> Harness {
        let telephony_log: Log = Arc::new(Mutex::new(Vec::new()));
        let ai_log: Log = Arc::new(Mutex::new(Vec::new()));
        let (telephony_in, telephony_rx) = mpsc::unbounded_channel();
        let (ai_in, ai_rx) = mpsc::unbounded_channel();

        let link = RealtimeLink {
            sink: Box::pin(RecordingSink {
                log: ai_log.clone(),
                broken: options.ai_sink_broken,
            }),
            stream: UnboundedReceiverStream::new(ai_rx).boxed(),
        };
        let (gate_tx, gate_rx) = oneshot::channel();
        let connector = ScriptedConnector {
            link: Mutex::new(options.link_available.then_some(link)),
            gate: Mutex::new(options.gated.then_some(gate_rx)),
        };

        let mut config = Config::for_tests();
        config.ai_connect_timeout = options.connect_timeout;
        let state = Arc::new(AppState {
            config: Arc::new(config),
            session_config: Arc::new(SessionConfig::new(
                "Be brief.".into(),
                "alloy".into(),
                "Greet the caller.".into(),
            )),
            connector: Arc::new(connector),
            observer: Arc::new(TracingObserver),
        });

        let telephony_tx = RecordingSink {
            log: telephony_log.clone(),
            broken: false,
        };
        let task = tokio::spawn(run_call_session(
            telephony_tx,
            UnboundedReceiverStream::new(telephony_rx),
            state,
        ));

        Harness {
            telephony_in,
            ai_in,
            telephony_log,
            ai_log,
            gate: options.gated.then_some(gate_tx),
            task,
        }
    }

    impl Harness {
        fn caller_sends(&self, frame: Value) {
            self.telephony_in.send(Ok(frame.to_string())).unwrap();
        }

        fn ai_sends(&self, frame: Value) {
            self.ai_in.send(Ok(frame.to_string())).unwrap();
        }

        /// Drops the only telephony sender, ending the inbound stream.
        fn hang_up(&mut self) {
            let (closed, _) = mpsc::unbounded_channel();
            self.telephony_in = closed;
        }

        fn open_gate(&mut self) {
            if let Some(gate) = self.gate.take() {
                gate.send(()).unwrap();
            }
        }

        async fn finished(self) -> (Vec<Sent>, Vec<Sent>) {
            tokio::time::timeout(Duration::from_secs(2), self.task)
                .await
                .expect("call session should finish")
                .unwrap();
            let telephony = self.telephony_log.lock().unwrap().clone();
            let ai = self.ai_log.lock().unwrap().clone();
            (telephony, ai)
        }
    }

    async fn wait_for_len(log: &Log, len: usize) {
        for _ in 0..200 {
            if log.lock().unwrap().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} frames, have {:?}", len, log.lock().unwrap());
    }

    fn json_frames(log: &[Sent]) -> Vec<Value> {
        log.iter()
            .filter_map(|s| match s {
                Sent::Text(text) => Some(serde_json::from_str(text).unwrap()),
                Sent::Closed => None,
            })
            .collect()
    }

    fn start(call_id: &str) -> Value {
        json!({"event": "start", "streamSid": call_id, "start": {"streamSid": call_id, "callSid": "CA-carrier"}})
    }

    fn media(payload: &str) -> Value {
        json!({"event": "media", "media": {"payload": payload}})
    }

    /// The rejection axum produces for a plain GET without upgrade headers.
    async fn not_an_upgrade() -> WebSocketUpgradeRejection {
        let (mut parts, _) = Request::get(MEDIA_STREAM_PATH)
            .body(())
            .unwrap()
            .into_parts();
        match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(_) => panic!("a plain GET should not upgrade"),
            Err(rejection) => rejection,
        }
    }

    fn guarded_state() -> Arc<AppState> {
        let mut config = Config::for_tests();
        config.stream_secret = Some("s3cret".to_string());
        Arc::new(AppState {
            config: Arc::new(config),
            session_config: Arc::new(SessionConfig::new(
                "Be brief.".into(),
                "alloy".into(),
                "Greet the caller.".into(),
            )),
            connector: Arc::new(ScriptedConnector {
                link: Mutex::new(None),
                gate: Mutex::new(None),
            }),
            observer: Arc::new(TracingObserver),
        })
    }

    #[tokio::test]
    async fn test_media_stream_rejects_bad_secret_before_upgrade() {
        let state = guarded_state();

        let missing =
            media_stream_handler(State(state.clone()), HeaderMap::new(), Err(not_an_upgrade().await))
                .await;
        assert_eq!(missing.status(), StatusCode::FORBIDDEN);

        let mut wrong = HeaderMap::new();
        wrong.insert(DEFAULT_STREAM_SECRET_HEADER, HeaderValue::from_static("wrong"));
        let rejected =
            media_stream_handler(State(state.clone()), wrong, Err(not_an_upgrade().await)).await;
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

        // With the right secret the upgrade rejection itself is returned.
        let mut right = HeaderMap::new();
        right.insert(DEFAULT_STREAM_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        let passed = media_stream_handler(State(state), right, Err(not_an_upgrade().await)).await;
        assert_ne!(passed.status(), StatusCode::FORBIDDEN);
        assert!(passed.status().is_client_error());
    }

    #[tokio::test]
    async fn test_full_call_relays_in_order() {
        let mut call = spawn_call(Options {
            gated: true,
            ..Options::default()
        });
        call.caller_sends(start("CA123"));
        call.caller_sends(media("AAA"));
        call.caller_sends(media("BBB"));
        call.open_gate();

        wait_for_len(&call.ai_log, 4).await;
        call.ai_sends(json!({"type": "response.audio.delta", "delta": "XYZ"}));
        call.ai_sends(json!({"type": "response.text.delta", "delta": "[[ROUTE:JAY]]"}));
        call.ai_sends(json!({"type": "response.audio.done"}));
        wait_for_len(&call.telephony_log, 2).await;
        call.caller_sends(json!({"event": "stop"}));

        let (telephony, ai) = call.finished().await;

        let ai_frames = json_frames(&ai);
        assert_eq!(ai_frames.len(), 5);
        assert_eq!(ai_frames[0]["type"], "session.update");
        assert_eq!(ai_frames[1]["type"], "response.create");
        assert_eq!(ai_frames[2]["audio"], "AAA");
        assert_eq!(ai_frames[3]["audio"], "BBB");
        assert_eq!(ai_frames[4], json!({"type": "input_audio_buffer.commit"}));
        assert_eq!(ai.last(), Some(&Sent::Closed));

        assert_eq!(
            json_frames(&telephony),
            vec![
                json!({"event": "media", "streamSid": "CA123", "media": {"payload": "XYZ", "track": "outbound"}}),
                json!({"event": "mark", "streamSid": "CA123", "mark": {"name": "done"}}),
            ]
        );
        assert_eq!(telephony.last(), Some(&Sent::Closed));
    }

    #[tokio::test]
    async fn test_connect_timeout_closes_caller() {
        let call = spawn_call(Options {
            gated: true,
            connect_timeout: Duration::from_millis(50),
            ..Options::default()
        });
        call.caller_sends(start("CA1"));
        call.caller_sends(media("AAA"));

        // The gate sender stays alive inside the harness, so the connect never resolves.
        let (telephony, ai) = call.finished().await;
        assert_eq!(telephony, vec![Sent::Closed]);
        assert!(ai.is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_closes_caller() {
        let call = spawn_call(Options {
            link_available: false,
            ..Options::default()
        });
        call.caller_sends(start("CA2"));

        let (telephony, ai) = call.finished().await;
        assert_eq!(telephony, vec![Sent::Closed]);
        assert!(ai.is_empty());
    }

    #[tokio::test]
    async fn test_caller_hangup_closes_ai() {
        let mut call = spawn_call(Options::default());
        call.caller_sends(start("CA3"));
        wait_for_len(&call.ai_log, 2).await;

        call.hang_up();

        let (telephony, ai) = call.finished().await;
        assert!(telephony.is_empty());
        assert_eq!(ai.last(), Some(&Sent::Closed));
        assert_eq!(json_frames(&ai).len(), 2);
    }

    #[tokio::test]
    async fn test_ai_disconnect_closes_caller() {
        let call = spawn_call(Options::default());
        call.caller_sends(start("CA4"));
        wait_for_len(&call.ai_log, 2).await;
        call.ai_in.send(Err(anyhow::anyhow!("connection reset"))).unwrap();

        let (telephony, ai) = call.finished().await;
        assert_eq!(telephony, vec![Sent::Closed]);
        assert!(!ai.contains(&Sent::Closed));
    }

    #[tokio::test]
    async fn test_failed_ai_send_closes_caller() {
        let call = spawn_call(Options {
            ai_sink_broken: true,
            ..Options::default()
        });
        call.caller_sends(start("CA5"));
        call.caller_sends(media("AAA"));

        let (telephony, ai) = call.finished().await;
        assert_eq!(telephony, vec![Sent::Closed]);
        assert!(ai.is_empty());
    }

    #[tokio::test]
    async fn test_noise_is_ignored() {
        let call = spawn_call(Options::default());
        call.telephony_in.send(Ok("not json".to_string())).unwrap();
        call.caller_sends(json!({"event": "connected", "protocol": "Call"}));
        call.caller_sends(start("CA6"));
        wait_for_len(&call.ai_log, 2).await;
        call.ai_in.send(Ok("{{{".to_string())).unwrap();
        call.ai_sends(json!({"type": "session.updated"}));
        call.caller_sends(media("AAA"));
        wait_for_len(&call.ai_log, 3).await;
        call.caller_sends(json!({"event": "stop"}));

        let (telephony, ai) = call.finished().await;
        assert_eq!(telephony, vec![Sent::Closed]);
        assert_eq!(json_frames(&ai).len(), 4);
    }
}
