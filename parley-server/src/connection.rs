//! One WebSocket connection = one [`Session`].
//!
//! The read half feeds binary frames to the audio path and text frames to the
//! control path. A writer task multiplexes session events and paced playback
//! onto the write half.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use parley_core::{
    Outbound, OutboundTracker, Pacer, PlaybackItem, PlaybackScheduler, ServerEvent, Session,
    SessionFlow,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message},
    WebSocketStream,
};
use tracing::{debug, info, warn, Instrument};

use crate::state::ServerState;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

#[derive(Debug, Clone, Copy)]
struct WriterOptions {
    inline_audio: bool,
    pacing: bool,
    frame_ms: u32,
    lead_frames: u32,
}

pub async fn serve(stream: TcpStream, peer: SocketAddr, state: Arc<ServerState>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };

    let (id, open) = state.register(peer);
    let span = tracing::info_span!("connection", session_id = id, %peer);
    async move {
        info!(open_connections = open, "client connected");
        let snapshot = run_session(ws, id, &state).await;
        let open = state.unregister(id, snapshot.as_ref());
        info!(open_connections = open, "client disconnected");
    }
    .instrument(span)
    .await;
}

async fn run_session(
    ws: WebSocketStream<TcpStream>,
    id: u64,
    state: &ServerState,
) -> Option<parley_core::DiagnosticsSnapshot> {
    let (sink, mut source) = ws.split();
    let config = state.session_config.clone();
    let (mut session, events) =
        match Session::with_energy_vad(id, config.clone(), state.collaborators.clone()) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "session setup failed");
                let mut sink = sink;
                let event = ServerEvent::error(&e, None);
                let _ = send_event(&mut sink, &event).await;
                let _ = sink.close().await;
                return None;
            }
        };

    let options = WriterOptions {
        inline_audio: state.settings.inline_audio,
        pacing: config.pacing,
        frame_ms: config.playback_frame_ms,
        lead_frames: config.pacing_lead_frames,
    };
    let writer = tokio::spawn(
        write_loop(sink, events, session.playback(), options).in_current_span(),
    );

    while let Some(msg) = source.next().await {
        let flow = match msg {
            Ok(Message::Binary(bytes)) => session.handle_audio(&bytes),
            Ok(Message::Text(text)) => session.handle_control(text.as_str()),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "close frame received");
                SessionFlow::Close
            }
            // Ping/pong are answered by tungstenite.
            Ok(_) => SessionFlow::Continue,
            Err(e) => {
                debug!(error = %e, "websocket read failed");
                SessionFlow::Close
            }
        };
        if flow == SessionFlow::Close {
            break;
        }
    }

    let snapshot = session.shutdown().await;
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "websocket write failed"),
        Err(e) => warn!(error = %e, "writer task panicked"),
    }
    Some(snapshot)
}

async fn send_event(sink: &mut WsSink, event: &ServerEvent) -> Result<(), WsError> {
    match event.to_json() {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "dropping unserializable event");
            Ok(())
        }
    }
}

/// Wait for the next send slot, then take the head of the queue. A cancel
/// that lands during the wait has already purged the queue, so its frames are
/// never taken.
async fn paced_next(
    playback: &PlaybackScheduler,
    pacer: &mut Pacer,
    pacing: bool,
) -> Option<PlaybackItem> {
    if pacing {
        pacer.ready().await;
    }
    playback.next().await
}

async fn write_loop(
    mut sink: WsSink,
    mut events: UnboundedReceiver<ServerEvent>,
    playback: Arc<PlaybackScheduler>,
    options: WriterOptions,
) -> Result<(), WsError> {
    let mut tracker = OutboundTracker::new(options.inline_audio);
    let mut pacer = Pacer::new(options.frame_ms, options.lead_frames);
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;
            event = events.recv(), if events_open => match event {
                Some(event) => send_event(&mut sink, &event).await?,
                None => events_open = false,
            },
            item = paced_next(&playback, &mut pacer, options.pacing) => {
                let Some(item) = item else { break };
                if !item.is_frame() {
                    debug!(
                        generation = item.generation(),
                        frames = pacer.frames_sent(),
                        "generation delivered"
                    );
                    pacer.reset();
                } else {
                    if tracker.current() != Some(item.generation()) {
                        pacer.reset();
                    }
                    pacer.mark_sent();
                }
                for out in tracker.on_item(item) {
                    match out {
                        Outbound::Event(event) => send_event(&mut sink, &event).await?,
                        Outbound::Audio { pcm16, .. } => {
                            sink.send(Message::Binary(pcm16.into())).await?
                        }
                    }
                }
            }
        }
    }

    // Playback closed; deliver whatever the session emitted on the way out.
    while let Ok(event) = events.try_recv() {
        send_event(&mut sink, &event).await?;
    }
    sink.close().await
}
